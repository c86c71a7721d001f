use serde::{Deserialize, Serialize};

use arbor_types::{Address, ArborError, NodeId, Result, Tree, Value};

/// Serde-friendly mirror of a node and its subtree, used for JSON output.
///
/// `type` carries the codec type tag (absent for untyped text and for
/// valueless nodes); `value` is the literal text form. Node references are
/// stored as the target's address, counted from the document's top node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDoc {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDoc>,
}

/// Build the document form of `node` and its subtree.
pub fn to_document(tree: &Tree, node: NodeId) -> Result<NodeDoc> {
    let top = tree.top(node)?;
    to_document_inner(tree, node, top)
}

fn to_document_inner(tree: &Tree, node: NodeId, top: NodeId) -> Result<NodeDoc> {
    let (type_name, value) = match tree.value(node)? {
        Value::None => (None, None),
        Value::Text(s) => (None, Some(s.clone())),
        Value::Node(target) => {
            let addr = if tree.top(*target)? == top {
                tree.path(*target)?.to_string()
            } else {
                String::new()
            };
            (Some("node".to_string()), Some(addr))
        }
        other => (
            Some(other.type_name().to_string()),
            other.to_literal(),
        ),
    };
    let children = tree
        .children(node)?
        .iter()
        .map(|&child| to_document_inner(tree, child, top))
        .collect::<Result<Vec<_>>>()?;
    Ok(NodeDoc {
        name: tree.name(node)?.to_string(),
        type_name,
        value,
        children,
    })
}

impl NodeDoc {
    /// Rebuild a tree whose root is this document's top node.
    pub fn into_tree(&self) -> Result<Tree> {
        let mut tree = Tree::with_root(self.name.clone(), Value::None);
        let root = tree.root();
        let mut references = Vec::new();
        self.fill(&mut tree, root, &mut references)?;
        for (node, literal) in references {
            let addr: Address = literal.parse()?;
            let target = tree.resolve(&addr)?;
            tree.set_value(node, Value::Node(target))?;
        }
        Ok(tree)
    }

    fn fill(
        &self,
        tree: &mut Tree,
        node: NodeId,
        references: &mut Vec<(NodeId, String)>,
    ) -> Result<()> {
        let value = match (self.type_name.as_deref(), &self.value) {
            (_, None) => Value::None,
            (None, Some(text)) => Value::Text(text.clone()),
            (Some("node"), Some(literal)) => {
                if literal.is_empty() {
                    return Err(ArborError::Other(format!(
                        "node '{}' references a target outside the document",
                        self.name
                    )));
                }
                references.push((node, literal.clone()));
                Value::None
            }
            (Some(tag), Some(literal)) => Value::from_typed(tag, literal)?,
        };
        tree.set_value(node, value)?;
        for child in &self.children {
            let id = tree.add_new(node, child.name.clone(), Value::None)?;
            child.fill(tree, id, references)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_serializes_compactly() {
        let mut tree = Tree::new();
        let root = tree.root();
        let data = tree.add_new(root, "_data", Value::None).unwrap();
        tree.add_new(data, "count", 3).unwrap();
        tree.add_new(data, "label", "x").unwrap();
        let doc = to_document(&tree, data).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "_data",
                "children": [
                    {"name": "count", "type": "int", "value": "3"},
                    {"name": "label", "value": "x"}
                ]
            })
        );
    }

    #[test]
    fn document_round_trips_through_json() {
        let mut tree = Tree::new();
        let root = tree.root();
        let target = tree.add_new(root, "target", 1.5).unwrap();
        let holder = tree.add_new(root, "holder", Value::None).unwrap();
        tree.set_value(holder, Value::Node(target)).unwrap();

        let doc = to_document(&tree, root).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let back: NodeDoc = serde_json::from_str(&json).unwrap();
        let rebuilt = back.into_tree().unwrap();
        let new_root = rebuilt.root();
        let new_target = rebuilt.child(new_root, 0).unwrap().unwrap();
        let new_holder = rebuilt.child(new_root, 1).unwrap().unwrap();
        assert_eq!(rebuilt.value(new_target).unwrap(), &Value::Float(1.5));
        assert_eq!(rebuilt.value(new_holder).unwrap(), &Value::Node(new_target));
    }
}
