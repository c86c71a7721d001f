use arbor_types::{NodeId, Result, Tree, Value};

/// Serialize every child of the tree root (the inverse of [`parse`](crate::parse)).
pub fn to_string(tree: &Tree) -> Result<String> {
    write_children(tree, tree.root())
}

/// Serialize the children of `node`, each at indentation level zero.
pub fn write_children(tree: &Tree, node: NodeId) -> Result<String> {
    let mut out = String::new();
    for &child in tree.children(node)? {
        write_node(tree, child, 0, &mut out)?;
    }
    Ok(out)
}

/// Serialize `node` itself and its subtree.
pub fn node_to_string(tree: &Tree, node: NodeId) -> Result<String> {
    let mut out = String::new();
    write_node(tree, node, 0, &mut out)?;
    Ok(out)
}

fn write_node(tree: &Tree, node: NodeId, depth: usize, out: &mut String) -> Result<()> {
    for _ in 0..depth {
        out.push_str("  ");
    }
    let name = tree.name(node)?;
    let value = tree.value(node)?;

    if name.is_empty() && value.is_none() {
        out.push_str("\"\"");
    } else {
        out.push_str(&quote_if_needed(name, true));
    }

    match value {
        Value::None => {}
        Value::Text(text) => {
            out.push(':');
            out.push_str(&quote_if_needed(text, false));
        }
        Value::Node(target) => {
            out.push_str(":node:");
            out.push_str(&tree.path(*target)?.to_string());
        }
        other => {
            out.push(':');
            out.push_str(other.type_name());
            out.push(':');
            // every non-node variant has a literal form
            out.push_str(&other.to_literal().unwrap_or_default());
        }
    }
    out.push('\n');

    for &child in tree.children(node)? {
        write_node(tree, child, depth + 1, out)?;
    }
    Ok(())
}

fn needs_quotes(text: &str, is_name: bool) -> bool {
    text.contains('"')
        || text.contains(':')
        || text.contains('\n')
        || text.contains('\r')
        || text.starts_with("//")
        || text.starts_with("/*")
        || text.trim() != text
        || (is_name && text.is_empty())
}

fn quote_if_needed(text: &str, is_name: bool) -> String {
    if is_name && text.is_empty() {
        // empty name followed by a value is written as a bare leading ':'
        return String::new();
    }
    if !needs_quotes(text, is_name) {
        return text.to_string();
    }
    if text.contains('\n') {
        return format!("@\"{}\"", text.replace('"', "\"\""));
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_entries_stay_bare() {
        let mut tree = Tree::new();
        let root = tree.root();
        let data = tree.add_new(root, "_data", Value::None).unwrap();
        tree.add_new(data, "name", "Thomas").unwrap();
        tree.add_new(data, "age", 42).unwrap();
        assert_eq!(to_string(&tree).unwrap(), "_data\n  name:Thomas\n  age:int:42\n");
    }

    #[test]
    fn ambiguous_text_is_quoted() {
        assert_eq!(quote_if_needed("int:5", false), "\"int:5\"");
        assert_eq!(quote_if_needed(" padded", false), "\" padded\"");
        assert_eq!(quote_if_needed("two\nlines", false), "@\"two\nlines\"");
        assert_eq!(quote_if_needed("say \"x\"", false), "\"say \\\"x\\\"\"");
        assert_eq!(quote_if_needed("plain", false), "plain");
    }

    #[test]
    fn empty_names() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.add_new(root, "", "arg").unwrap();
        tree.add_new(root, "", Value::None).unwrap();
        assert_eq!(to_string(&tree).unwrap(), ":arg\n\"\"\n");
    }

    #[test]
    fn references_are_written_as_addresses() {
        let mut tree = Tree::new();
        let root = tree.root();
        let target = tree.add_new(root, "target", Value::None).unwrap();
        let holder = tree.add_new(root, "holder", Value::None).unwrap();
        tree.set_value(holder, Value::Node(target)).unwrap();
        assert_eq!(
            node_to_string(&tree, holder).unwrap(),
            "holder:node:0\n"
        );
    }
}
