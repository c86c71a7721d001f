//! Hyperlisp: the indentation-structured text form of Arbor node trees.
//!
//! One node per line, two spaces of indentation per level, written as `name`,
//! `name:value`, or `name:type:value`. Untagged values are text; tagged values
//! are parsed with the type's literal rules (`int`, `float`, `bool`, `blob`,
//! `date`, `time`, `guid`, `path`, `node`). Also provides [`NodeDoc`], a
//! serde-serializable mirror of a subtree for JSON output.
//!
//! # Example
//! ```
//! let tree = arbor_hyperlisp::parse("_data\n  foo:bar\n  count:int:5\n").unwrap();
//! let root = tree.root();
//! let data = tree.child(root, 0).unwrap().unwrap();
//! assert_eq!(tree.name(data).unwrap(), "_data");
//! assert_eq!(tree.child_count(data).unwrap(), 2);
//! assert_eq!(arbor_hyperlisp::to_string(&tree).unwrap(), "_data\n  foo:bar\n  count:int:5\n");
//! ```

mod document;
mod parser;
mod writer;

pub use document::{to_document, NodeDoc};
pub use parser::parse;
pub use writer::{node_to_string, to_string, write_children};

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::{Address, ArborError, Tree, Value};
    use std::time::Duration;

    fn child(tree: &Tree, path: &str) -> arbor_types::NodeId {
        tree.resolve(&path.parse::<Address>().unwrap()).unwrap()
    }

    #[test]
    fn parse_nested_structure() {
        let input = "_data\n  foo1:success\n    bar1:int:5\n_other";
        let tree = parse(input).unwrap();
        let root = tree.root();
        assert_eq!(tree.child_count(root).unwrap(), 2);
        let foo = child(&tree, "0-0");
        assert_eq!(tree.name(foo).unwrap(), "foo1");
        assert_eq!(tree.value(foo).unwrap(), &Value::Text("success".into()));
        let bar = child(&tree, "0-0-0");
        assert_eq!(tree.value(bar).unwrap(), &Value::Integer(5));
        assert_eq!(tree.name(child(&tree, "1")).unwrap(), "_other");
    }

    #[test]
    fn parse_dedent_by_several_levels() {
        let tree = parse("a\n  b\n    c\n      d\ne").unwrap();
        let root = tree.root();
        assert_eq!(tree.child_count(root).unwrap(), 2);
        assert_eq!(tree.name(child(&tree, "1")).unwrap(), "e");
        assert_eq!(tree.name(child(&tree, "0-0-0-0")).unwrap(), "d");
    }

    #[test]
    fn parse_all_value_types() {
        let input = r#"s:hello
explicit:string:int:5
i:int:-3
f:float:2.5
b:bool:true
blob:blob:aGk=
d:date:2024-01-02T03:04:05Z
t:time:5s
g:guid:67e55044-10b1-426f-9247-bb680e5fe0c8
p:path:0-1
n:node:1
empty:
none
"#;
        let tree = parse(input).unwrap();
        let value = |i: usize| tree.value(child(&tree, &i.to_string())).unwrap().clone();
        assert_eq!(value(0), Value::Text("hello".into()));
        assert_eq!(value(1), Value::Text("int:5".into()));
        assert_eq!(value(2), Value::Integer(-3));
        assert_eq!(value(3), Value::Float(2.5));
        assert_eq!(value(4), Value::Boolean(true));
        assert_eq!(value(5), Value::Bytes(b"hi".to_vec()));
        assert_eq!(value(6).type_name(), "date");
        assert_eq!(value(7), Value::Duration(Duration::from_secs(5)));
        assert_eq!(value(8).type_name(), "guid");
        assert_eq!(value(9), Value::Path(Address::new(vec![0, 1])));
        assert_eq!(value(10), Value::Node(child(&tree, "1")));
        assert_eq!(value(11), Value::Text(String::new()));
        assert_eq!(value(12), Value::None);
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let input = "// header\n\na:1\n  // inside\n  b\n/* block\n   comment */\nc\n";
        let tree = parse(input).unwrap();
        assert_eq!(tree.child_count(tree.root()).unwrap(), 2);
        assert_eq!(tree.name(child(&tree, "0-0")).unwrap(), "b");
    }

    #[test]
    fn parse_multiline_value() {
        let tree = parse("text:@\"line one\nline \"\"two\"\"\"\nnext").unwrap();
        assert_eq!(
            tree.value(child(&tree, "0")).unwrap(),
            &Value::Text("line one\nline \"two\"".into())
        );
        assert_eq!(tree.name(child(&tree, "1")).unwrap(), "next");
    }

    #[test]
    fn odd_indentation_reports_line() {
        let err = parse("a\n   b").unwrap_err();
        match err {
            ArborError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("odd indentation"), "{message}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn indentation_jump_is_error() {
        let err = parse("a\n    b").unwrap_err();
        assert!(matches!(err, ArborError::Parse { line: 2, .. }), "{err}");
    }

    #[test]
    fn bad_typed_literal_is_parse_error() {
        let err = parse("ok\nx:int:five").unwrap_err();
        assert!(matches!(err, ArborError::Parse { line: 2, .. }), "{err}");
    }

    #[test]
    fn dangling_node_reference_is_error() {
        assert!(parse("x:node:4-4").is_err());
    }

    #[test]
    fn round_trip_preserves_values_and_types() {
        let input = r#"_data
  text:"needs: quoting"
  multi:@"a
b"
  num:int:7
  ratio:float:0.5
  flag:bool:false
  bytes:blob:AAH+
  when:date:2024-05-06T07:08:09.123Z
  wait:time:250ms
  id:guid:00000000-0000-0000-0000-000000000000
  where:path:0-2
  ref:node:0-2
  "":"@/../*?node"
  :arg
  """#;
        let first = parse(input).unwrap();
        let text = to_string(&first).unwrap();
        let second = parse(&text).unwrap();
        assert_eq!(to_string(&second).unwrap(), text);
        assert_eq!(second.len(), first.len());
        let reference = child(&second, "0-10");
        assert_eq!(second.value(reference).unwrap(), &Value::Node(child(&second, "0-2")));
    }

    #[test]
    fn document_json_round_trip() {
        let tree = parse("_data\n  a:int:1\n  b:hello\n").unwrap();
        let data = child(&tree, "0");
        let doc = to_document(&tree, data).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let back: NodeDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        let rebuilt = back.into_tree().unwrap();
        assert_eq!(node_to_string(&rebuilt, rebuilt.root()).unwrap(), "_data\n  a:int:1\n  b:hello\n");
    }
}
