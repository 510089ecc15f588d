//! Nested key/value documents and the structural operations over them.
//!
//! A document is a [`Tree`]: an ordered mapping whose values are [`Node`]s.
//! Sequences of mappings behave like record sequences: merging two of them
//! merges element by element instead of concatenating.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::DocumentError;

/// One value in a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Scalar(String),
    Map(Tree),
    Seq(Vec<Node>),
}

impl Node {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Tree> {
        match self {
            Node::Map(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(items) => Some(items),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::Map(_) => "mapping",
            Node::Seq(_) => "sequence",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Scalar(s) => write!(f, "{}", s),
            other => write!(f, "{}", Value::from(other.clone())),
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Scalar(s.to_owned())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Scalar(s)
    }
}

impl From<Tree> for Node {
    fn from(tree: Tree) -> Self {
        Node::Map(tree)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Seq(items)
    }
}

/// An ordered mapping from keys to nodes.
///
/// Keys are unique. Inserting an existing key replaces its value in place, so
/// key order is the order of first insertion. Equality ignores key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    entries: IndexMap<String, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(key)
    }

    /// Value of `key` if it is a scalar.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_scalar)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<Node>) -> Option<Node> {
        self.entries.insert(key.into(), node.into())
    }

    /// Removes `key`, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, node)| (k.as_str(), node))
    }
}

impl<K: Into<String>, N: Into<Node>> FromIterator<(K, N)> for Tree {
    fn from_iter<I: IntoIterator<Item = (K, N)>>(iter: I) -> Self {
        let mut tree = Tree::new();
        tree.extend(iter);
        tree
    }
}

impl<K: Into<String>, N: Into<Node>> Extend<(K, N)> for Tree {
    fn extend<I: IntoIterator<Item = (K, N)>>(&mut self, iter: I) {
        for (key, node) in iter {
            self.insert(key, node);
        }
    }
}

impl IntoIterator for Tree {
    type Item = (String, Node);
    type IntoIter = indexmap::map::IntoIter<String, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl TryFrom<Value> for Node {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Err(DocumentError::UnsupportedValue("null".to_owned())),
            Value::Bool(b) => Ok(Node::Scalar(b.to_string())),
            Value::Number(n) => Ok(Node::Scalar(n.to_string())),
            Value::String(s) => Ok(Node::Scalar(s)),
            Value::Array(items) => items
                .into_iter()
                .map(Node::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Node::Seq),
            Value::Object(map) => Tree::try_from(Value::Object(map)).map(Node::Map),
        }
    }
}

impl TryFrom<Value> for Tree {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| Ok((key, Node::try_from(value)?)))
                .collect(),
            _ => Err(DocumentError::WrongKind {
                field: "document".to_owned(),
                expected: "a mapping",
            }),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Scalar(s) => Value::String(s),
            Node::Map(tree) => tree.into(),
            Node::Seq(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        }
    }
}

impl From<Tree> for Value {
    fn from(tree: Tree) -> Self {
        Value::Object(
            tree.into_iter()
                .map(|(key, node)| (key, Value::from(node)))
                .collect::<Map<String, Value>>(),
        )
    }
}

/// Kind check used when reading typed structures out of a tree.
pub(crate) fn expect_kind<'a, T>(
    field: &str,
    node: &'a Node,
    pick: impl FnOnce(&'a Node) -> Option<T>,
    expected: &'static str,
) -> Result<T, DocumentError> {
    pick(node).ok_or_else(|| {
        log::debug!("field `{}` is a {}, wanted {}", field, node.kind(), expected);
        DocumentError::WrongKind {
            field: field.to_owned(),
            expected,
        }
    })
}

/// Deep-merges `src` into a copy of `dest`.
///
/// Mappings merge key by key. A sequence in `src` meeting a sequence in `dest`
/// merges position-wise: element `i` of the result is element `i` of `src`,
/// merged into element `i` of `dest` when both are mappings. The result has
/// the length of `src`. Any other value in `src` replaces its counterpart.
pub fn merge_document(dest: &Tree, src: &Tree) -> Tree {
    let mut merged = dest.clone();
    for (key, node) in src.iter() {
        let node = match (merged.get(key), node) {
            (Some(Node::Map(existing)), Node::Map(sub)) => Node::Map(merge_document(existing, sub)),
            (Some(Node::Seq(existing)), Node::Seq(items)) => {
                Node::Seq(merge_sequence(existing, items))
            }
            (_, node) => node.clone(),
        };
        merged.insert(key, node);
    }
    merged
}

fn merge_sequence(dest: &[Node], src: &[Node]) -> Vec<Node> {
    src.iter()
        .enumerate()
        .map(|(i, node)| match (dest.get(i), node) {
            (Some(Node::Map(existing)), Node::Map(sub)) => Node::Map(merge_document(existing, sub)),
            (_, node) => node.clone(),
        })
        .collect()
}

/// Left fold of [`merge_document`] over `docs`. `None` for no documents.
pub fn combine_documents<'a, I>(docs: I) -> Option<Tree>
where
    I: IntoIterator<Item = &'a Tree>,
{
    docs.into_iter().fold(None, |combined, doc| match combined {
        Some(combined) => Some(merge_document(&combined, doc)),
        None => Some(doc.clone()),
    })
}

/// Builds a new document by copying the value at each dotted source path in
/// `map` to its dotted destination path. Absent sources are skipped.
pub fn transform_by_map<'a, I>(doc: &Tree, map: I) -> Tree
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    map.into_iter().fold(Tree::new(), |mut out, (src, dst)| {
        if let Some(node) = find_value(doc, src) {
            insert_value(&mut out, &split_path(dst), node.clone());
        }
        out
    })
}

/// [`transform_by_map`] with sources and destinations swapped.
pub fn transform_by_inverted_map<'a, I>(doc: &Tree, map: I) -> Tree
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let inverted: Vec<(&str, &str)> = map.into_iter().map(|(src, dst)| (dst, src)).collect();
    transform_by_map(doc, inverted)
}

/// Whether the dotted `path` names a value in `doc`.
pub fn document_contains_path(doc: &Tree, path: &str) -> bool {
    find_value(doc, path).is_some()
}

/// Projects `doc` down to the shape of `assoc_doc`.
///
/// Keys of `assoc_doc` absent from `doc` are dropped. Nested mappings recurse;
/// sequences recurse position-wise up to the shorter of the two. Other values
/// are taken from `doc` as they are.
pub fn extract_corresponding(doc: &Tree, assoc_doc: &Tree) -> Tree {
    let empty = Tree::new();
    assoc_doc
        .iter()
        .filter_map(|(key, assoc)| {
            let node = doc.get(key)?;
            let node = match (node, assoc) {
                (Node::Map(sub), Node::Map(assoc_sub)) => {
                    Node::Map(extract_corresponding(sub, assoc_sub))
                }
                (Node::Map(sub), _) => Node::Map(extract_corresponding(sub, &empty)),
                (Node::Seq(items), Node::Seq(assoc_items)) => Node::Seq(
                    items
                        .iter()
                        .zip(assoc_items)
                        .map(|pair| match pair {
                            (Node::Map(item), Node::Map(assoc_item)) => {
                                Node::Map(extract_corresponding(item, assoc_item))
                            }
                            (item, _) => item.clone(),
                        })
                        .collect(),
                ),
                (node, _) => node.clone(),
            };
            Some((key, node))
        })
        .collect()
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

fn find_value<'a>(doc: &'a Tree, path: &str) -> Option<&'a Node> {
    let parts = split_path(path);
    let (last, init) = parts.split_last()?;
    let mut current = doc;
    for part in init {
        current = current.get(part)?.as_map()?;
    }
    current.get(last)
}

fn insert_value(doc: &mut Tree, path: &[&str], node: Node) {
    match path {
        [] => {}
        [key] => {
            doc.insert(*key, node);
        }
        [key, rest @ ..] => {
            let mut sub = match doc.get(key) {
                Some(Node::Map(existing)) => existing.clone(),
                _ => Tree::new(),
            };
            insert_value(&mut sub, rest, node);
            doc.insert(*key, sub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> Tree {
        Tree::try_from(value).unwrap()
    }

    #[test]
    fn test_merge_nested_mappings() {
        let dest = tree(json!({"meta": {"expects": {"foo": ["x"]}}, "a": "1"}));
        let src = tree(json!({"meta": {"expects": {"bar": ["y"]}}, "a": "2"}));
        let merged = merge_document(&dest, &src);
        assert_eq!(
            merged,
            tree(json!({"meta": {"expects": {"foo": ["x"], "bar": ["y"]}}, "a": "2"}))
        );
    }

    #[test]
    fn test_merge_sequences_position_wise() {
        let dest = tree(json!({"rows": [{"a": "1", "b": "2"}, {"a": "3"}]}));
        let src = tree(json!({"rows": [{"b": "20"}, {"c": "4"}, {"d": "5"}]}));
        let merged = merge_document(&dest, &src);
        assert_eq!(
            merged,
            tree(json!({"rows": [{"a": "1", "b": "20"}, {"a": "3", "c": "4"}, {"d": "5"}]}))
        );
    }

    #[test]
    fn test_merge_replaces_scalar_sequences() {
        let dest = tree(json!({"cols": ["a", "b", "c"]}));
        let src = tree(json!({"cols": ["x"]}));
        assert_eq!(merge_document(&dest, &src), tree(json!({"cols": ["x"]})));
    }

    #[test]
    fn test_merge_mapping_over_scalar() {
        let dest = tree(json!({"a": "1"}));
        let src = tree(json!({"a": {"b": "2"}}));
        assert_eq!(merge_document(&dest, &src), src);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let doc = tree(json!({
            "meta": {"repositories": {"repo0": "http://a"}},
            "actions": [{"name": "push", "table": "foo"}, {"name": "pop"}],
        }));
        assert_eq!(merge_document(&doc, &doc), doc);
    }

    #[test]
    fn test_combine_documents() {
        let docs = vec![
            tree(json!({"a": "1"})),
            tree(json!({"b": "2"})),
            tree(json!({"a": "3"})),
        ];
        assert_eq!(
            combine_documents(&docs),
            Some(tree(json!({"a": "3", "b": "2"})))
        );
        assert_eq!(combine_documents(&Vec::<Tree>::new()), None);
    }

    #[test]
    fn test_transform_by_map() {
        let doc = tree(json!({"a": {"b": "1"}, "c": "2"}));
        let out = transform_by_map(&doc, vec![("a.b", "x.y"), ("c", "z"), ("missing", "w")]);
        assert_eq!(out, tree(json!({"x": {"y": "1"}, "z": "2"})));
    }

    #[test]
    fn test_transform_by_inverted_map() {
        let doc = tree(json!({"x": {"y": "1"}}));
        let out = transform_by_inverted_map(&doc, vec![("a.b", "x.y")]);
        assert_eq!(out, tree(json!({"a": {"b": "1"}})));
    }

    #[test]
    fn test_document_contains_path() {
        let doc = tree(json!({"a": {"b": "1"}, "c": "2"}));
        assert!(document_contains_path(&doc, "a.b"));
        assert!(document_contains_path(&doc, "c"));
        assert!(!document_contains_path(&doc, "a.c"));
        assert!(!document_contains_path(&doc, "c.d"));
        assert!(!document_contains_path(&doc, "z.y"));
    }

    #[test]
    fn test_extract_corresponding() {
        let doc = tree(json!({
            "a": "1",
            "b": {"c": "2", "d": "3"},
            "e": [{"f": "4", "g": "5"}, {"f": "6"}],
            "unused": "7",
        }));
        let assoc = tree(json!({
            "a": "",
            "b": {"c": ""},
            "e": [{"f": ""}],
            "absent": "",
        }));
        assert_eq!(
            extract_corresponding(&doc, &assoc),
            tree(json!({"a": "1", "b": {"c": "2"}, "e": [{"f": "4"}]}))
        );
    }

    #[test]
    fn test_extract_corresponding_follows_assoc_order() {
        let doc = tree(json!({"a": "1", "b": "2", "c": "3"}));
        let assoc: Tree = vec![("c", ""), ("a", "")].into_iter().collect();
        let keys: Vec<_> = extract_corresponding(&doc, &assoc)
            .keys()
            .map(str::to_owned)
            .collect();
        assert_eq!(keys, vec!["c", "a"]);
    }

    #[test]
    fn test_json_scalars_and_null() {
        let node = Node::try_from(json!({"n": 12, "b": true})).unwrap();
        assert_eq!(node.as_map().unwrap().scalar("n"), Some("12"));
        assert_eq!(node.as_map().unwrap().scalar("b"), Some("true"));
        assert!(Node::try_from(json!(null)).is_err());
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut tree: Tree = vec![("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        assert_eq!(tree.remove("a"), Some(Node::from("1")));
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_equality_ignores_key_order() {
        let ab: Tree = vec![("a", "1"), ("b", "2")].into_iter().collect();
        let ba: Tree = vec![("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_wide_records_project_in_order() {
        let record: Tree = (0..2000).map(|i| (format!("c{}", i), i.to_string())).collect();
        let shape: Tree = (0..2000).rev().map(|i| (format!("c{}", i), "")).collect();
        let projected = extract_corresponding(&record, &shape);
        assert_eq!(projected.len(), 2000);
        assert_eq!(projected.keys().next(), Some("c1999"));
        assert_eq!(projected.scalar("c7"), Some("7"));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut tree: Tree = vec![("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(tree.insert("a", "3"), Some(Node::from("1")));
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
