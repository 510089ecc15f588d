//! The canonical document: `meta` plus an ordered list of `actions`.
//!
//! ```text
//! { "meta": { "expects": {table: [col, ...]}, "repositories": {name: url} },
//!   "actions": [ {"name": <kind>, ...}, ... ] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::{
    Action, ColumnName, ColumnProjection, Function, Identifier, Invoke, Joinish, Pull, TableName,
    Using,
};
use crate::document::{combine_documents, expect_kind, merge_document, Node, Tree};
use crate::error::{DocumentError, DocumentResult};

pub const META: &str = "meta";
pub const EXPECTS: &str = "expects";
pub const REPOSITORIES: &str = "repositories";
pub const ACTIONS: &str = "actions";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct Document {
    pub meta: Meta,
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Meta {
    pub expects: BTreeMap<TableName, Vec<ColumnName>>,
    /// Repository name to URL.
    pub repositories: BTreeMap<Identifier, String>,
}

impl Meta {
    pub fn is_empty(&self) -> bool {
        self.expects.is_empty() && self.repositories.is_empty()
    }
}

impl Document {
    /// Reads a document from JSON text. Only malformed JSON is reported as
    /// `DocumentError::Json`; shape errors keep their own variants.
    pub fn from_json(json: &str) -> DocumentResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Document::try_from(value)
    }

    pub fn to_json_pretty(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_tree(&self) -> Tree {
        let mut tree = Tree::new();

        let mut meta = Tree::new();
        if !self.meta.expects.is_empty() {
            meta.insert(
                EXPECTS,
                self.meta
                    .expects
                    .iter()
                    .map(|(table, columns)| (table.as_str(), names_node(columns)))
                    .collect::<Tree>(),
            );
        }
        if !self.meta.repositories.is_empty() {
            meta.insert(
                REPOSITORIES,
                self.meta
                    .repositories
                    .iter()
                    .map(|(name, url)| (name.as_str(), url.as_str()))
                    .collect::<Tree>(),
            );
        }
        if !meta.is_empty() {
            tree.insert(META, meta);
        }

        if !self.actions.is_empty() {
            tree.insert(
                ACTIONS,
                self.actions
                    .iter()
                    .map(|action| Node::Map(action_to_tree(action)))
                    .collect::<Vec<_>>(),
            );
        }
        tree
    }

    /// Deep merge of two documents. Actions merge position-wise.
    pub fn merge(&self, other: &Document) -> DocumentResult<Document> {
        Document::try_from(&merge_document(&self.to_tree(), &other.to_tree()))
    }

    /// Left fold of [`Document::merge`]. Empty input gives an empty document.
    pub fn combine<'a, I>(docs: I) -> DocumentResult<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let trees: Vec<Tree> = docs.into_iter().map(Document::to_tree).collect();
        match combine_documents(&trees) {
            Some(tree) => Document::try_from(&tree),
            None => Ok(Document::default()),
        }
    }
}

impl TryFrom<&Tree> for Document {
    type Error = DocumentError;

    fn try_from(tree: &Tree) -> Result<Self, Self::Error> {
        let mut doc = Document::default();

        if let Some(meta) = tree.get(META) {
            let meta = expect_kind(META, meta, Node::as_map, "a mapping")?;
            if let Some(expects) = meta.get(EXPECTS) {
                for (table, columns) in expect_kind(EXPECTS, expects, Node::as_map, "a mapping")?.iter() {
                    doc.meta
                        .expects
                        .insert(table.to_owned(), names_from_node(table, columns)?);
                }
            }
            if let Some(repositories) = meta.get(REPOSITORIES) {
                let repositories =
                    expect_kind(REPOSITORIES, repositories, Node::as_map, "a mapping")?;
                for (name, url) in repositories.iter() {
                    let url = expect_kind(name, url, Node::as_scalar, "a URL")?;
                    doc.meta.repositories.insert(name.to_owned(), url.to_owned());
                }
            }
        }

        if let Some(actions) = tree.get(ACTIONS) {
            doc.actions = expect_kind(ACTIONS, actions, Node::as_seq, "a sequence")?
                .iter()
                .map(|action| action_from_tree(expect_kind(ACTIONS, action, Node::as_map, "a mapping")?))
                .collect::<DocumentResult<_>>()?;
        }

        Ok(doc)
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Document::try_from(&Tree::try_from(value)?)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.to_tree().into()
    }
}

fn names_node(names: &[ColumnName]) -> Node {
    Node::Seq(names.iter().map(|n| Node::from(n.as_str())).collect())
}

fn names_from_node(field: &str, node: &Node) -> DocumentResult<Vec<ColumnName>> {
    expect_kind(field, node, Node::as_seq, "a sequence of names")?
        .iter()
        .map(|name| expect_kind(field, name, Node::as_scalar, "a name").map(str::to_owned))
        .collect()
}

/// Renders an action as its canonical mapping.
pub fn action_to_tree(action: &Action) -> Tree {
    let mut tree = Tree::new();
    tree.insert("name", action.name());

    match action {
        Action::Push { table } => {
            tree.insert("table", table.as_str());
        }
        Action::Pop | Action::Duplicate | Action::Unrecognized { .. } => {}
        Action::Commit { table, columns } => {
            tree.insert("table", table.as_str());
            if let Some(columns) = columns {
                tree.insert("columns", names_node(columns));
            }
        }
        Action::Join(joinish) | Action::Inclusion(joinish) => {
            let Joinish { using, include } = joinish;
            tree.insert(
                "using",
                Tree::from_iter([("left", names_node(&using.left)), ("right", names_node(&using.right))]),
            );
            if !include.is_empty() {
                tree.insert(
                    "include",
                    include
                        .iter()
                        .map(|p| (p.src.as_str(), p.dst.as_str()))
                        .collect::<Tree>(),
                );
            }
        }
        Action::Accumulate {
            column,
            function,
            result,
        } => {
            tree.insert("column", column.as_str());
            tree.insert(
                "function",
                Tree::from_iter([
                    ("name", Node::from(function.name.as_str())),
                    ("args", names_node(&function.args)),
                ]),
            );
            if let Some(result) = result {
                tree.insert("result", result.as_str());
            }
        }
        Action::Pull(pull) => {
            tree.insert("namespace", pull.namespace.as_str());
            tree.insert("table", pull.table.as_str());
            tree.insert("version", pull.version.as_str());
            tree.insert("as", pull.as_name.as_str());
        }
        Action::Invoke(invoke) => {
            tree.insert("namespace", invoke.namespace.as_str());
            tree.insert("rule", invoke.rule.as_str());
            tree.insert("version", invoke.version.as_str());
        }
    }
    tree
}

/// Reads an action from its canonical mapping.
///
/// Names outside the known set become [`Action::Unrecognized`]; known names
/// with missing or mistyped fields are errors.
pub fn action_from_tree(tree: &Tree) -> DocumentResult<Action> {
    let name = scalar(tree, "action", "name")?;
    let fields = Fields { name, tree };

    let action = match name {
        "push" => Action::Push {
            table: fields.scalar("table")?,
        },
        "pop" => Action::Pop,
        "duplicate" => Action::Duplicate,
        "commit" => Action::Commit {
            table: fields.scalar("table")?,
            columns: tree
                .get("columns")
                .map(|node| names_from_node("columns", node))
                .transpose()?,
        },
        "join" => Action::Join(fields.joinish()?),
        "inclusion" => Action::Inclusion(fields.joinish()?),
        "accumulate" => {
            let function = fields.map("function")?;
            let function_fields = Fields {
                name: "function",
                tree: function,
            };
            Action::Accumulate {
                column: fields.scalar("column")?,
                function: Function {
                    name: function_fields.scalar("name")?,
                    args: function_fields.names("args")?,
                },
                result: tree
                    .get("result")
                    .map(|node| expect_kind("result", node, Node::as_scalar, "a name").map(str::to_owned))
                    .transpose()?,
            }
        }
        "pull" => Action::Pull(Pull {
            namespace: fields.scalar("namespace")?,
            table: fields.scalar("table")?,
            version: fields.scalar("version")?,
            as_name: fields.scalar("as")?,
        }),
        "invoke" => Action::Invoke(Invoke {
            namespace: fields.scalar("namespace")?,
            rule: fields.scalar("rule")?,
            version: fields.scalar("version")?,
        }),
        other => Action::Unrecognized {
            name: other.to_owned(),
        },
    };
    Ok(action)
}

fn scalar<'a>(tree: &'a Tree, action: &str, field: &str) -> DocumentResult<&'a str> {
    let node = tree.get(field).ok_or_else(|| DocumentError::MissingField {
        action: action.to_owned(),
        field: field.to_owned(),
    })?;
    expect_kind(field, node, Node::as_scalar, "a scalar")
}

struct Fields<'a> {
    name: &'a str,
    tree: &'a Tree,
}

impl<'a> Fields<'a> {
    fn get(&self, field: &str) -> DocumentResult<&'a Node> {
        self.tree.get(field).ok_or_else(|| DocumentError::MissingField {
            action: self.name.to_owned(),
            field: field.to_owned(),
        })
    }

    fn scalar(&self, field: &str) -> DocumentResult<String> {
        scalar(self.tree, self.name, field).map(str::to_owned)
    }

    fn map(&self, field: &str) -> DocumentResult<&'a Tree> {
        expect_kind(field, self.get(field)?, Node::as_map, "a mapping")
    }

    fn names(&self, field: &str) -> DocumentResult<Vec<ColumnName>> {
        names_from_node(field, self.get(field)?)
    }

    fn joinish(&self) -> DocumentResult<Joinish> {
        let using = Fields {
            name: "using",
            tree: self.map("using")?,
        };
        let include = match self.tree.get("include") {
            Some(node) => expect_kind("include", node, Node::as_map, "a mapping")?
                .iter()
                .map(|(src, dst)| {
                    expect_kind(src, dst, Node::as_scalar, "a column name")
                        .map(|dst| ColumnProjection::new(src, dst))
                })
                .collect::<DocumentResult<_>>()?,
            None => Vec::new(),
        };
        Ok(Joinish {
            using: Using {
                left: using.names("left")?,
                right: using.names("right")?,
            },
            include,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_buffer;
    use serde_json::json;

    #[test]
    fn test_json_round_trip() {
        let doc = parse_buffer(
            "ATTACH http://a.org AS repo0\n\
             EXPECTS foo[x, y]\n\
             PULL ns0:foo:1 AS foo\n\
             JOIN USING [[a], [x]] INCLUDE [a, b AS c]\n\
             ACCUMULATE q USING add(a, b) AS total\n\
             COMMIT out[total]",
        )
        .unwrap();
        let json = doc.to_json_pretty().unwrap();
        assert_eq!(Document::from_json(&json).unwrap(), doc);
    }

    #[test]
    fn test_include_order_survives_json() {
        let doc = Document::from_json(
            r#"{"actions": [{"name": "join", "using": {"left": ["a"], "right": ["b"]},
                "include": {"z": "z", "a": "aa"}}]}"#,
        )
        .unwrap();
        match &doc.actions[0] {
            Action::Join(joinish) => assert_eq!(
                joinish.include,
                vec![ColumnProjection::same("z"), ColumnProjection::new("a", "aa")]
            ),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_is_kept() {
        let doc = Document::from_json(r#"{"actions": [{"name": "teleport", "to": "mars"}]}"#).unwrap();
        assert_eq!(
            doc.actions,
            vec![Action::Unrecognized {
                name: "teleport".into()
            }]
        );
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let err = Document::from_json(r#"{"actions": [{"name": "push"}]}"#).unwrap_err();
        assert!(matches!(err, DocumentError::MissingField { ref field, .. } if field == "table"));
    }

    #[test]
    fn test_wrong_kind_is_an_error() {
        let err = Document::from_json(r#"{"meta": {"expects": {"foo": "x"}}}"#).unwrap_err();
        assert!(matches!(err, DocumentError::WrongKind { .. }));
    }

    #[test]
    fn test_malformed_json_is_a_json_error() {
        let err = Document::from_json(r#"{"actions": ["#).unwrap_err();
        assert!(matches!(err, DocumentError::Json(_)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let doc = parse_buffer("ATTACH http://a.org AS repo0\nEXPECTS foo[x]\nPUSH foo\nCOMMIT bar").unwrap();
        assert_eq!(doc.merge(&doc).unwrap(), doc);
    }

    #[test]
    fn test_meta_merge_is_associative() {
        let a = parse_buffer("EXPECTS foo[x]\nATTACH http://a.org AS repo0").unwrap();
        let b = parse_buffer("EXPECTS foo[y, z]\nEXPECTS bar[p]").unwrap();
        let c = parse_buffer("ATTACH http://c.org AS repo0\nEXPECTS baz[q]").unwrap();

        let left = Document::combine([&a, &b, &c]).unwrap();
        let right = a.merge(&b.merge(&c).unwrap()).unwrap();
        assert_eq!(left.meta, right.meta);
        assert_eq!(left.meta.expects["foo"], vec!["y", "z"]);
        assert_eq!(left.meta.repositories["repo0"], "http://c.org");
    }

    #[test]
    fn test_serializes_to_canonical_shape() {
        let doc = parse_buffer("COMMIT baz").unwrap();
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"actions": [{"name": "commit", "table": "baz"}]})
        );
    }
}
