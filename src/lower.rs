//! Lowering of parsed statements into canonical document fragments.

use crate::ast::Statement;
use crate::canonical::{self, Document};
use crate::document::{merge_document, Node, Tree};

/// What one statement contributes to the canonical document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    /// Deep-merged into the document root, e.g. `{"meta": {"expects": {...}}}`.
    Meta(Tree),
    /// Appended to `actions`.
    Action(Node),
}

pub fn lower(statement: &Statement) -> Fragment {
    match statement {
        Statement::Expects { table, columns } => {
            let columns = columns.iter().map(|c| Node::from(c.as_str())).collect::<Vec<_>>();
            Fragment::Meta(meta_section(
                canonical::EXPECTS,
                Tree::from_iter([(table.as_str(), columns)]),
            ))
        }
        Statement::Attach { url, name } => Fragment::Meta(meta_section(
            canonical::REPOSITORIES,
            Tree::from_iter([(name.as_str(), url.as_str())]),
        )),
        Statement::Action(action) => Fragment::Action(Node::Map(canonical::action_to_tree(action))),
    }
}

fn meta_section(section: &str, entries: Tree) -> Tree {
    Tree::from_iter([(canonical::META, Tree::from_iter([(section, entries)]))])
}

/// Owns the document being assembled from a run of statements.
#[derive(Clone, Debug, Default)]
pub struct DocumentBuilder {
    root: Tree,
    actions: Vec<Node>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, fragment: Fragment) -> &mut Self {
        match fragment {
            Fragment::Meta(tree) => self.root = merge_document(&self.root, &tree),
            Fragment::Action(action) => self.actions.push(action),
        }
        self
    }

    pub fn statement(&mut self, statement: &Statement) -> &mut Self {
        self.merge(lower(statement))
    }

    /// The document so far, as a tree. `actions` is absent until the first
    /// action is appended.
    pub fn tree(&self) -> Tree {
        let mut tree = self.root.clone();
        if !self.actions.is_empty() {
            tree.insert(canonical::ACTIONS, self.actions.clone());
        }
        tree
    }

    pub fn build(&self) -> Document {
        Document::try_from(&self.tree()).expect("lowered statements form a well-formed document")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;
    use serde_json::{json, Value};

    fn lowered(lines: &[&str]) -> Value {
        let mut builder = DocumentBuilder::new();
        for line in lines {
            builder.statement(&parse_statement(line).unwrap());
        }
        Value::from(builder.tree())
    }

    #[test]
    fn test_expects_merge_into_meta() {
        assert_eq!(
            lowered(&["EXPECTS foo[x, y, z]", "ExPeCTS bar[a, b]"]),
            json!({"meta": {"expects": {"foo": ["x", "y", "z"], "bar": ["a", "b"]}}})
        );
    }

    #[test]
    fn test_later_expects_replaces_columns() {
        assert_eq!(
            lowered(&["EXPECTS foo[x, y, z]", "EXPECTS foo[a]"]),
            json!({"meta": {"expects": {"foo": ["a"]}}})
        );
    }

    #[test]
    fn test_pulls_and_attaches() {
        assert_eq!(
            lowered(&[
                "PULL ns0:foo:1234 AS foo0",
                "PULL ns1:bar:3333 AS bar1",
                "ATTACH http://www.example0.org/foo AS repo0",
                "ATTACH http://www.example1.org/foo AS repo1",
            ]),
            json!({
                "meta": {
                    "repositories": {
                        "repo0": "http://www.example0.org/foo",
                        "repo1": "http://www.example1.org/foo",
                    },
                },
                "actions": [
                    {"name": "pull", "namespace": "ns0", "table": "foo", "version": "1234", "as": "foo0"},
                    {"name": "pull", "namespace": "ns1", "table": "bar", "version": "3333", "as": "bar1"},
                ],
            })
        );
    }

    #[test]
    fn test_commit_without_columns_omits_field() {
        assert_eq!(
            lowered(&["COMMIT foo[a, b]", "COMMIT baz"]),
            json!({"actions": [
                {"name": "commit", "table": "foo", "columns": ["a", "b"]},
                {"name": "commit", "table": "baz"},
            ]})
        );
    }

    #[test]
    fn test_actions_keep_statement_order() {
        assert_eq!(
            lowered(&["PUSH foo", "POP", "DUPLICATE", "PUSH bar"]),
            json!({"actions": [
                {"name": "push", "table": "foo"},
                {"name": "pop"},
                {"name": "duplicate"},
                {"name": "push", "table": "bar"},
            ]})
        );
    }

    #[test]
    fn test_joinish_and_accumulate() {
        assert_eq!(
            lowered(&[
                "JOIN USING [[a, b], [x, y]] INCLUDE [p AS pp, q]",
                "INCLUSION USING [[r, s], [zz, yy]] INCLUDE [r AS rr, s AS ss]",
                "ACCUMULATE foo USING mult(a, b, c) AS baz",
                "ACCUMULATE bar USING add(p, q)",
            ]),
            json!({"actions": [
                {
                    "name": "join",
                    "using": {"left": ["a", "b"], "right": ["x", "y"]},
                    "include": {"p": "pp", "q": "q"},
                },
                {
                    "name": "inclusion",
                    "using": {"left": ["r", "s"], "right": ["zz", "yy"]},
                    "include": {"r": "rr", "s": "ss"},
                },
                {
                    "name": "accumulate",
                    "column": "foo",
                    "function": {"name": "mult", "args": ["a", "b", "c"]},
                    "result": "baz",
                },
                {
                    "name": "accumulate",
                    "column": "bar",
                    "function": {"name": "add", "args": ["p", "q"]},
                },
            ]})
        );
    }

    #[test]
    fn test_invoke() {
        assert_eq!(
            lowered(&["INVOKE ns0:name0:1111"]),
            json!({"actions": [
                {"name": "invoke", "namespace": "ns0", "rule": "name0", "version": "1111"},
            ]})
        );
    }
}
