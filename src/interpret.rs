//! Building executable [`Rule`]s from canonical documents.

use log::{debug, warn};

use crate::ast::Action;
use crate::canonical::Document;
use crate::error::Error;
use crate::parser::parse_buffer;
use crate::rule::Rule;

impl From<&Document> for Rule {
    fn from(document: &Document) -> Self {
        let mut rule = Rule::new();

        for (table, columns) in &document.meta.expects {
            rule.expects(table.as_str(), columns);
        }
        for (name, url) in &document.meta.repositories {
            rule.attach(url.as_str(), name.as_str());
        }

        for action in &document.actions {
            debug!("dispatching {}", action.name());
            match action {
                Action::Push { table } => {
                    rule.push(table.as_str());
                }
                Action::Pop => {
                    rule.pop();
                }
                Action::Duplicate => {
                    rule.duplicate();
                }
                Action::Commit { table, columns } => {
                    rule.commit(table.as_str(), columns.clone());
                }
                Action::Join(joinish) => {
                    rule.join(joinish.clone());
                }
                Action::Inclusion(joinish) => {
                    rule.inclusion(joinish.clone());
                }
                Action::Accumulate {
                    column,
                    function,
                    result,
                } => {
                    rule.accumulate(column.as_str(), result.clone(), function.clone());
                }
                Action::Pull(pull) => {
                    rule.pull(pull.clone());
                }
                Action::Invoke(invoke) => {
                    debug!(
                        "skipping invoke of {}:{}:{}",
                        invoke.namespace, invoke.rule, invoke.version
                    );
                }
                Action::Unrecognized { name } => {
                    warn!("ignoring unrecognized action `{}`", name);
                }
            }
        }

        rule
    }
}

impl From<Document> for Rule {
    fn from(document: Document) -> Self {
        Rule::from(&document)
    }
}

pub fn interpret(document: &Document) -> Rule {
    Rule::from(document)
}

/// Parses a buffer of statements straight into a rule.
pub fn compile(buffer: &str) -> Result<Rule, Error> {
    let document = parse_buffer(buffer)?;
    Ok(interpret(&document))
}
