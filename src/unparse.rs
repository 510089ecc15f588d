//! Rendering of actions and statements back into surface syntax.
//!
//! `unparse_statement(&parse_statement(line)?)` gives back `line` with runs of
//! whitespace collapsed and keywords in upper case.

use itertools::Itertools;

use crate::ast::{Action, ColumnName, Joinish, Statement};
use crate::canonical::Document;
use crate::error::UnparseError;

pub fn unparse(actions: &[Action]) -> Result<Vec<String>, UnparseError> {
    actions.iter().map(unparse_action).collect()
}

pub fn unparse_action(action: &Action) -> Result<String, UnparseError> {
    let s = match action {
        Action::Push { table } => format!("PUSH {}", table),
        Action::Pop => "POP".to_owned(),
        Action::Duplicate => "DUPLICATE".to_owned(),
        Action::Commit { table, columns } => match columns {
            Some(columns) => format!("COMMIT {}[{}]", table, names(columns)),
            None => format!("COMMIT {}", table),
        },
        Action::Join(joinish) => unparse_joinish("JOIN", joinish),
        Action::Inclusion(joinish) => unparse_joinish("INCLUSION", joinish),
        Action::Accumulate {
            column,
            function,
            result,
        } => {
            let mut s = format!(
                "ACCUMULATE {} USING {}({})",
                column,
                function.name,
                names(&function.args)
            );
            if let Some(result) = result {
                s.push_str(" AS ");
                s.push_str(result);
            }
            s
        }
        Action::Pull(pull) => format!(
            "PULL {}:{}:{} AS {}",
            pull.namespace, pull.table, pull.version, pull.as_name
        ),
        Action::Invoke(invoke) => format!(
            "INVOKE {}:{}:{}",
            invoke.namespace, invoke.rule, invoke.version
        ),
        Action::Unrecognized { name } => {
            return Err(UnparseError::UnrecognizedAction(name.clone()))
        }
    };
    Ok(s)
}

pub fn unparse_statement(statement: &Statement) -> Result<String, UnparseError> {
    match statement {
        Statement::Expects { table, columns } => Ok(format!("EXPECTS {}[{}]", table, names(columns))),
        Statement::Attach { url, name } => Ok(format!("ATTACH {} AS {}", url, name)),
        Statement::Action(action) => unparse_action(action),
    }
}

fn names(names: &[ColumnName]) -> String {
    names.iter().join(", ")
}

fn unparse_joinish(keyword: &str, joinish: &Joinish) -> String {
    let Joinish { using, include } = joinish;
    let mut s = format!(
        "{} USING [[{}], [{}]]",
        keyword,
        names(&using.left),
        names(&using.right)
    );
    if !include.is_empty() {
        s.push_str(" INCLUDE [");
        s.push_str(
            &include
                .iter()
                .map(|projection| {
                    if projection.src == projection.dst {
                        projection.src.clone()
                    } else {
                        format!("{} AS {}", projection.src, projection.dst)
                    }
                })
                .join(", "),
        );
        s.push(']');
    }
    s
}

impl Document {
    /// The whole document as statements: attachments, then expectations, then
    /// actions in program order.
    pub fn unparse(&self) -> Result<Vec<String>, UnparseError> {
        let attachments = self
            .meta
            .repositories
            .iter()
            .map(|(name, url)| Statement::Attach {
                url: url.clone(),
                name: name.clone(),
            });
        let expectations = self
            .meta
            .expects
            .iter()
            .map(|(table, columns)| Statement::Expects {
                table: table.clone(),
                columns: columns.clone(),
            });
        let actions = self.actions.iter().cloned().map(Statement::Action);

        attachments
            .chain(expectations)
            .chain(actions)
            .map(|statement| unparse_statement(&statement))
            .collect()
    }
}
