use std::collections::BTreeMap;

use crate::ast::{ColumnName, Function, Identifier, Joinish, Pull, TableName};
use crate::context::{Bindings, Context, Output};
use crate::document::document_contains_path;
use crate::error::ExecutionResult;
use crate::registry::Connector;
use crate::table::Record;

/// One executable action of a rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Push(TableName),
    Pop,
    Duplicate,
    Commit {
        table: TableName,
        columns: Option<Vec<ColumnName>>,
    },
    Join(Joinish),
    Inclusion(Joinish),
    Accumulate {
        column: ColumnName,
        function: Function,
        result: Option<ColumnName>,
    },
    Pull(Pull),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Push(_) => "push",
            Step::Pop => "pop",
            Step::Duplicate => "duplicate",
            Step::Commit { .. } => "commit",
            Step::Join(_) => "join",
            Step::Inclusion(_) => "inclusion",
            Step::Accumulate { .. } => "accumulate",
            Step::Pull(_) => "pull",
        }
    }
}

/// An executable plan: expected schemas, attached repositories and the steps
/// to run, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rule {
    expects: BTreeMap<TableName, Vec<ColumnName>>,
    repositories: BTreeMap<Identifier, String>,
    steps: Vec<Step>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `table` carries `columns`. Repeated declarations for the
    /// same table add up.
    pub fn expects(&mut self, table: impl Into<TableName>, columns: &[ColumnName]) -> &mut Self {
        let expected = self.expects.entry(table.into()).or_default();
        for column in columns {
            if !expected.contains(column) {
                expected.push(column.clone());
            }
        }
        self
    }

    pub fn expectations(&self) -> &BTreeMap<TableName, Vec<ColumnName>> {
        &self.expects
    }

    /// Whether every record carries the columns declared for `table`. Tables
    /// without a declaration always conform.
    ///
    /// Nothing checks this during execution.
    pub fn conforms(&self, table: &str, records: &[Record]) -> bool {
        match self.expects.get(table) {
            Some(columns) => records.iter().all(|record| {
                columns
                    .iter()
                    .all(|column| document_contains_path(record, column))
            }),
            None => true,
        }
    }

    pub fn attach(&mut self, url: impl Into<String>, name: impl Into<Identifier>) -> &mut Self {
        self.repositories.insert(name.into(), url.into());
        self
    }

    /// Attached repositories as `(name, url)` pairs.
    pub fn repositories(&self) -> impl Iterator<Item = (&str, &str)> {
        self.repositories
            .iter()
            .map(|(name, url)| (name.as_str(), url.as_str()))
    }

    pub fn repository(&self, name: &str) -> Option<&str> {
        self.repositories.get(name).map(String::as_str)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn push(&mut self, table: impl Into<TableName>) -> &mut Self {
        self.step(Step::Push(table.into()))
    }

    pub fn pop(&mut self) -> &mut Self {
        self.step(Step::Pop)
    }

    pub fn duplicate(&mut self) -> &mut Self {
        self.step(Step::Duplicate)
    }

    pub fn commit(
        &mut self,
        table: impl Into<TableName>,
        columns: Option<Vec<ColumnName>>,
    ) -> &mut Self {
        self.step(Step::Commit {
            table: table.into(),
            columns,
        })
    }

    pub fn join(&mut self, joinish: Joinish) -> &mut Self {
        self.step(Step::Join(joinish))
    }

    pub fn inclusion(&mut self, joinish: Joinish) -> &mut Self {
        self.step(Step::Inclusion(joinish))
    }

    pub fn accumulate(
        &mut self,
        column: impl Into<ColumnName>,
        result: Option<ColumnName>,
        function: Function,
    ) -> &mut Self {
        self.step(Step::Accumulate {
            column: column.into(),
            function,
            result,
        })
    }

    pub fn pull(&mut self, pull: Pull) -> &mut Self {
        self.step(Step::Pull(pull))
    }

    fn step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Runs the steps on a fresh stack. `bindings` are the tables `PUSH` can
    /// name before anything is pulled or committed.
    pub fn execute<C: Connector>(
        &self,
        context: &mut Context<C>,
        bindings: Bindings,
    ) -> ExecutionResult<Output> {
        context.execute_with(self, bindings)
    }
}
