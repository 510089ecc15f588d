//! The stack machine that runs a [`Rule`].
//!
//! A [`Context`] is reusable across executions. Each execution gets a fresh
//! stack and fresh bindings; the only state kept between runs is the cache of
//! registry clients, keyed by repository URL.

use std::collections::HashMap;

use log::{debug, info};

use crate::ast::{ColumnName, Function, Joinish, Pull, TableName};
use crate::error::{ExecutionError, ExecutionResult};
use crate::functions::{Aggregate, Functions};
use crate::registry::{Connector, RegistryClient};
use crate::rule::{Rule, Step};
use crate::table::{self, Record, Table};

/// Tables `PUSH` can name, by name.
pub type Bindings = HashMap<TableName, Table>;

/// A table emitted by `COMMIT`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub table: TableName,
    pub records: Table,
}

/// Everything an execution committed, in commit order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Output {
    pub commits: Vec<Commit>,
}

impl Output {
    /// The last table committed under `name`.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.commits
            .iter()
            .rev()
            .find(|commit| commit.table == name)
            .map(|commit| &commit.records)
    }
}

pub struct Context<C> {
    connector: C,
    clients: HashMap<String, Box<dyn RegistryClient>>,
    functions: Functions,
}

impl<C: Connector> Context<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            clients: HashMap::new(),
            functions: Functions::default(),
        }
    }

    /// Makes `function` available to `ACCUMULATE` under `name`.
    pub fn register_function(&mut self, name: impl Into<String>, function: impl Aggregate + 'static) {
        self.functions.register(name, function);
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn execute(&mut self, rule: &Rule) -> ExecutionResult<Output> {
        self.execute_with(rule, Bindings::new())
    }

    /// Runs `rule` with `bindings` available to `PUSH`.
    pub fn execute_with(&mut self, rule: &Rule, bindings: Bindings) -> ExecutionResult<Output> {
        let mut output = Output::default();
        self.execute_into(rule, bindings, &mut output)?;
        Ok(output)
    }

    /// Like [`Context::execute_with`], but commits land in `output` as they
    /// happen, so the ones made before a failing step are still there.
    ///
    /// Every attached repository is connected before the first step runs.
    pub fn execute_into(
        &mut self,
        rule: &Rule,
        bindings: Bindings,
        output: &mut Output,
    ) -> ExecutionResult<()> {
        for (name, url) in rule.repositories() {
            debug!("attaching {} at {}", name, url);
            self.client(url)?;
        }
        let mut execution = Execution {
            stack: Vec::new(),
            bindings,
            output,
        };
        for step in rule.steps() {
            execution.run(self, rule, step)?;
        }
        Ok(())
    }

    fn client(&mut self, url: &str) -> ExecutionResult<&dyn RegistryClient> {
        if !self.clients.contains_key(url) {
            debug!("creating registry client for {}", url);
            let client = self
                .connector
                .connect(url)
                .map_err(|source| ExecutionError::RepositoryFetch {
                    url: url.to_owned(),
                    source,
                })?;
            self.clients.insert(url.to_owned(), client);
        }
        Ok(self.clients[url].as_ref())
    }

    /// Fetches one table through the (cached) client for `url`.
    pub fn fetch(
        &mut self,
        url: &str,
        namespace: &str,
        table: &str,
        version: &str,
    ) -> ExecutionResult<Table> {
        self.client(url)?
            .tables(namespace, table, version)
            .map_err(|source| ExecutionError::RepositoryFetch {
                url: url.to_owned(),
                source,
            })
    }

    /// Fetches one table from the repository attached to `rule` as
    /// `repository`.
    pub fn get(
        &mut self,
        rule: &Rule,
        repository: &str,
        namespace: &str,
        table: &str,
        version: &str,
    ) -> ExecutionResult<Table> {
        let url = rule
            .repository(repository)
            .ok_or_else(|| ExecutionError::UnknownRepository(repository.to_owned()))?;
        self.fetch(url, namespace, table, version)
    }
}

/// State of one run: the frame stack, named tables and where commits go.
struct Execution<'a> {
    stack: Vec<Table>,
    bindings: Bindings,
    output: &'a mut Output,
}

impl Execution<'_> {
    fn run<C: Connector>(
        &mut self,
        context: &mut Context<C>,
        rule: &Rule,
        step: &Step,
    ) -> ExecutionResult<()> {
        debug!("{} (stack depth {})", step.name(), self.stack.len());
        match step {
            Step::Push(table) => self.push(table),
            Step::Pop => self.pop("pop").map(drop),
            Step::Duplicate => self.duplicate(),
            Step::Commit { table, columns } => self.commit(table, columns.as_deref()),
            Step::Join(joinish) => self.binary("join", joinish, table::join),
            Step::Inclusion(joinish) => self.binary("inclusion", joinish, table::inclusion),
            Step::Accumulate {
                column,
                function,
                result,
            } => self.accumulate(context, column, function, result.as_ref()),
            Step::Pull(pull) => self.pull(context, rule, pull),
        }
    }

    fn require(&self, action: &'static str, needed: usize) -> ExecutionResult<()> {
        if self.stack.len() < needed {
            return Err(ExecutionError::StackUnderflow {
                action,
                needed,
                available: self.stack.len(),
            });
        }
        Ok(())
    }

    fn pop(&mut self, action: &'static str) -> ExecutionResult<Table> {
        self.require(action, 1)?;
        Ok(self.stack.pop().unwrap_or_default())
    }

    fn top(&self, action: &'static str) -> ExecutionResult<&Table> {
        self.stack.last().ok_or(ExecutionError::StackUnderflow {
            action,
            needed: 1,
            available: 0,
        })
    }

    fn push(&mut self, name: &str) -> ExecutionResult<()> {
        let table = self
            .bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownTable(name.to_owned()))?;
        self.stack.push(table);
        Ok(())
    }

    fn duplicate(&mut self) -> ExecutionResult<()> {
        let copy = self.top("duplicate")?.clone();
        self.stack.push(copy);
        Ok(())
    }

    fn commit(&mut self, name: &str, columns: Option<&[ColumnName]>) -> ExecutionResult<()> {
        let top = self.top("commit")?;
        let records = match columns {
            Some(columns) => table::select_columns(top, columns)?,
            None => top.clone(),
        };
        info!("committing {} ({} records)", name, records.len());
        self.bindings.insert(name.to_owned(), records.clone());
        self.output.commits.push(Commit {
            table: name.to_owned(),
            records,
        });
        Ok(())
    }

    fn binary<F>(&mut self, action: &'static str, joinish: &Joinish, op: F) -> ExecutionResult<()>
    where
        F: FnOnce(&[Record], &[Record], &Joinish) -> ExecutionResult<Table>,
    {
        self.require(action, 2)?;
        let right = self.pop(action)?;
        let left = self.pop(action)?;
        let result = op(&left, &right, joinish)?;
        debug!(
            "{}: {} x {} records -> {}",
            action,
            left.len(),
            right.len(),
            result.len()
        );
        self.stack.push(result);
        Ok(())
    }

    fn accumulate<C: Connector>(
        &mut self,
        context: &Context<C>,
        column: &str,
        function: &Function,
        result: Option<&ColumnName>,
    ) -> ExecutionResult<()> {
        let frame = self.pop("accumulate")?;
        let value = context
            .functions
            .accumulate(&function.name, &function.args, &frame)?;
        let name = result.map_or(column, String::as_str);
        let record: Record = [(name, value.to_string())].into_iter().collect();
        self.stack.push(vec![record]);
        Ok(())
    }

    fn pull<C: Connector>(
        &mut self,
        context: &mut Context<C>,
        rule: &Rule,
        pull: &Pull,
    ) -> ExecutionResult<()> {
        let url = resolve_repository(rule, &pull.namespace)?;
        debug!(
            "pulling {}:{}:{} from {} as {}",
            pull.namespace, pull.table, pull.version, url, pull.as_name
        );
        let table = context.fetch(url, &pull.namespace, &pull.table, &pull.version)?;
        self.bindings.insert(pull.as_name.clone(), table.clone());
        self.stack.push(table);
        Ok(())
    }
}

/// The repository named like `namespace`, else the only attached repository.
fn resolve_repository<'a>(rule: &'a Rule, namespace: &str) -> ExecutionResult<&'a str> {
    if let Some(url) = rule.repository(namespace) {
        return Ok(url);
    }
    let mut repositories = rule.repositories();
    match (repositories.next(), repositories.next()) {
        (Some((_, url)), None) => Ok(url),
        (None, _) => Err(ExecutionError::UnknownRepository(namespace.to_owned())),
        (Some(_), Some(_)) => Err(ExecutionError::AmbiguousRepository(namespace.to_owned())),
    }
}
