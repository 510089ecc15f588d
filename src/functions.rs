//! Aggregation functions available to `ACCUMULATE`.
//!
//! A function folds the `args` columns of each record into one value, then
//! folds those per-record values across the whole frame. Both folds use the
//! same operator and start from its identity, so an empty frame accumulates
//! to the identity.

use std::collections::HashMap;

use num_bigint::BigInt;

use crate::ast::ColumnName;
use crate::error::{ExecutionError, ExecutionResult};
use crate::table::Record;

pub trait Aggregate {
    fn identity(&self) -> BigInt;
    fn combine(&self, acc: BigInt, value: BigInt) -> BigInt;
}

pub struct Add;

impl Aggregate for Add {
    fn identity(&self) -> BigInt {
        BigInt::from(0)
    }

    fn combine(&self, acc: BigInt, value: BigInt) -> BigInt {
        acc + value
    }
}

pub struct Mult;

impl Aggregate for Mult {
    fn identity(&self) -> BigInt {
        BigInt::from(1)
    }

    fn combine(&self, acc: BigInt, value: BigInt) -> BigInt {
        acc * value
    }
}

/// Named aggregation functions. Starts out with `add` and `mult`.
pub struct Functions {
    registry: HashMap<String, Box<dyn Aggregate>>,
}

impl Default for Functions {
    fn default() -> Self {
        let mut functions = Self {
            registry: HashMap::new(),
        };
        functions.register("add", Add);
        functions.register("mult", Mult);
        functions
    }
}

impl Functions {
    pub fn register(&mut self, name: impl Into<String>, function: impl Aggregate + 'static) {
        self.registry.insert(name.into(), Box::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn accumulate(
        &self,
        name: &str,
        args: &[ColumnName],
        records: &[Record],
    ) -> ExecutionResult<BigInt> {
        let function = self
            .registry
            .get(name)
            .ok_or_else(|| ExecutionError::UnknownFunction(name.to_owned()))?;

        records.iter().try_fold(function.identity(), |acc, record| {
            let value = args.iter().try_fold(function.identity(), |acc, arg| {
                Ok::<_, ExecutionError>(function.combine(acc, number(record, arg)?))
            })?;
            Ok(function.combine(acc, value))
        })
    }
}

fn number(record: &Record, column: &str) -> ExecutionResult<BigInt> {
    let node = record
        .get(column)
        .ok_or_else(|| ExecutionError::MissingColumn {
            column: column.to_owned(),
        })?;
    node.as_scalar()
        .and_then(|s| s.trim().parse::<BigInt>().ok())
        .ok_or_else(|| ExecutionError::NotANumber {
            column: column.to_owned(),
            value: node.to_string(),
        })
}
