//! Tables and the relational operations of the stack machine.
//!
//! Key columns are compared by value. A record lacking a key column never
//! matches. `using.left` and `using.right` must name the same number of
//! columns.

use crate::ast::{ColumnName, ColumnProjection, Joinish, Using};
use crate::document::{extract_corresponding, Tree};
use crate::error::{ExecutionError, ExecutionResult};

pub type Record = Tree;
pub type Table = Vec<Record>;

fn check_keys(action: &'static str, using: &Using) -> ExecutionResult<()> {
    if using.left.len() != using.right.len() {
        return Err(ExecutionError::MismatchedKeys {
            action,
            left: using.left.len(),
            right: using.right.len(),
        });
    }
    Ok(())
}

fn matches(left: &Record, right: &Record, using: &Using) -> bool {
    using.pairs().all(|(l, r)| match (left.get(l), right.get(r)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    })
}

/// Builds an output record from `include`, looking each source column up in
/// `left` first and then in `right`.
fn project(left: &Record, right: &Record, include: &[ColumnProjection]) -> ExecutionResult<Record> {
    include
        .iter()
        .map(|ColumnProjection { src, dst }| {
            let node = left
                .get(src)
                .or_else(|| right.get(src))
                .ok_or_else(|| ExecutionError::MissingColumn {
                    column: src.clone(),
                })?;
            Ok((dst.as_str(), node.clone()))
        })
        .collect()
}

/// Inner equi-join: one record per matching (left, right) pair, in left order.
pub fn join(left: &[Record], right: &[Record], joinish: &Joinish) -> ExecutionResult<Table> {
    let Joinish { using, include } = joinish;
    check_keys("join", using)?;
    let mut out = Vec::new();
    for l in left {
        for r in right.iter().filter(|r| matches(l, r, using)) {
            out.push(project(l, r, include)?);
        }
    }
    Ok(out)
}

/// Left-inclusion: one record per left record with at least one match.
/// Right-side columns come from the first matching right record. Left records
/// without a match are dropped.
pub fn inclusion(left: &[Record], right: &[Record], joinish: &Joinish) -> ExecutionResult<Table> {
    let Joinish { using, include } = joinish;
    check_keys("inclusion", using)?;
    left.iter()
        .filter_map(|l| right.iter().find(|r| matches(l, r, using)).map(|r| (l, r)))
        .map(|(l, r)| project(l, r, include))
        .collect()
}

/// Keeps only `columns`, in the given order.
pub fn select_columns(table: &[Record], columns: &[ColumnName]) -> ExecutionResult<Table> {
    let shape: Tree = columns.iter().map(|c| (c.as_str(), "")).collect();
    table
        .iter()
        .map(|record| {
            if let Some(missing) = columns.iter().find(|c| !record.contains_key(c)) {
                return Err(ExecutionError::MissingColumn {
                    column: missing.clone(),
                });
            }
            Ok(extract_corresponding(record, &shape))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().copied().collect()
    }

    fn joinish(left: &[&str], right: &[&str], include: &[(&str, &str)]) -> Joinish {
        Joinish {
            using: Using {
                left: left.iter().map(|s| s.to_string()).collect(),
                right: right.iter().map(|s| s.to_string()).collect(),
            },
            include: include
                .iter()
                .map(|(src, dst)| ColumnProjection::new(*src, *dst))
                .collect(),
        }
    }

    #[test]
    fn test_join_every_pair_matches() {
        let left = vec![record(&[("k", "1"), ("a", "x")]), record(&[("k", "1"), ("a", "y")])];
        let right = vec![
            record(&[("j", "1"), ("b", "p")]),
            record(&[("j", "1"), ("b", "q")]),
            record(&[("j", "1"), ("b", "r")]),
        ];
        let out = join(&left, &right, &joinish(&["k"], &["j"], &[("a", "a"), ("b", "b")])).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], record(&[("a", "x"), ("b", "p")]));
        assert_eq!(out[5], record(&[("a", "y"), ("b", "r")]));
    }

    #[test]
    fn test_join_no_pair_matches() {
        let left = vec![record(&[("k", "1")]), record(&[("k", "2")])];
        let right = vec![record(&[("j", "3")])];
        let out = join(&left, &right, &joinish(&["k"], &["j"], &[("k", "k")])).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_join_on_several_keys() {
        let left = vec![
            record(&[("a", "1"), ("b", "2"), ("v", "left12")]),
            record(&[("a", "1"), ("b", "3"), ("v", "left13")]),
        ];
        let right = vec![record(&[("x", "1"), ("y", "3"), ("w", "right13")])];
        let out = join(&left, &right, &joinish(&["a", "b"], &["x", "y"], &[("v", "v"), ("w", "ww")])).unwrap();
        assert_eq!(out, vec![record(&[("v", "left13"), ("ww", "right13")])]);
    }

    #[test]
    fn test_join_prefers_left_columns() {
        let left = vec![record(&[("k", "1"), ("c", "left")])];
        let right = vec![record(&[("k", "1"), ("c", "right")])];
        let out = join(&left, &right, &joinish(&["k"], &["k"], &[("c", "c")])).unwrap();
        assert_eq!(out, vec![record(&[("c", "left")])]);
    }

    #[test]
    fn test_join_missing_include_column() {
        let left = vec![record(&[("k", "1")])];
        let right = vec![record(&[("k", "1")])];
        let err = join(&left, &right, &joinish(&["k"], &["k"], &[("nope", "nope")])).unwrap_err();
        assert!(matches!(err, ExecutionError::MissingColumn { column } if column == "nope"));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let left = vec![record(&[("a", "1")])];
        let right = vec![record(&[("b", "1")])];
        let out = join(&left, &right, &joinish(&["k"], &["k"], &[("a", "a")])).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_mismatched_key_lists_are_rejected() {
        let left = vec![record(&[("k", "1"), ("a", "x")]), record(&[("k", "1"), ("a", "y")])];
        let right = vec![record(&[("j", "1"), ("b", "z")])];

        let err = join(&left, &right, &joinish(&["k", "a"], &["j"], &[("a", "a")])).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::MismatchedKeys { action: "join", left: 2, right: 1 }
        ));

        let err = inclusion(&left, &right, &joinish(&["k"], &["j", "b"], &[("a", "a")])).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::MismatchedKeys { action: "inclusion", left: 1, right: 2 }
        ));

        // checked even when there is nothing to match
        let err = join(&[], &[], &joinish(&["k"], &[], &[])).unwrap_err();
        assert!(matches!(err, ExecutionError::MismatchedKeys { .. }));
    }

    #[test]
    fn test_inclusion_drops_unmatched_left_records() {
        let left = vec![
            record(&[("k", "1"), ("a", "kept")]),
            record(&[("k", "2"), ("a", "dropped")]),
            record(&[("k", "3"), ("a", "kept too")]),
        ];
        let right = vec![
            record(&[("j", "1"), ("b", "first")]),
            record(&[("j", "1"), ("b", "second")]),
            record(&[("j", "3"), ("b", "third")]),
        ];
        let out = inclusion(&left, &right, &joinish(&["k"], &["j"], &[("a", "a"), ("b", "b")])).unwrap();
        assert_eq!(
            out,
            vec![
                record(&[("a", "kept"), ("b", "first")]),
                record(&[("a", "kept too"), ("b", "third")]),
            ]
        );
    }

    #[test]
    fn test_select_columns_in_given_order() {
        let table = vec![record(&[("a", "1"), ("b", "2"), ("c", "3")])];
        let out = select_columns(&table, &["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(out[0].keys().collect::<Vec<_>>(), vec!["c", "a"]);
        assert_eq!(out[0].scalar("a"), Some("1"));
    }

    #[test]
    fn test_select_columns_missing() {
        let table = vec![record(&[("a", "1")])];
        let err = select_columns(&table, &["b".to_string()]).unwrap_err();
        assert!(matches!(err, ExecutionError::MissingColumn { column } if column == "b"));
    }
}
