use std::borrow::BorrowMut;

use pest::Parser as _;
use pest_derive::Parser;

use crate::ast::{
    Action, ColumnName, ColumnProjection, Function, Identifier, Invoke, Joinish, Pull, Statement,
    Using,
};
use crate::canonical::Document;
use crate::error::{ParseError, ParseResult};
use crate::lower::DocumentBuilder;

#[derive(Parser)]
#[grammar = "rules.pest"]
struct StatementParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;
type Pairs<'a> = pest::iterators::Pairs<'a, Rule>;

/// Parses a single statement.
pub fn parse_statement(line: &str) -> ParseResult<Statement> {
    parse_line(1, line)
}

/// Parses a sequence of statements, one per item, into a canonical document.
///
/// The first statement that fails to parse aborts the whole sequence.
pub fn parse<'a, I>(statements: I) -> ParseResult<Document>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut builder = DocumentBuilder::new();
    for (i, line) in statements.into_iter().enumerate() {
        builder.statement(&parse_line(i + 1, line)?);
    }
    Ok(builder.build())
}

/// Parses a buffer of newline-separated statements into a canonical document.
///
/// Blank lines and lines starting with `#` are skipped. Errors report the line
/// number within `buffer`.
pub fn parse_buffer(buffer: &str) -> ParseResult<Document> {
    let mut builder = DocumentBuilder::new();
    for statement in parse_statements(buffer)? {
        builder.statement(&statement);
    }
    Ok(builder.build())
}

/// Parses every statement in `buffer` without lowering them.
pub fn parse_statements(buffer: &str) -> ParseResult<Vec<Statement>> {
    split_buffer(buffer)
        .map(|(line, statement)| parse_line(line, statement))
        .collect()
}

/// The statements of `buffer`, trimmed, with their 1-based line numbers.
pub fn split_buffer(buffer: &str) -> impl Iterator<Item = (usize, &str)> {
    buffer
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_line(line: usize, statement: &str) -> ParseResult<Statement> {
    log::debug!("try to parse: {}", statement);
    let pair = StatementParser::parse(Rule::statement, statement)
        .map_err(|e| ParseError::Syntax {
            line,
            statement: statement.to_owned(),
            source: Box::new(e),
        })?
        .next()
        .expect("missing statement");

    let action = pair.into_inner().next().expect("missing action");
    Ok(Statement::from(action))
}

fn expect_next_rule<'a, P: BorrowMut<Pairs<'a>>>(mut pairs: P, rule: Rule) -> Pair<'a> {
    let pair = pairs.borrow_mut().next().expect("missing pair");
    assert_eq!(pair.as_rule(), rule);
    pair
}

fn convert_identifier(pair: Pair) -> Identifier {
    assert_eq!(pair.as_rule(), Rule::name);
    pair.as_str().to_string()
}

fn expect_identifier<'a, P: BorrowMut<Pairs<'a>>>(pairs: P) -> Identifier {
    convert_identifier(expect_next_rule(pairs, Rule::name))
}

fn convert_names(pair: Pair) -> Vec<ColumnName> {
    assert_eq!(pair.as_rule(), Rule::names);
    pair.into_inner().map(convert_identifier).collect()
}

fn expect_names<'a, P: BorrowMut<Pairs<'a>>>(pairs: P) -> Vec<ColumnName> {
    convert_names(expect_next_rule(pairs, Rule::names))
}

fn convert_columns(pair: Pair) -> Vec<ColumnName> {
    assert_eq!(pair.as_rule(), Rule::columns);
    expect_names(pair.into_inner())
}

fn expect_rule_ref<'a, P: BorrowMut<Pairs<'a>>>(pairs: P) -> (Identifier, Identifier, Identifier) {
    let mut pairs = expect_next_rule(pairs, Rule::rule_ref).into_inner();
    let namespace = expect_identifier(&mut pairs);
    let name = expect_identifier(&mut pairs);
    let version = expect_identifier(&mut pairs);
    (namespace, name, version)
}

impl From<Pair<'_>> for Statement {
    fn from(pair: Pair<'_>) -> Self {
        match pair.as_rule() {
            Rule::expects => {
                let mut pairs = pair.into_inner();
                let table = expect_identifier(&mut pairs);
                let columns = convert_columns(expect_next_rule(&mut pairs, Rule::columns));
                Statement::Expects { table, columns }
            }

            Rule::attach => {
                let mut pairs = pair.into_inner();
                let url = expect_next_rule(&mut pairs, Rule::url).as_str().to_owned();
                let name = expect_identifier(&mut pairs);
                Statement::Attach { url, name }
            }

            _ => Statement::Action(Action::from(pair)),
        }
    }
}

impl From<Pair<'_>> for Action {
    fn from(pair: Pair<'_>) -> Self {
        let rule = pair.as_rule();
        let mut pairs = pair.into_inner();

        match rule {
            Rule::commit => {
                let table = expect_identifier(&mut pairs);
                let columns = pairs.next().map(convert_columns);
                Action::Commit { table, columns }
            }

            Rule::push => Action::Push {
                table: expect_identifier(&mut pairs),
            },

            Rule::pop => Action::Pop,

            Rule::duplicate => Action::Duplicate,

            Rule::join => Action::Join(Joinish::from(pairs)),

            Rule::inclusion => Action::Inclusion(Joinish::from(pairs)),

            Rule::accumulate => {
                let column = expect_identifier(&mut pairs);
                let function = Function::from(expect_next_rule(&mut pairs, Rule::function));
                let result = pairs.next().map(convert_identifier);
                Action::Accumulate {
                    column,
                    function,
                    result,
                }
            }

            Rule::pull => {
                let (namespace, table, version) = expect_rule_ref(&mut pairs);
                let as_name = expect_identifier(&mut pairs);
                Action::Pull(Pull {
                    namespace,
                    table,
                    version,
                    as_name,
                })
            }

            Rule::invoke => {
                let (namespace, rule, version) = expect_rule_ref(&mut pairs);
                Action::Invoke(Invoke {
                    namespace,
                    rule,
                    version,
                })
            }

            _ => unreachable!(),
        }
    }
}

impl From<Pairs<'_>> for Joinish {
    fn from(mut pairs: Pairs<'_>) -> Self {
        let mut using_pairs = expect_next_rule(&mut pairs, Rule::using).into_inner();
        let using = Using {
            left: expect_names(&mut using_pairs),
            right: expect_names(&mut using_pairs),
        };

        let include = match pairs.next() {
            Some(include) => {
                assert_eq!(include.as_rule(), Rule::include);
                include.into_inner().map(ColumnProjection::from).collect()
            }
            None => Vec::new(),
        };

        Self { using, include }
    }
}

impl From<Pair<'_>> for ColumnProjection {
    fn from(pair: Pair<'_>) -> Self {
        assert_eq!(pair.as_rule(), Rule::name_as);
        let mut pairs = pair.into_inner();
        let src = expect_identifier(&mut pairs);
        match pairs.next() {
            Some(dst) => ColumnProjection::new(src, convert_identifier(dst)),
            None => ColumnProjection::same(src),
        }
    }
}

impl From<Pair<'_>> for Function {
    fn from(pair: Pair<'_>) -> Self {
        let mut pairs = pair.into_inner();
        let name = expect_identifier(&mut pairs);
        let args = expect_names(&mut pairs);
        Self { name, args }
    }
}
