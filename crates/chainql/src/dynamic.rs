//! Method-style condition names.
//!
//! `whereFirstNameAndAgeOrEmail` reads as three conditions: `first_name`,
//! `AND age`, `OR email`, bound in order to the call's arguments.

use crate::condition::{Condition, Connector, with_or_sigil};
use crate::error::{QbError, QbResult};
use crate::value::{IntoOperand, Operand};
use heck::ToSnakeCase;

/// Connector tokens recognized between field names.
const CONNECTOR_TOKENS: [(&str, Connector); 2] = [("And", Connector::And), ("Or", Connector::Or)];

/// Prefixes accepted by [`DynamicName::parse`].
const PREFIXES: [(&str, Clause, Connector); 4] = [
    ("orWhere", Clause::Where, Connector::Or),
    ("orHaving", Clause::Having, Connector::Or),
    ("where", Clause::Where, Connector::And),
    ("having", Clause::Having, Connector::And),
];

/// Which clause a dynamic name targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Where,
    Having,
}

/// One field of a dynamic name with the connector that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub connector: Connector,
    pub field: String,
}

/// A parsed method-style name such as `orWhereNameAndAge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicName {
    pub clause: Clause,
    pub terms: Vec<Term>,
}

impl DynamicName {
    pub fn parse(name: &str) -> QbResult<Self> {
        let (rest, clause, connector) = PREFIXES
            .iter()
            .find_map(|(prefix, clause, connector)| {
                name.strip_prefix(prefix)
                    .filter(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()))
                    .map(|rest| (rest, *clause, *connector))
            })
            .ok_or_else(|| QbError::invalid(format!("Unrecognized condition name '{name}'")))?;

        Ok(Self {
            clause,
            terms: split_terms(rest, connector)?,
        })
    }

    /// Bind arguments to terms, one each, in order.
    pub fn bind<I>(&self, args: I) -> QbResult<Vec<Condition>>
    where
        I: IntoIterator,
        I::Item: IntoOperand,
    {
        bind_terms(&self.terms, args)
    }
}

/// Tokenize `FirstNameAndAgeOrEmail` into snake_case terms.
///
/// A connector token only splits when it is not at the start and is followed
/// by an uppercase letter, so `OrderId` and `ColorOrange` stay whole.
/// `first` is the connector of the first term.
pub fn split_terms(name: &str, first: Connector) -> QbResult<Vec<Term>> {
    let mut terms = Vec::new();
    let mut connector = first;
    let mut start = 0;
    let mut i = 0;

    while i < name.len() {
        let rest = &name[i..];
        let hit = (i > start).then(|| {
            CONNECTOR_TOKENS.iter().find(|(token, _)| {
                rest.strip_prefix(token)
                    .is_some_and(|after| after.starts_with(|c: char| c.is_ascii_uppercase()))
            })
        });
        match hit.flatten() {
            Some((token, next)) => {
                terms.push(term(connector, &name[start..i])?);
                connector = *next;
                i += token.len();
                start = i;
            }
            None => i += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    terms.push(term(connector, &name[start..])?);
    Ok(terms)
}

fn term(connector: Connector, raw: &str) -> QbResult<Term> {
    let field = raw.to_snake_case();
    if field.is_empty() {
        return Err(QbError::invalid("Empty field in condition name"));
    }
    Ok(Term { connector, field })
}

/// Pair terms with arguments. Any count mismatch is an error.
pub fn bind_terms<I>(terms: &[Term], args: I) -> QbResult<Vec<Condition>>
where
    I: IntoIterator,
    I::Item: IntoOperand,
{
    let args: Vec<Operand> = args.into_iter().map(IntoOperand::into_operand).collect();
    if args.len() != terms.len() {
        let names: Vec<&str> = terms.iter().map(|t| t.field.as_str()).collect();
        return Err(QbError::invalid(format!(
            "Condition name with fields [{}] expects {} argument(s), got {}",
            names.join(", "),
            terms.len(),
            args.len()
        )));
    }

    Ok(terms
        .iter()
        .zip(args)
        .map(|(term, operand)| {
            let field = match term.connector {
                Connector::And => term.field.clone(),
                Connector::Or => with_or_sigil(&term.field),
            };
            Condition { field, operand }
        })
        .collect())
}
