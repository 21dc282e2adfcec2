//! Placeholder translation.
//!
//! Rewrites the named placeholders of a statement (`:name`, `#{name}`) into the
//! markers of a target [`Dialect`] and records which name sits at which position.
//!
//! ```ignore
//! translate("SELECT * FROM t WHERE a = :x AND b = #{y}", Dialect::Positional, ValidationMode::Lenient)
//! // sql: "SELECT * FROM t WHERE a = ? AND b = ?", parameters: {0: "x", 1: "y"}
//!
//! translate("SELECT * FROM t WHERE a = :x AND b = :y", Dialect::Numbered, ValidationMode::Lenient)
//! // sql: "SELECT * FROM t WHERE a = $1 AND b = $2", parameters: {0: "x", 1: "y"}
//! ```

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::{Result, SqlTemplateError};
use crate::tokenizer::tokenize;

/// Leading keywords of statements that are scanned for placeholders.
const PARAMETERIZABLE_KEYWORDS: [&str; 5] = ["INSERT", "SELECT", "UPDATE", "DELETE", "WITH"];

/// Target placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// `?` markers (MySQL, SQLite, JDBC-style drivers).
    #[default]
    Positional,
    /// `$1`, `$2`, ... markers (PostgreSQL and friends).
    Numbered,
}

impl Dialect {
    fn write_marker(self, out: &mut String, ordinal: usize) {
        match self {
            Dialect::Positional => out.push('?'),
            Dialect::Numbered => {
                // Writing into a String cannot fail.
                let _ = write!(out, "${}", ordinal);
            }
        }
    }
}

/// How strictly mixed placeholder styles are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Rejects a bare `?` that follows a named placeholder. A named placeholder
    /// following a bare `?` is accepted and leaves that earlier position unnamed.
    #[default]
    Lenient,
    /// Rejects any mix of bare and named placeholders.
    Strict,
}

/// SQL rewritten for one dialect together with its parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Translation {
    /// The rewritten SQL.
    pub sql: String,
    /// 0-based position -> parameter name. Empty for purely positional statements.
    pub parameters: BTreeMap<usize, String>,
    /// Number of markers in `sql`.
    pub parameter_count: usize,
}

impl Translation {
    /// Untouched SQL with no parameters.
    pub fn passthrough(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            parameters: BTreeMap::new(),
            parameter_count: 0,
        }
    }

    /// Returns true when parameters are bound by name rather than by position.
    pub fn is_named(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Name of the parameter at a 0-based position.
    pub fn name_at(&self, position: usize) -> Option<&str> {
        self.parameters.get(&position).map(String::as_str)
    }
}

/// Placeholder kinds recognised in a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder<'a> {
    Bare,
    Named(&'a str),
    /// `$name`, only meaningful to the numbered dialect.
    Dollar(&'a str),
}

fn classify(token: &str) -> Option<Placeholder<'_>> {
    if token == "?" {
        return Some(Placeholder::Bare);
    }

    if let Some(inner) = token.strip_prefix("#{").and_then(|t| t.strip_suffix('}')) {
        let name = inner.trim();
        return (!name.is_empty()).then_some(Placeholder::Named(name));
    }

    if let Some(name) = token.strip_prefix(':') {
        if !name.is_empty() && !name.starts_with(':') {
            return Some(Placeholder::Named(name));
        }
    }

    if let Some(name) = token.strip_prefix('$') {
        if !name.is_empty() {
            return Some(Placeholder::Dollar(name));
        }
    }

    None
}

/// Returns true when the first non-blank token is one of INSERT, SELECT, UPDATE,
/// DELETE or WITH (case-insensitive).
pub fn is_parameterizable(tokens: &[&str]) -> bool {
    tokens
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty())
        .map_or(false, |first| {
            PARAMETERIZABLE_KEYWORDS
                .iter()
                .any(|keyword| first.eq_ignore_ascii_case(keyword))
        })
}

/// Tokenizes `sql` and translates it for `dialect`.
///
/// For [`Dialect::Positional`] statements that are not parameterizable come back
/// verbatim with zero parameters. The numbered dialect always translates.
pub fn translate(sql: &str, dialect: Dialect, mode: ValidationMode) -> Result<Translation> {
    let tokens = tokenize(sql);

    if dialect == Dialect::Positional && !is_parameterizable(&tokens) {
        return Ok(Translation::passthrough(sql));
    }

    translate_tokens(sql, &tokens, dialect, mode)
}

/// Single left-to-right pass over `tokens`. `sql` is only used for the error.
pub fn translate_tokens(
    sql: &str,
    tokens: &[&str],
    dialect: Dialect,
    mode: ValidationMode,
) -> Result<Translation> {
    let mut out = String::with_capacity(sql.len());
    let mut parameters = BTreeMap::new();
    let mut position = 0;

    for token in tokens {
        let name = match classify(token) {
            Some(Placeholder::Bare) => {
                if !parameters.is_empty() {
                    return Err(mixed(sql));
                }
                None
            }
            Some(Placeholder::Named(name)) => Some(name),
            Some(Placeholder::Dollar(name)) if dialect == Dialect::Numbered => Some(name),
            _ => {
                out.push_str(token);
                continue;
            }
        };

        if let Some(name) = name {
            // Every named marker so far has an entry, so a gap means a bare `?` came first.
            if mode == ValidationMode::Strict && parameters.len() < position {
                return Err(mixed(sql));
            }
            parameters.insert(position, name.to_string());
        }

        position += 1;
        dialect.write_marker(&mut out, position);
    }

    if dialect == Dialect::Numbered && is_sequential(&parameters) {
        parameters.clear();
    }

    Ok(Translation {
        sql: out,
        parameters,
        parameter_count: position,
    })
}

/// True when every name is the integer of its own 1-based position, i.e. the
/// statement already used plain `$1, $2, ...` markers.
fn is_sequential(parameters: &BTreeMap<usize, String>) -> bool {
    !parameters.is_empty()
        && parameters
            .iter()
            .all(|(position, name)| name.parse::<usize>().ok() == Some(position + 1))
}

fn mixed(sql: &str) -> SqlTemplateError {
    SqlTemplateError::MixedPlaceholders {
        sql: sql.to_string(),
    }
}
