//! Error types for named SQL templates.

use thiserror::Error;

/// Errors raised while building a template or resolving its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlTemplateError {
    /// A bare `?` marker was used after named placeholders in the same statement.
    #[error("cannot mix positional and named placeholders in one statement: {sql}")]
    MixedPlaceholders { sql: String },

    /// No argument was supplied for a named parameter.
    #[error("missing argument for named parameter '{name}'")]
    MissingParameter { name: String },

    /// The parameter at this position is a bare marker and cannot be bound by name.
    #[error("parameter at position {position} has no name")]
    UnnamedParameter { position: usize },
}

/// The construction-time syntax error callers match on.
pub type TemplateSyntaxError = SqlTemplateError;

pub type Result<T> = std::result::Result<T, SqlTemplateError>;
