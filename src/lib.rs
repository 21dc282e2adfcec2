//! Named-parameter SQL templates.
//!
//! Turns SQL written with named placeholders (`:name`, `#{name}`) into executable
//! forms: positional SQL using `?` markers, and numbered SQL using `$1, $2, ...`
//! markers. Parsed templates are memoized in a bounded, expiring cache keyed by the
//! SQL text so repeated statements are cheap after the first use.
//!
//! # Example
//!
//! ```
//! use sqlx_named_sql::NamedSql;
//!
//! let template = NamedSql::parse("SELECT * FROM users WHERE email = :email").unwrap();
//! assert_eq!(template.parameterized_sql(), "SELECT * FROM users WHERE email = ?");
//! assert_eq!(template.named_parameters().get(&0).map(String::as_str), Some("email"));
//! ```

pub mod cache;
pub mod error;
pub mod named_sql;
pub mod tokenizer;
pub mod translator;

#[cfg(any(feature = "postgres", feature = "mysql", feature = "sqlite"))]
pub mod query;

pub use cache::{CacheConfig, CacheStats, Clock, ManualClock, SystemClock, TemplateCache};
pub use error::{Result, SqlTemplateError, TemplateSyntaxError};
pub use named_sql::{Attributes, NamedSql};
pub use translator::{Dialect, Translation, ValidationMode};

#[cfg(any(feature = "postgres", feature = "mysql", feature = "sqlite"))]
pub use query::{query, query_with, Db, DbQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
enum DbType {
    PostgreSQL,
    MySQL,
    SQLite,
}

#[cfg(feature = "postgres")]
fn get_db() -> Option<DbType> {
    Some(DbType::PostgreSQL)
}

#[cfg(all(feature = "mysql", not(feature = "postgres")))]
fn get_db() -> Option<DbType> {
    Some(DbType::MySQL)
}

#[cfg(all(feature = "sqlite", not(feature = "postgres"), not(feature = "mysql")))]
fn get_db() -> Option<DbType> {
    Some(DbType::SQLite)
}

#[cfg(not(any(feature = "postgres", feature = "mysql", feature = "sqlite")))]
fn get_db() -> Option<DbType> {
    None
}

/// Placeholder dialect of the database selected by Cargo feature.
///
/// - PostgreSQL: [`Dialect::Numbered`] (`$1`, `$2`)
/// - MySQL/SQLite: [`Dialect::Positional`] (`?`)
/// - No database feature: [`Dialect::Positional`]
pub fn native_dialect() -> Dialect {
    match get_db() {
        Some(DbType::PostgreSQL) => Dialect::Numbered,
        Some(DbType::MySQL) | Some(DbType::SQLite) | None => Dialect::Positional,
    }
}
