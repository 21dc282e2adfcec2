//! sqlx bridge.
//!
//! Turns a [`NamedSql`] into an unbound or bound `sqlx` query for the database
//! selected by Cargo feature. Nothing here executes SQL.
//!
//! # Example
//!
//! ```ignore
//! use std::collections::HashMap;
//! use sqlx_named_sql::{query_with, NamedSql};
//!
//! let template = NamedSql::parse("SELECT * FROM users WHERE org = :org AND id = :id")?;
//! let args = HashMap::from([("id".to_string(), 42_i64), ("org".to_string(), 7_i64)]);
//! let rows = query_with(&template, &args)?.fetch_all(&pool).await?;
//! ```

use std::collections::HashMap;

use sqlx::database::HasArguments;
use sqlx::query::Query;
use sqlx::{Encode, Type};

use crate::error::Result;
use crate::named_sql::NamedSql;
use crate::native_dialect;

#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;

#[cfg(all(feature = "mysql", not(feature = "postgres")))]
pub type Db = sqlx::MySql;

#[cfg(all(feature = "sqlite", not(feature = "postgres"), not(feature = "mysql")))]
pub type Db = sqlx::Sqlite;

pub type DbQuery<'q> = Query<'q, Db, <Db as HasArguments<'q>>::Arguments>;

/// An unbound query over the template's native form.
pub fn query(template: &NamedSql) -> Result<DbQuery<'_>> {
    let form = template.form(native_dialect())?;
    Ok(sqlx::query(&form.sql))
}

/// A query with `args` bound in parameter order.
///
/// Fails when an argument is missing or a position is a bare marker.
pub fn query_with<'q, V>(template: &'q NamedSql, args: &'q HashMap<String, V>) -> Result<DbQuery<'q>>
where
    V: Encode<'q, Db> + Type<Db> + Sync,
{
    let dialect = native_dialect();
    let form = template.form(dialect)?;
    let values = template.resolve(dialect, args)?;

    let mut query = sqlx::query(&form.sql);
    for value in values {
        query = query.bind(value);
    }

    Ok(query)
}
