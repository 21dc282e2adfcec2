//! Parsed, reusable SQL statement templates.
//!
//! A [`NamedSql`] keeps the trimmed source text, the positional (`?`) form that is
//! computed eagerly, and the numbered (`$n`) form that is computed on first use.
//!
//! # Example
//!
//! ```
//! use sqlx_named_sql::NamedSql;
//!
//! let template = NamedSql::build("SELECT * FROM users WHERE id = :id AND org = #{org}").unwrap();
//! assert_eq!(template.parameterized_sql(), "SELECT * FROM users WHERE id = ? AND org = ?");
//! assert_eq!(template.parameter_count(), 2);
//!
//! let numbered = template.alternate_form().unwrap();
//! assert_eq!(numbered.sql, "SELECT * FROM users WHERE id = $1 AND org = $2");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::race::OnceBox;

use crate::cache;
use crate::error::{Result, SqlTemplateError};
use crate::tokenizer::tokenize;
use crate::translator::{self, Dialect, Translation, ValidationMode};

/// Free-form caller metadata carried alongside a template.
pub type Attributes = HashMap<String, String>;

/// A SQL statement with its named parameters resolved to positions.
///
/// Equality and hashing only look at the SQL text; two templates built from the
/// same statement with different attributes compare equal.
pub struct NamedSql {
    sql: String,
    attributes: Attributes,
    mode: ValidationMode,
    parameterizable: bool,
    default_form: Translation,
    // Concurrent first callers may each compute the form; the first stored value
    // wins and the rest are dropped. The computation is pure, so they are equal.
    alternate_form: OnceBox<Translation>,
}

impl NamedSql {
    /// Builds a template without attributes.
    pub fn build(sql: &str) -> Result<Self> {
        Self::build_with_mode(sql, Attributes::new(), ValidationMode::Lenient)
    }

    /// Builds a template carrying `attributes`.
    pub fn build_with_attributes(sql: &str, attributes: Attributes) -> Result<Self> {
        Self::build_with_mode(sql, attributes, ValidationMode::Lenient)
    }

    /// Builds a template, validating placeholder mixing with `mode`.
    ///
    /// Fails only with [`SqlTemplateError::MixedPlaceholders`]. Statements that do
    /// not start with INSERT, SELECT, UPDATE, DELETE or WITH are kept verbatim.
    pub fn build_with_mode(sql: &str, attributes: Attributes, mode: ValidationMode) -> Result<Self> {
        let sql = sql.trim();
        let tokens = tokenize(sql);
        let parameterizable = translator::is_parameterizable(&tokens);

        let default_form = if parameterizable {
            translator::translate_tokens(sql, &tokens, Dialect::Positional, mode)?
        } else {
            Translation::passthrough(sql)
        };

        Ok(Self {
            sql: sql.to_string(),
            attributes,
            mode,
            parameterizable,
            default_form,
            alternate_form: OnceBox::new(),
        })
    }

    /// Looks the statement up in the process-wide cache, building it on a miss.
    pub fn parse(sql: &str) -> Result<Arc<Self>> {
        cache::global().get_or_build(sql)
    }

    /// Same as [`NamedSql::parse`], attaching `attributes` when the template is built.
    pub fn parse_with_attributes(sql: &str, attributes: Attributes) -> Result<Arc<Self>> {
        cache::global().get_or_build_with_attributes(sql, attributes)
    }

    /// The trimmed source text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.mode
    }

    /// Whether the statement kind is scanned for placeholders.
    pub fn is_parameterizable(&self) -> bool {
        self.parameterizable
    }

    /// The `?` form, computed at construction.
    pub fn default_form(&self) -> &Translation {
        &self.default_form
    }

    pub fn parameterized_sql(&self) -> &str {
        &self.default_form.sql
    }

    pub fn named_parameters(&self) -> &BTreeMap<usize, String> {
        &self.default_form.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.default_form.parameter_count
    }

    /// The `$n` form, computed from a fresh tokenization of the source text on the
    /// first call and memoized afterwards.
    pub fn alternate_form(&self) -> Result<&Translation> {
        self.alternate_form.get_or_try_init(|| {
            tracing::trace!(sql = %self.sql, "computing numbered placeholder form");
            translator::translate(&self.sql, Dialect::Numbered, self.mode).map(Box::new)
        })
    }

    /// The form for `dialect`.
    pub fn form(&self, dialect: Dialect) -> Result<&Translation> {
        match dialect {
            Dialect::Positional => Ok(&self.default_form),
            Dialect::Numbered => self.alternate_form(),
        }
    }

    /// Parameter names in bind order for `dialect`.
    ///
    /// Fails with [`SqlTemplateError::UnnamedParameter`] when a position is a bare marker.
    pub fn ordered_names(&self, dialect: Dialect) -> Result<Vec<&str>> {
        let form = self.form(dialect)?;
        (0..form.parameter_count)
            .map(|position| {
                form.name_at(position)
                    .ok_or(SqlTemplateError::UnnamedParameter { position })
            })
            .collect()
    }

    /// Picks the values of `args` in bind order for `dialect`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use sqlx_named_sql::{Dialect, NamedSql};
    ///
    /// let template = NamedSql::build("UPDATE t SET a = :a WHERE id = :id").unwrap();
    /// let args = HashMap::from([("id".to_string(), 7), ("a".to_string(), 1)]);
    /// assert_eq!(template.resolve(Dialect::Positional, &args).unwrap(), vec![&1, &7]);
    /// ```
    pub fn resolve<'a, V>(&self, dialect: Dialect, args: &'a HashMap<String, V>) -> Result<Vec<&'a V>> {
        self.ordered_names(dialect)?
            .into_iter()
            .map(|name| {
                args.get(name).ok_or_else(|| SqlTemplateError::MissingParameter {
                    name: name.to_string(),
                })
            })
            .collect()
    }
}

impl PartialEq for NamedSql {
    fn eq(&self, other: &Self) -> bool {
        self.sql == other.sql
    }
}

impl Eq for NamedSql {}

impl Hash for NamedSql {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sql.hash(state);
    }
}

impl fmt::Display for NamedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl fmt::Debug for NamedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedSql")
            .field("sql", &self.sql)
            .field("attributes", &self.attributes)
            .field("mode", &self.mode)
            .field("default_form", &self.default_form)
            .field("alternate_form", &self.alternate_form.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(template: &NamedSql) -> u64 {
        let mut hasher = DefaultHasher::new();
        template.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_build_trims_source() {
        let template = NamedSql::build("  SELECT * FROM t WHERE a = :a \n").unwrap();
        assert_eq!(template.sql(), "SELECT * FROM t WHERE a = :a");
        assert_eq!(template.parameterized_sql(), "SELECT * FROM t WHERE a = ?");
        assert_eq!(template.to_string(), "SELECT * FROM t WHERE a = :a");
    }

    #[test]
    fn test_default_form_accessors() {
        let template = NamedSql::build("INSERT INTO t (a, b) VALUES (:a, #{b})").unwrap();
        assert!(template.is_parameterizable());
        assert_eq!(template.parameterized_sql(), "INSERT INTO t (a, b) VALUES (?, ?)");
        assert_eq!(template.parameter_count(), 2);
        assert_eq!(template.named_parameters().get(&0).map(String::as_str), Some("a"));
        assert_eq!(template.named_parameters().get(&1).map(String::as_str), Some("b"));
    }

    #[test]
    fn test_passthrough_statement() {
        let template = NamedSql::build("  SHOW TABLES LIKE :x ").unwrap();
        assert!(!template.is_parameterizable());
        assert_eq!(template.parameterized_sql(), "SHOW TABLES LIKE :x");
        assert_eq!(template.parameter_count(), 0);
        assert!(template.named_parameters().is_empty());
    }

    #[test]
    fn test_blank_statement() {
        let template = NamedSql::build("   ").unwrap();
        assert_eq!(template.sql(), "");
        assert_eq!(template.parameterized_sql(), "");
        assert_eq!(template.parameter_count(), 0);
    }

    #[test]
    fn test_mixing_error_carries_source() {
        let err = NamedSql::build("SELECT * FROM t WHERE a = :x AND b = ?").unwrap_err();
        assert_eq!(
            err,
            SqlTemplateError::MixedPlaceholders {
                sql: "SELECT * FROM t WHERE a = :x AND b = ?".to_string()
            }
        );
    }

    #[test]
    fn test_strict_mode_is_opt_in() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = :y";
        assert!(NamedSql::build(sql).is_ok());
        assert!(NamedSql::build_with_mode(sql, Attributes::new(), ValidationMode::Strict).is_err());
    }

    #[test]
    fn test_alternate_form_is_memoized() {
        let template = NamedSql::build("SELECT * FROM t WHERE a = :x AND b = :y").unwrap();
        let first = template.alternate_form().unwrap();
        let second = template.alternate_form().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(first.parameter_count, 2);
    }

    #[test]
    fn test_alternate_form_uses_source_not_default_form() {
        let template = NamedSql::build("SELECT * FROM t WHERE a = $1 AND b = $2").unwrap();
        assert_eq!(template.parameter_count(), 0);

        let numbered = template.alternate_form().unwrap();
        assert_eq!(numbered.sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(numbered.parameter_count, 2);
        assert!(numbered.parameters.is_empty());
    }

    #[test]
    fn test_alternate_form_error_is_not_memoized() {
        let template = NamedSql::build("SELECT $a, ?").unwrap();
        assert!(template.alternate_form().is_err());
        assert!(template.alternate_form().is_err());
        assert_eq!(template.parameter_count(), 1);
    }

    #[test]
    fn test_form_by_dialect() {
        let template = NamedSql::build("DELETE FROM t WHERE id = :id").unwrap();
        assert_eq!(template.form(Dialect::Positional).unwrap().sql, "DELETE FROM t WHERE id = ?");
        assert_eq!(template.form(Dialect::Numbered).unwrap().sql, "DELETE FROM t WHERE id = $1");
    }

    #[test]
    fn test_equality_ignores_attributes() {
        let plain = NamedSql::build("SELECT 1").unwrap();
        let tagged = NamedSql::build_with_attributes(
            " SELECT 1 ",
            Attributes::from([("fetch_size".to_string(), "100".to_string())]),
        )
        .unwrap();
        assert_eq!(plain, tagged);
        assert_eq!(hash_of(&plain), hash_of(&tagged));
        assert_eq!(tagged.attribute("fetch_size"), Some("100"));
        assert_eq!(plain.attribute("fetch_size"), None);
    }

    #[test]
    fn test_ordered_names() {
        let template = NamedSql::build("SELECT * FROM t WHERE a = :a AND b = :b AND c = :a").unwrap();
        assert_eq!(template.ordered_names(Dialect::Positional).unwrap(), vec!["a", "b", "a"]);
        assert_eq!(template.ordered_names(Dialect::Numbered).unwrap(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_ordered_names_with_bare_marker() {
        let template = NamedSql::build("SELECT * FROM t WHERE a = ? AND b = :b").unwrap();
        assert_eq!(
            template.ordered_names(Dialect::Positional).unwrap_err(),
            SqlTemplateError::UnnamedParameter { position: 0 }
        );
    }

    #[test]
    fn test_resolve_reports_missing_argument() {
        let template = NamedSql::build("SELECT * FROM t WHERE a = :a AND b = :b").unwrap();
        let args = HashMap::from([("a".to_string(), "x")]);
        assert_eq!(
            template.resolve(Dialect::Positional, &args).unwrap_err(),
            SqlTemplateError::MissingParameter { name: "b".to_string() }
        );
    }

    #[test]
    fn test_resolve_without_parameters() {
        let template = NamedSql::build("SELECT 1").unwrap();
        let args: HashMap<String, i32> = HashMap::new();
        assert!(template.resolve(Dialect::Numbered, &args).unwrap().is_empty());
    }
}
