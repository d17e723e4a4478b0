//! Typed filter and query building.
//!
//! [`Filter`] compiles a chain of column comparisons down to a parameterized
//! `WHERE` clause with positional `?N` placeholders; values travel in a
//! parallel argument vector and are bound by the engine, never interpolated
//! into the SQL text. Column identifiers come from code, but are still
//! validated before any SQL is assembled so a stray runtime-chosen string
//! cannot smuggle syntax in through the identifier position.

use rusqlite::types::Value;

use crate::error::{StoreError, StoreResult};

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One predicate in a filter chain.
#[derive(Debug, Clone)]
enum Clause {
    /// `column <op> ?N` — consumes one bound argument.
    Compare { column: String, op: &'static str },
    /// `column IS [NOT] NULL` — no argument.
    Null { column: String, negated: bool },
}

/// A parameterized predicate over one table's columns.
///
/// Clauses are combined with `AND`. An empty filter matches every row.
///
/// ```ignore
/// let f = Filter::new().like("name", "%John%").gt("created_at", cutoff);
/// let johns = repo.find_all(Query::new().filter(f)).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
    args: Vec<Value>,
}

impl Filter {
    /// An empty filter (matches all rows).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, "=", value)
    }

    pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, "<>", value)
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, ">", value)
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, ">=", value)
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, "<", value)
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, "<=", value)
    }

    /// SQL `LIKE` pattern match; `%` and `_` wildcards per engine rules.
    pub fn like(self, column: &str, pattern: impl Into<String>) -> Self {
        self.compare(column, "LIKE", Value::Text(pattern.into()))
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.clauses.push(Clause::Null {
            column: column.to_string(),
            negated: false,
        });
        self
    }

    pub fn is_not_null(mut self, column: &str) -> Self {
        self.clauses.push(Clause::Null {
            column: column.to_string(),
            negated: true,
        });
        self
    }

    fn compare(mut self, column: &str, op: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Compare {
            column: column.to_string(),
            op,
        });
        self.args.push(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render the predicate as SQL, numbering placeholders from
    /// `first_placeholder`, and return it with the bound arguments.
    pub(crate) fn to_sql(&self, first_placeholder: usize) -> StoreResult<(String, Vec<Value>)> {
        let mut next = first_placeholder;
        let mut parts = Vec::with_capacity(self.clauses.len());

        for clause in &self.clauses {
            match clause {
                Clause::Compare { column, op } => {
                    validate_ident(column)?;
                    parts.push(format!("{column} {op} ?{next}"));
                    next += 1;
                }
                Clause::Null { column, negated } => {
                    validate_ident(column)?;
                    let op = if *negated { "IS NOT NULL" } else { "IS NULL" };
                    parts.push(format!("{column} {op}"));
                }
            }
        }

        Ok((parts.join(" AND "), self.args.clone()))
    }
}

/// A full read query: optional filter, ordering, and pagination.
///
/// Ordering defaults to insertion order (`id ASC`) when unspecified.
/// By convention callers express pagination as `offset = page * limit`;
/// the repository does not enforce that.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) filter: Option<Filter>,
    pub(crate) order: Option<(String, Order)>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
}

impl Query {
    /// A query matching every row in insertion order.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render `ORDER BY` / `LIMIT` / `OFFSET`, appending bound arguments
    /// to `args` and numbering placeholders from `next`.
    pub(crate) fn tail_sql(&self, next: usize, args: &mut Vec<Value>) -> StoreResult<String> {
        let mut sql = String::new();

        match &self.order {
            Some((column, order)) => {
                validate_ident(column)?;
                sql.push_str(&format!(" ORDER BY {column} {}", order.as_sql()));
            }
            // Insertion order: surrogate ids are assigned monotonically.
            None => sql.push_str(" ORDER BY id ASC"),
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT ?{next} OFFSET ?{}", next + 1));
                args.push(Value::Integer(limit));
                args.push(Value::Integer(offset));
            }
            (Some(limit), None) => {
                sql.push_str(&format!(" LIMIT ?{next}"));
                args.push(Value::Integer(limit));
            }
            // SQLite needs a LIMIT for OFFSET to parse; -1 means unbounded.
            (None, Some(offset)) => {
                sql.push_str(&format!(" LIMIT -1 OFFSET ?{next}"));
                args.push(Value::Integer(offset));
            }
            (None, None) => {}
        }

        Ok(sql)
    }
}

/// An ordered set of named fields for a partial update.
///
/// ```ignore
/// repo.update_fields(id, Patch::new().set("name", "New Name")).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub(crate) fields: Vec<(String, Value)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`. Later sets of the same column win.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.fields.push((column.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Accept `[A-Za-z_][A-Za-z0-9_]*` — anything else never reaches the SQL.
pub(crate) fn validate_ident(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "invalid identifier: {name:?}"
        )))
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_compiles_to_positional_placeholders() {
        let filter = Filter::new()
            .eq("name", "John".to_string())
            .gt("age", 30i64)
            .like("email", "%@example.com");

        let (sql, args) = filter.to_sql(1).unwrap();
        assert_eq!(sql, "name = ?1 AND age > ?2 AND email LIKE ?3");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn null_clauses_consume_no_placeholder() {
        let filter = Filter::new().is_null("deleted_at").eq("active", 1i64);
        let (sql, args) = filter.to_sql(1).unwrap();
        assert_eq!(sql, "deleted_at IS NULL AND active = ?1");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn placeholder_numbering_respects_offset() {
        let filter = Filter::new().eq("a", 1i64).eq("b", 2i64);
        let (sql, _) = filter.to_sql(4).unwrap();
        assert_eq!(sql, "a = ?4 AND b = ?5");
    }

    #[test]
    fn malicious_identifier_is_rejected() {
        let filter = Filter::new().eq("name; DROP TABLE users; --", "x".to_string());
        let err = filter.to_sql(1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)), "got: {err}");

        assert!(validate_ident("name").is_ok());
        assert!(validate_ident("_private_2").is_ok());
        assert!(validate_ident("").is_err());
        assert!(validate_ident("1starts_with_digit").is_err());
        assert!(validate_ident("has space").is_err());
    }

    #[test]
    fn query_tail_defaults_to_insertion_order() {
        let mut args = Vec::new();
        let sql = Query::new().tail_sql(1, &mut args).unwrap();
        assert_eq!(sql, " ORDER BY id ASC");
        assert!(args.is_empty());
    }

    #[test]
    fn query_tail_binds_limit_and_offset() {
        let mut args = Vec::new();
        let sql = Query::new()
            .order_by("name", Order::Desc)
            .limit(10)
            .offset(20)
            .tail_sql(3, &mut args)
            .unwrap();
        assert_eq!(sql, " ORDER BY name DESC LIMIT ?3 OFFSET ?4");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn offset_without_limit_uses_unbounded_limit() {
        let mut args = Vec::new();
        let sql = Query::new().offset(5).tail_sql(1, &mut args).unwrap();
        assert_eq!(sql, " ORDER BY id ASC LIMIT -1 OFFSET ?1");
        assert_eq!(args.len(), 1);
    }
}
