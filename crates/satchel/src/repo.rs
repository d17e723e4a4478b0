//! Generic typed repositories.
//!
//! A [`Record`] binds one in-memory type to one table; [`Repository`] then
//! provides async CRUD, filtered queries, pagination, and transactional
//! batches for it over a shared [`Database`]. The same operations are
//! available synchronously inside a transaction through [`TxScope`], and
//! both paths run the exact same connection-level code, so transactional
//! and standalone behavior cannot drift apart.
//!
//! Write operations report affected-row counts. Zero is a normal outcome
//! (the row was already gone, the filter matched nothing) — callers check
//! the count instead of catching an error.

use std::marker::PhantomData;

use rusqlite::types::Value;
use rusqlite::{Connection, Row, TransactionBehavior, params, params_from_iter};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Patch, Query, validate_ident};

/// Binds a record type to one table.
///
/// `COLUMNS` lists the data columns in a fixed order, excluding the `id`
/// surrogate key (the engine assigns that on insert). `values` must yield
/// one [`Value`] per column in the same order, and `from_row` receives the
/// row as `id` at index 0 followed by the columns in declared order.
pub trait Record: Send + Sized + 'static {
    /// Table this record type maps to.
    const TABLE: &'static str;

    /// Data columns in declared order, `id` excluded.
    const COLUMNS: &'static [&'static str];

    /// The stored identifier, `None` until the record has been inserted.
    fn id(&self) -> Option<i64>;

    /// Serialize the data columns, one value per entry of `COLUMNS`.
    fn values(&self) -> Vec<Value>;

    /// Rebuild a record from a row shaped `(id, COLUMNS...)`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

// ═══════════════════════════════════════════════════════════════════════
//  Connection-level operations
// ═══════════════════════════════════════════════════════════════════════
//
// Everything below takes a `&Connection` so it serves both the async
// `Repository` methods (via `Database::execute`) and the synchronous
// `TxScope` methods (a `&Transaction` derefs to `&Connection`).

fn select_sql<R: Record>() -> String {
    format!("SELECT id, {} FROM {}", R::COLUMNS.join(", "), R::TABLE)
}

fn insert_record<R: Record>(conn: &Connection, record: &R) -> StoreResult<i64> {
    let values = record.values();
    if values.len() != R::COLUMNS.len() {
        return Err(StoreError::InvalidArgument(format!(
            "{} record produced {} values for {} columns",
            R::TABLE,
            values.len(),
            R::COLUMNS.len()
        )));
    }

    let placeholders: Vec<String> = (1..=R::COLUMNS.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

fn find_record<R: Record>(conn: &Connection, id: i64) -> StoreResult<Option<R>> {
    let sql = format!("{} WHERE id = ?1", select_sql::<R>());
    match conn.query_row(&sql, params![id], |row| R::from_row(row)) {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn find_records<R: Record>(conn: &Connection, query: &Query) -> StoreResult<Vec<R>> {
    let mut sql = select_sql::<R>();
    let mut args: Vec<Value> = Vec::new();
    let mut next = 1;

    if let Some(filter) = &query.filter
        && !filter.is_empty()
    {
        let (clause, mut filter_args) = filter.to_sql(next)?;
        next += filter_args.len();
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
        args.append(&mut filter_args);
    }

    sql.push_str(&query.tail_sql(next, &mut args)?);

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(args), |row| R::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

fn update_record<R: Record>(conn: &Connection, record: &R) -> StoreResult<usize> {
    let id = record.id().ok_or_else(|| {
        StoreError::InvalidArgument(format!(
            "cannot update a {} record that was never inserted (id is None)",
            R::TABLE
        ))
    })?;

    let sets: Vec<String> = R::COLUMNS
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ?{}", i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        R::TABLE,
        sets.join(", "),
        R::COLUMNS.len() + 1
    );

    let mut values = record.values();
    values.push(Value::Integer(id));
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

fn update_record_fields<R: Record>(
    conn: &Connection,
    id: i64,
    patch: &Patch,
) -> StoreResult<usize> {
    if patch.is_empty() {
        return Err(StoreError::InvalidArgument(
            "update_fields requires at least one field".into(),
        ));
    }

    let mut sets = Vec::with_capacity(patch.fields.len());
    let mut args: Vec<Value> = Vec::with_capacity(patch.fields.len() + 1);
    for (i, (column, value)) in patch.fields.iter().enumerate() {
        validate_ident(column)?;
        sets.push(format!("{column} = ?{}", i + 1));
        args.push(value.clone());
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        R::TABLE,
        sets.join(", "),
        patch.fields.len() + 1
    );
    args.push(Value::Integer(id));

    Ok(conn.execute(&sql, params_from_iter(args))?)
}

fn delete_record<R: Record>(conn: &Connection, id: i64) -> StoreResult<usize> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", R::TABLE);
    Ok(conn.execute(&sql, params![id])?)
}

fn delete_records<R: Record>(conn: &Connection, filter: Option<&Filter>) -> StoreResult<usize> {
    match filter {
        Some(filter) if !filter.is_empty() => {
            let (clause, args) = filter.to_sql(1)?;
            let sql = format!("DELETE FROM {} WHERE {clause}", R::TABLE);
            Ok(conn.execute(&sql, params_from_iter(args))?)
        }
        _ => {
            let sql = format!("DELETE FROM {}", R::TABLE);
            Ok(conn.execute(&sql, [])?)
        }
    }
}

fn count_records<R: Record>(conn: &Connection, filter: Option<&Filter>) -> StoreResult<i64> {
    match filter {
        Some(filter) if !filter.is_empty() => {
            let (clause, args) = filter.to_sql(1)?;
            let sql = format!("SELECT COUNT(*) FROM {} WHERE {clause}", R::TABLE);
            Ok(conn.query_row(&sql, params_from_iter(args), |row| row.get(0))?)
        }
        _ => {
            let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Repository
// ═══════════════════════════════════════════════════════════════════════

/// Async CRUD façade over one table.
///
/// Cheap to clone; all clones (and all other repositories) share the same
/// underlying [`Database`] handle.
pub struct Repository<R: Record> {
    db: Database,
    _record: PhantomData<R>,
}

impl<R: Record> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> Repository<R> {
    /// Create a repository backed by `db`.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }

    /// Insert a record and return the identifier the engine assigned.
    ///
    /// Fails with [`StoreError::Constraint`] on a unique, foreign-key, or
    /// not-null violation.
    #[instrument(skip(self, record), fields(table = R::TABLE))]
    pub async fn insert(&self, record: R) -> StoreResult<i64> {
        let id = self
            .db
            .execute(move |conn| insert_record(conn, &record))
            .await?;
        debug!(table = R::TABLE, id, "record inserted");
        Ok(id)
    }

    /// Insert all records inside one transaction.
    ///
    /// Either every row persists or none does: any failure rolls the whole
    /// batch back and nothing is assigned.
    #[instrument(skip(self, records), fields(table = R::TABLE, n = records.len()))]
    pub async fn insert_batch(&self, records: Vec<R>) -> StoreResult<Vec<i64>> {
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut ids = Vec::with_capacity(records.len());
                for record in &records {
                    ids.push(insert_record(&tx, record)?);
                }
                tx.commit()?;
                Ok(ids)
            })
            .await
    }

    /// Fetch a record by identifier, `None` if no row matches.
    #[instrument(skip(self), fields(table = R::TABLE))]
    pub async fn find_by_id(&self, id: i64) -> StoreResult<Option<R>> {
        self.db.execute(move |conn| find_record(conn, id)).await
    }

    /// Fetch records matching `query`.
    ///
    /// With a default [`Query`] this returns every row in insertion order.
    #[instrument(skip(self, query), fields(table = R::TABLE))]
    pub async fn find_all(&self, query: Query) -> StoreResult<Vec<R>> {
        self.db
            .execute(move |conn| find_records(conn, &query))
            .await
    }

    /// Replace the full row matched by the record's identifier.
    ///
    /// Returns the affected-row count: `0` means no such row, which is a
    /// normal result, not an error. A record whose `id()` is `None` is
    /// rejected with [`StoreError::InvalidArgument`].
    #[instrument(skip(self, record), fields(table = R::TABLE))]
    pub async fn update(&self, record: R) -> StoreResult<usize> {
        self.db
            .execute(move |conn| update_record(conn, &record))
            .await
    }

    /// Update only the fields named in `patch`. Same zero-count contract
    /// as [`update`](Self::update) when the id matches no row.
    #[instrument(skip(self, patch), fields(table = R::TABLE))]
    pub async fn update_fields(&self, id: i64, patch: Patch) -> StoreResult<usize> {
        self.db
            .execute(move |conn| update_record_fields::<R>(conn, id, &patch))
            .await
    }

    /// Delete one row by identifier; returns the count removed (0 or 1).
    /// Rows referencing it through `ON DELETE CASCADE` go with it.
    #[instrument(skip(self), fields(table = R::TABLE))]
    pub async fn delete(&self, id: i64) -> StoreResult<usize> {
        self.db
            .execute(move |conn| delete_record::<R>(conn, id))
            .await
    }

    /// Delete every row matching `filter` (all rows when `None`); returns
    /// the count removed. Zero is a valid result.
    #[instrument(skip(self, filter), fields(table = R::TABLE))]
    pub async fn delete_all(&self, filter: Option<Filter>) -> StoreResult<usize> {
        self.db
            .execute(move |conn| delete_records::<R>(conn, filter.as_ref()))
            .await
    }

    /// Count rows matching `filter` (all rows when `None`).
    #[instrument(skip(self, filter), fields(table = R::TABLE))]
    pub async fn count(&self, filter: Option<Filter>) -> StoreResult<i64> {
        self.db
            .execute(move |conn| count_records::<R>(conn, filter.as_ref()))
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  TxScope
// ═══════════════════════════════════════════════════════════════════════

/// Repository operations bound to one open transaction.
///
/// Handed to the closure of
/// [`Database::run_in_transaction`](crate::Database::run_in_transaction).
/// Methods are synchronous (the whole closure already runs on the blocking
/// pool) and generic over any [`Record`], so one transaction can span
/// several tables.
pub struct TxScope<'a> {
    conn: &'a Connection,
}

impl<'a> TxScope<'a> {
    pub(crate) fn new(tx: &'a rusqlite::Transaction<'_>) -> Self {
        Self { conn: tx }
    }

    pub fn insert<R: Record>(&self, record: &R) -> StoreResult<i64> {
        insert_record(self.conn, record)
    }

    pub fn find_by_id<R: Record>(&self, id: i64) -> StoreResult<Option<R>> {
        find_record(self.conn, id)
    }

    pub fn find_all<R: Record>(&self, query: &Query) -> StoreResult<Vec<R>> {
        find_records(self.conn, query)
    }

    pub fn update<R: Record>(&self, record: &R) -> StoreResult<usize> {
        update_record(self.conn, record)
    }

    pub fn update_fields<R: Record>(&self, id: i64, patch: &Patch) -> StoreResult<usize> {
        update_record_fields::<R>(self.conn, id, patch)
    }

    pub fn delete<R: Record>(&self, id: i64) -> StoreResult<usize> {
        delete_record::<R>(self.conn, id)
    }

    pub fn delete_all<R: Record>(&self, filter: Option<&Filter>) -> StoreResult<usize> {
        delete_records::<R>(self.conn, filter)
    }

    pub fn count<R: Record>(&self, filter: Option<&Filter>) -> StoreResult<i64> {
        count_records::<R>(self.conn, filter)
    }
}

// ── tests ────────────────────────────────────────────────────────────
