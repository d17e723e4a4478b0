//! End-to-end tests over a realistic two-table schema: `users` with a
//! unique natural key and `notes` referencing it with cascade delete.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Value;
use satchel::value::{timestamp_column, timestamp_from_storage, timestamp_to_storage};
use satchel::{
    Database, Filter, Migrations, Order, Patch, Query, Record, Repository, StoreError,
    stored_version,
};

// ═══════════════════════════════════════════════════════════════════════
//  Example schema
// ═══════════════════════════════════════════════════════════════════════

fn migrations() -> Migrations {
    Migrations::new()
        .step(
            1,
            "users table with unique email",
            "CREATE TABLE users (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL,
                name       TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX idx_users_email ON users(email);",
        )
        .step(
            2,
            "notes table, cascade on user delete",
            "CREATE TABLE notes (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title      TEXT NOT NULL,
                body       TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX idx_notes_user ON notes(user_id);",
        )
        .step(
            3,
            "archived flag on users",
            "ALTER TABLE users ADD COLUMN archived INTEGER NOT NULL DEFAULT 0;",
        )
}

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: Option<i64>,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
    archived: bool,
}

impl Record for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &["email", "name", "created_at", "archived"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.email.clone()),
            Value::Text(self.name.clone()),
            Value::Integer(timestamp_to_storage(self.created_at)),
            Value::from(self.archived),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: timestamp_column(row, 3)?,
            archived: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Note {
    id: Option<i64>,
    user_id: i64,
    title: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl Record for Note {
    const TABLE: &'static str = "notes";
    const COLUMNS: &'static [&'static str] = &["user_id", "title", "body", "created_at"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.user_id),
            Value::Text(self.title.clone()),
            Value::Text(self.body.clone()),
            Value::Integer(timestamp_to_storage(self.created_at)),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            created_at: timestamp_column(row, 4)?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════

/// A timestamp that is exact at millisecond precision, so fetched records
/// compare equal to what was inserted.
fn ts(millis: i64) -> DateTime<Utc> {
    timestamp_from_storage(millis).unwrap()
}

fn user(email: &str, name: &str) -> User {
    User {
        id: None,
        email: email.to_string(),
        name: name.to_string(),
        created_at: ts(1_700_000_000_123),
        archived: false,
    }
}

fn note(user_id: i64, title: &str) -> Note {
    Note {
        id: None,
        user_id,
        title: title.to_string(),
        body: format!("body of {title}"),
        created_at: ts(1_700_000_111_456),
    }
}

async fn setup() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.migrate(migrations()).await.unwrap();
    db
}

// ═══════════════════════════════════════════════════════════════════════
//  CRUD round trips
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn insert_then_fetch_round_trips_every_field() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    let original = user("alice@example.com", "Alice");
    let id = users.insert(original.clone()).await.unwrap();

    let fetched = users.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(fetched.id, Some(id));
    assert_eq!(fetched.email, original.email);
    assert_eq!(fetched.name, original.name);
    assert_eq!(fetched.created_at, original.created_at);
    assert_eq!(fetched.archived, original.archived);
}

#[tokio::test]
async fn update_fields_changes_exactly_the_named_fields() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    let id = users.insert(user("bob@example.com", "Bob")).await.unwrap();
    let before = users.find_by_id(id).await.unwrap().unwrap();

    let n = users
        .update_fields(id, Patch::new().set("name", "Robert".to_string()))
        .await
        .unwrap();
    assert_eq!(n, 1);

    let after = users.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(after.name, "Robert");
    // Everything not named in the patch is untouched.
    assert_eq!(after.email, before.email);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.archived, before.archived);
}

#[tokio::test]
async fn update_fields_on_missing_id_returns_zero() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    let n = users
        .update_fields(424242, Patch::new().set("name", "Nobody".to_string()))
        .await
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn duplicate_email_is_a_constraint_error() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    users.insert(user("same@example.com", "First")).await.unwrap();
    let err = users
        .insert(user("same@example.com", "Second"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "got: {err}");
}

// ═══════════════════════════════════════════════════════════════════════
//  Relationships
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn deleting_a_user_cascades_to_their_notes() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());
    let notes: Repository<Note> = Repository::new(db.clone());

    let keep = users.insert(user("keep@example.com", "Keep")).await.unwrap();
    let gone = users.insert(user("gone@example.com", "Gone")).await.unwrap();

    notes.insert(note(keep, "keep-1")).await.unwrap();
    notes.insert(note(gone, "gone-1")).await.unwrap();
    notes.insert(note(gone, "gone-2")).await.unwrap();
    assert_eq!(notes.count(None).await.unwrap(), 3);

    assert_eq!(users.delete(gone).await.unwrap(), 1);

    // Only the surviving user's notes remain.
    let remaining = notes.find_all(Query::new()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_id, keep);
}

#[tokio::test]
async fn note_for_unknown_user_is_a_constraint_error() {
    let db = setup().await;
    let notes: Repository<Note> = Repository::new(db.clone());

    let err = notes.insert(note(999, "orphan")).await.unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "got: {err}");
}

// ═══════════════════════════════════════════════════════════════════════
//  Filters and pagination
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn like_filter_matches_exactly_the_substring_set() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    for (email, name) in [
        ("a@example.com", "John Smith"),
        ("b@example.com", "Mary Johnson"),
        ("c@example.com", "Alice"),
        ("d@example.com", "Johnny Cash"),
        ("e@example.com", "Bob"),
    ] {
        users.insert(user(email, name)).await.unwrap();
    }

    let johns = users
        .find_all(Query::new().filter(Filter::new().like("name", "%John%")))
        .await
        .unwrap();

    let mut names: Vec<&str> = johns.iter().map(|u| u.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["John Smith", "Johnny Cash", "Mary Johnson"]);
}

#[tokio::test]
async fn batch_insert_then_paginate_in_insertion_order() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    let batch: Vec<User> = (1..=100)
        .map(|i| user(&format!("user{i:03}@example.com"), &format!("User {i:03}")))
        .collect();
    let ids = users.insert_batch(batch).await.unwrap();
    assert_eq!(ids.len(), 100);

    // Page 2 at 10 per page: records 21–30, no explicit order given.
    let page = users
        .find_all(Query::new().limit(10).offset(20))
        .await
        .unwrap();
    assert_eq!(page.len(), 10);
    assert_eq!(page[0].name, "User 021");
    assert_eq!(page[9].name, "User 030");
}

#[tokio::test]
async fn explicit_ordering_overrides_insertion_order() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    for (email, name) in [
        ("z@example.com", "Zoe"),
        ("a@example.com", "Ada"),
        ("m@example.com", "Mia"),
    ] {
        users.insert(user(email, name)).await.unwrap();
    }

    let sorted = users
        .find_all(Query::new().order_by("name", Order::Asc))
        .await
        .unwrap();
    let names: Vec<&str> = sorted.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Ada", "Mia", "Zoe"]);
}

#[tokio::test]
async fn count_respects_filters() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());

    for i in 0..4 {
        let mut u = user(&format!("u{i}@example.com"), "U");
        u.archived = i % 2 == 0;
        users.insert(u).await.unwrap();
    }

    assert_eq!(users.count(None).await.unwrap(), 4);
    assert_eq!(
        users
            .count(Some(Filter::new().eq("archived", 1i64)))
            .await
            .unwrap(),
        2
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Transactions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn failed_transaction_restores_the_exact_pre_state() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());
    let notes: Repository<Note> = Repository::new(db.clone());

    let uid = users.insert(user("pre@example.com", "Pre")).await.unwrap();
    notes.insert(note(uid, "pre-note")).await.unwrap();
    let users_before = users.find_all(Query::new()).await.unwrap();
    let notes_before = notes.find_all(Query::new()).await.unwrap();

    // Operations 1..k-1 succeed, operation k violates the unique email.
    let result: Result<(), StoreError> = db
        .run_in_transaction(move |scope| {
            let new_user = scope.insert(&user("mid@example.com", "Mid"))?;
            scope.insert(&note(new_user, "mid-note"))?;
            scope.update_fields::<User>(uid, &Patch::new().set("name", "Changed".to_string()))?;
            scope.insert(&user("pre@example.com", "Dup"))?;
            Ok(())
        })
        .await;
    assert!(matches!(result.unwrap_err(), StoreError::Constraint(_)));

    // No partial effects from the operations before the failure.
    assert_eq!(users.find_all(Query::new()).await.unwrap(), users_before);
    assert_eq!(notes.find_all(Query::new()).await.unwrap(), notes_before);
}

#[tokio::test]
async fn transaction_spanning_both_tables_commits_atomically() {
    let db = setup().await;
    let users: Repository<User> = Repository::new(db.clone());
    let notes: Repository<Note> = Repository::new(db.clone());

    let (uid, note_ids) = db
        .run_in_transaction(|scope| {
            let uid = scope.insert(&user("tx@example.com", "Tx"))?;
            let a = scope.insert(&note(uid, "first"))?;
            let b = scope.insert(&note(uid, "second"))?;
            Ok((uid, vec![a, b]))
        })
        .await
        .unwrap();

    assert!(users.find_by_id(uid).await.unwrap().is_some());
    for id in note_ids {
        assert_eq!(notes.find_by_id(id).await.unwrap().unwrap().user_id, uid);
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Migrations and persistence
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fresh_migration_matches_stepwise_upgrade() {
    // Fresh: v0 → v3 in one go.
    let fresh = Database::open_in_memory().unwrap();
    fresh.migrate(migrations()).await.unwrap();

    // Stepwise: v0 → v1, then v1 → v3.
    let stepwise = Database::open_in_memory().unwrap();
    stepwise
        .migrate(Migrations::new().step(
            1,
            "users table with unique email",
            "CREATE TABLE users (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL,
                name       TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX idx_users_email ON users(email);",
        ))
        .await
        .unwrap();
    stepwise.migrate(migrations()).await.unwrap();

    // Identical schema objects (tables and indexes) on both paths.
    let schema = |db: &Database| {
        let db = db.clone();
        async move {
            db.execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, sql FROM sqlite_master \
                     WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
        }
    };

    let fresh_schema = schema(&fresh).await.unwrap();
    let stepwise_schema = schema(&stepwise).await.unwrap();
    assert_eq!(fresh_schema, stepwise_schema);

    let version = fresh
        .execute(|conn| stored_version(conn))
        .await
        .unwrap();
    assert_eq!(version, 3);
}

#[tokio::test]
async fn reopening_an_existing_file_preserves_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    let id = {
        let db = Database::open_and_migrate(path.clone(), migrations())
            .await
            .unwrap();
        let users: Repository<User> = Repository::new(db.clone());
        let id = users
            .insert(user("durable@example.com", "Durable"))
            .await
            .unwrap();
        db.close().await.unwrap();
        id
    };

    // Second open: migrations are a no-op, the row is still there.
    let db = Database::open_and_migrate(path, migrations()).await.unwrap();
    let users: Repository<User> = Repository::new(db.clone());
    let fetched = users.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(fetched.email, "durable@example.com");
}

#[tokio::test]
async fn backup_copy_contains_the_same_records() {
    let dir = tempfile::tempdir().unwrap();
    let live_path = dir.path().join("live.db");
    let backup_path = dir.path().join("backup.db");

    let db = Database::open_and_migrate(live_path, migrations())
        .await
        .unwrap();
    let users: Repository<User> = Repository::new(db.clone());
    let id = users.insert(user("saved@example.com", "Saved")).await.unwrap();

    db.backup_to(backup_path.clone()).await.unwrap();

    let copy = Database::open(&backup_path).unwrap();
    let copy_users: Repository<User> = Repository::new(copy.clone());
    let fetched = copy_users.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Saved");
}
