//! # satchel
//!
//! Typed data access layer over embedded SQLite.
//!
//! Three small layers, leaf to root:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Repository<R> / TxScope  (typed CRUD,       │
//! │  filters, pagination, transactional batches) │
//! ├──────────────────────────────────────────────┤
//! │  Migrations (version-gated DDL steps,        │
//! │  applied in one transaction)                 │
//! ├──────────────────────────────────────────────┤
//! │  Database (shared rusqlite handle, WAL,      │
//! │  spawn_blocking dispatch)                    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use satchel::{Database, Migrations, Repository};
//!
//! let migrations = Migrations::new()
//!     .step(1, "users table", "CREATE TABLE users (...);");
//! let db = Database::open_and_migrate("data/app.db", migrations).await?;
//!
//! let users: Repository<User> = Repository::new(db.clone());
//! let id = users.insert(user).await?;
//! ```
//!
//! The `Database` is constructed once at the application's composition root
//! and cloned into every repository; there is no global connection state.

pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod query;
pub mod repo;
pub mod value;

// ── re-exports ───────────────────────────────────────────────────────

pub use config::StoreConfig;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use migration::{MigrationStep, Migrations, stored_version};
pub use query::{Filter, Order, Patch, Query};
pub use repo::{Record, Repository, TxScope};
