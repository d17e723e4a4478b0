//! Schema migration system.
//!
//! The embedding application registers an ordered list of DDL steps, each
//! bound to the schema version it produces. The stored version lives in
//! SQLite's `user_version` header field, so the engine keeps it alongside
//! the file and it participates in the migration transaction.
//!
//! All pending steps apply inside one IMMEDIATE transaction: a failure in
//! step N rolls back steps 1..N and leaves the stored version untouched.
//! Steps whose version is at or below the stored version never re-run —
//! that gate is the only idempotence a step needs.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration step: DDL bound to the version it produces.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    /// Schema version this step migrates *to*. Strictly increasing, ≥ 1.
    pub version: u32,
    /// Human-readable description, for logs.
    pub description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    pub sql: &'static str,
}

/// Ordered list of migration steps registered by the application.
///
/// ```ignore
/// let migrations = Migrations::new()
///     .step(1, "initial schema", "CREATE TABLE users (...);")
///     .step(2, "notes table", "CREATE TABLE notes (...);");
/// let db = Database::open_and_migrate("data/app.db", migrations).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Migrations {
    steps: Vec<MigrationStep>,
}

impl Migrations {
    /// An empty migration list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step targeting `version`. Steps must be registered in
    /// ascending version order; `run` rejects lists that are not.
    pub fn step(mut self, version: u32, description: &'static str, sql: &'static str) -> Self {
        self.steps.push(MigrationStep {
            version,
            description,
            sql,
        });
        self
    }

    /// The version the schema reaches once every step has applied.
    /// Zero when no steps are registered.
    pub fn latest_version(&self) -> u32 {
        self.steps.last().map(|s| s.version).unwrap_or(0)
    }

    /// Apply all pending steps and return the new stored version.
    ///
    /// This is a **synchronous** function — call it from `spawn_blocking`
    /// (or via [`Database::migrate`](crate::Database::migrate)).
    ///
    /// Semantics per the stored version `current`:
    /// - `current == latest`: no-op.
    /// - `current > latest`: [`StoreError::Migration`] — downgrades are
    ///   unsupported.
    /// - otherwise: every step in `(current, latest]` runs, in order,
    ///   inside one transaction; the stored version moves to `latest` in
    ///   the same transaction.
    ///
    /// A fresh database (version 0) runs all steps from the beginning, so
    /// the full schema is simply the composition of the step list.
    pub fn run(&self, conn: &mut Connection) -> StoreResult<u32> {
        self.validate()?;

        let current = stored_version(conn)?;
        let latest = self.latest_version();

        if current == latest {
            debug!(version = current, "database schema is up to date");
            return Ok(current);
        }
        if current > latest {
            return Err(StoreError::Migration {
                version: latest,
                message: format!(
                    "stored version {current} is newer than latest known step {latest}; \
                     downgrades are unsupported"
                ),
            });
        }

        let pending: Vec<&MigrationStep> =
            self.steps.iter().filter(|s| s.version > current).collect();
        info!(
            current_version = current,
            target_version = latest,
            pending = pending.len(),
            "running pending migrations"
        );

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StoreError::Migration {
                version: latest,
                message: format!("failed to begin transaction: {e}"),
            })?;

        for step in &pending {
            info!(
                version = step.version,
                description = step.description,
                "applying migration step"
            );
            if let Err(e) = tx.execute_batch(step.sql) {
                warn!(version = step.version, %e, "migration step failed, rolling back");
                // Dropping `tx` rolls back every step applied so far.
                return Err(StoreError::Migration {
                    version: step.version,
                    message: format!("SQL execution failed: {e}"),
                });
            }
        }

        tx.pragma_update(None, "user_version", latest)
            .map_err(|e| StoreError::Migration {
                version: latest,
                message: format!("failed to record version: {e}"),
            })?;
        tx.commit().map_err(|e| StoreError::Migration {
            version: latest,
            message: format!("failed to commit: {e}"),
        })?;

        info!(new_version = latest, "all migrations applied");
        Ok(latest)
    }

    /// Versions must be ≥ 1 and strictly increasing.
    fn validate(&self) -> StoreResult<()> {
        let mut last = 0u32;
        for step in &self.steps {
            if step.version <= last {
                return Err(StoreError::Migration {
                    version: step.version,
                    message: format!(
                        "step versions must be strictly increasing; \
                         {} follows {last}",
                        step.version
                    ),
                });
            }
            last = step.version;
        }
        Ok(())
    }
}

/// Read the stored schema version (`PRAGMA user_version`), 0 when fresh.
pub fn stored_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read stored version: {e}"),
        })?;
    Ok(version)
}

// ── tests ────────────────────────────────────────────────────────────
