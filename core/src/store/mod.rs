//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The executor and engine call `Queries` methods; they never execute SQL
//! directly. Every `Queries` handle borrows either a plain connection or an
//! open transaction, so the same code runs inside a batch transaction.

mod event;
mod reference;
mod subscription;

use crate::error::RedemptionResult;
use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, Row};

pub struct RedemptionStore {
    conn: Connection,
}

impl RedemptionStore {
    pub fn open(path: &str) -> RedemptionResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        // Overlapping batch runs wait on each other instead of failing fast.
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RedemptionResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RedemptionResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_redemption.sql"))?;
        Ok(())
    }

    /// Raw connection for tooling and tests. Engine code goes through
    /// `queries()` or `with_transaction()`.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Query handle outside any explicit transaction (autocommit).
    pub fn queries(&self) -> Queries<'_> {
        Queries::new(&self.conn)
    }

    /// Run `f` inside one transaction: commit if it returns `Ok`, roll back
    /// every write it made if it returns `Err`.
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
        F: FnOnce(&Queries<'_>) -> Result<T, E>,
    {
        // IMMEDIATE takes the write lock up front so two batch runs never
        // interleave their re-read and update of the same subscription.
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        match f(&Queries::new(&tx)) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    log::error!("rollback failed: {rb}");
                }
                Err(e)
            }
        }
    }
}

/// Transactional query handle.
pub struct Queries<'c> {
    conn: &'c Connection,
}

impl<'c> Queries<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Run `f` under a named savepoint. Its writes are undone if it returns
    /// `Err`; the enclosing transaction stays open either way.
    pub fn with_savepoint<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
        F: FnOnce(&Queries<'c>) -> Result<T, E>,
    {
        self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name};"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = self.conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};")) {
                    log::error!("rollback to savepoint {name} failed: {rb}");
                }
                Err(e)
            }
        }
    }
}

pub(crate) fn to_ts(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

pub(crate) fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {secs} out of range").into(),
        )
    })
}

pub(crate) fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => ts_at(row, idx).map(Some),
        None => Ok(None),
    }
}
