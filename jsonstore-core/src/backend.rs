// jsonstore-core/src/backend.rs
// SQLite connection shared by a store and all of its collections

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};

use crate::catalog;
use crate::config::StoreConfig;
use crate::error::{JsonStoreError, Result};

pub(crate) struct Backend {
    conn: Mutex<Option<Connection>>,
    /// An ambient transaction opened by `Store::begin_transaction` is running
    in_transaction: AtomicBool,
    path: Option<PathBuf>,
}

impl Backend {
    pub(crate) fn open(config: &StoreConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if config.path.is_some() {
            let mode: String = conn.pragma_update_and_check(
                None,
                "journal_mode",
                config.journal_mode.as_pragma(),
                |row| row.get(0),
            )?;
            debug!("journal_mode = {}", mode);
        }
        conn.execute_batch(&format!(
            "PRAGMA synchronous = {}; PRAGMA temp_store = MEMORY;",
            config.durability.synchronous_pragma()
        ))?;
        catalog::ensure_catalog(&conn)?;

        match &config.path {
            Some(path) => info!("Opened store at {} ({:?})", path.display(), config.durability),
            None => info!("Opened in-memory store"),
        }

        Ok(Backend {
            conn: Mutex::new(Some(conn)),
            in_transaction: AtomicBool::new(false),
            path: config.path.clone(),
        })
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    /// Run read-only work on the connection.
    pub(crate) fn read<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(store_closed)?;
        f(conn)
    }

    /// Run a write atomically.
    ///
    /// Outside an ambient transaction this is its own IMMEDIATE transaction;
    /// inside one it is a savepoint, so a failure undoes only this write and
    /// the ambient transaction stays open. Returning `Err` rolls back.
    pub(crate) fn write<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or_else(store_closed)?;

        if self.in_transaction() {
            let savepoint = conn.savepoint()?;
            let result = f(&*savepoint)?;
            savepoint.commit()?;
            Ok(result)
        } else {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = f(&*tx)?;
            tx.commit()?;
            Ok(result)
        }
    }

    // ========== AMBIENT TRANSACTION ==========

    pub(crate) fn begin(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(store_closed)?;
        if self.in_transaction() {
            return Err(JsonStoreError::Transaction(
                "A transaction is already active".to_string(),
            ));
        }
        conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction.store(true, Ordering::SeqCst);
        debug!("Ambient transaction started");
        Ok(())
    }

    pub(crate) fn commit(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(store_closed)?;
        self.require_transaction("commit")?;
        if let Err(err) = conn.execute_batch("COMMIT") {
            // a failed COMMIT can leave the transaction open
            if !conn.is_autocommit() {
                let _ = conn.execute_batch("ROLLBACK");
            }
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        self.in_transaction.store(false, Ordering::SeqCst);
        debug!("Ambient transaction committed");
        Ok(())
    }

    pub(crate) fn rollback(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(store_closed)?;
        self.require_transaction("roll back")?;
        self.in_transaction.store(false, Ordering::SeqCst);
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        debug!("Ambient transaction rolled back");
        Ok(())
    }

    fn require_transaction(&self, action: &str) -> Result<()> {
        if self.in_transaction() {
            Ok(())
        } else {
            Err(JsonStoreError::Transaction(format!(
                "No active transaction to {}",
                action
            )))
        }
    }

    /// Reject schema-changing operations while an ambient transaction is open.
    pub(crate) fn ensure_no_transaction(&self, action: &str) -> Result<()> {
        if self.in_transaction() {
            return Err(JsonStoreError::Transaction(format!(
                "Cannot {} while a transaction is active",
                action
            )));
        }
        Ok(())
    }

    // ========== LIFECYCLE ==========

    pub(crate) fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    pub(crate) fn close(&self) -> Result<()> {
        self.ensure_no_transaction("close the store")?;
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, err)| JsonStoreError::Sqlite(err))?;
            info!("Store closed");
        }
        Ok(())
    }
}

fn store_closed() -> JsonStoreError {
    JsonStoreError::NotOpen("store".to_string())
}
