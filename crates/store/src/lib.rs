//! The data manager: a persistent, transactional, content-addressed
//! store for every quantity the pipeline computes.
//!
//! Tokens are the basic unit of currency when interacting with the
//! store: [`DataManager::tokenize_model`] and friends return an existing
//! identifier when a stored row matches the value within its class
//! tolerance, and mint a new identifier otherwise. Work lists are the
//! set-difference between a requested Cartesian product of tokens and
//! the rows already present. Results are committed one transaction per
//! sample and can be read back with the `find_*` operations.
//!
//! The store is opened exclusively by the master process; workers never
//! hold a handle.

mod create;
mod error;
mod find;
mod policy;
mod store_ops;
mod tokenize;
mod work_lists;

#[cfg(test)]
mod tests;

use std::cell::Cell;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rusqlite::Connection;

pub use error::{Result, StoreError};
pub use policy::Policy;

use oneloop_units::{Energy, IrResumToken, IrToken, KToken, UvToken, ZToken};

/// Store options.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Declare real foreign keys on every value table and enable
    /// `PRAGMA foreign_keys`, so orphan rows fail their transaction.
    pub strict_consistency: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            strict_consistency: false,
        }
    }
}

/// Search tolerances per entity class.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances {
    pub model: f64,
    pub z: f64,
    pub k: f64,
    pub params: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            model: 1e-5,
            z: 1e-5,
            k: 1e-10,
            params: 1e-12,
        }
    }
}

#[derive(Debug)]
pub struct DataManager {
    pub(crate) conn: Connection,
    pub(crate) policy: Policy,
    pub(crate) options: Options,
    pub(crate) tolerances: Tolerances,
    container: PathBuf,
    tx_live: Cell<bool>,
}

impl DataManager {
    /// Open an existing container, or create a fresh one with the full
    /// schema.
    pub fn open(path: &Path, options: Options) -> Result<Self> {
        let policy = Policy::default();
        let fresh = !path.exists();
        if !fresh && !path.is_file() {
            return Err(StoreError::NotAFile(path.to_path_buf()));
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        if options.strict_consistency {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }

        let manager = DataManager {
            conn,
            policy,
            options,
            tolerances: Tolerances::default(),
            container: path.to_path_buf(),
            tx_live: Cell::new(false),
        };
        if fresh {
            info!("creating data container {}", path.display());
            create::create_tables(&manager.conn, &manager.policy, &manager.options)?;
        } else {
            debug!("opened data container {}", path.display());
        }
        Ok(manager)
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    /// Open a transaction. Fails if one is already live; the pipeline
    /// never nests transactions.
    pub fn open_transaction(&self) -> Result<Transaction<'_>> {
        if self.tx_live.get() {
            return Err(StoreError::TransactionInProgress);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.tx_live.set(true);
        Ok(Transaction {
            dm: self,
            committed: false,
        })
    }

    /// Number of rows in `table`; new tokens are minted as the row count
    /// at insertion time.
    pub(crate) fn count(&self, table: &str) -> Result<u32> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })?;
        Ok(count as u32)
    }
}

impl Drop for DataManager {
    fn drop(&mut self) {
        // Routine maintenance on close; failure only costs disk space.
        let _ = self.conn.execute_batch("VACUUM;");
    }
}

/// A live transaction on the store. Dropping without committing rolls
/// back. Commit consumes the guard, so committing a released
/// transaction is unrepresentable.
#[derive(Debug)]
pub struct Transaction<'dm> {
    dm: &'dm DataManager,
    committed: bool,
}

impl Transaction<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.dm.conn.execute_batch("COMMIT;")?;
        self.committed = true;
        self.dm.tx_live.set(false);
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.dm.conn.execute_batch("ROLLBACK;");
            self.dm.tx_live.set(false);
        }
    }
}

/// Token/value samples for the configuration axes.
pub type ZDb = Vec<(ZToken, f64)>;
pub type KDb = Vec<(KToken, Energy)>;
pub type UvDb = Vec<(UvToken, Energy)>;
pub type IrDb = Vec<(IrToken, Energy)>;
pub type IrResumDb = Vec<(IrResumToken, Energy)>;
