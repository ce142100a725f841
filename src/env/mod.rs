//! # Store environment
//!
//! One LMDB environment per logical store. The environment owns the memory
//! map, the named databases inside it, and a small `info` database for
//! store metadata (schema, counters).
//!
//! ## Transactions
//!
//! All access goes through two scoped helpers:
//!
//! - [`StoreEnvironment::write`] opens the single write transaction, runs the
//!   supplied closure with a [`Writer`], and commits on `Ok` or aborts on
//!   `Err`. Commit first resolves any hash clashes staged during the
//!   transaction (see [`crate::lookup::clash`]).
//! - [`StoreEnvironment::read`] opens a read transaction on a consistent
//!   snapshot, runs the closure, and releases the snapshot.
//!
//! No transaction handle outlives the closure it was handed to.
//!
//! ## Concurrency
//!
//! LMDB serialises writers per environment and gives every reader a
//! multi-version snapshot. `StoreEnvironment` is `Send + Sync`; readers may
//! run on any number of threads while a writer is active.


use std::fs;
use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::{debug, info};

use crate::StoreError;
use crate::lookup::clash::{ClashLedger, StagedClash};

/// Largest key LMDB accepts with its default build settings.
pub const MAX_KEY_LENGTH: usize = 511;

/// Name of the metadata database.
pub const INFO_DB: &str = "info";

/// Map sizes are rounded up to a multiple of this, which covers the page
/// size of every supported platform.
const MAP_SIZE_ALIGNMENT: usize = 64 * 1024;

/// Parameters of one LMDB environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Maximum size of the memory map (bytes). Writes beyond it fail with
    /// the engine's map-full error.
    pub max_store_size: usize,

    /// Maximum number of named databases.
    pub max_dbs: u32,

    /// Maximum number of concurrent read transactions.
    pub max_readers: u32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            max_store_size: 1024 * 1024 * 1024,
            max_dbs: 8,
            max_readers: 126,
        }
    }
}

/// An open LMDB environment plus its metadata database.
pub struct StoreEnvironment {
    env: Env,
    path: PathBuf,
    info: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for StoreEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEnvironment")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl StoreEnvironment {
    /// Opens (or creates) the environment stored in directory `path`.
    pub fn open(path: impl AsRef<Path>, config: &EnvConfig) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let map_size = config
            .max_store_size
            .div_ceil(MAP_SIZE_ALIGNMENT)
            .saturating_mul(MAP_SIZE_ALIGNMENT);

        // SAFETY: the environment directory is owned by this store; nothing
        // else maps or truncates its data file while the environment is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(config.max_dbs)
                .max_readers(config.max_readers)
                .open(&path)?
        };

        let mut txn = env.write_txn()?;
        let info = env.create_database::<Bytes, Bytes>(&mut txn, Some(INFO_DB))?;
        txn.commit()?;

        info!(path = %path.display(), map_size, "environment opened");
        Ok(Self { env, path, info })
    }

    /// Directory holding the environment's files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Largest key the engine accepts.
    pub fn max_key_len(&self) -> usize {
        MAX_KEY_LENGTH
    }

    /// The metadata database.
    pub fn info_db(&self) -> Database<Bytes, Bytes> {
        self.info
    }

    /// Opens or creates the named database.
    pub fn create_database(&self, name: &str) -> Result<Database<Bytes, Bytes>, StoreError> {
        let mut txn = self.env.write_txn()?;
        let db = self
            .env
            .create_database::<Bytes, Bytes>(&mut txn, Some(name))?;
        txn.commit()?;
        debug!(name, "database opened");
        Ok(db)
    }

    /// Runs `work` inside the write transaction.
    ///
    /// Commits (after resolving staged hash clashes) if `work` returns
    /// `Ok`, aborts otherwise. Blocks while another writer is active.
    pub fn write<T>(
        &self,
        work: impl FnOnce(&mut Writer<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut writer = Writer {
            txn: self.env.write_txn()?,
            info: self.info,
            clashes: ClashLedger::default(),
        };
        match work(&mut writer) {
            Ok(result) => {
                writer.commit()?;
                Ok(result)
            }
            Err(e) => {
                writer.abort();
                Err(e)
            }
        }
    }

    /// Runs `work` against a read snapshot.
    pub fn read<T>(
        &self,
        work: impl FnOnce(&RoTxn<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let txn = self.env.read_txn()?;
        work(&txn)
    }

    /// Closes the environment, waiting until LMDB has released it.
    pub fn close(self) {
        let path = self.path;
        self.env.prepare_for_closing().wait();
        info!(path = %path.display(), "environment closed");
    }
}

// ------------------------------------------------------------------------------------------------
// Writer
// ------------------------------------------------------------------------------------------------

/// The write transaction of a [`StoreEnvironment::write`] call.
///
/// Carries the clash ledger alongside the engine transaction so that hash
/// clashes detected while interning are resolved exactly once, at commit.
pub struct Writer<'e> {
    txn: RwTxn<'e>,
    info: Database<Bytes, Bytes>,
    clashes: ClashLedger,
}

impl<'e> Writer<'e> {
    /// Read access through the write transaction.
    pub fn txn(&self) -> &RoTxn<'e> {
        &self.txn
    }

    /// Mutable access to the engine transaction.
    pub fn txn_mut(&mut self) -> &mut RwTxn<'e> {
        &mut self.txn
    }

    /// Records a hash clash to be resolved when this transaction commits.
    pub fn stage_clash(&mut self, clash: StagedClash) {
        self.clashes.stage(clash);
    }

    /// Number of clashes staged so far.
    pub fn staged_clashes(&self) -> usize {
        self.clashes.len()
    }

    fn commit(mut self) -> Result<(), StoreError> {
        let resolved = self.clashes.resolve(&mut self.txn, self.info)?;
        self.txn.commit()?;
        if resolved > 0 {
            debug!(resolved, "write committed with resolved hash clashes");
        }
        Ok(())
    }

    fn abort(self) {
        if !self.clashes.is_empty() {
            debug!(staged = self.clashes.len(), "write aborted; staged clashes dropped");
        }
        self.txn.abort();
    }
}

// ------------------------------------------------------------------------------------------------
// Info helpers
// ------------------------------------------------------------------------------------------------

/// Reads a big-endian `u64` counter from the info database (absent = 0).
pub(crate) fn read_counter(
    txn: &RoTxn<'_>,
    info: Database<Bytes, Bytes>,
    key: &[u8],
) -> Result<u64, StoreError> {
    match info.get(txn, key)? {
        None => Ok(0),
        Some(raw) => {
            let bytes: [u8; 8] = raw
                .try_into()
                .map_err(|_| StoreError::Corruption(format!("counter {} is {} bytes", crate::hex(key), raw.len())))?;
            Ok(u64::from_be_bytes(bytes))
        }
    }
}

/// Writes a big-endian `u64` counter to the info database.
pub(crate) fn write_counter(
    txn: &mut RwTxn<'_>,
    info: Database<Bytes, Bytes>,
    key: &[u8],
    value: u64,
) -> Result<(), StoreError> {
    info.put(txn, key, &value.to_be_bytes())?;
    Ok(())
}
