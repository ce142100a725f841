//! # Shard
//!
//! One logical store: an LMDB environment holding
//!
//! | Database           | Contents                                            |
//! |--------------------|-----------------------------------------------------|
//! | `records`          | encoded key (value + effective time) → encoded value (value + insert time) |
//! | `uid_lookup`       | UID table entries                                   |
//! | `uid_lookup_index` | UID table reverse index                             |
//! | `hash_lookup`      | hash table entries                                  |
//! | `info`             | schema record, hash clash counter                   |
//!
//! The key and value codecs share the shard's two lookup tables. Record keys
//! carry the effective time at the schema's precision, so all versions of
//! one key sort together, oldest first. Record values carry their insertion
//! instant at millisecond precision.
//!
//! ## Lifecycle
//!
//! [`Shard::open`] validates the schema and configuration, opens the
//! environment, and either persists the schema (new store) or checks it
//! against the stored one (existing store). [`Shard::close`] releases the
//! environment.
//!
//! ## Maintenance
//!
//! Overwriting or deleting records can orphan lookup entries. [`Shard::gc`]
//! reclaims them; [`Shard::run_gc_pass`] does the same from a maintenance
//! loop, logging instead of returning failures. [`Shard::delete_old_data`]
//! drops records older than a cutoff, and [`Shard::condense`] drops
//! superseded versions older than a cutoff. Both reclaim the lookup entries
//! they orphan in the same transaction.

pub mod schema;

#[cfg(test)]
mod tests;

pub use schema::ShardSchema;

use std::collections::HashMap;
use std::ops::Bound;
use std::path::Path;

use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, RoTxn};
use tracing::{debug, error, info};

use crate::StoreError;
use crate::buffer::{ByteBufferArena, DEFAULT_BUFFER_CAPACITY, DEFAULT_POOLED_BUFFERS};
use crate::codec::{Thresholds, ValueCodec};
use crate::encoding::Value;
use crate::env::{EnvConfig, StoreEnvironment, Writer};
use crate::gc::{GcStats, UsedLookupsRecorder};
use crate::lookup::Lookups;
use crate::lookup::clash::clash_count;
use crate::time::{TemporalPrecision, TimeCodec};

/// Name of the records database.
pub const RECORDS_DB: &str = "records";

/// Precision of the insertion instant stored with every value.
pub const INSERT_TIME_PRECISION: TemporalPrecision = TemporalPrecision::Millisecond;

/// Named databases of one shard: records, three lookup databases, info.
const SHARD_DBS: u32 = 8;

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`Shard`].
///
/// All fields have sensible defaults via [`ShardConfig::default()`].
/// The configuration is validated when passed to [`Shard::open`].
///
/// # Example
///
/// ```rust
/// use planb::ShardConfig;
///
/// let config = ShardConfig {
///     max_store_size: 256 * 1024 * 1024,
///     pooled_buffers: 4,
///     ..ShardConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Maximum size of the store's memory map in bytes.
    ///
    /// Default: 1 GiB. Must be ≥ 1 MiB.
    pub max_store_size: usize,

    /// Maximum number of concurrent read transactions.
    ///
    /// Default: 126. Must be ≥ 1.
    pub max_readers: u32,

    /// Initial capacity of pooled encode buffers.
    ///
    /// Default: 1024. Must be ≥ 64.
    pub buffer_capacity: usize,

    /// Number of idle encode buffers kept for reuse.
    ///
    /// Default: 16. Must be ≥ 1.
    pub pooled_buffers: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            max_store_size: 1024 * 1024 * 1024,
            max_readers: 126,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            pooled_buffers: DEFAULT_POOLED_BUFFERS,
        }
    }
}

impl ShardConfig {
    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_store_size < 1024 * 1024 {
            return Err(StoreError::InvalidConfig(
                "max_store_size must be >= 1 MiB".into(),
            ));
        }
        if self.max_readers < 1 {
            return Err(StoreError::InvalidConfig("max_readers must be >= 1".into()));
        }
        if self.buffer_capacity < 64 {
            return Err(StoreError::InvalidConfig(
                "buffer_capacity must be >= 64".into(),
            ));
        }
        if self.pooled_buffers < 1 {
            return Err(StoreError::InvalidConfig(
                "pooled_buffers must be >= 1".into(),
            ));
        }
        Ok(())
    }

    fn to_env_config(&self) -> EnvConfig {
        EnvConfig {
            max_store_size: self.max_store_size,
            max_dbs: SHARD_DBS,
            max_readers: self.max_readers,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Records
// ------------------------------------------------------------------------------------------------

/// A stored value with the instant it was inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueWithTime {
    pub value: Value,
    pub insert_time: DateTime<Utc>,
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Value,
    /// Effective time, truncated to the schema precision.
    pub effective_time: DateTime<Utc>,
    pub value: Value,
    pub insert_time: DateTime<Utc>,
}

/// Sizes of a shard's tables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShardStats {
    pub records: u64,
    pub uid_entries: u64,
    pub hash_entries: u64,
    /// Hash clashes resolved over the lifetime of the store.
    pub hash_clashes: u64,
}

/// Which instant of a record [`Shard::delete_old_data`] ages it by.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RecordAge {
    /// When the record was last written.
    #[default]
    InsertTime,
    /// The effective time carried in the record key.
    EffectiveTime,
}

// ------------------------------------------------------------------------------------------------
// Shard
// ------------------------------------------------------------------------------------------------

/// One logical store. `Send + Sync`: reads may run on any thread while a
/// write (including a GC pass) is in progress.
pub struct Shard {
    env: StoreEnvironment,
    schema: ShardSchema,
    records: Database<Bytes, Bytes>,
    lookups: Lookups,
    key_codec: ValueCodec,
    value_codec: ValueCodec,
    arena: ByteBufferArena,
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("path", &self.env.path())
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Shard {
    /// Opens (or creates) the shard stored in directory `path`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidConfig`] if `config` or the schema's direct
    ///   threshold is out of range.
    /// - [`StoreError::SchemaMismatch`] if the store exists with a different
    ///   schema.
    /// - [`StoreError::Corruption`] if the stored schema record is damaged.
    pub fn open(
        path: impl AsRef<Path>,
        schema: ShardSchema,
        config: ShardConfig,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        schema.validate()?;

        let env = StoreEnvironment::open(&path, &config.to_env_config())?;
        let created = match schema.ensure(&env) {
            Ok(created) => created,
            Err(e) => {
                env.close();
                return Err(e);
            }
        };
        let records = env.create_database(RECORDS_DB)?;
        let lookups = Lookups::open(&env, schema.hash_width)?;

        let thresholds = Thresholds {
            direct_max: schema.direct_threshold,
            max_key_len: env.max_key_len(),
        };
        let key_codec = ValueCodec::new(
            schema.key_type,
            TimeCodec::new(schema.temporal_precision),
            lookups,
            thresholds,
        );
        let value_codec = ValueCodec::new(
            schema.value_type,
            TimeCodec::new(INSERT_TIME_PRECISION),
            lookups,
            thresholds,
        );

        info!(
            path = %path.as_ref().display(),
            %schema,
            created,
            "shard opened"
        );

        Ok(Self {
            env,
            schema,
            records,
            lookups,
            key_codec,
            value_codec,
            arena: ByteBufferArena::new(config.buffer_capacity, config.pooled_buffers),
        })
    }

    /// Closes the shard, waiting until the environment is released.
    pub fn close(self) {
        info!(path = %self.env.path().display(), "shard closing");
        self.env.close();
    }

    pub fn schema(&self) -> ShardSchema {
        self.schema
    }

    pub fn path(&self) -> &Path {
        self.env.path()
    }

    /// The shard's lookup tables, for use inside [`Shard::read`] and
    /// [`Shard::write`].
    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    pub fn key_codec(&self) -> &ValueCodec {
        &self.key_codec
    }

    pub fn value_codec(&self) -> &ValueCodec {
        &self.value_codec
    }

    /// Runs `work` in the shard's write transaction (see
    /// [`StoreEnvironment::write`]).
    pub fn write<T>(
        &self,
        work: impl FnOnce(&mut Writer<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.env.write(work)
    }

    /// Runs `work` against a read snapshot.
    pub fn read<T>(
        &self,
        work: impl FnOnce(&RoTxn<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.env.read(work)
    }

    // --------------------------------------------------------------------------------------------
    // Write operations
    // --------------------------------------------------------------------------------------------

    /// Inserts or replaces the record `(key, effective) → value` inside an
    /// existing write transaction. The insertion instant is the current time.
    pub fn insert(
        &self,
        writer: &mut Writer<'_>,
        key: &Value,
        effective: DateTime<Utc>,
        value: &Value,
    ) -> Result<(), StoreError> {
        let mut key_buf = self.arena.acquire();
        let mut value_buf = self.arena.acquire();
        self.key_codec.write(writer, key, effective, &mut key_buf)?;
        self.value_codec.write(writer, value, Utc::now(), &mut value_buf)?;
        self.records
            .put(writer.txn_mut(), key_buf.as_slice(), value_buf.as_slice())?;
        Ok(())
    }

    /// Inserts or replaces one record in its own transaction.
    pub fn put(&self, key: &Value, effective: DateTime<Utc>, value: &Value) -> Result<(), StoreError> {
        self.write(|writer| self.insert(writer, key, effective, value))
    }

    /// Inserts or replaces many records in one transaction.
    pub fn put_batch<'v>(
        &self,
        entries: impl IntoIterator<Item = (&'v Value, DateTime<Utc>, &'v Value)>,
    ) -> Result<usize, StoreError> {
        self.write(|writer| {
            let mut written = 0;
            for (key, effective, value) in entries {
                self.insert(writer, key, effective, value)?;
                written += 1;
            }
            debug!(written, "record batch inserted");
            Ok(written)
        })
    }

    /// Removes the record `(key, effective)` inside an existing write
    /// transaction. Returns whether it existed.
    ///
    /// Lookup entries it referenced stay until the next GC pass.
    pub fn remove(
        &self,
        writer: &mut Writer<'_>,
        key: &Value,
        effective: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut key_buf = self.arena.acquire();
        if !self
            .key_codec
            .write_for_read(writer.txn(), key, effective, &mut key_buf)?
        {
            return Ok(false);
        }
        Ok(self.records.delete(writer.txn_mut(), key_buf.as_slice())?)
    }

    /// Removes one record in its own transaction.
    pub fn delete(&self, key: &Value, effective: DateTime<Utc>) -> Result<bool, StoreError> {
        self.write(|writer| self.remove(writer, key, effective))
    }

    /// Deletes every record older than `before`, then reclaims the lookup
    /// entries no remaining record references. Both happen in one
    /// transaction. Returns the number of records deleted.
    ///
    /// `age` selects which instant of a record is compared with `before`.
    pub fn delete_old_data(&self, before: DateTime<Utc>, age: RecordAge) -> Result<u64, StoreError> {
        let (deleted, stats) = self.write(|writer| {
            let mut doomed = Vec::new();
            for entry in self.records.iter(writer.txn())? {
                let (key, value) = entry?;
                let time = match age {
                    RecordAge::InsertTime => self.value_codec.read_time(value)?,
                    RecordAge::EffectiveTime => self.key_codec.read_time(key)?,
                };
                if time < before {
                    doomed.push(key.to_vec());
                }
            }
            let stats = self.delete_and_sweep(writer, &doomed)?;
            Ok((doomed.len() as u64, stats))
        })?;

        info!(
            %before,
            ?age,
            deleted,
            lookups_deleted = stats.deleted(),
            "old data deleted"
        );
        Ok(deleted)
    }

    /// Drops history older than `before`: of the versions of one key whose
    /// effective time is before the cutoff, only the latest is kept. Lookup
    /// entries left unreferenced are reclaimed in the same transaction.
    /// Returns the number of records deleted.
    ///
    /// [`Shard::get_at`] answers unchanged for every instant at or after
    /// `before`.
    pub fn condense(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let time_len = self.key_codec.time_codec().size();
        let (deleted, stats) = self.write(|writer| {
            // Versions of one key ascend in time, but keys of different
            // lengths may interleave, so track the latest per key prefix.
            let mut doomed = Vec::new();
            let mut latest_old: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
            for entry in self.records.iter(writer.txn())? {
                let (key, _) = entry?;
                if self.key_codec.read_time(key)? >= before {
                    continue;
                }
                let prefix = key[..key.len().saturating_sub(time_len)].to_vec();
                if let Some(superseded) = latest_old.insert(prefix, key.to_vec()) {
                    doomed.push(superseded);
                }
            }
            let stats = self.delete_and_sweep(writer, &doomed)?;
            Ok((doomed.len() as u64, stats))
        })?;

        info!(
            %before,
            deleted,
            lookups_deleted = stats.deleted(),
            "shard condensed"
        );
        Ok(deleted)
    }

    // --------------------------------------------------------------------------------------------
    // Read operations
    // --------------------------------------------------------------------------------------------

    /// The value stored at exactly `(key, effective)`, with `effective`
    /// truncated to the schema precision.
    pub fn get(&self, key: &Value, effective: DateTime<Utc>) -> Result<Option<ValueWithTime>, StoreError> {
        self.read(|txn| {
            let mut key_buf = self.arena.acquire();
            if !self
                .key_codec
                .write_for_read(txn, key, effective, &mut key_buf)?
            {
                return Ok(None);
            }
            let Some(bytes) = self.records.get(txn, key_buf.as_slice())? else {
                return Ok(None);
            };
            let (value, insert_time) = self.value_codec.read(txn, bytes)?;
            Ok(Some(ValueWithTime { value, insert_time }))
        })
    }

    /// The latest record of `key` whose effective time is at or before `at`.
    pub fn get_at(&self, key: &Value, at: DateTime<Utc>) -> Result<Option<Record>, StoreError> {
        let time = self.key_codec.time_codec();
        if at < time.min_instant() {
            return Ok(None);
        }
        let at = at.min(time.max_instant());
        self.read(|txn| {
            let mut upper = self.arena.acquire();
            if !self.key_codec.write_for_read(txn, key, at, &mut upper)? {
                return Ok(None);
            }
            let upper = upper.as_slice();
            let prefix = &upper[..upper.len() - time.size()];
            let range = (Bound::Included(prefix), Bound::Included(upper));

            for entry in self.records.rev_range(txn, &range)? {
                let (k, v) = entry?;
                if k.len() == upper.len() && k.starts_with(prefix) {
                    return self.decode_record(txn, k, v).map(Some);
                }
            }
            Ok(None)
        })
    }

    /// Every record, in key order.
    pub fn records(&self) -> Result<Vec<Record>, StoreError> {
        self.read(|txn| {
            let mut out = Vec::new();
            for entry in self.records.iter(txn)? {
                let (k, v) = entry?;
                out.push(self.decode_record(txn, k, v)?);
            }
            Ok(out)
        })
    }

    /// Number of records.
    pub fn count(&self) -> Result<u64, StoreError> {
        self.read(|txn| Ok(self.records.len(txn)?))
    }

    pub fn stats(&self) -> Result<ShardStats, StoreError> {
        self.read(|txn| {
            Ok(ShardStats {
                records: self.records.len(txn)?,
                uid_entries: self.lookups.uid.len(txn)?,
                hash_entries: self.lookups.hash.len(txn)?,
                hash_clashes: clash_count(txn, self.env.info_db())?,
            })
        })
    }

    // --------------------------------------------------------------------------------------------
    // Maintenance
    // --------------------------------------------------------------------------------------------

    /// Deletes every lookup entry that no record references.
    ///
    /// Marking and sweeping share one write transaction; concurrent readers
    /// keep decoding from their own snapshots throughout.
    pub fn gc(&self) -> Result<GcStats, StoreError> {
        let stats = self.write(|writer| self.delete_and_sweep(writer, &[]))?;
        debug!(
            records = stats.records_scanned,
            deleted = stats.deleted(),
            "lookup gc pass complete"
        );
        Ok(stats)
    }

    /// [`Shard::gc`] for maintenance loops: failures are logged and the pass
    /// is left to be retried later.
    pub fn run_gc_pass(&self) -> Option<GcStats> {
        match self.gc() {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(path = %self.env.path().display(), error = %e, "lookup gc pass failed");
                None
            }
        }
    }

    /// Deletes `doomed` records, then sweeps lookup entries that the
    /// remaining records no longer reference.
    fn delete_and_sweep(&self, writer: &mut Writer<'_>, doomed: &[Vec<u8>]) -> Result<GcStats, StoreError> {
        for key in doomed {
            self.records.delete(writer.txn_mut(), key)?;
        }
        let mut recorder = UsedLookupsRecorder::new();
        recorder.mark(writer.txn(), self.records, &self.key_codec, &self.value_codec)?;
        recorder.delete_unused(writer.txn_mut(), &self.lookups)
    }

    fn decode_record(&self, txn: &RoTxn<'_>, key: &[u8], value: &[u8]) -> Result<Record, StoreError> {
        let (key, effective_time) = self.key_codec.read(txn, key)?;
        let (value, insert_time) = self.value_codec.read(txn, value)?;
        Ok(Record {
            key,
            effective_time,
            value,
            insert_time,
        })
    }
}
