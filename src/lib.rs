//! # planb
//!
//! Typed key/value codecs and interning lookup tables for an embedded,
//! ordered key-value store (LMDB). Each logical store, a **shard**, encodes
//! application values and timestamped keys into compact byte strings,
//! interns large values in side tables to bound record size, resolves hash
//! clashes while interning, and garbage-collects interned values that no
//! record references any more.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use planb::{Shard, ShardConfig, ShardSchema, TemporalPrecision, Value, ValueType};
//!
//! let schema = ShardSchema {
//!     key_type: ValueType::Variable,
//!     value_type: ValueType::Long,
//!     temporal_precision: TemporalPrecision::Second,
//!     ..ShardSchema::default()
//! };
//! let shard = Shard::open("/tmp/my_shard", schema, ShardConfig::default()).unwrap();
//!
//! let now = Utc::now();
//! shard.put(&Value::from("sensor-7"), now, &Value::Long(42)).unwrap();
//!
//! let hit = shard.get_at(&Value::from("sensor-7"), now).unwrap().unwrap();
//! assert_eq!(hit.value, Value::Long(42));
//!
//! // Reclaim interned values no record refers to any more.
//! let stats = shard.gc().unwrap();
//! println!("deleted {} lookup entries", stats.deleted());
//!
//! shard.close();
//! ```
//!
//! ## Layers
//!
//! - [`time`]: fixed-width instants at nanosecond … day precision.
//! - [`encoding`]: the closed set of value types and their primitive bytes.
//! - [`buffer`]: pooled write buffers.
//! - [`lookup`]: UID and hash interning tables, with commit-time clash
//!   resolution.
//! - [`codec`]: per-type record codecs, including the adaptive
//!   `Variable` codec.
//! - [`gc`]: mark-and-sweep reclamation of unreferenced lookup entries.
//! - [`env`]: the LMDB environment and its scoped transactions.
//! - [`shard`]: one logical store tying the above together.

pub mod buffer;
pub mod codec;
pub mod encoding;
pub mod env;
pub mod gc;
pub mod lookup;
pub mod shard;
pub mod time;

#[cfg(test)]
pub(crate) mod test_helpers;

use thiserror::Error;

pub use buffer::{ByteBufferArena, PooledBuffer};
pub use codec::{Thresholds, ValueCodec, VariableEncoding};
pub use encoding::{EncodingError, Value, ValueType};
pub use env::{EnvConfig, MAX_KEY_LENGTH, StoreEnvironment, Writer};
pub use gc::{GcStats, UsedLookupsRecorder};
pub use lookup::{HashLookupDb, HashWidth, LookupRef, Lookups, UidLookupDb};
pub use shard::{Record, RecordAge, Shard, ShardConfig, ShardSchema, ShardStats, ValueWithTime};
pub use time::{TemporalPrecision, TimeCodec};

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A value does not fit its declared type, or stored bytes are malformed.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A hash clash could not be resolved; the write transaction is aborted.
    #[error("hash clash on {hash} could not be resolved: {reason}")]
    ClashResolution {
        /// Hex form of the clashing hash.
        hash: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A record references a lookup entry that does not exist.
    #[error("{table} lookup entry {id} not found")]
    LookupNotFound {
        /// Which lookup table was consulted.
        table: &'static str,
        /// Display form of the missing identifier.
        id: String,
    },

    /// Error reported by the underlying LMDB engine.
    #[error("engine error: {0}")]
    Engine(#[from] heed::Error),

    /// A store was reopened with a schema different from the persisted one.
    #[error("schema mismatch: stored {stored}, requested {requested}")]
    SchemaMismatch {
        /// The schema persisted in the store.
        stored: String,
        /// The schema supplied at open.
        requested: String,
    },

    /// Persisted metadata failed an integrity check.
    #[error("corruption: {0}")]
    Corruption(String),

    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lower-case hex rendering used in error messages and logs.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
