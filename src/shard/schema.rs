//! Persisted shard schema.
//!
//! The schema is written to the info database under [`SCHEMA_KEY`] when a
//! shard is created and checked on every reopen.
//!
//! ## Layout
//!
//! ```text
//! [version: u8][key type: u8][value type: u8][precision: u8][hash width: u8]
//! [direct threshold: u16 BE][crc32: u32 LE]
//! ```
//!
//! The checksum covers the seven preceding bytes. Everything that decides
//! how a value is encoded lives here, so a reopened store always encodes a
//! given value to the bytes it was first written with.

use std::fmt;

use crate::StoreError;
use crate::codec::variable::DEFAULT_DIRECT_MAX;
use crate::encoding::ValueType;
use crate::env::{MAX_KEY_LENGTH, StoreEnvironment};
use crate::lookup::HashWidth;
use crate::time::TemporalPrecision;

/// Info-database key of the schema record.
pub const SCHEMA_KEY: &[u8] = b"schema";

const SCHEMA_VERSION: u8 = 2;
const BODY_LEN: usize = 7;
const RECORD_LEN: usize = BODY_LEN + 4;

/// The fixed shape of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSchema {
    /// Declared type of record keys.
    pub key_type: ValueType,
    /// Declared type of record values.
    pub value_type: ValueType,
    /// Precision of the effective time in record keys.
    pub temporal_precision: TemporalPrecision,
    /// Width of the hash lookup table's hashes.
    pub hash_width: HashWidth,
    /// `Variable` values up to this many bytes are stored inline.
    ///
    /// Default: 32. Must be < 510.
    pub direct_threshold: usize,
}

impl Default for ShardSchema {
    fn default() -> Self {
        Self {
            key_type: ValueType::Variable,
            value_type: ValueType::Variable,
            temporal_precision: TemporalPrecision::Millisecond,
            hash_width: HashWidth::Long,
            direct_threshold: DEFAULT_DIRECT_MAX,
        }
    }
}

impl fmt::Display for ShardSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} @ {:?} (hash {:?}, direct <= {})",
            self.key_type,
            self.value_type,
            self.temporal_precision,
            self.hash_width,
            self.direct_threshold
        )
    }
}

impl ShardSchema {
    /// Checks the parameters that are not closed enums.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.direct_threshold >= MAX_KEY_LENGTH - 1 {
            return Err(StoreError::InvalidConfig(format!(
                "direct_threshold must be < {}",
                MAX_KEY_LENGTH - 1
            )));
        }
        Ok(())
    }

    /// Serialises a validated schema.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let threshold = (self.direct_threshold as u16).to_be_bytes();
        let body = [
            SCHEMA_VERSION,
            self.key_type.tag(),
            self.value_type.tag(),
            self.temporal_precision.tag(),
            self.hash_width.tag(),
            threshold[0],
            threshold[1],
        ];
        let crc = crc32fast::hash(&body);
        let mut out = [0u8; RECORD_LEN];
        out[..BODY_LEN].copy_from_slice(&body);
        out[BODY_LEN..].copy_from_slice(&crc.to_le_bytes());
        out
    }

    pub fn decode(raw: &[u8]) -> Result<Self, StoreError> {
        if raw.len() != RECORD_LEN {
            return Err(StoreError::Corruption(format!(
                "schema record is {} bytes, expected {RECORD_LEN}",
                raw.len()
            )));
        }
        let (body, crc) = raw.split_at(BODY_LEN);
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        if crc32fast::hash(body) != stored {
            return Err(StoreError::Corruption("schema record checksum mismatch".into()));
        }
        if body[0] != SCHEMA_VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported schema version {}",
                body[0]
            )));
        }
        let schema = Self {
            key_type: ValueType::from_tag(body[1])?,
            value_type: ValueType::from_tag(body[2])?,
            temporal_precision: TemporalPrecision::from_tag(body[3])?,
            hash_width: HashWidth::from_tag(body[4])?,
            direct_threshold: usize::from(u16::from_be_bytes([body[5], body[6]])),
        };
        schema
            .validate()
            .map_err(|e| StoreError::Corruption(format!("stored schema: {e}")))?;
        Ok(schema)
    }

    /// Persists `self` in a fresh store, or checks it against the schema of
    /// an existing one.
    ///
    /// Returns `true` if the schema was written by this call.
    pub(crate) fn ensure(&self, env: &StoreEnvironment) -> Result<bool, StoreError> {
        let info = env.info_db();
        env.write(|w| {
            let stored = info
                .get(w.txn(), SCHEMA_KEY)?
                .map(ShardSchema::decode)
                .transpose()?;
            match stored {
                Some(stored) if stored == *self => Ok(false),
                Some(stored) => Err(StoreError::SchemaMismatch {
                    stored: stored.to_string(),
                    requested: self.to_string(),
                }),
                None => {
                    info.put(w.txn_mut(), SCHEMA_KEY, &self.encode())?;
                    Ok(true)
                }
            }
        })
    }
}
