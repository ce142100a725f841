//! Hash lookup table.
//!
//! Entries are keyed by the xxh3 hash of the value, truncated to the
//! table's [`HashWidth`]. All values sharing a hash form a *bucket*:
//!
//! - slot 0 is keyed by the bare hash;
//! - slots 1..=255 are keyed by the hash followed by the slot byte.
//!
//! A new value takes the lowest free slot of its bucket. Taking any slot
//! while the bucket already holds another value is a clash; the clash is
//! staged on the [`Writer`] and resolved when the transaction commits.

use std::collections::HashSet;
use std::fmt;

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use tracing::{trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::encoding::EncodingError;
use crate::env::{StoreEnvironment, Writer};
use crate::lookup::clash::StagedClash;
use crate::{StoreError, hex};

/// Number of slots in one bucket (the bare hash plus 255 suffixed keys).
pub const BUCKET_SLOTS: usize = 256;

/// Width of the hashes a table is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashWidth {
    /// 4-byte hashes: both halves of the 64-bit hash folded together.
    Integer,
    /// 8-byte hashes: the full 64-bit hash.
    Long,
}

impl HashWidth {
    pub const ALL: [HashWidth; 2] = [HashWidth::Integer, HashWidth::Long];

    /// Persisted one-byte tag.
    pub fn tag(self) -> u8 {
        match self {
            HashWidth::Integer => 0,
            HashWidth::Long => 1,
        }
    }

    /// Inverse of [`HashWidth::tag`].
    pub fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        Self::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(EncodingError::InvalidTag {
                tag,
                type_name: "HashWidth",
            })
    }

    /// Hash length in bytes.
    pub fn len(self) -> usize {
        match self {
            HashWidth::Integer => 4,
            HashWidth::Long => 8,
        }
    }

    /// Big-endian hash of `value` at this width.
    pub fn hash(self, value: &[u8]) -> Vec<u8> {
        let h = xxh3_64(value);
        match self {
            HashWidth::Integer => (((h >> 32) ^ h) as u32).to_be_bytes().to_vec(),
            HashWidth::Long => h.to_be_bytes().to_vec(),
        }
    }
}

/// Handle to one hash lookup table.
#[derive(Clone, Copy)]
pub struct HashLookupDb {
    name: &'static str,
    values: Database<Bytes, Bytes>,
    width: HashWidth,
}

impl fmt::Debug for HashLookupDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashLookupDb")
            .field("name", &self.name)
            .field("width", &self.width)
            .finish()
    }
}

impl HashLookupDb {
    /// Opens (or creates) the table's database.
    pub fn open(
        env: &StoreEnvironment,
        name: &'static str,
        width: HashWidth,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            name,
            values: env.create_database(name)?,
            width,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn width(&self) -> HashWidth {
        self.width
    }

    /// Whether `key` has the shape of an entry key of this table.
    pub fn is_valid_key(&self, key: &[u8]) -> bool {
        let w = self.width.len();
        key.len() == w || (key.len() == w + 1 && key[w] != 0)
    }

    /// Returns the key of `value`, creating an entry if the value is not
    /// interned yet.
    ///
    /// # Errors
    ///
    /// [`StoreError::ClashResolution`] if every slot of the value's bucket is
    /// already taken by a different value.
    pub fn get_or_create(&self, writer: &mut Writer<'_>, value: &[u8]) -> Result<Vec<u8>, StoreError> {
        let hash = self.width.hash(value);
        let mut occupied = [false; BUCKET_SLOTS];
        let mut bucket_len = 0usize;

        for entry in self.values.prefix_iter(writer.txn(), &hash)? {
            let (key, stored) = entry?;
            if stored == value {
                return Ok(key.to_vec());
            }
            occupied[self.slot_of(key)?] = true;
            bucket_len += 1;
        }

        let slot = occupied
            .iter()
            .position(|taken| !taken)
            .ok_or_else(|| StoreError::ClashResolution {
                hash: hex(&hash),
                reason: format!("all {BUCKET_SLOTS} slots of the bucket are taken"),
            })?;
        let key = slot_key(&hash, slot);
        self.values.put(writer.txn_mut(), &key, value)?;

        if bucket_len > 0 {
            warn!(
                table = self.name,
                hash = %hex(&hash),
                slot,
                bucket_len,
                "hash clash; value stored in clash slot"
            );
            writer.stage_clash(StagedClash::new(*self, hash, slot));
        } else {
            trace!(table = self.name, hash = %hex(&hash), "hash lookup entry created");
        }
        Ok(key)
    }

    /// Returns the key of `value` without creating an entry.
    pub fn find(&self, txn: &RoTxn<'_>, value: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let hash = self.width.hash(value);
        for entry in self.values.prefix_iter(txn, &hash)? {
            let (key, stored) = entry?;
            if stored == value {
                return Ok(Some(key.to_vec()));
            }
        }
        Ok(None)
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::LookupNotFound`] if no entry has that key.
    pub fn get_value<'t>(&self, txn: &'t RoTxn<'_>, key: &[u8]) -> Result<&'t [u8], StoreError> {
        self.values
            .get(txn, key)?
            .ok_or_else(|| StoreError::LookupNotFound {
                table: "hash",
                id: hex(key),
            })
    }

    /// Removes the entry under `key`. Returns whether it existed.
    pub fn delete(&self, txn: &mut RwTxn<'_>, key: &[u8]) -> Result<bool, StoreError> {
        let existed = self.values.delete(txn, key)?;
        if existed {
            trace!(table = self.name, key = %hex(key), "hash lookup entry deleted");
        }
        Ok(existed)
    }

    /// All entry keys, in key order.
    pub fn keys(&self, txn: &RoTxn<'_>) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut keys = Vec::new();
        for entry in self.values.iter(txn)? {
            let (key, _) = entry?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Number of entries.
    pub fn len(&self, txn: &RoTxn<'_>) -> Result<u64, StoreError> {
        Ok(self.values.len(txn)?)
    }

    /// Checks that the bucket of `hash` holds pairwise distinct values and
    /// still contains `slot`.
    pub(crate) fn verify_bucket(
        &self,
        txn: &RoTxn<'_>,
        hash: &[u8],
        slot: usize,
    ) -> Result<usize, StoreError> {
        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut slot_present = false;
        for entry in self.values.prefix_iter(txn, hash)? {
            let (key, stored) = entry?;
            slot_present |= self.slot_of(key)? == slot;
            if !seen.insert(stored) {
                return Err(StoreError::ClashResolution {
                    hash: hex(hash),
                    reason: "bucket holds the same value in two slots".into(),
                });
            }
        }
        if !slot_present {
            return Err(StoreError::ClashResolution {
                hash: hex(hash),
                reason: format!("staged slot {slot} is missing from the bucket"),
            });
        }
        Ok(seen.len())
    }

    fn slot_of(&self, key: &[u8]) -> Result<usize, StoreError> {
        if !self.is_valid_key(key) {
            return Err(StoreError::Corruption(format!(
                "malformed {} key {}",
                self.name,
                hex(key)
            )));
        }
        Ok(key.get(self.width.len()).map_or(0, |&s| usize::from(s)))
    }
}

fn slot_key(hash: &[u8], slot: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(hash.len() + 1);
    key.extend_from_slice(hash);
    if slot > 0 {
        key.push(slot as u8);
    }
    key
}
