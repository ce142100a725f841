//! UID lookup table.
//!
//! Two databases back the table:
//!
//! - values: `[u32 id, big-endian]` → value bytes
//! - index:  value bytes → `[u32 id, big-endian]`
//!
//! New values get the lowest id not currently in use. When ids are dense
//! (the common case) that is simply the entry count; after deletions the
//! first gap is found by an ordered scan of the values database.
//!
//! Records embed ids in their minimal big-endian form (1 to 4 bytes), see
//! [`write_compact`].

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use tracing::trace;

use crate::StoreError;
use crate::encoding::EncodingError;
use crate::env::{MAX_KEY_LENGTH, StoreEnvironment};

const ID_LEN: usize = 4;

/// Handle to one UID lookup table.
#[derive(Clone, Copy)]
pub struct UidLookupDb {
    values: Database<Bytes, Bytes>,
    index: Database<Bytes, Bytes>,
}

impl UidLookupDb {
    /// Opens (or creates) the table's two databases.
    pub fn open(env: &StoreEnvironment, values: &str, index: &str) -> Result<Self, StoreError> {
        Ok(Self {
            values: env.create_database(values)?,
            index: env.create_database(index)?,
        })
    }

    /// Largest value length (exclusive) the table accepts.
    pub fn max_value_len(&self) -> usize {
        MAX_KEY_LENGTH
    }

    /// Returns the id of `value`, assigning the lowest free id if the value
    /// is not interned yet.
    ///
    /// # Errors
    ///
    /// [`EncodingError::ValueTooLong`] if `value` is not shorter than
    /// [`UidLookupDb::max_value_len`].
    pub fn get_or_create(&self, txn: &mut RwTxn<'_>, value: &[u8]) -> Result<u32, StoreError> {
        self.check_len(value)?;
        if let Some(uid) = self.find(txn, value)? {
            return Ok(uid);
        }

        let uid = self.next_free_id(txn)?;
        self.values.put(txn, &uid.to_be_bytes(), value)?;
        self.index.put(txn, value, &uid.to_be_bytes())?;
        trace!(uid, len = value.len(), "uid lookup entry created");
        Ok(uid)
    }

    /// Returns the id of `value` without creating an entry.
    pub fn find(&self, txn: &RoTxn<'_>, value: &[u8]) -> Result<Option<u32>, StoreError> {
        if value.len() >= MAX_KEY_LENGTH {
            return Ok(None);
        }
        self.index.get(txn, value)?.map(decode_id).transpose()
    }

    /// Returns the value interned under `uid`.
    ///
    /// # Errors
    ///
    /// [`StoreError::LookupNotFound`] if no entry has that id.
    pub fn get_value<'t>(&self, txn: &'t RoTxn<'_>, uid: u32) -> Result<&'t [u8], StoreError> {
        self.values
            .get(txn, &uid.to_be_bytes())?
            .ok_or_else(|| StoreError::LookupNotFound {
                table: "uid",
                id: uid.to_string(),
            })
    }

    /// Removes the entry with id `uid` and its index entry. Returns whether
    /// an entry existed.
    pub fn delete(&self, txn: &mut RwTxn<'_>, uid: u32) -> Result<bool, StoreError> {
        let key = uid.to_be_bytes();
        let value = match self.values.get(txn, &key)? {
            Some(value) => value.to_vec(),
            None => return Ok(false),
        };
        self.values.delete(txn, &key)?;
        self.index.delete(txn, &value)?;
        trace!(uid, "uid lookup entry deleted");
        Ok(true)
    }

    /// All ids in use, ascending.
    pub fn ids(&self, txn: &RoTxn<'_>) -> Result<Vec<u32>, StoreError> {
        let mut ids = Vec::new();
        for entry in self.values.iter(txn)? {
            let (key, _) = entry?;
            ids.push(decode_id(key)?);
        }
        Ok(ids)
    }

    /// Number of entries.
    pub fn len(&self, txn: &RoTxn<'_>) -> Result<u64, StoreError> {
        Ok(self.values.len(txn)?)
    }

    /// The id the next new value would receive.
    pub fn next_free_id(&self, txn: &RoTxn<'_>) -> Result<u32, StoreError> {
        let len = self.values.len(txn)?;
        let Some((last, _)) = self.values.last(txn)? else {
            return Ok(0);
        };

        let last = decode_id(last)?;
        if u64::from(last) + 1 == len {
            return last.checked_add(1).ok_or_else(exhausted);
        }

        let mut expected: u32 = 0;
        for entry in self.values.iter(txn)? {
            let (key, _) = entry?;
            if decode_id(key)? != expected {
                return Ok(expected);
            }
            expected = expected.checked_add(1).ok_or_else(exhausted)?;
        }
        Ok(expected)
    }

    fn check_len(&self, value: &[u8]) -> Result<(), StoreError> {
        if value.len() >= MAX_KEY_LENGTH {
            return Err(EncodingError::ValueTooLong {
                len: value.len(),
                max: MAX_KEY_LENGTH - 1,
            }
            .into());
        }
        Ok(())
    }
}

fn exhausted() -> StoreError {
    StoreError::Corruption("uid lookup id space exhausted".into())
}

fn decode_id(raw: &[u8]) -> Result<u32, StoreError> {
    let bytes: [u8; ID_LEN] = raw
        .try_into()
        .map_err(|_| StoreError::Corruption(format!("uid lookup id of {} bytes", raw.len())))?;
    Ok(u32::from_be_bytes(bytes))
}

// ------------------------------------------------------------------------------------------------
// Compact id form used inside records
// ------------------------------------------------------------------------------------------------

/// Appends `uid` as big-endian bytes with leading zero bytes removed
/// (at least one byte).
pub fn write_compact(uid: u32, out: &mut Vec<u8>) {
    let bytes = uid.to_be_bytes();
    let skip = (uid.leading_zeros() / 8).min(3) as usize;
    out.extend_from_slice(&bytes[skip..]);
}

/// Decodes an id written by [`write_compact`]; `raw` must be the whole id.
pub fn read_compact(raw: &[u8]) -> Result<u32, EncodingError> {
    if raw.is_empty() || raw.len() > ID_LEN {
        return Err(EncodingError::InvalidLength {
            what: "uid",
            len: raw.len(),
        });
    }
    Ok(raw.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}
