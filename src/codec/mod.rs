//! # Record codecs
//!
//! A [`ValueCodec`] turns one `(value, instant)` pair into the bytes of a
//! record key or record value, and back. Its layout is always
//!
//! ```text
//! [payload][time]
//! ```
//!
//! where `time` has the fixed width of the codec's [`TimeCodec`] and the
//! payload depends on the declared [`ValueType`]:
//!
//! | Type                 | Payload                                       |
//! |----------------------|-----------------------------------------------|
//! | fixed-width numerics | big-endian bytes ([`crate::encoding`])        |
//! | `String`             | UTF-8 bytes                                   |
//! | `UidLookup`          | compact id of the value in the UID table      |
//! | `HashLookup`         | key of the value in the hash table            |
//! | `Variable`           | tag + payload, see [`variable`]               |
//!
//! ## Write paths
//!
//! [`ValueCodec::write`] interns through the write transaction and never
//! fails for want of a lookup entry. [`ValueCodec::write_for_read`] only
//! consults existing entries: it is used to build keys for point reads, and
//! reports `false` when a required entry does not exist (so the record
//! cannot exist either).

pub mod variable;


pub use variable::{Thresholds, VariableEncoding};

use chrono::{DateTime, Utc};
use heed::RoTxn;

use crate::StoreError;
use crate::encoding::{EncodingError, Value, ValueType, read_fixed, read_text, text_bytes, write_fixed};
use crate::env::Writer;
use crate::lookup::{HashLookupDb, LookupRef, Lookups, UidLookupDb, uid};
use crate::time::TimeCodec;

// ------------------------------------------------------------------------------------------------
// Interning mode
// ------------------------------------------------------------------------------------------------

/// Whether encoding may create lookup entries.
pub(crate) enum Interner<'a, 'e> {
    /// Create missing entries through the write transaction.
    Create(&'a mut Writer<'e>),
    /// Only use entries that already exist.
    Find(&'a RoTxn<'e>),
}

impl Interner<'_, '_> {
    pub(crate) fn uid(&mut self, table: &UidLookupDb, value: &[u8]) -> Result<Option<u32>, StoreError> {
        match self {
            Interner::Create(writer) => table.get_or_create(writer.txn_mut(), value).map(Some),
            Interner::Find(txn) => table.find(txn, value),
        }
    }

    pub(crate) fn hash(
        &mut self,
        table: &HashLookupDb,
        value: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Interner::Create(writer) => table.get_or_create(writer, value).map(Some),
            Interner::Find(txn) => table.find(txn, value),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Value codec
// ------------------------------------------------------------------------------------------------

/// Codec for the keys or the values of one store.
#[derive(Clone, Copy)]
pub struct ValueCodec {
    value_type: ValueType,
    time: TimeCodec,
    lookups: Lookups,
    thresholds: Thresholds,
}

impl std::fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCodec")
            .field("value_type", &self.value_type)
            .field("time", &self.time)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl ValueCodec {
    pub fn new(value_type: ValueType, time: TimeCodec, lookups: Lookups, thresholds: Thresholds) -> Self {
        Self {
            value_type,
            time,
            lookups,
            thresholds,
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn time_codec(&self) -> TimeCodec {
        self.time
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Appends the encoding of `(value, time)` to `out`, interning through
    /// `writer` as needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Encoding`] if the value does not fit the declared
    ///   type or the instant does not fit the time encoding.
    /// - [`StoreError::ClashResolution`] if hash interning runs out of slots.
    pub fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Value,
        time: DateTime<Utc>,
        out: &mut Vec<u8>,
    ) -> Result<(), StoreError> {
        self.encode(&mut Interner::Create(writer), value, time, out)?;
        Ok(())
    }

    /// Like [`ValueCodec::write`] but never creates lookup entries.
    ///
    /// Returns `false`, with `out` in an unspecified state, if the value
    /// needs a lookup entry that does not exist.
    pub fn write_for_read(
        &self,
        txn: &RoTxn<'_>,
        value: &Value,
        time: DateTime<Utc>,
        out: &mut Vec<u8>,
    ) -> Result<bool, StoreError> {
        self.encode(&mut Interner::Find(txn), value, time, out)
    }

    /// Decodes a record written by this codec, resolving lookups through
    /// `txn`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Encoding`] if `bytes` are malformed.
    /// - [`StoreError::LookupNotFound`] if a referenced lookup entry is gone.
    pub fn read(&self, txn: &RoTxn<'_>, bytes: &[u8]) -> Result<(Value, DateTime<Utc>), StoreError> {
        let (payload, time) = self.split(bytes)?;
        let value = match self.value_type {
            ValueType::String => read_text(payload)?,
            ValueType::UidLookup => {
                let id = uid::read_compact(payload)?;
                read_text(self.lookups.uid.get_value(txn, id)?)?
            }
            ValueType::HashLookup => read_text(self.lookups.hash.get_value(txn, payload)?)?,
            ValueType::Variable => variable::decode(&self.lookups, txn, payload)?,
            fixed => {
                let (value, used) = read_fixed(fixed, payload)?;
                if used != payload.len() {
                    return Err(EncodingError::InvalidLength {
                        what: "fixed-width payload",
                        len: payload.len(),
                    }
                    .into());
                }
                value
            }
        };
        Ok((value, self.time.decode(time)))
    }

    /// Decodes only the instant of a record; never touches lookup tables.
    pub fn read_time(&self, bytes: &[u8]) -> Result<DateTime<Utc>, EncodingError> {
        let (_, time) = self.split(bytes)?;
        Ok(self.time.decode(time))
    }

    /// Whether the record references a lookup entry.
    pub fn uses_lookup(&self, bytes: &[u8]) -> bool {
        match self.value_type {
            ValueType::UidLookup | ValueType::HashLookup => true,
            ValueType::Variable => self
                .split(bytes)
                .is_ok_and(|(payload, _)| variable::uses_lookup(payload)),
            _ => false,
        }
    }

    /// The lookup entry a record references, if any.
    pub fn lookup_ref(&self, bytes: &[u8]) -> Result<Option<LookupRef>, EncodingError> {
        let (payload, _) = self.split(bytes)?;
        Ok(match self.value_type {
            ValueType::UidLookup => Some(LookupRef::Uid(uid::read_compact(payload)?)),
            ValueType::HashLookup => Some(LookupRef::Hash(payload.to_vec())),
            ValueType::Variable => variable::lookup_ref(payload)?,
            _ => None,
        })
    }

    fn encode(
        &self,
        interner: &mut Interner<'_, '_>,
        value: &Value,
        time: DateTime<Utc>,
        out: &mut Vec<u8>,
    ) -> Result<bool, StoreError> {
        match self.value_type {
            ValueType::String => out.extend_from_slice(text_bytes(self.value_type, value)?),
            ValueType::UidLookup => {
                let text = text_bytes(self.value_type, value)?;
                let Some(id) = interner.uid(&self.lookups.uid, text)? else {
                    return Ok(false);
                };
                uid::write_compact(id, out);
            }
            ValueType::HashLookup => {
                let text = text_bytes(self.value_type, value)?;
                let Some(key) = interner.hash(&self.lookups.hash, text)? else {
                    return Ok(false);
                };
                out.extend_from_slice(&key);
            }
            ValueType::Variable => {
                let text = text_bytes(self.value_type, value)?;
                if !variable::encode(&self.thresholds, &self.lookups, interner, text, out)? {
                    return Ok(false);
                }
            }
            fixed => write_fixed(fixed, value, out)?,
        }
        self.time.encode(time, out)?;
        Ok(true)
    }

    fn split<'b>(&self, bytes: &'b [u8]) -> Result<(&'b [u8], &'b [u8]), EncodingError> {
        let size = self.time.size();
        if bytes.len() < size {
            return Err(EncodingError::UnexpectedEof {
                needed: size,
                available: bytes.len(),
            });
        }
        Ok(bytes.split_at(bytes.len() - size))
    }
}
