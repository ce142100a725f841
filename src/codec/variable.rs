//! Adaptive encoding for `Variable` values.
//!
//! Each value is stored as a one-byte tag followed by its payload:
//!
//! | Tag | Encoding     | Payload                  | Chosen when                                  |
//! |-----|--------------|--------------------------|----------------------------------------------|
//! | 0   | `Direct`     | UTF-8 bytes              | `len <= direct_max`                          |
//! | 1   | `UidLookup`  | compact uid (1-4 bytes)  | `direct_max < len < max_key_len`             |
//! | 2   | `HashLookup` | hash key (w or w+1 bytes)| `len >= max_key_len`                         |
//!
//! The choice depends only on the value's length, so equal values always
//! produce equal bytes.

use heed::RoTxn;

use crate::StoreError;
use crate::codec::Interner;
use crate::encoding::{EncodingError, Value, read_text};
use crate::env::MAX_KEY_LENGTH;
use crate::lookup::{LookupRef, Lookups, uid};

pub const TAG_DIRECT: u8 = 0;
pub const TAG_UID_LOOKUP: u8 = 1;
pub const TAG_HASH_LOOKUP: u8 = 2;

/// Default inclusive length limit for direct storage.
pub const DEFAULT_DIRECT_MAX: usize = 32;

/// How one `Variable` value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableEncoding {
    Direct,
    UidLookup,
    HashLookup,
}

impl VariableEncoding {
    pub fn tag(self) -> u8 {
        match self {
            VariableEncoding::Direct => TAG_DIRECT,
            VariableEncoding::UidLookup => TAG_UID_LOOKUP,
            VariableEncoding::HashLookup => TAG_HASH_LOOKUP,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            TAG_DIRECT => Ok(VariableEncoding::Direct),
            TAG_UID_LOOKUP => Ok(VariableEncoding::UidLookup),
            TAG_HASH_LOOKUP => Ok(VariableEncoding::HashLookup),
            tag => Err(EncodingError::InvalidTag {
                tag,
                type_name: "VariableEncoding",
            }),
        }
    }
}

/// Length limits that select a [`VariableEncoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Values up to this many bytes are stored inline.
    pub direct_max: usize,
    /// Values at least this long are interned by hash.
    pub max_key_len: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            direct_max: DEFAULT_DIRECT_MAX,
            max_key_len: MAX_KEY_LENGTH,
        }
    }
}

impl Thresholds {
    /// Encoding for a value of `len` bytes.
    pub fn choose(&self, len: usize) -> VariableEncoding {
        if len <= self.direct_max {
            VariableEncoding::Direct
        } else if len < self.max_key_len {
            VariableEncoding::UidLookup
        } else {
            VariableEncoding::HashLookup
        }
    }
}

/// Appends tag and payload. Returns `false` if a lookup was required but
/// the interner is read-only and the value is not interned.
pub(super) fn encode(
    thresholds: &Thresholds,
    lookups: &Lookups,
    interner: &mut Interner<'_, '_>,
    text: &[u8],
    out: &mut Vec<u8>,
) -> Result<bool, StoreError> {
    let encoding = thresholds.choose(text.len());
    match encoding {
        VariableEncoding::Direct => {
            out.push(TAG_DIRECT);
            out.extend_from_slice(text);
        }
        VariableEncoding::UidLookup => {
            let Some(id) = interner.uid(&lookups.uid, text)? else {
                return Ok(false);
            };
            out.push(TAG_UID_LOOKUP);
            uid::write_compact(id, out);
        }
        VariableEncoding::HashLookup => {
            let Some(key) = interner.hash(&lookups.hash, text)? else {
                return Ok(false);
            };
            out.push(TAG_HASH_LOOKUP);
            out.extend_from_slice(&key);
        }
    }
    Ok(true)
}

pub(super) fn decode(lookups: &Lookups, txn: &RoTxn<'_>, payload: &[u8]) -> Result<Value, StoreError> {
    let (&tag, rest) = payload.split_first().ok_or(EncodingError::UnexpectedEof {
        needed: 1,
        available: 0,
    })?;
    let text = match VariableEncoding::from_tag(tag)? {
        VariableEncoding::Direct => rest,
        VariableEncoding::UidLookup => lookups.uid.get_value(txn, uid::read_compact(rest)?)?,
        VariableEncoding::HashLookup => lookups.hash.get_value(txn, rest)?,
    };
    Ok(read_text(text)?)
}

pub(super) fn lookup_ref(payload: &[u8]) -> Result<Option<LookupRef>, EncodingError> {
    let (&tag, rest) = payload.split_first().ok_or(EncodingError::UnexpectedEof {
        needed: 1,
        available: 0,
    })?;
    Ok(match VariableEncoding::from_tag(tag)? {
        VariableEncoding::Direct => None,
        VariableEncoding::UidLookup => Some(LookupRef::Uid(uid::read_compact(rest)?)),
        VariableEncoding::HashLookup => Some(LookupRef::Hash(rest.to_vec())),
    })
}

pub(super) fn uses_lookup(payload: &[u8]) -> bool {
    matches!(payload.first(), Some(&tag) if tag != TAG_DIRECT)
}
