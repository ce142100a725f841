//! # Lookup tables
//!
//! Interning side tables that replace a large value in a record by a short
//! identifier. Two flavours exist:
//!
//! - [`uid`]: sequential `u32` identifiers with a reverse index from value to
//!   id. Deleted ids are reused, lowest first. Values must be shorter than the
//!   engine's key limit because the reverse index is keyed by the value.
//! - [`hash`]: identifiers derived from the value's hash. Values of any length
//!   are accepted; values whose hashes collide share a bucket and are told
//!   apart by a one-byte slot suffix (see [`clash`]).
//!
//! Both tables are addressed through cheap `Copy` handles to databases inside
//! one [`crate::env::StoreEnvironment`]; every operation takes the caller's
//! transaction, so interning commits or aborts together with the record that
//! references it.
//!
//! Lookup entries are never reference counted. Entries that no record
//! references any more are reclaimed by [`crate::gc`].

pub mod clash;
pub mod hash;
pub mod uid;

#[cfg(test)]
mod tests;

pub use hash::{HashLookupDb, HashWidth};
pub use uid::UidLookupDb;

use crate::StoreError;
use crate::env::StoreEnvironment;

/// Database holding the UID table's id → value entries.
pub const UID_LOOKUP_DB: &str = "uid_lookup";
/// Database holding the UID table's value → id index.
pub const UID_LOOKUP_INDEX_DB: &str = "uid_lookup_index";
/// Database holding the hash table's entries.
pub const HASH_LOOKUP_DB: &str = "hash_lookup";

/// Identifier of one lookup entry, as embedded in a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupRef {
    /// Entry of the UID table.
    Uid(u32),
    /// Full key (hash plus optional slot) of an entry in the hash table.
    Hash(Vec<u8>),
}

/// The pair of lookup tables one store shares between its key and value
/// codecs.
#[derive(Clone, Copy)]
pub struct Lookups {
    pub uid: UidLookupDb,
    pub hash: HashLookupDb,
}

impl Lookups {
    /// Opens (or creates) both tables in `env`.
    pub fn open(env: &StoreEnvironment, width: HashWidth) -> Result<Self, StoreError> {
        Ok(Self {
            uid: UidLookupDb::open(env, UID_LOOKUP_DB, UID_LOOKUP_INDEX_DB)?,
            hash: HashLookupDb::open(env, HASH_LOOKUP_DB, width)?,
        })
    }
}
