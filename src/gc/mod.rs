//! # Lookup garbage collection
//!
//! Lookup entries are shared between records and never reference counted,
//! so overwriting or deleting a record can leave entries nothing refers to.
//! A GC pass reclaims them in two phases:
//!
//! 1. **Mark**: every record key and value is fed to
//!    [`UsedLookupsRecorder::record_used`], which collects the set of uids
//!    and hash keys still referenced.
//! 2. **Sweep**: [`UsedLookupsRecorder::delete_unused`] deletes every lookup
//!    entry outside those sets.
//!
//! Both phases run inside the same write transaction. The mark therefore
//! sees exactly the records the sweep commits against: no concurrent writer
//! can add a reference in between, and readers keep their own snapshots, so
//! an entry that is still referenced is never deleted.
//!
//! A pass is idempotent: a second pass over unchanged records deletes
//! nothing.


use std::collections::HashSet;

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use tracing::debug;

use crate::StoreError;
use crate::codec::ValueCodec;
use crate::lookup::{LookupRef, Lookups};

/// Outcome of one GC pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Records examined during the mark phase.
    pub records_scanned: u64,
    /// Distinct uids referenced by records.
    pub uids_in_use: u64,
    /// Distinct hash keys referenced by records.
    pub hashes_in_use: u64,
    /// Unreferenced UID entries deleted.
    pub uids_deleted: u64,
    /// Unreferenced hash entries deleted.
    pub hashes_deleted: u64,
}

impl GcStats {
    /// Total lookup entries deleted.
    pub fn deleted(&self) -> u64 {
        self.uids_deleted + self.hashes_deleted
    }
}

/// Collects the lookup entries referenced by records.
#[derive(Debug, Default)]
pub struct UsedLookupsRecorder {
    uids: HashSet<u32>,
    hashes: HashSet<Vec<u8>>,
    records_scanned: u64,
}

impl UsedLookupsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the lookup entry referenced by `bytes`, encoded by `codec`.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` claim a lookup reference that cannot be parsed; a
    /// pass that cannot read a reference must not sweep.
    pub fn record_used(&mut self, codec: &ValueCodec, bytes: &[u8]) -> Result<(), StoreError> {
        if !codec.uses_lookup(bytes) {
            return Ok(());
        }
        match codec.lookup_ref(bytes)? {
            Some(LookupRef::Uid(uid)) => {
                self.uids.insert(uid);
            }
            Some(LookupRef::Hash(key)) => {
                self.hashes.insert(key);
            }
            None => {}
        }
        Ok(())
    }

    /// Marks the references of every record in `records`.
    pub fn mark(
        &mut self,
        txn: &RoTxn<'_>,
        records: Database<Bytes, Bytes>,
        key_codec: &ValueCodec,
        value_codec: &ValueCodec,
    ) -> Result<(), StoreError> {
        for entry in records.iter(txn)? {
            let (key, value) = entry?;
            self.record_used(key_codec, key)?;
            self.record_used(value_codec, value)?;
            self.records_scanned += 1;
        }
        Ok(())
    }

    pub fn is_uid_used(&self, uid: u32) -> bool {
        self.uids.contains(&uid)
    }

    pub fn is_hash_used(&self, key: &[u8]) -> bool {
        self.hashes.contains(key)
    }

    /// Deletes every entry of `lookups` that was not recorded as used.
    pub fn delete_unused(&self, txn: &mut RwTxn<'_>, lookups: &Lookups) -> Result<GcStats, StoreError> {
        let mut stats = GcStats {
            records_scanned: self.records_scanned,
            uids_in_use: self.uids.len() as u64,
            hashes_in_use: self.hashes.len() as u64,
            ..GcStats::default()
        };

        let unused_uids: Vec<u32> = lookups
            .uid
            .ids(txn)?
            .into_iter()
            .filter(|uid| !self.uids.contains(uid))
            .collect();
        for uid in unused_uids {
            if lookups.uid.delete(txn, uid)? {
                stats.uids_deleted += 1;
            }
        }

        let unused_hashes: Vec<Vec<u8>> = lookups
            .hash
            .keys(txn)?
            .into_iter()
            .filter(|key| !self.hashes.contains(key))
            .collect();
        for key in unused_hashes {
            if lookups.hash.delete(txn, &key)? {
                stats.hashes_deleted += 1;
            }
        }

        debug!(
            records = stats.records_scanned,
            uids_deleted = stats.uids_deleted,
            hashes_deleted = stats.hashes_deleted,
            "unused lookup entries swept"
        );
        Ok(stats)
    }
}
