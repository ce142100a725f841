//! Commit-time hash clash resolution.
//!
//! Interning a value whose hash bucket already holds a different value
//! places it in a free slot straight away, so the record being written can
//! reference its final key. The clash itself is staged on the
//! [`crate::env::Writer`] and resolved once, just before the transaction
//! commits:
//!
//! 1. every touched bucket is re-read and must hold pairwise distinct values,
//!    including the staged slot;
//! 2. the persisted clash counter is advanced by the number of clashes.
//!
//! If either step fails the transaction is aborted and
//! [`StoreError::ClashResolution`] is returned; neither the clash nor the
//! records written alongside it become visible.

use std::collections::HashSet;

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use tracing::info;

use crate::StoreError;
use crate::env::{read_counter, write_counter};
use crate::lookup::hash::HashLookupDb;

/// Info-database key of the persisted clash counter.
pub const HASH_CLASH_COUNT_KEY: &[u8] = b"hash_clash_count";

/// A clash detected while interning, awaiting resolution.
pub struct StagedClash {
    table: HashLookupDb,
    hash: Vec<u8>,
    slot: usize,
}

impl StagedClash {
    pub fn new(table: HashLookupDb, hash: Vec<u8>, slot: usize) -> Self {
        Self { table, hash, slot }
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Clashes staged by one write transaction.
#[derive(Default)]
pub struct ClashLedger {
    staged: Vec<StagedClash>,
}

impl ClashLedger {
    pub fn stage(&mut self, clash: StagedClash) {
        self.staged.push(clash);
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Verifies every staged clash and records them in the clash counter.
    /// Returns the number of clashes resolved.
    pub fn resolve(
        &mut self,
        txn: &mut RwTxn<'_>,
        info_db: Database<Bytes, Bytes>,
    ) -> Result<u64, StoreError> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        let staged = std::mem::take(&mut self.staged);

        let mut verified: HashSet<(&'static str, &[u8], usize)> = HashSet::new();
        let mut largest_bucket = 0;
        for clash in &staged {
            if verified.insert((clash.table.name(), clash.hash.as_slice(), clash.slot)) {
                let bucket = clash.table.verify_bucket(txn, &clash.hash, clash.slot)?;
                largest_bucket = largest_bucket.max(bucket);
            }
        }

        let resolved = staged.len() as u64;
        let total = read_counter(txn, info_db, HASH_CLASH_COUNT_KEY)? + resolved;
        write_counter(txn, info_db, HASH_CLASH_COUNT_KEY, total)?;
        info!(resolved, total, largest_bucket, "hash clashes resolved");
        Ok(resolved)
    }
}

/// Number of hash clashes resolved over the lifetime of the store.
pub fn clash_count(txn: &RoTxn<'_>, info_db: Database<Bytes, Bytes>) -> Result<u64, StoreError> {
    read_counter(txn, info_db, HASH_CLASH_COUNT_KEY)
}
