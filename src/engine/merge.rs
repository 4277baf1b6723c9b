//! Merge pass and bucket combining.
//!
//! Brokers report partial fills of one order as consecutive rows with the
//! same account, instrument, action, and timestamp. The merge pass folds
//! such runs into one synthetic transaction; combining then splits the
//! sequence into per-(account, day, underlying) buckets for matching.

use crate::domain::{LineageTable, Transaction, TxId};
use std::collections::BTreeMap;

/// Collapse adjacent same-key fragments into synthetic transactions.
///
/// Only adjacency matters: non-contiguous duplicates separated by a
/// different transaction stay separate, since brokers emit the fragments of
/// one order consecutively. The input must already be sorted by
/// (date, action, expiration, strike, kind).
///
/// The first merge for a retained transaction mints a synthetic id and
/// stamps both constituents; further fragments fold into the same synthetic.
/// Snapshots of every synthetic land in `minted`.
pub fn merge_adjacent(
    transactions: Vec<Transaction>,
    lineage: &mut LineageTable,
    minted: &mut BTreeMap<TxId, Transaction>,
) -> Vec<Transaction> {
    let mut retained: Vec<Transaction> = Vec::with_capacity(transactions.len());
    for tx in transactions {
        let Some(prev) = retained.last() else {
            retained.push(tx);
            continue;
        };
        if !prev.mergeable_with(&tx) {
            retained.push(tx);
            continue;
        }

        let already_synthetic = lineage.get(prev.id).merge_parent == Some(prev.id);
        let result_id = if already_synthetic {
            prev.id
        } else {
            TxId::generate()
        };
        let merged = prev
            .merge(&tx, result_id)
            .expect("mergeable_with checked above");

        lineage.set_merge_parent(result_id, result_id);
        if !already_synthetic {
            lineage.set_merge_parent(prev.id, result_id);
        }
        lineage.set_merge_parent(tx.id, result_id);
        minted.insert(result_id, merged.clone());

        *retained.last_mut().expect("non-empty") = merged;
    }
    retained
}

/// Partition a merged sequence into maximal consecutive runs sharing
/// (account, calendar day, underlying).
///
/// A consecutive-run split suffices because the upstream query already
/// sorted by date.
pub fn combine(transactions: Vec<Transaction>) -> Vec<Vec<Transaction>> {
    let mut buckets: Vec<Vec<Transaction>> = Vec::new();
    for tx in transactions {
        match buckets.last_mut() {
            Some(bucket) if tx.same_bucket(&bucket[0]) => bucket.push(tx),
            _ => buckets.push(vec![tx]),
        }
    }
    buckets
}
