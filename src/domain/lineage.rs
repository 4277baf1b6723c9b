//! Merge/slice lineage, kept in a side table instead of on the transaction.
//!
//! The assembly engine replaces rows rather than editing them: merging mints
//! a synthetic result and retires the fragments, slicing mints fragments and
//! retires the parent. This table records who replaced whom, and the
//! effectiveness predicates decide which rows may participate in matching.

use crate::domain::TxId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Lineage bookkeeping for one transaction.
///
/// `merge_parent`: id of the synthetic this row was folded into; the
/// synthetic itself carries its own id here. `slice_parent`: id of the root
/// this row was sliced from; a parent retired by slicing carries its own id.
/// `grouped`: set once the row has been placed into a persisted group, with
/// the group's completed flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub merge_parent: Option<TxId>,
    pub slice_parent: Option<TxId>,
    pub grouped: Option<bool>,
}

/// Arena of lineage records keyed by transaction id.
///
/// Rows without an entry have default (never merged or sliced) lineage.
/// Mutations are tracked so persistence can write back only what changed.
#[derive(Debug, Default, Clone)]
pub struct LineageTable {
    records: HashMap<TxId, Lineage>,
    dirty: BTreeSet<TxId>,
}

impl LineageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record from storage without marking it dirty.
    pub fn seed(&mut self, id: TxId, lineage: Lineage) {
        self.records.insert(id, lineage);
    }

    pub fn get(&self, id: TxId) -> Lineage {
        self.records.get(&id).cloned().unwrap_or_default()
    }

    pub fn set_merge_parent(&mut self, id: TxId, parent: TxId) {
        self.records.entry(id).or_default().merge_parent = Some(parent);
        self.dirty.insert(id);
    }

    pub fn set_slice_parent(&mut self, id: TxId, parent: TxId) {
        self.records.entry(id).or_default().slice_parent = Some(parent);
        self.dirty.insert(id);
    }

    pub fn set_grouped(&mut self, id: TxId, completed: bool) {
        self.records.entry(id).or_default().grouped = Some(completed);
        self.dirty.insert(id);
    }

    /// Ids whose lineage changed since this table was seeded.
    pub fn dirty_ids(&self) -> impl Iterator<Item = TxId> + '_ {
        self.dirty.iter().copied()
    }

    /// Folded into a synthetic merge result (and not that result itself).
    pub fn is_merged(&self, id: TxId) -> bool {
        let lineage = self.get(id);
        match lineage.merge_parent {
            None => false,
            Some(parent) => parent != id && Some(parent) != lineage.slice_parent,
        }
    }

    /// A fragment sliced off some root transaction.
    pub fn is_sliced(&self, id: TxId) -> bool {
        matches!(self.get(id).slice_parent, Some(parent) if parent != id)
    }

    /// Minted by the engine: a merge result or a slice fragment.
    pub fn is_virtual(&self, id: TxId) -> bool {
        self.get(id).merge_parent == Some(id) || self.is_sliced(id)
    }

    pub fn is_original(&self, id: TxId) -> bool {
        !self.is_virtual(id)
    }

    /// Eligible for matching: neither a stale pre-merge fragment nor a
    /// parent retired by slicing.
    pub fn is_effective(&self, id: TxId) -> bool {
        !self.is_merged(id) && self.get(id).slice_parent != Some(id)
    }

    /// The id every fragment of this transaction should carry as its
    /// `slice_parent`: the transaction's own root, established by the first
    /// slice and reused thereafter.
    pub fn slice_root(&self, id: TxId) -> TxId {
        match self.get(id).slice_parent {
            Some(parent) if parent != id => parent,
            _ => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untracked_row_is_effective_original() {
        let table = LineageTable::new();
        let id = TxId::generate();
        assert!(table.is_effective(id));
        assert!(table.is_original(id));
        assert!(!table.is_virtual(id));
    }

    #[test]
    fn test_merge_lineage() {
        let mut table = LineageTable::new();
        let result = TxId::generate();
        let left = TxId::generate();
        let right = TxId::generate();

        table.set_merge_parent(result, result);
        table.set_merge_parent(left, result);
        table.set_merge_parent(right, result);

        assert!(table.is_virtual(result));
        assert!(table.is_effective(result));
        assert!(table.is_merged(left));
        assert!(!table.is_effective(left));
        assert!(!table.is_effective(right));
        assert!(table.is_original(left));
    }

    #[test]
    fn test_slice_lineage() {
        let mut table = LineageTable::new();
        let original = TxId::generate();
        let piece = TxId::generate();
        let remainder = TxId::generate();

        // first slice retires the original and points both pieces at it
        table.set_slice_parent(original, original);
        table.set_slice_parent(piece, original);
        table.set_slice_parent(remainder, original);

        assert!(!table.is_effective(original));
        assert!(table.is_original(original));
        assert!(table.is_virtual(piece));
        assert!(table.is_effective(piece));
        assert_eq!(table.slice_root(piece), original);
        assert_eq!(table.slice_root(remainder), original);
    }

    #[test]
    fn test_sliced_merge_result_fragments_stay_effective() {
        let mut table = LineageTable::new();
        let synthetic = TxId::generate();
        let fragment = TxId::generate();

        table.set_merge_parent(synthetic, synthetic);
        table.set_slice_parent(synthetic, synthetic);
        table.set_merge_parent(fragment, synthetic);
        table.set_slice_parent(fragment, synthetic);

        // retired parent: virtual and ineffective
        assert!(table.is_virtual(synthetic));
        assert!(!table.is_effective(synthetic));
        // fragment: merge_parent == slice_parent keeps it unmerged
        assert!(!table.is_merged(fragment));
        assert!(table.is_effective(fragment));
        assert!(table.is_virtual(fragment));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut table = LineageTable::new();
        let seeded = TxId::generate();
        table.seed(
            seeded,
            Lineage {
                merge_parent: None,
                slice_parent: None,
                grouped: Some(false),
            },
        );
        assert_eq!(table.dirty_ids().count(), 0);

        let touched = TxId::generate();
        table.set_grouped(touched, true);
        let dirty: Vec<TxId> = table.dirty_ids().collect();
        assert_eq!(dirty, vec![touched]);
    }
}
