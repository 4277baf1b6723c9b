//! The matching/assembly engine.
//!
//! Pairs opening transactions with the closing transactions that extinguish
//! them. Groups seeded from the leading buckets are scanned most recent
//! first, so closing activity lands on the most recently opened position
//! when several could absorb it. Oversized closes are sliced across chains
//! and groups; the unconsumed remainder goes back to the front of the work
//! queue until everything is matched or provably unmatchable.

use crate::domain::{qty_epsilon, Decimal, LineageTable, Ticker, Transaction, TxId};
use crate::engine::group::{Chain, TransactionGroup};
use crate::engine::merge::{combine, merge_adjacent};
use crate::engine::AssemblyError;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, error};

/// Everything the engine produced: the assembled groups, the synthetic
/// transactions it minted (merge results and slice fragments, with the
/// retired parents' full snapshots), and the final lineage for every
/// transaction it touched.
#[derive(Debug)]
pub struct Assembly {
    pub groups: Vec<TransactionGroup>,
    pub minted: Vec<Transaction>,
    pub lineage: LineageTable,
}

/// Assemble trade groups from two pre-sorted sequences: `leading`
/// (opening activity known to predate any close) and `following`
/// (closing activity plus any same-day opens that ride along with it).
///
/// `lineage` carries stored merge/slice ancestry for the input rows; the
/// returned table extends it with everything minted here.
///
/// # Errors
/// [`AssemblyError::UnmatchedClose`] when a close-containing bucket matches
/// no group — every close must be attributable to a prior open of the same
/// underlying in the same account.
pub fn assemble(
    leading: Vec<Transaction>,
    following: Vec<Transaction>,
    mut lineage: LineageTable,
) -> Result<Assembly, AssemblyError> {
    let mut minted: BTreeMap<TxId, Transaction> = BTreeMap::new();

    let merged_leading = merge_adjacent(leading, &mut lineage, &mut minted);
    let mut groups: Vec<TransactionGroup> = combine(merged_leading)
        .into_iter()
        .map(seed_group)
        .collect();
    // LIFO preference: closes target the most recently opened group first
    groups.reverse();

    let merged_following = merge_adjacent(following, &mut lineage, &mut minted);
    let mut queue: VecDeque<Vec<Transaction>> = combine(merged_following).into();

    while let Some(bucket) = queue.pop_front() {
        let (mut close_list, open_list): (Vec<Transaction>, Vec<Transaction>) = bucket
            .into_iter()
            .partition(|tx| tx.action.is_close() && tx.quantity > qty_epsilon());
        let open_list: Vec<Transaction> = open_list
            .into_iter()
            .filter(|tx| tx.action.is_open())
            .collect();
        if close_list.is_empty() {
            // pure-open bucket: stays ungrouped for a later pass
            continue;
        }

        let day = close_list[0].day();
        let ticker = bucket_ticker(&close_list);
        let mut matched = false;
        for group in groups.iter_mut() {
            if follow_group(group, &mut close_list, &mut lineage, &mut minted)? {
                for tx in open_list {
                    // same-day roll: new opens continue the matched group
                    group.chains.push(Chain::new(tx));
                }
                close_list.retain(|tx| tx.quantity > qty_epsilon());
                if !close_list.is_empty() {
                    queue.push_front(close_list);
                }
                matched = true;
                break;
            }
        }
        if !matched {
            error!(ticker = %ticker, %day, "closing activity matches no group");
            return Err(AssemblyError::UnmatchedClose { ticker, day });
        }
    }

    Ok(Assembly {
        groups,
        minted: minted.into_values().collect(),
        lineage,
    })
}

fn seed_group(bucket: Vec<Transaction>) -> TransactionGroup {
    let account = bucket[0].account.clone();
    let underlying = bucket_ticker(&bucket);
    TransactionGroup::seed(account, underlying, bucket)
}

fn bucket_ticker(bucket: &[Transaction]) -> Ticker {
    bucket
        .iter()
        .find_map(|tx| tx.symbol.as_ref().map(|s| s.ticker.clone()))
        .unwrap_or_else(|| Ticker::new(""))
}

/// Try to absorb closes from `close_list` into `group`'s chains with
/// unmatched residual. Fully consumed closes move into the chain whole;
/// oversized ones are sliced and leave their remainder in `close_list` for
/// the caller to requeue. Returns whether anything matched.
fn follow_group(
    group: &mut TransactionGroup,
    close_list: &mut [Transaction],
    lineage: &mut LineageTable,
    minted: &mut BTreeMap<TxId, Transaction>,
) -> Result<bool, AssemblyError> {
    let mut matched = false;
    for chain in group.chains.iter_mut() {
        let mut opened = chain.residual();
        if opened < -qty_epsilon() {
            return Err(AssemblyError::ResidualOverdrawn {
                ticker: group.underlying.clone(),
                open_id: chain.opening.id,
            });
        }
        if opened <= qty_epsilon() {
            continue;
        }

        for close in close_list.iter_mut() {
            if close.quantity <= qty_epsilon() || !chain.opening.closed_by(close) {
                continue;
            }
            let take = opened.min(close.quantity);
            if close.quantity - take <= qty_epsilon() {
                consume_whole(chain, close, lineage, minted);
            } else {
                slice_into_chain(chain, close, take, lineage, minted);
            }
            matched = true;
            opened -= take;
            debug!(
                open = %chain.opening.id,
                taken = %take,
                remaining_open = %opened,
                "matched closing activity"
            );
            if opened <= qty_epsilon() {
                break;
            }
        }
    }
    Ok(matched)
}

/// Move the whole closing transaction into the chain and zero it out of the
/// work list. Fragments coming to rest here get their final value recorded.
fn consume_whole(
    chain: &mut Chain,
    close: &mut Transaction,
    lineage: &LineageTable,
    minted: &mut BTreeMap<TxId, Transaction>,
) {
    chain.closings.push(close.clone());
    if lineage.is_virtual(close.id) {
        minted.insert(close.id, close.clone());
    }
    close.quantity = Decimal::zero();
}

/// Slice `take` off an oversized close into the chain. The first slice of a
/// row retires it (slice_parent = itself) and rebrands the in-flight
/// remainder as a fresh fragment, so every fragment of one original traces
/// back to a single root.
fn slice_into_chain(
    chain: &mut Chain,
    close: &mut Transaction,
    take: Decimal,
    lineage: &mut LineageTable,
    minted: &mut BTreeMap<TxId, Transaction>,
) {
    let root = lineage.slice_root(close.id);
    let first_slice = !lineage.is_sliced(close.id);
    let inherited_merge_parent = lineage.get(root).merge_parent;

    let piece_id = TxId::generate();
    let piece = close
        .slice(take, piece_id)
        .expect("take is strictly inside the close quantity");
    lineage.set_slice_parent(piece_id, root);
    if inherited_merge_parent.is_some() {
        lineage.set_merge_parent(piece_id, root);
    }
    minted.insert(piece_id, piece.clone());
    chain.closings.push(piece);

    if first_slice {
        // retire the root and give the remainder its own identity
        lineage.set_slice_parent(root, root);
        let remainder_id = TxId::generate();
        close.id = remainder_id;
        lineage.set_slice_parent(remainder_id, root);
        if inherited_merge_parent.is_some() {
            lineage.set_merge_parent(remainder_id, root);
        }
    }
}
