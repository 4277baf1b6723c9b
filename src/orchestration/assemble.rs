//! Assembly orchestration: query, run the engine, value, persist.

use crate::db::Repository;
use crate::domain::{Account, Lineage, LineageTable, Ticker, Transaction, TxId};
use crate::engine::{assemble, AssemblyError, TransactionGroup};
use crate::orchestration::QuoteService;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("consistency check failed: {0}")]
    Consistency(String),
}

/// What one assembly run did.
#[derive(Debug, Default)]
pub struct AssembleOutcome {
    pub groups: Vec<TransactionGroup>,
    /// Synthetic transactions inserted.
    pub created: usize,
    /// Pre-existing rows whose lineage was written back.
    pub updated: usize,
    /// Incomplete groups dropped before re-assembly.
    pub deleted_incomplete: u64,
}

/// Rebuilds trade groups for one (account, underlying) from the effective
/// ungrouped transaction set, and optionally persists the result.
///
/// Callers must not run two assemblies for the same (account, underlying)
/// concurrently; different pairs are independent.
pub struct Assembler {
    repo: Arc<Repository>,
    quotes: Arc<QuoteService>,
}

impl Assembler {
    pub fn new(repo: Arc<Repository>, quotes: Arc<QuoteService>) -> Self {
        Self { repo, quotes }
    }

    /// Assemble groups for `ticker`. With `persist`, incomplete groups are
    /// dropped and the new groups, minted transactions, and lineage updates
    /// are written back.
    pub async fn group_transactions(
        &self,
        account: &Account,
        ticker: &Ticker,
        persist: bool,
        today: NaiveDate,
    ) -> Result<AssembleOutcome, AssembleError> {
        let rows = self.repo.query_effective_ungrouped(account, ticker).await?;
        if rows.is_empty() {
            return Ok(AssembleOutcome::default());
        }
        let input_ids: HashSet<TxId> = rows.iter().map(|(tx, _)| tx.id).collect();

        let mut lineage = LineageTable::new();
        for (tx, stored) in &rows {
            lineage.seed(tx.id, stored.clone());
        }

        let (leading, following) = split_leading_following(rows);
        debug!(
            leading = leading.len(),
            following = following.len(),
            %ticker,
            "assembling"
        );

        let mut assembly = assemble(leading, following, lineage)?;

        // value each group against prefetched quotes
        let mut symbols: BTreeSet<String> = BTreeSet::new();
        for group in &assembly.groups {
            for chain in &group.chains {
                if chain.residual().abs() > crate::domain::qty_epsilon() {
                    if let Some(symbol) = &chain.opening.symbol {
                        symbols.insert(symbol.to_compact_string());
                    }
                }
            }
        }
        let book = self.quotes.quote_book(&symbols, today).await;
        for group in &mut assembly.groups {
            group.run_valuation(&book, today);
        }

        // stamp every chain member with its group's completion state
        for group in &assembly.groups {
            let completed = group.completed();
            for chain in &group.chains {
                assembly.lineage.set_grouped(chain.opening.id, completed);
                for close in &chain.closings {
                    assembly.lineage.set_grouped(close.id, completed);
                }
            }
        }

        check_invariants(&assembly.minted, &assembly.groups, &assembly.lineage)?;

        let mut outcome = AssembleOutcome {
            created: assembly.minted.len(),
            ..Default::default()
        };
        if persist {
            outcome.deleted_incomplete =
                self.repo.delete_incomplete_groups(account, ticker).await?;
            self.repo
                .insert_minted_batch(&assembly.minted, &assembly.lineage)
                .await?;
            let minted_ids: HashSet<TxId> = assembly.minted.iter().map(|tx| tx.id).collect();
            for id in assembly.lineage.dirty_ids().collect::<Vec<_>>() {
                if minted_ids.contains(&id) {
                    continue;
                }
                if !input_ids.contains(&id) {
                    // lineage touched a row we never loaded: engine bug
                    return Err(AssembleError::Consistency(format!(
                        "lineage update for unknown transaction {}",
                        id
                    )));
                }
                self.repo
                    .update_lineage(id, &assembly.lineage.get(id))
                    .await?;
                outcome.updated += 1;
            }
            for group in &assembly.groups {
                self.repo.insert_group(group).await?;
            }
            info!(
                %ticker,
                groups = assembly.groups.len(),
                created = outcome.created,
                updated = outcome.updated,
                "persisted assembly"
            );
        }
        outcome.groups = assembly.groups;
        Ok(outcome)
    }
}

/// Split the effective set into leading opens and the close-day traffic.
///
/// Any calendar day with closing activity becomes a "following" day; opens
/// on such days ride along with the closes so same-day rolls stay in one
/// bucket.
fn split_leading_following(
    rows: Vec<(Transaction, Lineage)>,
) -> (Vec<Transaction>, Vec<Transaction>) {
    let close_days: BTreeSet<NaiveDate> = rows
        .iter()
        .filter(|(tx, _)| tx.action.is_close())
        .map(|(tx, _)| tx.day())
        .collect();

    let mut leading = Vec::new();
    let mut following = Vec::new();
    for (tx, _) in rows {
        if close_days.contains(&tx.day()) {
            if tx.action.is_open() || tx.action.is_close() {
                following.push(tx);
            }
        } else if tx.action.is_open() {
            leading.push(tx);
        }
    }
    (leading, following)
}

/// Save-time invariants: minted rows must be virtual, chain members must be
/// effective.
fn check_invariants(
    minted: &[Transaction],
    groups: &[TransactionGroup],
    lineage: &LineageTable,
) -> Result<(), AssembleError> {
    for tx in minted {
        if !lineage.is_virtual(tx.id) {
            return Err(AssembleError::Consistency(format!(
                "minted transaction {} is not virtual",
                tx.id
            )));
        }
    }
    for group in groups {
        for chain in &group.chains {
            for member in std::iter::once(&chain.opening).chain(chain.closings.iter()) {
                if !lineage.is_effective(member.id) {
                    return Err(AssembleError::Consistency(format!(
                        "grouped transaction {} is not effective",
                        member.id
                    )));
                }
            }
        }
    }
    Ok(())
}
