//! Pure computation engines for deterministic trade-group logic.
//!
//! Everything here is synchronous and operates over already-fetched,
//! pre-sorted transaction lists; the async edges (store, quote fetching)
//! live in `db` and `datasource`.

use crate::domain::{Decimal, Ticker, TxId};
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

pub mod assembler;
pub mod group;
pub mod lots;
pub mod merge;

pub use assembler::{assemble, Assembly};
pub use group::{Chain, GroupSummary, TransactionGroup, Valuation};
pub use group::summarize;
pub use lots::{lot_pnl, CoinAction, CoinTrade, LotMethod, LotPnl};
pub use merge::{combine, merge_adjacent};

/// Fatal consistency failures during assembly.
///
/// These indicate a parsing or grouping bug upstream, not a valid trading
/// scenario, so the whole (account, ticker) batch aborts rather than
/// silently dropping activity.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("closing activity on {day} for {ticker} matches no open position")]
    UnmatchedClose { ticker: Ticker, day: NaiveDate },
    #[error("matched quantity exceeds opening {open_id} for {ticker}")]
    ResidualOverdrawn { ticker: Ticker, open_id: TxId },
}

/// Prefetched prices keyed by compact symbol string, injected into the
/// valuation pass so the engine never blocks on quote I/O.
#[derive(Debug, Clone, Default)]
pub struct QuoteBook {
    prices: HashMap<String, Decimal>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, price: Decimal) {
        self.prices.insert(symbol.into(), price);
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
