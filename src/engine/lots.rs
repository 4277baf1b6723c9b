//! Crypto lot matching: FIFO/LIFO/HIFO cost assignment.
//!
//! Independent of the grouping engine: a single-asset queue of buy lots
//! consumed by sells under the chosen priority. Shares the quantity
//! tolerance discipline with the core so fractional lot dust never lingers.

use crate::domain::Decimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const LOT_EPSILON: &str = "0.00000001";

fn lot_epsilon() -> Decimal {
    Decimal::from_str_canonical(LOT_EPSILON).expect("epsilon literal")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoinAction {
    Buy,
    Sell,
    Transfer,
}

/// One crypto ledger entry. Quantity is signed (buys positive, sells
/// negative), amount is the signed cash effect net of fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinTrade {
    pub date: NaiveDateTime,
    pub symbol: String,
    pub action: CoinAction,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub amount: Decimal,
}

impl CoinTrade {
    /// Consume `qty` from this buy lot. Returns true when the lot survives
    /// with quantity left, false when it is (within tolerance) used up and
    /// should be dropped; fee and amount scale down with the remainder.
    fn consume(&mut self, qty: Decimal) -> bool {
        if self.quantity - qty <= lot_epsilon() {
            self.quantity = Decimal::zero();
            self.amount = Decimal::zero();
            return false;
        }
        let ratio = Decimal::one() - qty / self.quantity;
        self.fee = self.fee * ratio;
        self.amount = self.amount * ratio;
        self.quantity -= qty;
        true
    }
}

/// Which buy lot a sell consumes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotMethod {
    /// Oldest lot first.
    Fifo,
    /// Newest lot first.
    Lifo,
    /// Most expensive lot first (minimizes reported gains).
    Hifo,
}

/// Result of running lot matching over one asset's trade history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotPnl {
    /// Realized profit over the matched lots.
    pub realized: Decimal,
    /// Cash spent on the lots that were consumed (negative).
    pub matched_cost: Decimal,
    /// Cash received from sells.
    pub proceeds: Decimal,
    /// Cash spent on the lots still open (negative).
    pub open_cost: Decimal,
    /// Quantity still held.
    pub open_position: Decimal,
}

/// Match sells against buy lots in `method` priority order.
///
/// Trades must be in chronological order and all for one asset. Transfers
/// carry no cost information and are skipped unless `include_transfers`.
pub fn lot_pnl(trades: &[CoinTrade], method: LotMethod, include_transfers: bool) -> LotPnl {
    let mut lots: Vec<CoinTrade> = Vec::new();
    let mut realized = Decimal::zero();
    let mut cost = Decimal::zero();
    let mut proceeds = Decimal::zero();

    for trade in trades {
        if trade.action == CoinAction::Transfer && !include_transfers {
            continue;
        }
        if trade.quantity.is_positive() {
            cost += trade.amount;
            lots.push(trade.clone());
            continue;
        }
        if trade.quantity.is_zero() {
            continue;
        }

        let mut sell_qty = -trade.quantity;
        proceeds += trade.amount;
        realized += trade.amount;
        while sell_qty > lot_epsilon() {
            let Some(index) = next_lot(&lots, method) else {
                // oversold: no lot left to absorb the remainder
                break;
            };
            let lot_amount = lots[index].amount;
            let lot_qty = lots[index].quantity;
            if lots[index].consume(sell_qty) {
                realized += lot_amount - lots[index].amount;
                break;
            }
            realized += lot_amount;
            lots.remove(index);
            sell_qty -= lot_qty;
        }
    }

    let open_cost: Decimal = lots.iter().map(|lot| lot.amount).sum();
    let open_position: Decimal = lots.iter().map(|lot| lot.quantity).sum();
    LotPnl {
        realized,
        matched_cost: cost - open_cost,
        proceeds,
        open_cost,
        open_position,
    }
}

fn next_lot(lots: &[CoinTrade], method: LotMethod) -> Option<usize> {
    if lots.is_empty() {
        return None;
    }
    match method {
        LotMethod::Fifo => Some(0),
        LotMethod::Lifo => Some(lots.len() - 1),
        LotMethod::Hifo => lots
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                // stable pick: first of equal-priced lots wins
                a.price.cmp(&b.price).then(ib.cmp(ia))
            })
            .map(|(i, _)| i),
    }
}
