//! The normalized record of a single economic event at a broker.

use crate::domain::{Account, Action, Decimal, Symbol, TxId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Quantity comparison tolerance. Broker exports round fill fractions; any
/// residual inside this band counts as fully closed, and slice requests below
/// it are dropped instead of minting degenerate fragments.
pub fn qty_epsilon() -> Decimal {
    Decimal::from_str_canonical("0.000001").expect("epsilon literal")
}

/// Outcome of the amount-reconciliation check at normalization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Validity {
    /// Arithmetic checks out; eligible for matching.
    Valid,
    /// Stated amount disagrees with quantity x price - fee.
    Invalid,
    /// Explicitly filtered broker record (unsettled, duplicate, unparseable).
    Ignored,
}

/// A single normalized transaction.
///
/// Immutable once stored, except that the assembly engine tracks merge/slice
/// lineage for it in a side table (see [`crate::domain::lineage`]) rather
/// than mutating shared records in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub account: Account,
    /// Full event timestamp; bucketing uses the calendar day, match ordering
    /// uses the whole value.
    pub date: NaiveDateTime,
    /// None for pure cash events (transfer, interest, dividend, journal).
    pub symbol: Option<Symbol>,
    pub action: Action,
    /// Always absolute; direction comes from `action`.
    pub quantity: Decimal,
    /// Per-share (stock) or per-contract (option) fill price.
    pub price: Decimal,
    pub fee: Decimal,
    /// Signed net cash effect.
    pub amount: Decimal,
    pub validity: Validity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Transaction {
    /// Build a transaction and run the reconciliation check.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: Account,
        date: NaiveDateTime,
        symbol: Option<Symbol>,
        action: Action,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        amount: Decimal,
        description: Option<String>,
    ) -> Self {
        let mut tx = Transaction {
            id: TxId::generate(),
            account,
            date,
            symbol,
            action,
            quantity,
            price,
            fee,
            amount,
            validity: Validity::Valid,
            description,
        };
        tx.validity = if tx.verify() {
            Validity::Valid
        } else {
            Validity::Invalid
        };
        tx
    }

    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    pub fn is_option(&self) -> bool {
        self.symbol.as_ref().is_some_and(Symbol::is_option)
    }

    /// Shares represented by this transaction's quantity.
    pub fn share_quantity(&self) -> Decimal {
        match &self.symbol {
            Some(symbol) => self.quantity * symbol.share_multiplier(),
            None => self.quantity,
        }
    }

    /// Check `quantity x shares x price x cash_sign - fee ~= amount`.
    ///
    /// Actions whose cash effect is not fill-price-computed (expiry,
    /// assignment, exercise, cash events, splits) pass unconditionally.
    /// The tolerance scales with the trade notional to absorb broker
    /// rounding.
    fn verify(&self) -> bool {
        if self.action == Action::Invalid {
            return false;
        }
        if self.action.skips_verification() {
            return true;
        }
        if self.symbol.is_none() {
            return false;
        }
        let sign = Decimal::from_i64(self.action.cash_sign() as i64);
        let computed = self.share_quantity() * self.price * sign - self.fee;
        let tolerance = qty_epsilon() * (Decimal::one() + (self.share_quantity() * self.price).abs());
        (computed - self.amount).abs() <= tolerance
    }

    /// Stable dedupe key over the identity fields, for idempotent ingest.
    pub fn natural_key(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.account.as_str());
        hasher.update(self.date.format("%Y-%m-%dT%H:%M:%S").to_string());
        hasher.update(self.action.as_str());
        if let Some(symbol) = &self.symbol {
            hasher.update(symbol.to_compact_string());
        }
        hasher.update(self.quantity.to_canonical_string());
        hasher.update(self.price.to_canonical_string());
        hasher.update(self.fee.to_canonical_string());
        hasher.update(self.amount.to_canonical_string());
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }

    /// Whether `other` is a same-instant fragment of the same order:
    /// identical account, symbol, action, and timestamp.
    pub fn mergeable_with(&self, other: &Transaction) -> bool {
        self.account == other.account
            && self.symbol == other.symbol
            && self.action == other.action
            && self.date == other.date
    }

    /// Merge a same-instant fragment into this transaction, producing the
    /// combined value under `result_id`. Quantity, fee, and amount add;
    /// price is recomputed so the reconciliation identity still holds.
    ///
    /// Returns None when the two are not fragments of one order.
    pub fn merge(&self, other: &Transaction, result_id: TxId) -> Option<Transaction> {
        if !self.mergeable_with(other) {
            return None;
        }
        let mut merged = self.clone();
        merged.id = result_id;
        merged.quantity = self.quantity + other.quantity;
        merged.fee = self.fee + other.fee;
        merged.amount = self.amount + other.amount;
        merged.price = recomputed_price(&merged);
        Some(merged)
    }

    /// Slice off `qty` into a new fragment under `piece_id`, prorating fee
    /// and amount by `qty / quantity` and leaving the exact difference here,
    /// so the two pieces conserve quantity, fee, and amount with no rounding
    /// leakage.
    ///
    /// Returns None when `qty` is below tolerance or not strictly less than
    /// the current quantity.
    pub fn slice(&mut self, qty: Decimal, piece_id: TxId) -> Option<Transaction> {
        if qty < qty_epsilon() || qty + qty_epsilon() > self.quantity {
            return None;
        }
        let piece_fee = self.fee * qty / self.quantity;
        let piece_amount = self.amount * qty / self.quantity;
        let mut piece = self.clone();
        piece.id = piece_id;
        piece.quantity = qty;
        piece.fee = piece_fee;
        piece.amount = piece_amount;

        self.quantity -= qty;
        self.fee -= piece_fee;
        self.amount -= piece_amount;
        Some(piece)
    }

    /// Whether `close` can extinguish (part of) this opening transaction:
    /// open/close action compatibility, symbol match (wildcard-tolerant),
    /// and the close not predating the open.
    pub fn closed_by(&self, close: &Transaction) -> bool {
        if !self.action.is_open() || !close.action.is_close() {
            return false;
        }
        if close.date < self.date {
            return false;
        }
        match (&self.symbol, &close.symbol) {
            (Some(a), Some(b)) => a.matches(b),
            _ => false,
        }
    }

    /// Calendar day used for bucketing.
    pub fn day(&self) -> chrono::NaiveDate {
        self.date.date()
    }

    /// Whether two transactions land in the same assembly bucket:
    /// same account, same calendar day, same underlying.
    pub fn same_bucket(&self, other: &Transaction) -> bool {
        self.account == other.account
            && self.day() == other.day()
            && match (&self.symbol, &other.symbol) {
                (Some(a), Some(b)) => a.ticker == b.ticker,
                _ => false,
            }
    }
}

/// Price consistent with the verify identity: `(amount + fee) / (shares x
/// sign)`. Zero for non-priced actions.
fn recomputed_price(tx: &Transaction) -> Decimal {
    let sign = tx.action.cash_sign();
    let shares = tx.share_quantity();
    if sign == 0 || shares.is_zero() {
        return Decimal::zero();
    }
    (tx.amount + tx.fee) / (shares * Decimal::from_i64(sign as i64))
}
