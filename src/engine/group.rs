//! Assembled trade groups and the inventory/valuation pass.

use crate::domain::{qty_epsilon, Account, Action, Decimal, OptionKind, Ticker, Transaction};
use crate::engine::QuoteBook;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// One opening transaction and the ordered closing transactions matched to
/// it. Insertion order is match order and is preserved through persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub opening: Transaction,
    pub closings: Vec<Transaction>,
}

impl Chain {
    pub fn new(opening: Transaction) -> Self {
        Chain {
            opening,
            closings: Vec::new(),
        }
    }

    /// Quantity of the opening not yet extinguished by matched closings.
    pub fn residual(&self) -> Decimal {
        let closed: Decimal = self.closings.iter().map(|tx| tx.quantity).sum();
        self.opening.quantity - closed
    }
}

/// Derived figures for a group, computed by the valuation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    /// Sum of all cash flows across the group.
    pub total: Decimal,
    /// Residual open quantity per compact symbol string, signed long/short.
    pub positions: BTreeMap<String, Decimal>,
    /// Strategy cost basis (decision table over the opening legs).
    pub cost: Decimal,
    /// `total` plus the market value of residual positions.
    pub profit: Decimal,
    /// Days from first to last event; today substituted while open.
    pub duration_days: i64,
    /// Annualized return, defined only once the group is fully closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<f64>,
}

/// A reconstructed trade: one or more opening chains for a single
/// (account, underlying), plus everything that closed them.
///
/// Groups are derived and recomputable from the effective transaction set;
/// they are never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionGroup {
    pub account: Account,
    pub underlying: Ticker,
    pub chains: Vec<Chain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation: Option<Valuation>,
}

impl TransactionGroup {
    pub fn seed(account: Account, underlying: Ticker, openings: Vec<Transaction>) -> Self {
        TransactionGroup {
            account,
            underlying,
            chains: openings.into_iter().map(Chain::new).collect(),
            valuation: None,
        }
    }

    /// Fully closed: every chain's opening quantity is extinguished.
    pub fn completed(&self) -> bool {
        self.chains
            .iter()
            .all(|chain| chain.residual() <= qty_epsilon())
    }

    pub fn profit(&self) -> Option<Decimal> {
        self.valuation.as_ref().map(|v| v.profit)
    }

    /// Inventory pass: accumulate cash flow, collect residual positions,
    /// derive cost basis, profit, duration, and (when closed) annualized
    /// ROI. Prices for residual positions come from the injected quote
    /// book; a missing quote degrades to zero value with a warning, never
    /// an error.
    pub fn run_valuation(&mut self, quotes: &QuoteBook, today: NaiveDate) {
        let mut total = Decimal::zero();
        let mut positions: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut first_day: Option<NaiveDate> = None;
        let mut last_day: Option<NaiveDate> = None;

        for chain in &self.chains {
            let mut observe = |day: NaiveDate| {
                first_day = Some(first_day.map_or(day, |d| d.min(day)));
                last_day = Some(last_day.map_or(day, |d| d.max(day)));
            };
            observe(chain.opening.day());
            total += chain.opening.amount;
            for close in &chain.closings {
                observe(close.day());
                total += close.amount;
            }

            let residual = chain.residual();
            if residual.abs() > qty_epsilon() {
                let key = chain
                    .opening
                    .symbol
                    .as_ref()
                    .map(|s| s.to_compact_string())
                    .unwrap_or_else(|| self.underlying.as_str().to_string());
                let signed = if chain.opening.action.opens_long() {
                    residual
                } else {
                    -residual
                };
                let entry = positions.entry(key.clone()).or_insert_with(Decimal::zero);
                *entry += signed;
                if entry.abs() <= qty_epsilon() {
                    positions.remove(&key);
                }
            }
        }

        let cost = self.cost_basis();
        let market_value = market_value(&positions, quotes);
        let profit = total + market_value;

        let first_day = first_day.unwrap_or(today);
        let last_day = if positions.is_empty() {
            last_day.unwrap_or(today)
        } else {
            today
        };
        let duration_days = (last_day - first_day).num_days() + 1;

        let roi = if positions.is_empty() {
            annualized_roi(profit, cost, duration_days, &self.underlying)
        } else {
            None
        };

        self.valuation = Some(Valuation {
            total,
            positions,
            cost,
            profit,
            duration_days,
            roi,
        });
    }

    /// Strategy cost basis from the opening legs.
    ///
    /// Best-effort pattern matching over which (bought/sold, call/put)
    /// strikes appear: single legs, vertical spreads, and short iron
    /// condors are recognized; exotic structures (ratio spreads,
    /// broken-wing condors) are not and fall through the nearest case.
    fn cost_basis(&self) -> Decimal {
        let Some(first) = self.chains.first().map(|c| &c.opening) else {
            return Decimal::zero();
        };

        let mut bought_calls: BTreeSet<Decimal> = BTreeSet::new();
        let mut sold_calls: BTreeSet<Decimal> = BTreeSet::new();
        let mut bought_puts: BTreeSet<Decimal> = BTreeSet::new();
        let mut sold_puts: BTreeSet<Decimal> = BTreeSet::new();
        for chain in &self.chains {
            let open = &chain.opening;
            let Some(contract) = open.symbol.as_ref().and_then(|s| s.contract.as_ref()) else {
                continue;
            };
            let bought = open.action == Action::Bto;
            match (contract.kind, bought) {
                (OptionKind::Put, true) => bought_puts.insert(contract.strike),
                (OptionKind::Put, false) => sold_puts.insert(contract.strike),
                (_, true) => bought_calls.insert(contract.strike),
                (_, false) => sold_calls.insert(contract.strike),
            };
        }

        let multiplier = Decimal::contract_multiplier() * first.quantity;
        let has_calls = !bought_calls.is_empty() || !sold_calls.is_empty();
        let has_puts = !bought_puts.is_empty() || !sold_puts.is_empty();

        if !has_calls && !has_puts {
            // stock only
            return first.amount.abs();
        }

        if !has_puts {
            return match (bought_calls.iter().next(), sold_calls.iter().next()) {
                // long call: cost is the debit paid
                (Some(_), None) => -first.amount,
                // naked short call: covered-call collateral at the lowest strike
                (None, Some(sold)) => *sold * multiplier,
                // vertical call spread: width
                (Some(bought), Some(sold)) => (*bought - *sold) * multiplier,
                (None, None) => unreachable!("has_calls checked"),
            };
        }

        if !has_calls {
            return match (bought_puts.iter().next(), sold_puts.iter().next()) {
                (Some(_), None) => -first.amount,
                // cash-secured short put: strike as collateral
                (None, Some(sold)) => *sold * multiplier,
                // vertical put spread: width
                (Some(bought), Some(sold)) => (*sold - *bought) * multiplier,
                (None, None) => unreachable!("has_puts checked"),
            };
        }

        // calls and puts together: assume a short iron condor, margined by
        // the put-spread width
        let sold = sold_puts.iter().next().copied().unwrap_or_default();
        let bought = bought_puts.iter().next().copied().unwrap_or_default();
        (sold - bought) * multiplier
    }
}

fn market_value(positions: &BTreeMap<String, Decimal>, quotes: &QuoteBook) -> Decimal {
    let mut value = Decimal::zero();
    for (symbol, qty) in positions {
        let Some(price) = quotes.price(symbol) else {
            warn!(symbol = %symbol, "no quote for open position, valuing at zero");
            continue;
        };
        let multiplier = if symbol.contains('_') {
            Decimal::contract_multiplier()
        } else {
            Decimal::one()
        };
        value += price * *qty * multiplier;
    }
    value
}

/// Annualize a completed group's simple return.
///
/// Under a year the compounding period is whole weeks; beyond a year a
/// continuous exponent is used. Losses are reported un-annualized.
fn annualized_roi(profit: Decimal, cost: Decimal, duration_days: i64, underlying: &Ticker) -> Option<f64> {
    if !cost.is_positive() {
        warn!(underlying = %underlying, cost = %cost, "non-positive cost basis, skipping ROI");
        return None;
    }
    let simple = profit.to_f64() / cost.to_f64();
    if profit.is_positive() {
        let days = duration_days.max(1) as f64;
        if duration_days < 365 {
            let weeks = (days / 7.0).ceil();
            Some((1.0 + simple).powf(52.0 / weeks) - 1.0)
        } else {
            Some(((1.0 + simple).ln() * (365.0 / days)).exp() - 1.0)
        }
    } else {
        Some(simple)
    }
}

/// Aggregated figures across many groups of one or more tickers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupSummary {
    pub total: Decimal,
    pub profit: Decimal,
    /// Residual positions per underlying, keyed by compact symbol string.
    pub positions: BTreeMap<String, BTreeMap<String, Decimal>>,
}

/// Roll up totals, profit, and net residual positions across groups.
/// Positions that net to zero across groups are dropped.
pub fn summarize(groups: &[TransactionGroup]) -> GroupSummary {
    let mut summary = GroupSummary::default();
    for group in groups {
        let Some(valuation) = &group.valuation else {
            continue;
        };
        summary.total += valuation.total;
        summary.profit += valuation.profit;
        let by_ticker = summary
            .positions
            .entry(group.underlying.as_str().to_string())
            .or_default();
        for (symbol, qty) in &valuation.positions {
            let entry = by_ticker.entry(symbol.clone()).or_insert_with(Decimal::zero);
            *entry += *qty;
            if entry.is_zero() {
                by_ticker.remove(symbol);
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, Symbol};
    use chrono::NaiveDateTime;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(s, "%m/%d/%Y")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn tx(day: &str, symbol: &str, action: Action, qty: &str, price: &str, fee: &str, amount: &str) -> Transaction {
        Transaction::new(
            Account::new("1234"),
            ts(day),
            Some(Symbol::parse(symbol).unwrap()),
            action,
            dec(qty),
            dec(price),
            dec(fee),
            dec(amount),
            None,
        )
    }

    fn closed_stock_group() -> TransactionGroup {
        let open = tx("01/03/2022", "VMW", Action::Bto, "10", "100", "0", "-1000");
        let close = tx("01/10/2022", "VMW", Action::Stc, "10", "103.84", "0", "1038.40");
        let mut chain = Chain::new(open);
        chain.closings.push(close);
        TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("VMW"),
            chains: vec![chain],
            valuation: None,
        }
    }

    #[test]
    fn test_completed_group_valuation() {
        let mut group = closed_stock_group();
        assert!(group.completed());

        group.run_valuation(&QuoteBook::new(), NaiveDate::from_ymd_opt(2022, 3, 1).unwrap());
        let v = group.valuation.as_ref().unwrap();
        assert_eq!(v.total, dec("38.40"));
        assert_eq!(v.profit, dec("38.40"));
        assert_eq!(v.cost, dec("1000"));
        assert!(v.positions.is_empty());
        assert_eq!(v.duration_days, 8);
        // 3.84% over 8 days -> annualized over ceil(8/7)=2 weeks
        let roi = v.roi.unwrap();
        let expected = (1.0f64 + 0.0384).powf(52.0 / 2.0) - 1.0;
        assert!((roi - expected).abs() < 1e-9);
    }

    #[test]
    fn test_open_group_positions_and_market_value() {
        let open = tx(
            "01/24/2022",
            "AAPL 01/28/2022 140.00 P",
            Action::Sto,
            "10",
            "0.86",
            "6.60",
            "853.40",
        );
        let mut group = TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("AAPL"),
            chains: vec![Chain::new(open)],
            valuation: None,
        };
        assert!(!group.completed());

        let mut quotes = QuoteBook::new();
        quotes.insert("AAPL_220128P140", dec("0.30"));
        let today = NaiveDate::from_ymd_opt(2022, 1, 26).unwrap();
        group.run_valuation(&quotes, today);

        let v = group.valuation.as_ref().unwrap();
        assert_eq!(v.positions.get("AAPL_220128P140"), Some(&dec("-10")));
        // short 10 contracts valued at 0.30: market value = -10 * 0.30 * 100
        assert_eq!(v.profit, dec("853.40") - dec("300"));
        // still open: duration runs to today
        assert_eq!(v.duration_days, 3);
        assert!(v.roi.is_none());
    }

    #[test]
    fn test_missing_quote_degrades_to_zero() {
        let open = tx(
            "01/24/2022",
            "AAPL 01/28/2022 140.00 P",
            Action::Sto,
            "10",
            "0.86",
            "6.60",
            "853.40",
        );
        let mut group = TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("AAPL"),
            chains: vec![Chain::new(open)],
            valuation: None,
        };
        group.run_valuation(&QuoteBook::new(), NaiveDate::from_ymd_opt(2022, 1, 26).unwrap());
        assert_eq!(group.valuation.as_ref().unwrap().profit, dec("853.40"));
    }

    #[test]
    fn test_cost_basis_short_put() {
        let open = tx(
            "01/24/2022",
            "AAPL 01/28/2022 140.00 P",
            Action::Sto,
            "10",
            "0.86",
            "6.60",
            "853.40",
        );
        let group = TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("AAPL"),
            chains: vec![Chain::new(open)],
            valuation: None,
        };
        // cash-secured put: strike x 100 x quantity
        assert_eq!(group.cost_basis(), dec("140") * dec("100") * dec("10"));
    }

    #[test]
    fn test_cost_basis_put_credit_spread() {
        let sell = tx(
            "01/24/2022",
            "AAPL 01/28/2022 140.00 P",
            Action::Sto,
            "10",
            "0.86",
            "6.60",
            "853.40",
        );
        let buy = tx(
            "01/24/2022",
            "AAPL 01/28/2022 135.00 P",
            Action::Bto,
            "10",
            "0.54",
            "6.60",
            "-546.60",
        );
        let group = TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("AAPL"),
            chains: vec![Chain::new(sell), Chain::new(buy)],
            valuation: None,
        };
        // width (140 - 135) x 100 x 10
        assert_eq!(group.cost_basis(), dec("5000"));
    }

    #[test]
    fn test_cost_basis_long_call() {
        let buy = tx(
            "01/24/2022",
            "AAPL 02/18/2022 150.00 C",
            Action::Bto,
            "2",
            "3.50",
            "1.32",
            "-701.32",
        );
        let group = TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("AAPL"),
            chains: vec![Chain::new(buy)],
            valuation: None,
        };
        assert_eq!(group.cost_basis(), dec("701.32"));
    }

    #[test]
    fn test_cost_basis_iron_condor_uses_put_wing() {
        let chains = vec![
            Chain::new(tx("01/24/2022", "SPY 02/04/2022 450.00 C", Action::Sto, "1", "1.00", "0.66", "99.34")),
            Chain::new(tx("01/24/2022", "SPY 02/04/2022 455.00 C", Action::Bto, "1", "0.50", "0.66", "-50.66")),
            Chain::new(tx("01/24/2022", "SPY 02/04/2022 430.00 P", Action::Sto, "1", "1.20", "0.66", "119.34")),
            Chain::new(tx("01/24/2022", "SPY 02/04/2022 425.00 P", Action::Bto, "1", "0.70", "0.66", "-70.66")),
        ];
        let group = TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("SPY"),
            chains,
            valuation: None,
        };
        // put wing width (430 - 425) x 100 x 1
        assert_eq!(group.cost_basis(), dec("500"));
    }

    #[test]
    fn test_summarize() {
        let mut a = closed_stock_group();
        let mut b = closed_stock_group();
        let today = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        a.run_valuation(&QuoteBook::new(), today);
        b.run_valuation(&QuoteBook::new(), today);

        let summary = summarize(&[a, b]);
        assert_eq!(summary.total, dec("76.80"));
        assert_eq!(summary.profit, dec("76.80"));
        assert!(summary.positions.get("VMW").unwrap().is_empty());
    }
}
