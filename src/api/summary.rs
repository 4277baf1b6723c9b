use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::transactions::parse_account;
use super::AppState;
use crate::domain::{Action, Ticker};
use crate::engine::summarize;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub account: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    /// Net cash across all effective transactions.
    pub total_cash: String,
    /// Cash moved in via transfers and journals.
    pub total_investment: String,
    pub total_interest: String,
    pub total_dividend: String,
    /// Cash committed to trading (buys minus sells), positive when invested.
    pub total_trading: String,
    pub tickers: Vec<String>,
    /// Net cash flow per underlying.
    pub ticker_costs: BTreeMap<String, String>,
    /// Residual open positions per underlying, from the persisted groups.
    pub positions: BTreeMap<String, BTreeMap<String, f64>>,
}

pub async fn account_summary(
    Query(params): Query<SummaryQuery>,
    State(state): State<AppState>,
) -> Result<Json<SummaryResponse>, AppError> {
    let account = parse_account(&params.account)?;
    let (from, to) = (params.from_date, params.to_date);

    let total_cash = state
        .repo
        .sum_amounts(&account, from, to, |_| true)
        .await?;
    let total_investment = state
        .repo
        .sum_amounts(&account, from, to, |a| {
            matches!(a, Action::Transfer | Action::Journal)
        })
        .await?;
    let total_interest = state
        .repo
        .sum_amounts(&account, from, to, |a| a == Action::Interest)
        .await?;
    let total_dividend = state
        .repo
        .sum_amounts(&account, from, to, |a| a == Action::Dividend)
        .await?;
    let total_trading = -state
        .repo
        .sum_amounts(&account, from, to, |a| {
            a.is_open() || a.is_close()
        })
        .await?;

    let tickers = state.repo.distinct_tickers(&account).await?;
    let mut ticker_costs = BTreeMap::new();
    let mut positions: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for ticker_name in &tickers {
        let ticker = Ticker::new(ticker_name);
        let cost = state.repo.ticker_cost(&account, &ticker).await?;
        ticker_costs.insert(ticker_name.clone(), cost.to_canonical_string());

        let groups = state.repo.query_groups(&account, &ticker).await?;
        let summary = summarize(&groups);
        for (underlying, by_symbol) in summary.positions {
            if by_symbol.is_empty() {
                continue;
            }
            let entry = positions.entry(underlying).or_default();
            for (symbol, qty) in by_symbol {
                entry.insert(symbol, qty.to_f64());
            }
        }
    }

    Ok(Json(SummaryResponse {
        total_cash: total_cash.to_canonical_string(),
        total_investment: total_investment.to_canonical_string(),
        total_interest: total_interest.to_canonical_string(),
        total_dividend: total_dividend.to_canonical_string(),
        total_trading: total_trading.to_canonical_string(),
        tickers,
        ticker_costs,
        positions,
    }))
}
