//! Persisted transaction groups.
//!
//! Chains are stored as nested JSON arrays. Each chain's opening
//! transaction carries the contract fields (kind, strike, expiration) once;
//! closing entries inherit them on load. The compaction is a persistence
//! detail — groups are derived data and can always be rebuilt from the
//! transaction table.

use super::{
    format_datetime, kind_from_str, kind_to_str, parse_datetime, parse_tx_id, Repository,
};
use crate::domain::{
    Account, Action, Decimal, OptionKind, Symbol, Ticker, Transaction, TxId, Validity,
};
use crate::engine::{Chain, TransactionGroup, Valuation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
struct ChainTxDoc {
    id: String,
    date: String,
    action: String,
    quantity: Decimal,
    price: Decimal,
    fee: Decimal,
    amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strike: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<String>,
}

fn tx_to_doc(tx: &Transaction, with_contract: bool) -> ChainTxDoc {
    let contract = tx
        .symbol
        .as_ref()
        .and_then(|s| s.contract.as_ref())
        .filter(|_| with_contract);
    ChainTxDoc {
        id: tx.id.to_string(),
        date: format_datetime(&tx.date),
        action: tx.action.as_str().to_string(),
        quantity: tx.quantity,
        price: tx.price,
        fee: tx.fee,
        amount: tx.amount,
        kind: contract.map(|c| kind_to_str(c.kind).to_string()),
        strike: contract.map(|c| c.strike),
        expiration: contract.map(|c| c.expiration.format("%Y-%m-%d").to_string()),
    }
}

fn tx_from_doc(
    doc: &ChainTxDoc,
    account: &Account,
    underlying: &Ticker,
    inherited: Option<&Symbol>,
) -> Transaction {
    let symbol = match (&doc.kind, &doc.strike, &doc.expiration) {
        (Some(kind), Some(strike), Some(expiration)) => {
            let kind = kind_from_str(kind).unwrap_or(OptionKind::Auto);
            let expiration =
                NaiveDate::parse_from_str(expiration, "%Y-%m-%d").unwrap_or_default();
            Symbol::option(underlying.clone(), kind, *strike, expiration)
        }
        _ => inherited
            .cloned()
            .unwrap_or_else(|| Symbol::stock(underlying.clone())),
    };
    Transaction {
        id: parse_tx_id(&doc.id).unwrap_or_else(TxId::generate),
        account: account.clone(),
        date: parse_datetime(&doc.date),
        symbol: Some(symbol),
        action: Action::parse(&doc.action),
        quantity: doc.quantity,
        price: doc.price,
        fee: doc.fee,
        amount: doc.amount,
        validity: Validity::Valid,
        description: None,
    }
}

fn chains_to_json(group: &TransactionGroup) -> serde_json::Value {
    let chains: Vec<Vec<ChainTxDoc>> = group
        .chains
        .iter()
        .map(|chain| {
            let mut docs = vec![tx_to_doc(&chain.opening, true)];
            docs.extend(chain.closings.iter().map(|tx| tx_to_doc(tx, false)));
            docs
        })
        .collect();
    serde_json::to_value(chains).unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize group chains");
        serde_json::Value::Array(Vec::new())
    })
}

fn chains_from_json(
    text: &str,
    account: &Account,
    underlying: &Ticker,
) -> Vec<Chain> {
    let docs: Vec<Vec<ChainTxDoc>> = match serde_json::from_str(text) {
        Ok(docs) => docs,
        Err(e) => {
            warn!(error = %e, "failed to parse stored group chains");
            return Vec::new();
        }
    };
    docs.into_iter()
        .filter_map(|mut chain_docs| {
            if chain_docs.is_empty() {
                return None;
            }
            let closing_docs = chain_docs.split_off(1);
            let opening = tx_from_doc(&chain_docs[0], account, underlying, None);
            let opening_symbol = opening.symbol.clone();
            let closings = closing_docs
                .iter()
                .map(|doc| tx_from_doc(doc, account, underlying, opening_symbol.as_ref()))
                .collect();
            Some(Chain { opening, closings })
        })
        .collect()
}

impl Repository {
    /// Persist an assembled group.
    pub async fn insert_group(&self, group: &TransactionGroup) -> Result<(), sqlx::Error> {
        let chains = chains_to_json(group);
        let valuation = group.valuation.as_ref();
        sqlx::query(
            r#"
            INSERT INTO transaction_groups
            (account, underlying, completed, chains, total, cost, profit, duration_days, roi)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group.account.as_str())
        .bind(group.underlying.as_str())
        .bind(group.completed())
        .bind(chains.to_string())
        .bind(valuation.map(|v| v.total.to_canonical_string()))
        .bind(valuation.map(|v| v.cost.to_canonical_string()))
        .bind(valuation.map(|v| v.profit.to_canonical_string()))
        .bind(valuation.map(|v| v.duration_days))
        .bind(valuation.and_then(|v| v.roi))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the persisted groups for one (account, underlying). Stored
    /// valuation figures are carried over; residual positions are rebuilt
    /// from the chains.
    pub async fn query_groups(
        &self,
        account: &Account,
        ticker: &Ticker,
    ) -> Result<Vec<TransactionGroup>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT account, underlying, completed, chains, total, cost, profit, duration_days, roi
            FROM transaction_groups
            WHERE account = ? AND underlying = ?
            ORDER BY id ASC
            "#,
        )
        .bind(account.as_str())
        .bind(ticker.as_str())
        .fetch_all(&self.pool)
        .await?;

        let groups = rows
            .iter()
            .map(|row| {
                let account = Account::new(row.get::<String, _>("account").as_str());
                let underlying = Ticker::new(row.get::<String, _>("underlying").as_str());
                let chains_text: String = row.get("chains");
                let chains = chains_from_json(&chains_text, &account, &underlying);

                let total: Option<String> = row.get("total");
                let cost: Option<String> = row.get("cost");
                let profit: Option<String> = row.get("profit");
                let duration_days: Option<i64> = row.get("duration_days");
                let roi: Option<f64> = row.get("roi");

                let mut group = TransactionGroup {
                    account,
                    underlying,
                    chains,
                    valuation: None,
                };
                if let (Some(total), Some(cost), Some(profit), Some(duration_days)) =
                    (total, cost, profit, duration_days)
                {
                    group.valuation = Some(Valuation {
                        total: super::parse_decimal(&total, "total"),
                        positions: residual_positions(&group),
                        cost: super::parse_decimal(&cost, "cost"),
                        profit: super::parse_decimal(&profit, "profit"),
                        duration_days,
                        roi,
                    });
                }
                group
            })
            .collect();
        Ok(groups)
    }

    /// Drop incomplete groups before re-assembly; future transactions may
    /// still close them.
    pub async fn delete_incomplete_groups(
        &self,
        account: &Account,
        ticker: &Ticker,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM transaction_groups
            WHERE account = ? AND underlying = ? AND completed = 0
            "#,
        )
        .bind(account.as_str())
        .bind(ticker.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn residual_positions(group: &TransactionGroup) -> BTreeMap<String, Decimal> {
    let mut positions = BTreeMap::new();
    for chain in &group.chains {
        let residual = chain.residual();
        if residual.abs() <= crate::domain::qty_epsilon() {
            continue;
        }
        let key = chain
            .opening
            .symbol
            .as_ref()
            .map(|s| s.to_compact_string())
            .unwrap_or_default();
        let signed = if chain.opening.action.opens_long() {
            residual
        } else {
            -residual
        };
        let entry = positions.entry(key.clone()).or_insert_with(Decimal::zero);
        *entry += signed;
        if entry.abs() <= crate::domain::qty_epsilon() {
            positions.remove(&key);
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::engine::QuoteBook;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    async fn setup() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

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

    fn option_group() -> TransactionGroup {
        let open = tx(
            "01/24/2022",
            "AAPL 01/28/2022 140.00 P",
            Action::Sto,
            "10",
            "0.86",
            "6.60",
            "853.40",
        );
        let close = tx(
            "01/26/2022",
            "AAPL 01/28/2022 140.00 P",
            Action::Btc,
            "4",
            "0.20",
            "2.64",
            "-82.64",
        );
        let mut chain = Chain::new(open);
        chain.closings.push(close);
        let mut group = TransactionGroup {
            account: Account::new("1234"),
            underlying: Ticker::new("AAPL"),
            chains: vec![chain],
            valuation: None,
        };
        group.run_valuation(&QuoteBook::new(), NaiveDate::from_ymd_opt(2022, 1, 27).unwrap());
        group
    }

    #[tokio::test]
    async fn test_group_roundtrip() {
        let (repo, _temp) = setup().await;
        let group = option_group();
        repo.insert_group(&group).await.unwrap();

        let loaded = repo
            .query_groups(&Account::new("1234"), &Ticker::new("AAPL"))
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        let g = &loaded[0];
        assert_eq!(g.chains.len(), 1);
        assert_eq!(g.chains[0].closings.len(), 1);
        assert!(!g.completed());

        // closing inherited the opening's contract
        let close_symbol = g.chains[0].closings[0].symbol.as_ref().unwrap();
        assert_eq!(close_symbol, g.chains[0].opening.symbol.as_ref().unwrap());

        let v = g.valuation.as_ref().unwrap();
        assert_eq!(v.total, dec("770.76"));
        assert_eq!(v.positions.get("AAPL_220128P140"), Some(&dec("-6")));
        assert_eq!(
            v.profit,
            group.valuation.as_ref().unwrap().profit
        );
    }

    #[tokio::test]
    async fn test_delete_incomplete_groups() {
        let (repo, _temp) = setup().await;
        repo.insert_group(&option_group()).await.unwrap();

        let deleted = repo
            .delete_incomplete_groups(&Account::new("1234"), &Ticker::new("AAPL"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let loaded = repo
            .query_groups(&Account::new("1234"), &Ticker::new("AAPL"))
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }
}
