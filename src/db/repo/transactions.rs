//! Transaction row operations: ingest, lineage updates, effective queries,
//! and cash totals.

use super::{
    format_datetime, kind_to_str, transaction_from_row, validity_to_str, Repository, DATE_FORMAT,
};
use crate::domain::{Account, Action, Decimal, Lineage, LineageTable, Ticker, Transaction, TxId};
use chrono::NaiveDate;
use sqlx::Row;
use std::collections::HashMap;

/// SQL fragment selecting rows eligible for matching: not folded into a
/// merge result (fragments of one keep `merge_parent = slice_parent`) and
/// not a parent retired by slicing.
const EFFECTIVE_CONDITION: &str = "\
    (merge_parent IS NULL OR merge_parent = id OR merge_parent = slice_parent) \
    AND (slice_parent IS NULL OR slice_parent != id)";

impl Repository {
    /// Insert loaded transactions idempotently.
    ///
    /// Dedupe is by natural key plus the occurrence ordinal within the
    /// batch, so re-importing the same export is a no-op while genuinely
    /// identical same-instant fragments in one file both survive.
    ///
    /// Returns the number of newly inserted rows.
    pub async fn insert_transactions_batch(
        &self,
        transactions: &[Transaction],
    ) -> Result<usize, sqlx::Error> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let mut occurrences: HashMap<String, u32> = HashMap::new();
        let mut inserted = 0usize;
        let mut db_tx = self.pool.begin().await?;

        for tx in transactions {
            let base_key = tx.natural_key();
            let ordinal = occurrences.entry(base_key.clone()).or_insert(0);
            let natural_key = format!("{}#{}", base_key, ordinal);
            *ordinal += 1;

            let result = insert_query(tx, &natural_key, &Lineage::default())
                .execute(&mut *db_tx)
                .await?;
            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        db_tx.commit().await?;
        Ok(inserted)
    }

    /// Insert synthetic transactions minted by the assembly engine, with
    /// their lineage. Keyed by id; re-inserting is a no-op.
    pub async fn insert_minted_batch(
        &self,
        minted: &[Transaction],
        lineage: &LineageTable,
    ) -> Result<usize, sqlx::Error> {
        if minted.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0usize;
        let mut db_tx = self.pool.begin().await?;
        for tx in minted {
            // a stored synthetic can grow when later imports add fragments
            // to the same order, so re-minting refreshes the row
            let natural_key = format!("synthetic:{}", tx.id);
            let tx_lineage = lineage.get(tx.id);
            let result = sqlx::query(
                r#"
                INSERT INTO transactions
                (id, natural_key, account, date, underlying, option_kind, strike, expiration,
                 action, quantity, price, fee, amount, validity, description,
                 merge_parent, slice_parent, grouped)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    quantity = excluded.quantity,
                    price = excluded.price,
                    fee = excluded.fee,
                    amount = excluded.amount,
                    merge_parent = excluded.merge_parent,
                    slice_parent = excluded.slice_parent,
                    grouped = excluded.grouped
                "#,
            )
            .bind(tx.id.to_string())
            .bind(natural_key)
            .bind(tx.account.as_str().to_string())
            .bind(format_datetime(&tx.date))
            .bind(tx.symbol.as_ref().map(|s| s.ticker.as_str().to_string()))
            .bind(
                tx.symbol
                    .as_ref()
                    .and_then(|s| s.contract.as_ref())
                    .map(|c| kind_to_str(c.kind).to_string()),
            )
            .bind(
                tx.symbol
                    .as_ref()
                    .and_then(|s| s.contract.as_ref())
                    .map(|c| c.strike.to_canonical_string()),
            )
            .bind(
                tx.symbol
                    .as_ref()
                    .and_then(|s| s.contract.as_ref())
                    .map(|c| c.expiration.format("%Y-%m-%d").to_string()),
            )
            .bind(tx.action.as_str())
            .bind(tx.quantity.to_canonical_string())
            .bind(tx.price.to_canonical_string())
            .bind(tx.fee.to_canonical_string())
            .bind(tx.amount.to_canonical_string())
            .bind(validity_to_str(tx.validity))
            .bind(tx.description.clone())
            .bind(tx_lineage.merge_parent.map(|p| p.to_string()))
            .bind(tx_lineage.slice_parent.map(|p| p.to_string()))
            .bind(tx_lineage.grouped)
            .execute(&mut *db_tx)
            .await?;
            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }
        db_tx.commit().await?;
        Ok(inserted)
    }

    /// Write back the lineage columns for one transaction.
    pub async fn update_lineage(&self, id: TxId, lineage: &Lineage) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET merge_parent = ?, slice_parent = ?, grouped = ?
            WHERE id = ?
            "#,
        )
        .bind(lineage.merge_parent.map(|p| p.to_string()))
        .bind(lineage.slice_parent.map(|p| p.to_string()))
        .bind(lineage.grouped)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Valid, effective, not-yet-grouped transactions for one
    /// (account, underlying), in matching order.
    pub async fn query_effective_ungrouped(
        &self,
        account: &Account,
        ticker: &Ticker,
    ) -> Result<Vec<(Transaction, Lineage)>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT * FROM transactions
            WHERE account = ? AND underlying = ? AND validity = 'VALID'
              AND (grouped IS NULL OR grouped = 0)
              AND {}
            ORDER BY date ASC, action ASC, expiration ASC, strike ASC, option_kind ASC
            "#,
            EFFECTIVE_CONDITION
        );
        let rows = sqlx::query(&sql)
            .bind(account.as_str())
            .bind(ticker.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(transaction_from_row).collect())
    }

    /// List transactions for display, newest first.
    pub async fn query_transactions(
        &self,
        account: &Account,
        ticker: Option<&Ticker>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<(Transaction, Lineage)>, sqlx::Error> {
        let ticker_text = ticker.map(|t| t.as_str().to_string());
        let from_text =
            from.map(|d| d.and_hms_opt(0, 0, 0).unwrap().format(DATE_FORMAT).to_string());
        let to_text =
            to.map(|d| d.and_hms_opt(23, 59, 59).unwrap().format(DATE_FORMAT).to_string());
        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions
            WHERE account = ?
              AND (? IS NULL OR underlying = ?)
              AND (? IS NULL OR date >= ?)
              AND (? IS NULL OR date <= ?)
            ORDER BY date DESC
            "#,
        )
        .bind(account.as_str())
        .bind(&ticker_text)
        .bind(&ticker_text)
        .bind(&from_text)
        .bind(&from_text)
        .bind(&to_text)
        .bind(&to_text)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(transaction_from_row).collect())
    }

    /// Sum the cash amounts of valid, effective transactions whose action
    /// satisfies `filter`, over an optional date window.
    ///
    /// Amounts are summed in Rust to keep decimal precision; SQLite's SUM
    /// would coerce to REAL.
    pub async fn sum_amounts(
        &self,
        account: &Account,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        filter: impl Fn(Action) -> bool,
    ) -> Result<Decimal, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT action, amount FROM transactions
            WHERE account = ? AND validity = 'VALID'
              AND (? IS NULL OR date >= ?)
              AND (? IS NULL OR date <= ?)
              AND {}
            "#,
            EFFECTIVE_CONDITION
        );
        let from_text =
            from.map(|d| d.and_hms_opt(0, 0, 0).unwrap().format(DATE_FORMAT).to_string());
        let to_text =
            to.map(|d| d.and_hms_opt(23, 59, 59).unwrap().format(DATE_FORMAT).to_string());
        let rows = sqlx::query(&sql)
            .bind(account.as_str())
            .bind(&from_text)
            .bind(&from_text)
            .bind(&to_text)
            .bind(&to_text)
            .fetch_all(&self.pool)
            .await?;

        let mut sum = Decimal::zero();
        for row in rows {
            let action_text: String = row.get("action");
            if filter(Action::parse(&action_text)) {
                let amount: String = row.get("amount");
                sum += super::parse_decimal(&amount, "amount");
            }
        }
        Ok(sum)
    }

    /// Distinct underlyings with valid transactions in this account.
    pub async fn distinct_tickers(&self, account: &Account) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT underlying FROM transactions
            WHERE account = ? AND validity = 'VALID' AND underlying IS NOT NULL
            ORDER BY underlying ASC
            "#,
        )
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("underlying")).collect())
    }

    /// Net cash flow of valid, effective transactions for one underlying.
    pub async fn ticker_cost(
        &self,
        account: &Account,
        ticker: &Ticker,
    ) -> Result<Decimal, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT amount FROM transactions
            WHERE account = ? AND underlying = ? AND validity = 'VALID'
              AND {}
            "#,
            EFFECTIVE_CONDITION
        );
        let rows = sqlx::query(&sql)
            .bind(account.as_str())
            .bind(ticker.as_str())
            .fetch_all(&self.pool)
            .await?;
        let mut sum = Decimal::zero();
        for row in rows {
            let amount: String = row.get("amount");
            sum += super::parse_decimal(&amount, "amount");
        }
        Ok(sum)
    }
}

fn insert_query<'a>(
    tx: &'a Transaction,
    natural_key: &'a str,
    lineage: &'a Lineage,
) -> sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>> {
    let (underlying, option_kind, strike, expiration) = match &tx.symbol {
        None => (None, None, None, None),
        Some(symbol) => (
            Some(symbol.ticker.as_str().to_string()),
            symbol.contract.as_ref().map(|c| kind_to_str(c.kind).to_string()),
            symbol
                .contract
                .as_ref()
                .map(|c| c.strike.to_canonical_string()),
            symbol
                .contract
                .as_ref()
                .map(|c| c.expiration.format("%Y-%m-%d").to_string()),
        ),
    };

    sqlx::query(
        r#"
        INSERT INTO transactions
        (id, natural_key, account, date, underlying, option_kind, strike, expiration,
         action, quantity, price, fee, amount, validity, description,
         merge_parent, slice_parent, grouped)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(natural_key) DO NOTHING
        "#,
    )
    .bind(tx.id.to_string())
    .bind(natural_key.to_string())
    .bind(tx.account.as_str().to_string())
    .bind(format_datetime(&tx.date))
    .bind(underlying)
    .bind(option_kind)
    .bind(strike)
    .bind(expiration)
    .bind(tx.action.as_str())
    .bind(tx.quantity.to_canonical_string())
    .bind(tx.price.to_canonical_string())
    .bind(tx.fee.to_canonical_string())
    .bind(tx.amount.to_canonical_string())
    .bind(validity_to_str(tx.validity))
    .bind(tx.description.clone())
    .bind(lineage.merge_parent.map(|p| p.to_string()))
    .bind(lineage.slice_parent.map(|p| p.to_string()))
    .bind(lineage.grouped)
}
