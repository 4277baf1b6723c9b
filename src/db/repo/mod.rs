//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database
//! operations. Methods are organized across submodules by domain:
//! - `transactions.rs` - transaction rows, lineage, and totals
//! - `groups.rs` - persisted transaction groups
//! - `quotes.rs` - the quote cache

mod groups;
mod quotes;
mod transactions;

use crate::domain::{
    Account, Action, Decimal, Lineage, OptionKind, Symbol, Ticker, Transaction, TxId, Validity,
};
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }
}

fn format_datetime(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_datetime(text: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(text, DATE_FORMAT).unwrap_or_else(|e| {
        warn!(text, error = %e, "unparseable stored timestamp, using epoch");
        NaiveDateTime::default()
    })
}

fn parse_decimal(text: &str, column: &str) -> Decimal {
    Decimal::from_str(text).unwrap_or_else(|e| {
        warn!(text, column, error = %e, "unparseable stored decimal, using zero");
        Decimal::zero()
    })
}

fn parse_tx_id(text: &str) -> Option<TxId> {
    match TxId::from_str(text) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(text, error = %e, "unparseable stored transaction id");
            None
        }
    }
}

fn kind_to_str(kind: OptionKind) -> &'static str {
    match kind {
        OptionKind::Call => "CALL",
        OptionKind::Put => "PUT",
        OptionKind::Auto => "AUTO",
    }
}

fn kind_from_str(text: &str) -> Option<OptionKind> {
    match text {
        "CALL" => Some(OptionKind::Call),
        "PUT" => Some(OptionKind::Put),
        "AUTO" => Some(OptionKind::Auto),
        _ => None,
    }
}

fn validity_to_str(validity: Validity) -> &'static str {
    match validity {
        Validity::Valid => "VALID",
        Validity::Invalid => "INVALID",
        Validity::Ignored => "IGNORED",
    }
}

fn validity_from_str(text: &str) -> Validity {
    match text {
        "VALID" => Validity::Valid,
        "IGNORED" => Validity::Ignored,
        _ => Validity::Invalid,
    }
}

/// Rebuild a transaction and its lineage from a row.
fn transaction_from_row(row: &SqliteRow) -> (Transaction, Lineage) {
    let id_text: String = row.get("id");
    let id = parse_tx_id(&id_text).unwrap_or_else(TxId::generate);
    let account: String = row.get("account");
    let date_text: String = row.get("date");
    let underlying: Option<String> = row.get("underlying");
    let kind_text: Option<String> = row.get("option_kind");
    let strike_text: Option<String> = row.get("strike");
    let expiration_text: Option<String> = row.get("expiration");
    let action_text: String = row.get("action");
    let quantity: String = row.get("quantity");
    let price: String = row.get("price");
    let fee: String = row.get("fee");
    let amount: String = row.get("amount");
    let validity_text: String = row.get("validity");
    let description: Option<String> = row.get("description");

    let symbol = underlying.map(|ticker| {
        let ticker = Ticker::new(&ticker);
        match (
            kind_text.as_deref().and_then(kind_from_str),
            strike_text.as_deref(),
            expiration_text.as_deref(),
        ) {
            (Some(kind), Some(strike), Some(expiration)) => {
                let expiration = NaiveDate::parse_from_str(expiration, "%Y-%m-%d")
                    .unwrap_or_else(|e| {
                        warn!(expiration, error = %e, "unparseable stored expiration");
                        NaiveDate::default()
                    });
                Symbol::option(ticker, kind, parse_decimal(strike, "strike"), expiration)
            }
            _ => Symbol::stock(ticker),
        }
    });

    let tx = Transaction {
        id,
        account: Account::new(&account),
        date: parse_datetime(&date_text),
        symbol,
        action: Action::parse(&action_text),
        quantity: parse_decimal(&quantity, "quantity"),
        price: parse_decimal(&price, "price"),
        fee: parse_decimal(&fee, "fee"),
        amount: parse_decimal(&amount, "amount"),
        validity: validity_from_str(&validity_text),
        description,
    };

    let merge_parent: Option<String> = row.get("merge_parent");
    let slice_parent: Option<String> = row.get("slice_parent");
    let grouped: Option<bool> = row.get("grouped");
    let lineage = Lineage {
        merge_parent: merge_parent.as_deref().and_then(parse_tx_id),
        slice_parent: slice_parent.as_deref().and_then(parse_tx_id),
        grouped,
    };

    (tx, lineage)
}
