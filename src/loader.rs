//! CSV import of broker transaction exports.
//!
//! Parses the eight-column export format (date, action, symbol,
//! description, quantity, price, fee, amount), normalizes money and date
//! text, and tags each row Valid / Invalid / Ignored. Only structure is
//! judged here; the amount-reconciliation check lives on the Transaction
//! itself.

use crate::domain::{Account, Action, Decimal, Symbol, Transaction, Validity};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read export file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of one import: parsed transactions plus the counts batch callers
/// report.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Rows that parsed and reconciled; eligible for matching.
    pub valid: Vec<Transaction>,
    /// Rows that parsed but failed the amount reconciliation; stored for
    /// audit, excluded from matching.
    pub invalid: Vec<Transaction>,
    /// Rows skipped outright: headers, short rows, unparseable dates or
    /// symbols.
    pub ignored: usize,
}

impl LoadReport {
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.valid.len(), self.invalid.len(), self.ignored)
    }
}

/// Parse a broker CSV export for one account.
pub fn parse_csv<R: Read>(reader: R, account: &Account) -> Result<LoadReport, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut report = LoadReport::default();
    for record in csv_reader.records() {
        let record = record?;
        match parse_row(&record, account) {
            Some(tx) if tx.validity == Validity::Valid => report.valid.push(tx),
            Some(tx) => {
                warn!(tx = ?tx, "transaction failed amount reconciliation");
                report.invalid.push(tx);
            }
            None => report.ignored += 1,
        }
    }
    debug!(
        valid = report.valid.len(),
        invalid = report.invalid.len(),
        ignored = report.ignored,
        "parsed export"
    );
    Ok(report)
}

/// Parse a broker CSV export from disk.
pub fn load_file(path: &Path, account: &Account) -> Result<LoadReport, LoadError> {
    let file = std::fs::File::open(path)?;
    parse_csv(file, account)
}

fn parse_row(record: &csv::StringRecord, account: &Account) -> Option<Transaction> {
    if record.len() < 8 {
        return None;
    }
    let date = parse_date(record.get(0)?)?;
    let action = Action::parse(record.get(1)?);
    let symbol_text = record.get(2)?.trim();
    let description = record.get(3)?.trim();
    let quantity = parse_quantity(record.get(4)?)?;
    let price = parse_money(record.get(5)?);
    let fee = parse_money(record.get(6)?);
    let amount = parse_money(record.get(7)?);

    let symbol = if symbol_text.is_empty() {
        None
    } else {
        match Symbol::parse(symbol_text) {
            Ok(symbol) => Some(symbol),
            Err(err) => {
                warn!(symbol = symbol_text, %err, "unparseable symbol, ignoring row");
                return None;
            }
        }
    };

    Some(Transaction::new(
        account.clone(),
        date,
        symbol,
        action,
        quantity,
        price,
        fee,
        amount,
        (!description.is_empty()).then(|| description.to_string()),
    ))
}

/// Export dates come as `MM/DD/YYYY`, sometimes suffixed with an
/// "as of" clause; only the leading token counts.
fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let token = text.split_whitespace().next()?;
    let date = NaiveDate::parse_from_str(token, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(token, "%Y-%m-%d"))
        .ok()?;
    date.and_hms_opt(0, 0, 0)
}

/// Money text: `$6.60`, `-$546.60`, or empty (zero).
fn parse_money(text: &str) -> Decimal {
    let text = text.trim();
    if text.is_empty() {
        return Decimal::zero();
    }
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('$').unwrap_or(rest);
    let value = Decimal::from_str_canonical(&rest.replace(',', "")).unwrap_or_else(|_| {
        warn!(text, "unparseable money text, treating as zero");
        Decimal::zero()
    });
    if negative {
        -value
    } else {
        value
    }
}

fn parse_quantity(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Decimal::zero());
    }
    Decimal::from_str_canonical(&text.replace(',', "")).ok()
}
