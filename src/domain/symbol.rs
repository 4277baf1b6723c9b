//! Instrument symbols and the three broker text encodings.
//!
//! All three forms parse to the same canonical (underlying, kind, strike,
//! expiration) tuple:
//!
//! - space form: `AAPL 01/28/2022 140.00 P` (bare `AAPL` for stock)
//! - compact form: `AAPL_220128P140` (strike trailing zeros stripped)
//! - OCC form: `AAPL  220128P00140000` (root space-padded to 6, strike x1000
//!   zero-padded to 8, 21 chars total)

use crate::domain::{Decimal, Ticker};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Call/put marker. `Auto` stands in when the feed omits the contract kind
/// (assignment, exercise, and expiry rows); it matches either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionKind {
    Call,
    Put,
    Auto,
}

impl OptionKind {
    fn code(&self) -> char {
        match self {
            OptionKind::Call => 'C',
            OptionKind::Put => 'P',
            OptionKind::Auto => 'A',
        }
    }

    fn from_code(c: char) -> Option<OptionKind> {
        match c {
            'C' => Some(OptionKind::Call),
            'P' => Some(OptionKind::Put),
            'A' => Some(OptionKind::Auto),
            _ => None,
        }
    }
}

/// An option contract: kind, strike, expiration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionContract {
    pub kind: OptionKind,
    pub strike: Decimal,
    pub expiration: NaiveDate,
}

/// Canonical instrument symbol: an underlying ticker plus an optional
/// option contract. Plain equality is strict; use [`Symbol::matches`] for the
/// wildcard-tolerant comparison the matching engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: Ticker,
    pub contract: Option<OptionContract>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("empty symbol text")]
    Empty,
    #[error("malformed symbol text: {0}")]
    Malformed(String),
    #[error("bad expiration date in symbol: {0}")]
    BadDate(String),
    #[error("bad strike in symbol: {0}")]
    BadStrike(String),
}

impl Symbol {
    pub fn stock(ticker: Ticker) -> Self {
        Symbol {
            ticker,
            contract: None,
        }
    }

    pub fn option(ticker: Ticker, kind: OptionKind, strike: Decimal, expiration: NaiveDate) -> Self {
        Symbol {
            ticker,
            contract: Some(OptionContract {
                kind,
                strike,
                expiration,
            }),
        }
    }

    /// Contract with an unknown call/put kind, for feeds that omit it.
    pub fn auto(ticker: Ticker, strike: Decimal, expiration: NaiveDate) -> Self {
        Self::option(ticker, OptionKind::Auto, strike, expiration)
    }

    pub fn is_option(&self) -> bool {
        self.contract.is_some()
    }

    /// Shares moved per unit quantity: 100 for option contracts, 1 for stock.
    pub fn share_multiplier(&self) -> Decimal {
        if self.is_option() {
            Decimal::contract_multiplier()
        } else {
            Decimal::one()
        }
    }

    /// Wildcard-tolerant equality: underlying, strike, and expiration must
    /// match; kinds match when equal or when either side is `Auto`.
    pub fn matches(&self, other: &Symbol) -> bool {
        if self.ticker != other.ticker {
            return false;
        }
        match (&self.contract, &other.contract) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.strike == b.strike
                    && a.expiration == b.expiration
                    && (a.kind == b.kind
                        || a.kind == OptionKind::Auto
                        || b.kind == OptionKind::Auto)
            }
            _ => false,
        }
    }

    /// Parse any of the three encodings.
    pub fn parse(text: &str) -> Result<Symbol, SymbolError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SymbolError::Empty);
        }
        // OCC first: its space-padded root would otherwise read as the
        // space-separated form
        if is_occ_shaped(text) {
            return Self::parse_occ_form(text);
        }
        if text.contains(' ') {
            return Self::parse_space_form(text);
        }
        if text.contains('_') {
            return Self::parse_compact_form(text);
        }
        Ok(Symbol::stock(Ticker::new(text)))
    }

    fn parse_space_form(text: &str) -> Result<Symbol, SymbolError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            [ticker] => Ok(Symbol::stock(Ticker::new(ticker))),
            [ticker, date, strike, kind] => {
                let expiration = NaiveDate::parse_from_str(date, "%m/%d/%Y")
                    .map_err(|_| SymbolError::BadDate(date.to_string()))?;
                let strike = Decimal::from_str_canonical(strike)
                    .map_err(|_| SymbolError::BadStrike(strike.to_string()))?;
                let kind = single_char(kind)
                    .and_then(OptionKind::from_code)
                    .ok_or_else(|| SymbolError::Malformed(text.to_string()))?;
                Ok(Symbol::option(Ticker::new(ticker), kind, strike, expiration))
            }
            _ => Err(SymbolError::Malformed(text.to_string())),
        }
    }

    fn parse_compact_form(text: &str) -> Result<Symbol, SymbolError> {
        let (ticker, rest) = text
            .split_once('_')
            .ok_or_else(|| SymbolError::Malformed(text.to_string()))?;
        if !rest.is_ascii() || rest.len() < 8 {
            return Err(SymbolError::Malformed(text.to_string()));
        }
        let (date_part, rest) = rest.split_at(6);
        let expiration = parse_yymmdd(date_part)
            .ok_or_else(|| SymbolError::BadDate(date_part.to_string()))?;
        let mut chars = rest.chars();
        let kind = chars
            .next()
            .and_then(OptionKind::from_code)
            .ok_or_else(|| SymbolError::Malformed(text.to_string()))?;
        let strike_text: String = chars.collect();
        let strike = Decimal::from_str_canonical(&strike_text)
            .map_err(|_| SymbolError::BadStrike(strike_text.clone()))?;
        Ok(Symbol::option(Ticker::new(ticker), kind, strike, expiration))
    }

    fn parse_occ_form(text: &str) -> Result<Symbol, SymbolError> {
        let root = text[..6].trim_end();
        if root.is_empty() {
            return Err(SymbolError::Malformed(text.to_string()));
        }
        let expiration = parse_yymmdd(&text[6..12])
            .ok_or_else(|| SymbolError::BadDate(text[6..12].to_string()))?;
        let kind = text[12..13]
            .chars()
            .next()
            .and_then(OptionKind::from_code)
            .ok_or_else(|| SymbolError::Malformed(text.to_string()))?;
        let thousandths: i64 = text[13..21]
            .parse()
            .map_err(|_| SymbolError::BadStrike(text[13..21].to_string()))?;
        let strike = Decimal::from_i64(thousandths) / Decimal::from_i64(1000);
        Ok(Symbol::option(Ticker::new(root), kind, strike, expiration))
    }

    /// Space form: `AAPL 01/28/2022 140.00 P`, strike printed to cents.
    pub fn to_space_string(&self) -> String {
        match &self.contract {
            None => self.ticker.as_str().to_string(),
            Some(c) => {
                let mut strike = c.strike.inner();
                strike.rescale(2);
                format!(
                    "{} {} {} {}",
                    self.ticker,
                    c.expiration.format("%m/%d/%Y"),
                    strike,
                    c.kind.code()
                )
            }
        }
    }

    /// Compact form: `AAPL_220128P140`, strike trailing zeros stripped.
    /// This is the canonical key for positions and quote lookups.
    pub fn to_compact_string(&self) -> String {
        match &self.contract {
            None => self.ticker.as_str().to_string(),
            Some(c) => format!(
                "{}_{}{}{}",
                self.ticker,
                c.expiration.format("%y%m%d"),
                c.kind.code(),
                c.strike.to_canonical_string()
            ),
        }
    }

    /// OCC 21-character form. None for stock or when the kind is unknown.
    pub fn to_occ_string(&self) -> Option<String> {
        let c = self.contract.as_ref()?;
        if c.kind == OptionKind::Auto {
            return None;
        }
        use rust_decimal::prelude::ToPrimitive;
        let thousandths = (c.strike * Decimal::from_i64(1000)).inner().to_i64()?;
        Some(format!(
            "{:<6}{}{}{:08}",
            self.ticker.as_str(),
            c.expiration.format("%y%m%d"),
            c.kind.code(),
            thousandths
        ))
    }
}

fn is_occ_shaped(text: &str) -> bool {
    if !text.is_ascii() || text.len() != 21 {
        return false;
    }
    let bytes = text.as_bytes();
    bytes[6..12].iter().all(|b| b.is_ascii_digit())
        && matches!(bytes[12], b'C' | b'P')
        && bytes[13..21].iter().all(|b| b.is_ascii_digit())
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn parse_yymmdd(s: &str) -> Option<NaiveDate> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = s[..2].parse().ok()?;
    let mm: u32 = s[2..4].parse().ok()?;
    let dd: u32 = s[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_compact_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_parse_stock() {
        let s = Symbol::parse("AAPL").unwrap();
        assert_eq!(s.ticker.as_str(), "AAPL");
        assert!(!s.is_option());
    }

    #[test]
    fn test_parse_space_form() {
        let s = Symbol::parse("AAPL 01/28/2022 140.00 P").unwrap();
        let c = s.contract.as_ref().unwrap();
        assert_eq!(s.ticker.as_str(), "AAPL");
        assert_eq!(c.kind, OptionKind::Put);
        assert_eq!(c.strike, dec("140"));
        assert_eq!(c.expiration, NaiveDate::from_ymd_opt(2022, 1, 28).unwrap());
    }

    #[test]
    fn test_parse_compact_form() {
        let s = Symbol::parse("SPY_220204P436").unwrap();
        let c = s.contract.as_ref().unwrap();
        assert_eq!(s.ticker.as_str(), "SPY");
        assert_eq!(c.kind, OptionKind::Put);
        assert_eq!(c.strike, dec("436"));
        assert_eq!(c.expiration, NaiveDate::from_ymd_opt(2022, 2, 4).unwrap());
    }

    #[test]
    fn test_parse_occ_form() {
        let s = Symbol::parse("AAPL  220128C00140000").unwrap();
        let c = s.contract.as_ref().unwrap();
        assert_eq!(s.ticker.as_str(), "AAPL");
        assert_eq!(c.kind, OptionKind::Call);
        assert_eq!(c.strike, dec("140"));
    }

    #[test]
    fn test_parse_occ_fractional_strike() {
        let s = Symbol::parse("TSLA  220218P00902500").unwrap();
        assert_eq!(s.contract.as_ref().unwrap().strike, dec("902.5"));
    }

    #[test]
    fn test_roundtrip_all_encodings() {
        let original = Symbol::option(
            Ticker::new("AAPL"),
            OptionKind::Put,
            dec("140"),
            NaiveDate::from_ymd_opt(2022, 1, 28).unwrap(),
        );

        let space = original.to_space_string();
        assert_eq!(space, "AAPL 01/28/2022 140.00 P");
        assert_eq!(Symbol::parse(&space).unwrap(), original);

        let compact = original.to_compact_string();
        assert_eq!(compact, "AAPL_220128P140");
        assert_eq!(Symbol::parse(&compact).unwrap(), original);

        let occ = original.to_occ_string().unwrap();
        assert_eq!(occ, "AAPL  220128P00140000");
        assert_eq!(occ.len(), 21);
        assert_eq!(Symbol::parse(&occ).unwrap(), original);
    }

    #[test]
    fn test_compact_form_strips_strike_zeros() {
        let s = Symbol::option(
            Ticker::new("TSLA"),
            OptionKind::Call,
            dec("902.50"),
            NaiveDate::from_ymd_opt(2022, 2, 18).unwrap(),
        );
        assert_eq!(s.to_compact_string(), "TSLA_220218C902.5");
    }

    #[test]
    fn test_auto_matches_either_kind() {
        let exp = NaiveDate::from_ymd_opt(2022, 1, 28).unwrap();
        let put = Symbol::option(Ticker::new("AAPL"), OptionKind::Put, dec("140"), exp);
        let call = Symbol::option(Ticker::new("AAPL"), OptionKind::Call, dec("140"), exp);
        let auto = Symbol::auto(Ticker::new("AAPL"), dec("140"), exp);

        assert!(auto.matches(&put));
        assert!(auto.matches(&call));
        assert!(put.matches(&auto));
        assert!(!put.matches(&call));
        assert_ne!(auto, put);
    }

    #[test]
    fn test_mismatched_strike_or_expiry() {
        let exp = NaiveDate::from_ymd_opt(2022, 1, 28).unwrap();
        let p140 = Symbol::option(Ticker::new("AAPL"), OptionKind::Put, dec("140"), exp);
        let p135 = Symbol::option(Ticker::new("AAPL"), OptionKind::Put, dec("135"), exp);
        assert!(!p140.matches(&p135));

        let stock = Symbol::stock(Ticker::new("AAPL"));
        assert!(!p140.matches(&stock));
        assert!(stock.matches(&Symbol::stock(Ticker::new("AAPL"))));
    }

    #[test]
    fn test_auto_has_no_occ_form() {
        let exp = NaiveDate::from_ymd_opt(2022, 1, 28).unwrap();
        let auto = Symbol::auto(Ticker::new("AAPL"), dec("140"), exp);
        assert!(auto.to_occ_string().is_none());
    }

    #[test]
    fn test_malformed_inputs() {
        assert_eq!(Symbol::parse(""), Err(SymbolError::Empty));
        assert!(matches!(
            Symbol::parse("AAPL 2022-01-28 140.00 P"),
            Err(SymbolError::BadDate(_))
        ));
        assert!(matches!(
            Symbol::parse("AAPL 01/28/2022 140.00 X"),
            Err(SymbolError::Malformed(_))
        ));
    }
}
