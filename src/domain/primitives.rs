//! Domain primitives: TxId, Account, Ticker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque transaction identifier.
///
/// Assigned at creation; synthetic merge results and slice fragments mint
/// fresh ids so lineage can point back at the rows they replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub Uuid);

impl TxId {
    pub fn generate() -> Self {
        TxId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TxId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s).map(TxId)
    }
}

/// Brokerage account identifier (last four digits, as brokers print it).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account(pub String);

impl Account {
    /// Normalize a full account number to its last-four form.
    pub fn new(raw: &str) -> Self {
        let tail = if raw.len() > 4 {
            &raw[raw.len() - 4..]
        } else {
            raw
        };
        Account(tail.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Underlying ticker symbol (e.g. "AAPL", "SPY").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticker(pub String);

impl Ticker {
    pub fn new(ticker: &str) -> Self {
        Ticker(ticker.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_keeps_last_four() {
        assert_eq!(Account::new("123456789").as_str(), "6789");
        assert_eq!(Account::new("6789").as_str(), "6789");
    }

    #[test]
    fn test_ticker_normalizes() {
        assert_eq!(Ticker::new(" aapl ").as_str(), "AAPL");
    }

    #[test]
    fn test_txid_roundtrip() {
        let id = TxId::generate();
        let parsed: TxId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
