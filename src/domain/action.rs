//! Transaction actions and the broker-synonym canonicalization table.

use serde::{Deserialize, Serialize};

/// The economic kind of a transaction.
///
/// Quantity is always stored as an absolute value; the direction of the cash
/// and share effect comes from the action alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Buy to open.
    Bto,
    /// Sell to open.
    Sto,
    /// Sell to close.
    Stc,
    /// Buy to close.
    Btc,
    /// Option expired worthless.
    Expired,
    /// Short option assigned.
    Assigned,
    /// Long option exercised.
    Exercised,
    /// Corporate action: split source position (seeds a group).
    Split,
    /// Corporate action: shares removed by a split.
    SplitFrom,
    /// Corporate action: shares received from a split.
    SplitTo,
    Transfer,
    Interest,
    Dividend,
    Journal,
    /// Unrecognized broker action text.
    Invalid,
}

/// Broker action text, canonicalized. One row per synonym; extend here when a
/// new export format shows up.
const SYNONYMS: &[(&str, Action)] = &[
    ("BTO", Action::Bto),
    ("BUY", Action::Bto),
    ("BUY TO OPEN", Action::Bto),
    ("STO", Action::Sto),
    ("SELL TO OPEN", Action::Sto),
    ("STC", Action::Stc),
    ("SELL", Action::Stc),
    ("SELL TO CLOSE", Action::Stc),
    ("BTC", Action::Btc),
    ("BUY TO CLOSE", Action::Btc),
    ("EXPIRED", Action::Expired),
    ("ASSIGNED", Action::Assigned),
    ("EXERCISE", Action::Exercised),
    ("EXCHANGE OR EXERCISE", Action::Exercised),
    ("SPLIT", Action::Split),
    ("SPLIT_FROM", Action::SplitFrom),
    ("SPLIT_TO", Action::SplitTo),
    ("TRANSFER", Action::Transfer),
    ("MONEYLINK TRANSFER", Action::Transfer),
    ("INTEREST", Action::Interest),
    ("BANK INTEREST", Action::Interest),
    ("DIVIDEND", Action::Dividend),
    ("CASH DIVIDEND", Action::Dividend),
    ("PR YR CASH DIV", Action::Dividend),
    ("JOURNAL", Action::Journal),
    ("JOURNALED SHARES", Action::Journal),
];

impl Action {
    /// Canonicalize broker action text. Unknown text maps to `Invalid`.
    pub fn parse(text: &str) -> Action {
        let needle = text.trim().to_uppercase();
        SYNONYMS
            .iter()
            .find(|(synonym, _)| *synonym == needle)
            .map(|(_, action)| *action)
            .unwrap_or(Action::Invalid)
    }

    /// Canonical storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Bto => "BTO",
            Action::Sto => "STO",
            Action::Stc => "STC",
            Action::Btc => "BTC",
            Action::Expired => "EXPIRED",
            Action::Assigned => "ASSIGNED",
            Action::Exercised => "EXERCISE",
            Action::Split => "SPLIT",
            Action::SplitFrom => "SPLIT_FROM",
            Action::SplitTo => "SPLIT_TO",
            Action::Transfer => "TRANSFER",
            Action::Interest => "INTEREST",
            Action::Dividend => "DIVIDEND",
            Action::Journal => "JOURNAL",
            Action::Invalid => "INVALID",
        }
    }

    /// Establishes or adds to a position.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Action::Bto | Action::Sto | Action::Split | Action::SplitTo
        )
    }

    /// Reduces or extinguishes a position.
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            Action::Stc
                | Action::Btc
                | Action::Expired
                | Action::Assigned
                | Action::Exercised
                | Action::SplitFrom
        )
    }

    /// A buy opens long, a sell opens short; residual positions are signed by
    /// this.
    pub fn opens_long(&self) -> bool {
        matches!(self, Action::Bto | Action::Split | Action::SplitTo)
    }

    /// Sign of the cash effect: sells bring cash in, buys pay cash out.
    /// Zero for actions whose cash effect is not fill-price-computed.
    pub fn cash_sign(&self) -> i32 {
        match self {
            Action::Sto | Action::Stc => 1,
            Action::Bto | Action::Btc => -1,
            _ => 0,
        }
    }

    /// Actions whose stated amount is definitionally zero or broker-computed,
    /// exempt from the quantity-price-amount reconciliation check.
    pub fn skips_verification(&self) -> bool {
        self.cash_sign() == 0
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Action::parse(s))
    }
}
