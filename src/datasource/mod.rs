//! Market-data abstraction for price quotes.
//!
//! The engine never talks to these directly: orchestration prefetches the
//! prices it needs into a [`crate::engine::QuoteBook`] and hands that to the
//! valuation pass.

use crate::domain::Decimal;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpQuoteProvider;
pub use mock::MockQuoteProvider;

/// Price-quote source.
///
/// Implementations must handle retry/backoff and rate limiting; callers
/// treat a failure as "no quote" and degrade to a zero valuation.
#[async_trait]
pub trait QuoteProvider: Send + Sync + fmt::Debug {
    /// Fetch the price of `symbol` (compact form, e.g. `AAPL` or
    /// `AAPL_220128P140`) as of the given trading day.
    async fn get_price(&self, symbol: &str, as_of: NaiveDate) -> Result<Decimal, QuoteError>;
}

/// Error type for quote operations.
#[derive(Debug, Clone)]
pub enum QuoteError {
    /// Network error (connection timeout, DNS failure).
    Network(String),
    /// HTTP error (5xx server error, unexpected status).
    Http { status: u16, message: String },
    /// Invalid JSON or a response missing the price.
    Parse(String),
    /// Rate limit exceeded after backoff gave up.
    RateLimited,
    /// The provider has no quote for this symbol/day.
    Unavailable(String),
}

impl fmt::Display for QuoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteError::Network(msg) => write!(f, "network error: {}", msg),
            QuoteError::Http { status, message } => {
                write!(f, "http error {}: {}", status, message)
            }
            QuoteError::Parse(msg) => write!(f, "parse error: {}", msg),
            QuoteError::RateLimited => write!(f, "rate limited"),
            QuoteError::Unavailable(symbol) => write!(f, "no quote for {}", symbol),
        }
    }
}

impl std::error::Error for QuoteError {}
