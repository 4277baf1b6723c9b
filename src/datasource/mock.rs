//! Mock quote provider for tests: fixed prices, no network.

use super::{QuoteError, QuoteProvider};
use crate::domain::Decimal;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Quote provider that serves preset prices.
#[derive(Debug, Clone, Default)]
pub struct MockQuoteProvider {
    prices: HashMap<String, Decimal>,
}

impl MockQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset a price for a compact symbol string.
    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }
}

#[async_trait]
impl QuoteProvider for MockQuoteProvider {
    async fn get_price(&self, symbol: &str, _as_of: NaiveDate) -> Result<Decimal, QuoteError> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| QuoteError::Unavailable(symbol.to_string()))
    }
}
