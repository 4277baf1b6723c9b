//! Quote prefetching with a cache-through and last-known fallback.

use crate::datasource::QuoteProvider;
use crate::db::Repository;
use crate::engine::QuoteBook;
use chrono::{Datelike, NaiveDate, Weekday};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Fetches prices through the provider, caches them per trading day, and
/// falls back to the last cached quote when the provider fails. Total
/// failure yields no entry: valuation then prices the position at zero.
pub struct QuoteService {
    provider: Arc<dyn QuoteProvider>,
    repo: Arc<Repository>,
}

impl QuoteService {
    pub fn new(provider: Arc<dyn QuoteProvider>, repo: Arc<Repository>) -> Self {
        Self { provider, repo }
    }

    /// Normalize a calendar day to a trading day: weekends map to the
    /// preceding Friday.
    pub fn trading_day(day: NaiveDate) -> NaiveDate {
        match day.weekday() {
            Weekday::Sat => day - chrono::Duration::days(1),
            Weekday::Sun => day - chrono::Duration::days(2),
            _ => day,
        }
    }

    /// Build a quote book for the given compact symbols as of `day`.
    pub async fn quote_book(&self, symbols: &BTreeSet<String>, day: NaiveDate) -> QuoteBook {
        let day = Self::trading_day(day);
        let lookups = symbols
            .iter()
            .map(|symbol| self.lookup(symbol.clone(), day));
        let mut book = QuoteBook::new();
        for result in join_all(lookups).await.into_iter().flatten() {
            let (symbol, price) = result;
            book.insert(symbol, price);
        }
        book
    }

    async fn lookup(
        &self,
        symbol: String,
        day: NaiveDate,
    ) -> Option<(String, crate::domain::Decimal)> {
        match self.provider.get_price(&symbol, day).await {
            Ok(price) => {
                if let Err(e) = self.repo.upsert_quote(&symbol, day, price).await {
                    warn!(symbol = %symbol, error = %e, "failed to cache quote");
                }
                Some((symbol, price))
            }
            Err(fetch_err) => {
                warn!(symbol = %symbol, error = %fetch_err, "quote fetch failed, trying cache");
                match self.repo.latest_quote_at_or_before(&symbol, day).await {
                    Ok(Some((cached_day, price))) => {
                        warn!(symbol = %symbol, %cached_day, "using stale cached quote");
                        Some((symbol, price))
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "quote cache lookup failed");
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockQuoteProvider;
    use crate::db::migrations::init_db;
    use crate::domain::Decimal;
    use tempfile::TempDir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    async fn setup(provider: MockQuoteProvider) -> (QuoteService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        (QuoteService::new(Arc::new(provider), repo), temp_dir)
    }

    #[test]
    fn test_trading_day_normalization() {
        let saturday = NaiveDate::from_ymd_opt(2022, 1, 29).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2022, 1, 30).unwrap();
        let friday = NaiveDate::from_ymd_opt(2022, 1, 28).unwrap();
        let wednesday = NaiveDate::from_ymd_opt(2022, 1, 26).unwrap();

        assert_eq!(QuoteService::trading_day(saturday), friday);
        assert_eq!(QuoteService::trading_day(sunday), friday);
        assert_eq!(QuoteService::trading_day(wednesday), wednesday);
    }

    #[tokio::test]
    async fn test_quote_book_fetches_and_caches() {
        let provider = MockQuoteProvider::new().with_price("AAPL", dec("161.62"));
        let (service, _temp) = setup(provider).await;
        let day = NaiveDate::from_ymd_opt(2022, 1, 26).unwrap();

        let symbols: BTreeSet<String> = ["AAPL".to_string()].into_iter().collect();
        let book = service.quote_book(&symbols, day).await;
        assert_eq!(book.price("AAPL"), Some(dec("161.62")));

        // cached for later fallback
        let cached = service
            .repo
            .latest_quote_at_or_before("AAPL", day)
            .await
            .unwrap();
        assert_eq!(cached, Some((day, dec("161.62"))));
    }

    #[tokio::test]
    async fn test_missing_symbol_falls_back_to_cache_then_nothing() {
        let (service, _temp) = setup(MockQuoteProvider::new()).await;
        let day = NaiveDate::from_ymd_opt(2022, 1, 26).unwrap();

        // no cache yet: symbol absent from the book
        let symbols: BTreeSet<String> = ["MSFT".to_string()].into_iter().collect();
        let book = service.quote_book(&symbols, day).await;
        assert_eq!(book.price("MSFT"), None);

        // with a stale cache entry the book falls back to it
        service
            .repo
            .upsert_quote("MSFT", day - chrono::Duration::days(3), dec("300"))
            .await
            .unwrap();
        let book = service.quote_book(&symbols, day).await;
        assert_eq!(book.price("MSFT"), Some(dec("300")));
    }
}
