//! HTTP quote provider.

use super::{QuoteError, QuoteProvider};
use crate::domain::Decimal;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Quote provider backed by a market-data REST endpoint.
///
/// Expects `GET {base_url}/v1/quote?symbol=...&date=YYYY-MM-DD` returning
/// `{"symbol": ..., "price": <number>}`. Rate limits and server errors are
/// retried with exponential backoff; client errors are permanent.
#[derive(Debug, Clone)]
pub struct HttpQuoteProvider {
    client: Client,
    base_url: String,
}

impl HttpQuoteProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn fetch(&self, symbol: &str, as_of: NaiveDate) -> Result<serde_json::Value, QuoteError> {
        let url = format!("{}/v1/quote", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&[("symbol", symbol), ("date", &as_of.to_string())])
                .send()
                .await
                .map_err(|e| backoff::Error::transient(QuoteError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(QuoteError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(QuoteError::Http {
                    status: status.as_u16(),
                    message: "server error".to_string(),
                }));
            }
            if status == 404 {
                return Err(backoff::Error::permanent(QuoteError::Unavailable(
                    symbol.to_string(),
                )));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(QuoteError::Http {
                    status: status.as_u16(),
                    message: "client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(QuoteError::Parse(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl QuoteProvider for HttpQuoteProvider {
    async fn get_price(&self, symbol: &str, as_of: NaiveDate) -> Result<Decimal, QuoteError> {
        debug!(symbol, %as_of, "fetching quote");
        let body = self.fetch(symbol, as_of).await?;
        let price = body
            .get("price")
            .and_then(|p| p.as_f64())
            .ok_or_else(|| QuoteError::Parse("response missing price".to_string()))?;
        Decimal::from_str_canonical(&price.to_string())
            .map_err(|e| QuoteError::Parse(e.to_string()))
    }
}
