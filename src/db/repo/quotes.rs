//! Quote cache: one price per (symbol, trading day).

use super::{parse_decimal, Repository};
use crate::domain::Decimal;
use chrono::NaiveDate;
use sqlx::Row;

impl Repository {
    /// Store (or refresh) the price of a symbol for a trading day.
    pub async fn upsert_quote(
        &self,
        symbol: &str,
        day: NaiveDate,
        price: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO quotes (symbol, day, price)
            VALUES (?, ?, ?)
            ON CONFLICT(symbol, day) DO UPDATE SET price = excluded.price
            "#,
        )
        .bind(symbol)
        .bind(day.format("%Y-%m-%d").to_string())
        .bind(price.to_canonical_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent cached price at or before `day`, if any.
    pub async fn latest_quote_at_or_before(
        &self,
        symbol: &str,
        day: NaiveDate,
    ) -> Result<Option<(NaiveDate, Decimal)>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT day, price FROM quotes
            WHERE symbol = ? AND day <= ?
            ORDER BY day DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(day.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let day_text: String = r.get("day");
            let price_text: String = r.get("price");
            let day = NaiveDate::parse_from_str(&day_text, "%Y-%m-%d").unwrap_or_default();
            (day, parse_decimal(&price_text, "price"))
        }))
    }
}
