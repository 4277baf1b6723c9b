use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::{Account, Ticker, Validity};
use crate::error::AppError;
use crate::orchestration::IngestReport;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub account: String,
    pub ticker: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionDto>,
    pub valid: usize,
    pub invalid: usize,
    pub ignored: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: String,
    pub date: String,
    pub symbol: Option<String>,
    pub action: String,
    pub quantity: String,
    pub price: String,
    pub fee: String,
    pub amount: String,
    pub validity: String,
    pub effective: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub async fn list_transactions(
    Query(params): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let account = parse_account(&params.account)?;
    let ticker = params.ticker.as_deref().map(Ticker::new);

    let rows = state
        .repo
        .query_transactions(&account, ticker.as_ref(), params.from_date, params.to_date)
        .await?;

    let mut lineage_table = crate::domain::LineageTable::new();
    for (tx, lineage) in &rows {
        lineage_table.seed(tx.id, lineage.clone());
    }

    let mut valid = 0;
    let mut invalid = 0;
    let mut ignored = 0;
    let transactions = rows
        .iter()
        .map(|(tx, _)| {
            match tx.validity {
                Validity::Valid => valid += 1,
                Validity::Invalid => invalid += 1,
                Validity::Ignored => ignored += 1,
            }
            TransactionDto {
                id: tx.id.to_string(),
                date: tx.date.format("%Y-%m-%dT%H:%M:%S").to_string(),
                symbol: tx.symbol.as_ref().map(|s| s.to_compact_string()),
                action: tx.action.as_str().to_string(),
                quantity: tx.quantity.to_canonical_string(),
                price: tx.price.to_canonical_string(),
                fee: tx.fee.to_canonical_string(),
                amount: tx.amount.to_canonical_string(),
                validity: format!("{:?}", tx.validity).to_uppercase(),
                effective: lineage_table.is_effective(tx.id),
                description: tx.description.clone(),
            }
        })
        .collect();

    Ok(Json(TransactionsResponse {
        transactions,
        valid,
        invalid,
        ignored,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub account: String,
    pub path: String,
}

pub async fn load_export(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<IngestReport>, AppError> {
    let account = parse_account(&request.account)?;
    let report = state
        .ingestor
        .ingest_file(std::path::Path::new(&request.path), &account)
        .await?;
    Ok(Json(report))
}

pub(super) fn parse_account(raw: &str) -> Result<Account, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("account is required".to_string()));
    }
    Ok(Account::new(trimmed))
}
