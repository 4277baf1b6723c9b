use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::transactions::parse_account;
use super::AppState;
use crate::domain::Ticker;
use crate::engine::TransactionGroup;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsQuery {
    pub account: String,
    pub ticker: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsResponse {
    pub groups: Vec<GroupDto>,
    pub completed: usize,
    pub incomplete: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDto {
    pub underlying: String,
    pub account: String,
    pub completed: bool,
    pub chains: Vec<Vec<ChainTxDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTxDto {
    pub date: String,
    pub symbol: String,
    pub action: String,
    pub quantity: String,
    pub amount: String,
}

fn group_to_dto(group: &TransactionGroup) -> GroupDto {
    let chains = group
        .chains
        .iter()
        .map(|chain| {
            std::iter::once(&chain.opening)
                .chain(chain.closings.iter())
                .map(|tx| ChainTxDto {
                    date: tx.date.format("%Y-%m-%d").to_string(),
                    symbol: tx
                        .symbol
                        .as_ref()
                        .map(|s| s.to_compact_string())
                        .unwrap_or_default(),
                    action: tx.action.as_str().to_string(),
                    quantity: tx.quantity.to_canonical_string(),
                    amount: tx.amount.to_canonical_string(),
                })
                .collect()
        })
        .collect();
    let valuation = group.valuation.as_ref();
    GroupDto {
        underlying: group.underlying.as_str().to_string(),
        account: group.account.as_str().to_string(),
        completed: group.completed(),
        chains,
        total: valuation.map(|v| v.total.to_canonical_string()),
        cost: valuation.map(|v| v.cost.to_canonical_string()),
        profit: valuation.map(|v| v.profit.to_canonical_string()),
        duration_days: valuation.map(|v| v.duration_days),
        roi: valuation.and_then(|v| v.roi),
    }
}

fn groups_response(groups: &[TransactionGroup]) -> GroupsResponse {
    let completed = groups.iter().filter(|g| g.completed()).count();
    GroupsResponse {
        completed,
        incomplete: groups.len() - completed,
        groups: groups.iter().map(group_to_dto).collect(),
    }
}

/// Previously assembled groups, straight from the store.
pub async fn list_groups(
    Query(params): Query<GroupsQuery>,
    State(state): State<AppState>,
) -> Result<Json<GroupsResponse>, AppError> {
    let account = parse_account(&params.account)?;
    let ticker = Ticker::new(&params.ticker);
    let groups = state.repo.query_groups(&account, &ticker).await?;
    Ok(Json(groups_response(&groups)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleRequest {
    pub account: String,
    pub ticker: String,
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleResponse {
    #[serde(flatten)]
    pub groups: GroupsResponse,
    pub created: usize,
    pub updated: usize,
    pub deleted_incomplete: u64,
}

/// Run assembly for one (account, ticker), optionally persisting.
pub async fn assemble_groups(
    State(state): State<AppState>,
    Json(request): Json<AssembleRequest>,
) -> Result<Json<AssembleResponse>, AppError> {
    let account = parse_account(&request.account)?;
    let ticker = Ticker::new(&request.ticker);
    let today = chrono::Utc::now().date_naive();

    let outcome = state
        .assembler
        .group_transactions(&account, &ticker, request.save, today)
        .await?;

    Ok(Json(AssembleResponse {
        groups: groups_response(&outcome.groups),
        created: outcome.created,
        updated: outcome.updated,
        deleted_incomplete: outcome.deleted_incomplete,
    }))
}
