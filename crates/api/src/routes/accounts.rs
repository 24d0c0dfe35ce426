//! Ledger account lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::AccountId;
use history::HistoryStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::transfers::AppState;

#[derive(Serialize)]
pub struct AccountResponse {
    pub account: AccountId,
    pub balance: i64,
}

/// GET /accounts/{account} — current balance in the ledger.
#[tracing::instrument(skip(state))]
pub async fn get<S: HistoryStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(account): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = AccountId::new(account);
    let balance = state
        .ledger
        .balance(&account)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Account {account} not found")))?;

    Ok(Json(AccountResponse { account, balance }))
}
