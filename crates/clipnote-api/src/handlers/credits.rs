//! Credit balance and history handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use clipnote_models::CreditLedgerEntry;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for credit history.
#[derive(Debug, Deserialize)]
pub struct GetCreditsQuery {
    /// Maximum history entries to return (clamped to 1..=100)
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /api/credits response.
#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub plan: String,
    pub limit: u32,
    pub used: i64,
    pub remaining: i64,
    pub history: Vec<CreditLedgerEntry>,
}

/// GET /api/credits
///
/// Current-period balance plus recent ledger entries.
pub async fn get_credits(
    State(state): State<AppState>,
    Query(query): Query<GetCreditsQuery>,
    user: AuthUser,
) -> ApiResult<Json<CreditsResponse>> {
    let used = state
        .ledger
        .usage(&user.uid, user.plan)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read usage: {e}")))?;
    let remaining = state
        .ledger
        .remaining(&user.uid, user.plan)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read balance: {e}")))?;

    let limit = query.limit.unwrap_or(20).clamp(1, 100) as usize;
    let history = state
        .ledger
        .history(&user.uid, limit)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read history: {e}")))?;

    Ok(Json(CreditsResponse {
        plan: user.plan.as_str().to_string(),
        limit: user.plan.credit_limit(),
        used,
        remaining,
        history,
    }))
}
