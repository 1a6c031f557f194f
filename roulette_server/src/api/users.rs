//! User balance lookup.

use axum::{
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use super::{
    AppState,
    response::{ApiError, success},
};

/// Current balance of a user by external id
///
/// # Errors
///
/// - `404 Not Found`: Unknown user
pub async fn get_balance(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(user_id) = user_id?;
    let account = state.rounds.ledger().find_account(user_id).await?;
    Ok(success(StatusCode::OK, account))
}
