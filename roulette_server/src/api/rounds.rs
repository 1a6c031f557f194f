//! Round API handlers.
//!
//! # Examples
//!
//! Start and roll a round:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/roulette/start
//! ```
//!
//! Place bets on an open round:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/roulette/ROUND_UUID/place-bet \
//!   -H "Content-Type: application/json" \
//!   -d '{"bets": [{"color": "red", "amount": 100}], "user_uuid": "USER_UUID"}'
//! ```

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use roulette::{
    fairness,
    round::{DrawRecord, Round, RoundPhase, Stake},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    AppState,
    response::{ApiError, success},
};
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub bets: Vec<Stake>,
    pub user_uuid: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RoundResponse {
    #[serde(flatten)]
    pub round: Round,
    pub phase: RoundPhase,
}

impl From<Round> for RoundResponse {
    fn from(round: Round) -> Self {
        Self {
            phase: round.phase(),
            round,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DrawResponse {
    #[serde(flatten)]
    pub record: DrawRecord,
    /// Digest and stopping value recomputed from the stored seeds
    pub verified: bool,
}

/// Start a round and roll it.
///
/// Rolling settles the bets placed on the previous round. The response
/// carries the new round, its draw and outcome, and the settlement.
///
/// # Errors
///
/// - `500 Internal Server Error`: Storage failure; nothing was persisted
/// - `503 Service Unavailable`: Round start could not be announced
pub async fn play_round(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let summary = state.rounds.play_round().await?;

    metrics::rounds_started_total();
    if let Some(settlement) = &summary.settlement {
        metrics::payouts(settlement.total_paid(), settlement.payouts.len());
    }
    logging::log_round_event(
        "played",
        summary.round.sequence,
        &summary.round.external_id.to_string(),
    );

    Ok(success(StatusCode::OK, summary))
}

/// Open a round without rolling it
pub async fn start_round(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let round = state.rounds.start_round().await?;

    metrics::rounds_started_total();
    logging::log_round_event("started", round.sequence, &round.external_id.to_string());

    Ok(success(StatusCode::CREATED, RoundResponse::from(round)))
}

/// Roll an open round and settle the one before it.
///
/// # Errors
///
/// - `400 Bad Request`: Round was already rolled
/// - `404 Not Found`: Unknown round
pub async fn roll_round(
    State(state): State<AppState>,
    round_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(round_id) = round_id?;
    let summary = state.rounds.roll(round_id).await?;

    if let Some(settlement) = &summary.settlement {
        metrics::payouts(settlement.total_paid(), settlement.payouts.len());
    }
    logging::log_round_event("rolled", summary.round.sequence, &round_id.to_string());

    Ok(success(StatusCode::OK, summary))
}

/// Place one or two stakes on an open round.
///
/// # Request Body
///
/// ```json
/// {"bets": [{"color": "red", "amount": 100}], "user_uuid": "..."}
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Malformed body, round closed, bet limit exceeded
/// - `402 Payment Required`: Total stake exceeds the balance
/// - `404 Not Found`: Unknown round or user
pub async fn place_bet(
    State(state): State<AppState>,
    round_id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<PlaceBetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(round_id) = round_id?;
    let Json(request) = request?;

    let placed = state
        .rounds
        .place_bet(round_id, request.user_uuid, &request.bets)
        .await?;
    metrics::bets_placed_total(placed.bets.len());

    Ok(success(StatusCode::OK, placed))
}

pub async fn get_round(
    State(state): State<AppState>,
    round_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(round_id) = round_id?;
    let round = state.rounds.round(round_id).await?;
    Ok(success(StatusCode::OK, RoundResponse::from(round)))
}

/// Provably fair record of a rolled round, with a verification flag
pub async fn get_draw(
    State(state): State<AppState>,
    round_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(round_id) = round_id?;
    let record = state.rounds.get_draw(round_id).await?;
    let verified = fairness::verify(&record.draw);
    if !verified {
        log::error!("Stored draw for round {} fails verification", round_id);
    }
    Ok(success(StatusCode::OK, DrawResponse { record, verified }))
}
