//! Closing run handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::{RunId, VoucherId};

use crate::dto::closing::*;
use crate::{error::ApiError, AppState};

/// Creates a queued run for a period closing voucher
pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<RunResponse>), ApiError> {
    let policy = request.policy.unwrap_or(state.config.default_policy);
    let run = state
        .service
        .create_run(VoucherId::from_uuid(request.voucher_id), policy)
        .await?;
    Ok((StatusCode::CREATED, Json(RunResponse::from(&run))))
}

/// Gets a run with its unit counts
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let overview = state.service.status(RunId::from_uuid(id)).await?;
    Ok(Json(RunStatusResponse::try_from(overview)?))
}

/// Starts a queued run, or tops up a running one
pub async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let outcome = state.service.start(RunId::from_uuid(id)).await?;
    Ok(Json(outcome.into()))
}

/// Pauses a run
pub async fn pause_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PauseResponse>, ApiError> {
    let paused_units = state.service.pause(RunId::from_uuid(id)).await?;
    Ok(Json(PauseResponse {
        run_id: id,
        paused_units,
    }))
}

/// Resumes a paused run
pub async fn resume_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let outcome = state.service.resume(RunId::from_uuid(id)).await?;
    Ok(Json(outcome.into()))
}

/// Claims more units or posts a finished run
pub async fn advance_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let outcome = state.service.advance(RunId::from_uuid(id)).await?;
    Ok(Json(outcome.into()))
}
