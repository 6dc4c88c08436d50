//! Program provisioning and progress handlers

use crate::api::rest::extract::{parse_program_id, CallerActor};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use csr_types::{CheckpointProgress, CheckpointView, NewProgram, Program};

/// Create a program with its five pending checkpoints
pub async fn create_program(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Json(request): Json<NewProgram>,
) -> ApiResult<(StatusCode, Json<Program>)> {
    let program = state.service.provision_program(request, &actor).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

/// List all programs
pub async fn list_programs(State(state): State<AppState>) -> ApiResult<Json<Vec<Program>>> {
    Ok(Json(state.service.programs().await?))
}

/// List the checkpoints of a program
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CheckpointView>>> {
    let program_id = parse_program_id(&id)?;
    Ok(Json(state.service.list(&program_id).await?))
}

/// Checkpoint progress summary of a program
pub async fn checkpoint_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CheckpointProgress>> {
    let program_id = parse_program_id(&id)?;
    Ok(Json(state.service.status(&program_id).await?))
}
