//! Checkpoint transition handlers

use crate::api::rest::extract::{parse_checkpoint_number, parse_program_id, CallerActor};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use csr_checkpoints::AcknowledgeOutcome;
use csr_types::{CheckpointView, NotesUpdate, TriggerEligibility};

/// Whether a checkpoint can be triggered now
pub async fn can_trigger(
    State(state): State<AppState>,
    Path((id, number)): Path<(String, String)>,
) -> ApiResult<Json<TriggerEligibility>> {
    let program_id = parse_program_id(&id)?;
    let number = parse_checkpoint_number(&number)?;
    Ok(Json(state.service.can_trigger(&program_id, number).await))
}

/// Trigger a checkpoint (admin)
pub async fn trigger_checkpoint(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path((id, number)): Path<(String, String)>,
) -> ApiResult<Json<CheckpointView>> {
    let program_id = parse_program_id(&id)?;
    let number = parse_checkpoint_number(&number)?;
    let view = state.service.trigger(&program_id, number, &actor).await?;
    Ok(Json(view))
}

/// Acknowledge a checkpoint (sponsor owner)
pub async fn acknowledge_checkpoint(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path((id, number)): Path<(String, String)>,
) -> ApiResult<Json<AcknowledgeOutcome>> {
    let program_id = parse_program_id(&id)?;
    let number = parse_checkpoint_number(&number)?;
    let outcome = state.service.acknowledge(&program_id, number, &actor).await?;
    Ok(Json(outcome))
}

/// Update checkpoint notes (admin)
pub async fn update_notes(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path((id, number)): Path<(String, String)>,
    Json(update): Json<NotesUpdate>,
) -> ApiResult<Json<CheckpointView>> {
    let program_id = parse_program_id(&id)?;
    let number = parse_checkpoint_number(&number)?;
    let view = state
        .service
        .update_notes(&program_id, number, update, &actor)
        .await?;
    Ok(Json(view))
}
