//! Sponsor and user registration handlers plus notification feeds

use crate::api::rest::extract::{parse_sponsor_id, CallerActor};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use csr_types::{Notification, NotificationPreferences, Sponsor, SponsorId, User, UserId};
use serde::Deserialize;

/// Register sponsor request
#[derive(Debug, Deserialize)]
pub struct RegisterSponsorRequest {
    /// Existing sponsor to replace; a new ID is generated when absent
    #[serde(default)]
    pub id: Option<SponsorId>,
    pub user_id: UserId,
    pub organization_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
}

/// Feed query params
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Create or replace a sponsor (admin)
pub async fn register_sponsor(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Json(request): Json<RegisterSponsorRequest>,
) -> ApiResult<(StatusCode, Json<Sponsor>)> {
    let mut sponsor = Sponsor::new(request.user_id, request.organization_name)
        .with_preferences(request.notification_preferences);
    sponsor.email = request.email;
    if let Some(id) = request.id {
        sponsor.id = id;
    }

    let sponsor = state.directory.register_sponsor(sponsor, &actor).await?;
    Ok((StatusCode::CREATED, Json(sponsor)))
}

/// Create or replace a user account (admin)
pub async fn register_user(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Json(user): Json<User>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.directory.register_user(user, &actor).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// In-app notification feed of a sponsor
pub async fn sponsor_notifications(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let sponsor_id = parse_sponsor_id(&id)?;
    let feed = state
        .directory
        .sponsor_feed(&sponsor_id, &actor, query.limit)
        .await?;
    Ok(Json(feed))
}

/// In-app notification feed of the calling admin
pub async fn admin_notifications(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.directory.admin_feed(&actor, query.limit).await?))
}
