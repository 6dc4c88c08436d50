//! Realtime event streaming

use crate::api::rest::extract::CallerActor;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use csr_types::UserId;
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Stream realtime events addressed to one user via SSE
pub async fn stream_user_events(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let user_id = UserId::new(id);
    if actor.user_id != user_id && !actor.is_admin() {
        return Err(ApiError::Forbidden(
            "Cannot subscribe to another user's events".to_string(),
        ));
    }

    let rx = state.hub.subscribe();
    let stream = stream::unfold((rx, user_id), |(mut rx, user_id)| async move {
        loop {
            match rx.recv().await {
                Ok(message) if message.user_id == user_id => {
                    let json = serde_json::to_string(&message.event).unwrap_or_default();
                    let event = Event::default().event(message.event.kind.clone()).data(json);
                    return Some((Ok(event), (rx, user_id)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(user_id = %user_id, skipped, "Realtime subscriber lagged");
                    return Some((Ok(Event::default().comment("lagged")), (rx, user_id)));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
