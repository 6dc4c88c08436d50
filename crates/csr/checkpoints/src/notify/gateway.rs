//! Outbound delivery port

use async_trait::async_trait;
use csr_types::{RealtimeEvent, UserId};
use thiserror::Error;

/// Delivery failures reported by a gateway
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("Delivery channel unavailable: {0}")]
    Unavailable(String),
}

/// External delivery mechanisms used by the dispatcher.
///
/// Implementations must not retry internally; retries belong to the
/// delivery worker so that attempts are counted against the record.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Send one email to one address
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;

    /// Push an event to a connected user
    async fn push_to_user(&self, user_id: &UserId, event: &RealtimeEvent)
        -> Result<(), DeliveryError>;
}
