//! Delivery gateways used by the daemon
//!
//! Realtime pushes go through an in-process broadcast hub that the SSE
//! endpoint subscribes to. Email goes to an HTTP relay when one is
//! configured and is only logged otherwise.

use async_trait::async_trait;
use csr_checkpoints::{DeliveryError, DeliveryGateway};
use csr_types::{RealtimeEvent, UserId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// A realtime event addressed to one user
#[derive(Debug, Clone)]
pub struct UserEvent {
    pub user_id: UserId,
    pub event: RealtimeEvent,
}

/// Fan-out point for realtime events
#[derive(Debug, Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<UserEvent>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; returns how many subscribers received it
    pub fn publish(&self, user_id: &UserId, event: &RealtimeEvent) -> usize {
        // No subscribers means nobody is connected; the record stays in the feed.
        self.tx
            .send(UserEvent {
                user_id: user_id.clone(),
                event: event.clone(),
            })
            .unwrap_or(0)
    }
}

/// Outbound email transport
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Email sender that only writes a log line
#[derive(Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), DeliveryError> {
        tracing::info!(to = %to, subject = %subject, "Email (log only)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Email sender that POSTs JSON messages to a relay service
#[derive(Debug, Clone)]
pub struct HttpEmailRelay {
    client: reqwest::Client,
    url: String,
}

impl HttpEmailRelay {
    pub fn new(url: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailRelay {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RelayMessage { to, subject, body })
            .send()
            .await
            .map_err(|e| DeliveryError::Email(e.to_string()))?;

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| DeliveryError::Email(e.to_string()))
    }
}

/// The daemon's [`DeliveryGateway`]: realtime hub plus an email sender
pub struct DaemonGateway {
    hub: RealtimeHub,
    email: Arc<dyn EmailSender>,
}

impl DaemonGateway {
    pub fn new(hub: RealtimeHub, email: Arc<dyn EmailSender>) -> Self {
        Self { hub, email }
    }
}

#[async_trait]
impl DeliveryGateway for DaemonGateway {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.email.send(to, subject, body).await
    }

    async fn push_to_user(
        &self,
        user_id: &UserId,
        event: &RealtimeEvent,
    ) -> Result<(), DeliveryError> {
        let receivers = self.hub.publish(user_id, event);
        tracing::debug!(user_id = %user_id, receivers, "Realtime event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use csr_types::{NotificationId, Severity};

    fn event() -> RealtimeEvent {
        RealtimeEvent {
            notification_id: NotificationId::generate(),
            kind: "checkpoint_ready".into(),
            title: "Checkpoint 1 ready".into(),
            message: "Review".into(),
            link: None,
            severity: Severity::Info,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_hub_delivers_to_subscribers() {
        let hub = RealtimeHub::new(8);
        let mut rx = hub.subscribe();
        let gateway = DaemonGateway::new(hub, Arc::new(LogEmailSender));

        gateway
            .push_to_user(&UserId::from("owner"), &event())
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id.as_str(), "owner");
        assert_eq!(received.event.kind, "checkpoint_ready");
    }

    #[tokio::test]
    async fn test_push_without_subscribers_is_ok() {
        let gateway = DaemonGateway::new(RealtimeHub::new(8), Arc::new(LogEmailSender));
        assert!(gateway
            .push_to_user(&UserId::from("nobody"), &event())
            .await
            .is_ok());
        assert!(gateway.send_email("a@example.org", "s", "b").await.is_ok());
    }
}
