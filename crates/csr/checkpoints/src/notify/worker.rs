//! Outbox delivery worker
//!
//! Pending notification records are the outbox. The worker delivers them
//! when nudged by the dispatcher and also sweeps the table periodically, so
//! records left behind by a crash or a full nudge queue are still picked up.

use super::gateway::DeliveryGateway;
use crate::error::CheckpointResult;
use chrono::{DateTime, Utc};
use csr_store::Storage;
use csr_types::{Notification, NotificationId, NotificationStatus, RealtimeEvent, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Retry settings for outbox delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before a record is settled as failed or partial
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Fire once, never retry
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }

    /// Delay required after `attempts` failed attempts
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempts - 1).min(16);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }

    /// When a record that has failed `attempts` times may be retried
    pub fn next_attempt_after(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = chrono::Duration::from_std(self.backoff_for(attempts))
            .unwrap_or_else(|_| chrono::Duration::days(1));
        now.checked_add_signed(backoff).unwrap_or(now)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
        }
    }
}

/// Delivery worker settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub retry: RetryPolicy,
    pub sweep_interval: Duration,
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            sweep_interval: Duration::from_secs(10),
            batch_size: 50,
        }
    }
}

/// Run one delivery attempt against a record and settle its status.
///
/// Realtime pushes happen on the first attempt only. Each email address is
/// sent independently; successful ones are remembered in `delivered_to` so
/// later attempts skip them. A record left pending is scheduled for its next
/// attempt according to `policy`.
pub(crate) async fn attempt_delivery(
    gateway: &dyn DeliveryGateway,
    notification: &mut Notification,
    policy: &RetryPolicy,
) {
    if notification.attempts == 0 {
        let event = RealtimeEvent::from(&*notification);
        let mut pushed: Vec<&UserId> = Vec::new();
        for user_id in notification.recipients.iter().filter_map(|r| r.user_id.as_ref()) {
            if pushed.contains(&user_id) {
                continue;
            }
            pushed.push(user_id);
            if let Err(e) = gateway.push_to_user(user_id, &event).await {
                tracing::warn!(
                    notification_id = %notification.id,
                    user_id = %user_id,
                    error = %e,
                    "Realtime push failed"
                );
            }
        }
    }

    let subject = notification.payload.title.clone();
    let body = match &notification.payload.link {
        Some(link) => format!("{}\n\n{}", notification.payload.message, link),
        None => notification.payload.message.clone(),
    };

    for address in notification.outstanding_emails() {
        match gateway.send_email(&address, &subject, &body).await {
            Ok(()) => {
                tracing::debug!(notification_id = %notification.id, to = %address, "Email sent");
                notification.delivered_to.push(address);
            }
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    to = %address,
                    error = %e,
                    "Email delivery failed"
                );
                notification.last_error = Some(e.to_string());
            }
        }
    }

    notification.attempts += 1;
    notification.status = if notification.outstanding_emails().is_empty() {
        NotificationStatus::Delivered
    } else if notification.attempts >= policy.max_attempts {
        if notification.delivered_to.is_empty() {
            NotificationStatus::Failed
        } else {
            NotificationStatus::PartiallyDelivered
        }
    } else {
        NotificationStatus::Pending
    };

    let now = Utc::now();
    notification.next_attempt_at = match notification.status {
        NotificationStatus::Pending => Some(policy.next_attempt_after(notification.attempts, now)),
        _ => None,
    };
    notification.updated_at = now;
}

/// Background deliverer for pending notification records
pub struct DeliveryWorker {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn DeliveryGateway>,
    config: WorkerConfig,
    nudge_tx: mpsc::Sender<NotificationId>,
    running: Arc<RwLock<bool>>,
}

impl DeliveryWorker {
    /// Create a new worker and the receiving end of its nudge queue
    pub fn new(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn DeliveryGateway>,
        config: WorkerConfig,
    ) -> (Arc<Self>, mpsc::Receiver<NotificationId>) {
        let (nudge_tx, nudge_rx) = mpsc::channel(256);

        let worker = Arc::new(Self {
            storage,
            gateway,
            config,
            nudge_tx,
            running: Arc::new(RwLock::new(false)),
        });

        (worker, nudge_rx)
    }

    /// Handle for the dispatcher to announce new records
    pub fn sender(&self) -> mpsc::Sender<NotificationId> {
        self.nudge_tx.clone()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until [`DeliveryWorker::stop`] is called
    pub async fn start(self: Arc<Self>, mut nudge_rx: mpsc::Receiver<NotificationId>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(
            max_attempts = self.config.retry.max_attempts,
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Delivery worker started"
        );

        let mut ticker = interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Outbox sweep failed");
                    }
                }
                Some(id) = nudge_rx.recv() => {
                    if let Err(e) = self.deliver(&id).await {
                        tracing::error!(notification_id = %id, error = %e, "Outbox delivery failed");
                    }
                }
                else => break,
            }

            let running = self.running.read().await;
            if !*running {
                break;
            }
        }

        tracing::info!("Delivery worker stopped");
    }

    /// Stop the worker after its current iteration
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// Attempt every pending record that is due; returns how many were attempted
    pub async fn sweep(&self) -> CheckpointResult<usize> {
        let due = self
            .storage
            .list_due_notifications(Utc::now(), self.config.batch_size)
            .await?;

        let mut attempted = 0;
        for notification in due {
            let id = notification.id;
            if let Err(e) = self.process(notification).await {
                tracing::error!(notification_id = %id, error = %e, "Failed to record delivery attempt");
            }
            attempted += 1;
        }

        if attempted > 0 {
            tracing::debug!(attempted, "Outbox sweep finished");
        }
        Ok(attempted)
    }

    /// Attempt a single record if it is still pending and due.
    ///
    /// Returns the resulting status, or `None` if nothing was attempted.
    pub async fn deliver(&self, id: &NotificationId) -> CheckpointResult<Option<NotificationStatus>> {
        let Some(notification) = self.storage.get_notification(id).await? else {
            return Ok(None);
        };
        if !notification.is_due(Utc::now()) {
            return Ok(None);
        }
        self.process(notification).await.map(Some)
    }

    async fn process(&self, mut notification: Notification) -> CheckpointResult<NotificationStatus> {
        attempt_delivery(
            self.gateway.as_ref(),
            &mut notification,
            &self.config.retry,
        )
        .await;

        let status = notification.status;
        if status.is_settled() {
            tracing::info!(
                notification_id = %notification.id,
                status = %status,
                attempts = notification.attempts,
                "Notification settled"
            );
        }
        self.storage.update_notification(notification).await?;
        Ok(status)
    }
}
