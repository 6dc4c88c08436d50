//! Notification fan-out for checkpoint events
//!
//! Every logical event becomes one persisted record per audience before any
//! external delivery is attempted. Delivery is then either spawned inline or
//! handed to the outbox worker; in both cases the caller never waits on it and
//! never sees a delivery error.

use super::gateway::DeliveryGateway;
use super::worker::{attempt_delivery, RetryPolicy};
use csr_store::Storage;
use csr_types::{
    Channel, Notification, NotificationAudience, NotificationId, NotificationPayload,
    NotificationStatus, Recipient, Role, Sponsor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// How persisted records reach the delivery gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One attempt, spawned right after persistence
    Inline,
    /// Handed to the [`super::DeliveryWorker`], which retries
    #[default]
    Outbox,
}

/// Persists and fans out notifications
pub struct NotificationDispatcher {
    storage: Arc<dyn Storage>,
    gateway: Arc<dyn DeliveryGateway>,
    outbox: Option<mpsc::Sender<NotificationId>>,
}

impl NotificationDispatcher {
    /// Dispatcher that delivers inline, once per record
    pub fn inline(storage: Arc<dyn Storage>, gateway: Arc<dyn DeliveryGateway>) -> Self {
        Self {
            storage,
            gateway,
            outbox: None,
        }
    }

    /// Dispatcher that leaves delivery to an outbox worker
    pub fn outbox(
        storage: Arc<dyn Storage>,
        gateway: Arc<dyn DeliveryGateway>,
        nudge: mpsc::Sender<NotificationId>,
    ) -> Self {
        Self {
            storage,
            gateway,
            outbox: Some(nudge),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        if self.outbox.is_some() {
            DeliveryMode::Outbox
        } else {
            DeliveryMode::Inline
        }
    }

    /// Explicit recipients followed by the sponsor's own account, minus
    /// entries with neither an email nor a user id, deduplicated on
    /// `(user_id, email)` in first-seen order.
    pub fn resolve_recipients(sponsor: &Sponsor) -> Vec<Recipient> {
        let fallback = Recipient {
            name: Some(sponsor.organization_name.clone()),
            email: sponsor.email.clone(),
            user_id: Some(sponsor.user_id.clone()),
        };

        let mut seen = Vec::new();
        let mut resolved = Vec::new();
        for recipient in sponsor
            .notification_preferences
            .recipients
            .iter()
            .chain(std::iter::once(&fallback))
        {
            if !recipient.is_addressable() {
                continue;
            }
            let key = (
                recipient.user_id.clone(),
                recipient.email_address().map(str::to_string),
            );
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            resolved.push(recipient.clone());
        }
        resolved
    }

    /// Configured channels, or in-app only when none are configured
    pub fn resolve_channels(sponsor: &Sponsor) -> Vec<Channel> {
        let configured = &sponsor.notification_preferences.channels;
        if configured.is_empty() {
            vec![Channel::InApp]
        } else {
            let mut channels = Vec::with_capacity(configured.len());
            for channel in configured {
                if !channels.contains(channel) {
                    channels.push(*channel);
                }
            }
            channels
        }
    }

    /// Persist a sponsor-scoped record and start its delivery.
    ///
    /// Returns the persisted record, or `None` if it could not be stored.
    /// When the sponsor has disabled notifications the record is stored as
    /// `skipped` and nothing is sent.
    pub async fn dispatch_to_sponsor(
        &self,
        sponsor: &Sponsor,
        payload: NotificationPayload,
    ) -> Option<Notification> {
        let mut notification = Notification::new(
            NotificationAudience::Sponsor {
                sponsor_id: sponsor.id,
            },
            Self::resolve_recipients(sponsor),
            Self::resolve_channels(sponsor),
            payload,
        );
        if !sponsor.notification_preferences.enabled {
            notification.status = NotificationStatus::Skipped;
        }

        if let Err(e) = self.storage.insert_notification(notification.clone()).await {
            tracing::error!(
                sponsor_id = %sponsor.id,
                kind = %notification.payload.kind,
                error = %e,
                "Failed to persist sponsor notification"
            );
            return None;
        }

        if notification.status == NotificationStatus::Skipped {
            tracing::debug!(
                notification_id = %notification.id,
                sponsor_id = %sponsor.id,
                "Sponsor notifications disabled, delivery skipped"
            );
        } else {
            self.hand_off(&notification).await;
        }

        Some(notification)
    }

    /// Persist one admin-scoped record per admin user and start delivery.
    ///
    /// A failure for one admin does not affect the others.
    pub async fn notify_admins(&self, payload: NotificationPayload) -> Vec<Notification> {
        let admins = match self.storage.list_users_by_role(Role::Admin).await {
            Ok(admins) => admins,
            Err(e) => {
                tracing::error!(kind = %payload.kind, error = %e, "Failed to list admins");
                return Vec::new();
            }
        };

        let mut records = Vec::with_capacity(admins.len());
        for admin in admins {
            let recipient = Recipient {
                name: admin.name.clone(),
                email: admin.email.clone(),
                user_id: Some(admin.id.clone()),
            };
            let notification = Notification::new(
                NotificationAudience::Admin {
                    user_id: admin.id.clone(),
                },
                vec![recipient],
                vec![Channel::InApp, Channel::Email],
                payload.clone(),
            );

            if let Err(e) = self.storage.insert_notification(notification.clone()).await {
                tracing::error!(
                    user_id = %admin.id,
                    kind = %payload.kind,
                    error = %e,
                    "Failed to persist admin notification"
                );
                continue;
            }

            self.hand_off(&notification).await;
            records.push(notification);
        }
        records
    }

    async fn hand_off(&self, notification: &Notification) {
        match &self.outbox {
            Some(nudge) => {
                // A full queue only delays delivery until the next sweep.
                if let Err(e) = nudge.try_send(notification.id) {
                    tracing::debug!(
                        notification_id = %notification.id,
                        error = %e,
                        "Outbox nudge dropped"
                    );
                }
            }
            None => {
                let storage = self.storage.clone();
                let gateway = self.gateway.clone();
                let mut notification = notification.clone();
                tokio::spawn(async move {
                    let policy = RetryPolicy::single_attempt();
                    attempt_delivery(gateway.as_ref(), &mut notification, &policy).await;
                    if let Err(e) = storage.update_notification(notification.clone()).await {
                        tracing::warn!(
                            notification_id = %notification.id,
                            error = %e,
                            "Failed to record delivery result"
                        );
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csr_types::{NotificationPreferences, UserId};

    fn recipient(user: Option<&str>, email: Option<&str>) -> Recipient {
        Recipient {
            name: None,
            email: email.map(str::to_string),
            user_id: user.map(UserId::from),
        }
    }

    fn sponsor(recipients: Vec<Recipient>, channels: Vec<Channel>) -> Sponsor {
        Sponsor::new(UserId::from("owner"), "Acme Foundation")
            .with_email("csr@acme.org")
            .with_preferences(NotificationPreferences {
                channels,
                recipients,
                ..Default::default()
            })
    }

    #[test]
    fn test_resolve_recipients_appends_owner_and_dedupes() {
        let s = sponsor(
            vec![
                recipient(None, Some("lead@acme.org")),
                recipient(None, Some("lead@acme.org")),
                recipient(None, None),
                recipient(Some("owner"), Some("csr@acme.org")),
            ],
            vec![],
        );

        let resolved = NotificationDispatcher::resolve_recipients(&s);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].email.as_deref(), Some("lead@acme.org"));
        assert_eq!(resolved[1].user_id, Some(UserId::from("owner")));
    }

    #[test]
    fn test_resolve_recipients_blank_email_counts_as_missing() {
        let s = sponsor(vec![recipient(None, Some("   "))], vec![]);
        let resolved = NotificationDispatcher::resolve_recipients(&s);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].user_id, Some(UserId::from("owner")));
    }

    #[test]
    fn test_resolve_channels_defaults_to_in_app() {
        let s = sponsor(vec![], vec![]);
        assert_eq!(NotificationDispatcher::resolve_channels(&s), vec![Channel::InApp]);

        let s = sponsor(vec![], vec![Channel::Email, Channel::Sms, Channel::Email]);
        assert_eq!(
            NotificationDispatcher::resolve_channels(&s),
            vec![Channel::Email, Channel::Sms]
        );
    }
}
