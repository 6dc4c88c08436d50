//! Persisted notification records and realtime events

use crate::ids::{NotificationId, SponsorId, UserId};
use crate::sponsor::{Channel, Recipient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// The logical event carried by a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Who a notification record is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum NotificationAudience {
    Sponsor { sponsor_id: SponsorId },
    Admin { user_id: UserId },
}

/// Delivery state of a notification record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Persisted, delivery not yet settled
    Pending,
    /// Every external delivery succeeded (or none was required)
    Delivered,
    /// Some recipients were reached before attempts ran out
    PartiallyDelivered,
    /// No recipient could be reached
    Failed,
    /// Sponsor disabled notifications; kept for the in-app feed only
    Skipped,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::PartiallyDelivered => "partially_delivered",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Skipped => "skipped",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted notification: the durable record of intent to notify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub audience: NotificationAudience,
    pub recipients: Vec<Recipient>,
    pub channels: Vec<Channel>,
    pub status: NotificationStatus,
    pub payload: NotificationPayload,
    /// Delivery attempts made so far
    #[serde(default)]
    pub attempts: u32,
    /// Email addresses already reached
    #[serde(default)]
    pub delivered_to: Vec<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Earliest time a retry may run; `None` until an attempt leaves the record pending
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        audience: NotificationAudience,
        recipients: Vec<Recipient>,
        channels: Vec<Channel>,
        payload: NotificationPayload,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: NotificationId::generate(),
            audience,
            recipients,
            channels,
            status: NotificationStatus::Pending,
            payload,
            attempts: 0,
            delivered_to: Vec::new(),
            last_error: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }

    /// Pending and past its retry backoff
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Pending
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Email addresses that still need a successful send
    pub fn outstanding_emails(&self) -> Vec<String> {
        if !self.has_channel(Channel::Email) {
            return Vec::new();
        }
        let mut out: Vec<String> = Vec::new();
        for address in self.recipients.iter().filter_map(Recipient::email_address) {
            if !self.delivered_to.iter().any(|d| d == address) && !out.iter().any(|o| o == address)
            {
                out.push(address.to_string());
            }
        }
        out
    }
}

/// Event pushed to a connected user over the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub notification_id: NotificationId,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for RealtimeEvent {
    fn from(n: &Notification) -> Self {
        Self {
            notification_id: n.id,
            kind: n.payload.kind.clone(),
            title: n.payload.title.clone(),
            message: n.payload.message.clone(),
            link: n.payload.link.clone(),
            severity: n.payload.severity,
            created_at: n.created_at,
        }
    }
}
