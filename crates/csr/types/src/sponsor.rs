//! Sponsoring organizations and their notification preferences

use crate::ids::{SponsorId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery channel for sponsor notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    InApp,
    Webhook,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::InApp => "in_app",
            Channel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often the sponsor wants to hear from the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Immediate,
    Daily,
    Weekly,
}

/// An explicit notification recipient.
///
/// Either field may be missing, but a recipient with neither is dropped
/// during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl Recipient {
    /// Email address if present and non-blank
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    pub fn is_addressable(&self) -> bool {
        self.email_address().is_some() || self.user_id.is_some()
    }
}

/// Sponsor notification preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

fn default_enabled() -> bool {
    true
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: Vec::new(),
            frequency: Frequency::Immediate,
            recipients: Vec::new(),
        }
    }
}

/// A CSR organization that funds and owns programs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sponsor {
    pub id: SponsorId,
    /// The user account that owns this sponsor and may acknowledge checkpoints
    pub user_id: UserId,
    pub organization_name: String,
    /// Contact address, used as the fallback recipient
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
}

impl Sponsor {
    pub fn new(user_id: UserId, organization_name: impl Into<String>) -> Self {
        Self {
            id: SponsorId::generate(),
            user_id,
            organization_name: organization_name.into(),
            email: None,
            notification_preferences: NotificationPreferences::default(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_preferences(mut self, preferences: NotificationPreferences) -> Self {
        self.notification_preferences = preferences;
        self
    }
}
