//! Sponsor and user registration plus the in-app notification feed

use crate::error::{CheckpointError, CheckpointResult};
use csr_store::Storage;
use csr_types::{Actor, Notification, Role, Sponsor, SponsorId, User};
use std::sync::Arc;

/// Maximum number of feed entries returned in one call
pub const MAX_FEED_LIMIT: usize = 200;

/// Administrative registry of the accounts checkpoints are routed to
#[derive(Clone)]
pub struct Directory {
    storage: Arc<dyn Storage>,
}

impl Directory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create or replace a sponsor; admin only
    pub async fn register_sponsor(&self, sponsor: Sponsor, actor: &Actor) -> CheckpointResult<Sponsor> {
        require_admin(actor, "register sponsors")?;
        if sponsor.organization_name.trim().is_empty() {
            return Err(CheckpointError::Validation(
                "Organization name must not be empty".to_string(),
            ));
        }
        self.storage.upsert_sponsor(sponsor.clone()).await?;
        tracing::info!(sponsor_id = %sponsor.id, owner = %sponsor.user_id, "Sponsor registered");
        Ok(sponsor)
    }

    /// Create or replace a user account; admin only
    pub async fn register_user(&self, user: User, actor: &Actor) -> CheckpointResult<User> {
        require_admin(actor, "register users")?;
        if user.id.as_str().trim().is_empty() {
            return Err(CheckpointError::Validation("User id must not be empty".to_string()));
        }
        self.storage.upsert_user(user.clone()).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Most recent sponsor notifications, visible to the sponsor owner and admins
    pub async fn sponsor_feed(
        &self,
        sponsor_id: &SponsorId,
        actor: &Actor,
        limit: usize,
    ) -> CheckpointResult<Vec<Notification>> {
        let sponsor = self
            .storage
            .get_sponsor(sponsor_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Sponsor not found".to_string()))?;
        if actor.role != Role::Admin && actor.user_id != sponsor.user_id {
            return Err(CheckpointError::Forbidden(
                "Only the sponsor owner or an administrator can read this feed".to_string(),
            ));
        }
        Ok(self
            .storage
            .list_notifications_for_sponsor(sponsor_id, limit.clamp(1, MAX_FEED_LIMIT))
            .await?)
    }

    /// Most recent admin-scoped notifications of the calling admin
    pub async fn admin_feed(&self, actor: &Actor, limit: usize) -> CheckpointResult<Vec<Notification>> {
        require_admin(actor, "read the admin feed")?;
        Ok(self
            .storage
            .list_notifications_for_user(&actor.user_id, limit.clamp(1, MAX_FEED_LIMIT))
            .await?)
    }
}

fn require_admin(actor: &Actor, action: &str) -> CheckpointResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(CheckpointError::Forbidden(format!(
            "Only administrators can {}",
            action
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use csr_store::{InMemoryStorage, NotificationStorage};
    use csr_types::{
        Channel, NotificationAudience, NotificationPayload, Severity, UserId,
    };

    fn payload() -> NotificationPayload {
        NotificationPayload {
            kind: "checkpoint_ready".into(),
            category: "program".into(),
            title: "Ready".into(),
            message: "Review".into(),
            link: None,
            severity: Severity::Info,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_registration_is_admin_only() {
        let directory = Directory::new(Arc::new(InMemoryStorage::new()));
        let sponsor = Sponsor::new(UserId::from("owner"), "Acme");

        let err = directory
            .register_sponsor(sponsor.clone(), &Actor::sponsor("owner"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        directory
            .register_sponsor(sponsor, &Actor::admin("root"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sponsor_feed_visibility() {
        let storage = Arc::new(InMemoryStorage::new());
        let directory = Directory::new(storage.clone());
        let sponsor = Sponsor::new(UserId::from("owner"), "Acme");
        directory
            .register_sponsor(sponsor.clone(), &Actor::admin("root"))
            .await
            .unwrap();
        storage
            .insert_notification(Notification::new(
                NotificationAudience::Sponsor {
                    sponsor_id: sponsor.id,
                },
                vec![],
                vec![Channel::InApp],
                payload(),
            ))
            .await
            .unwrap();

        let feed = directory
            .sponsor_feed(&sponsor.id, &Actor::sponsor("owner"), 10)
            .await
            .unwrap();
        assert_eq!(feed.len(), 1);

        let err = directory
            .sponsor_feed(&sponsor.id, &Actor::sponsor("intruder"), 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = directory
            .sponsor_feed(&SponsorId::generate(), &Actor::admin("root"), 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
