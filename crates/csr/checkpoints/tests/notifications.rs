mod common;

use common::{n, wait_until_settled, Fixture, RecordingGateway};
use csr_checkpoints::{CheckpointService, DeliveryMode, NotificationDispatcher};
use csr_store::{InMemoryStorage, SponsorStorage, UserStorage};
use csr_types::{
    Actor, Channel, CheckpointStatus, NewProgram, NotificationAudience, NotificationPreferences,
    NotificationStatus, Recipient, Role, Sponsor, User, UserId,
};
use std::sync::Arc;

fn lead() -> Recipient {
    Recipient {
        name: Some("Program Lead".into()),
        email: Some("lead@acme.org".into()),
        user_id: None,
    }
}

fn owner_recipient() -> Recipient {
    Recipient {
        name: Some("CSR Desk".into()),
        email: Some("csr@acme.org".into()),
        user_id: Some(UserId::from("sponsor-owner")),
    }
}

fn with_email_channel(sponsor: Sponsor) -> Sponsor {
    sponsor.with_preferences(NotificationPreferences {
        channels: vec![Channel::Email, Channel::InApp],
        recipients: vec![lead(), owner_recipient()],
        ..Default::default()
    })
}

#[tokio::test]
async fn trigger_persists_pending_record_before_delivery() {
    let fx = Fixture::with_gateway(RecordingGateway::default(), with_email_channel).await;
    fx.service
        .trigger(&fx.program_id, n(1), &fx.admin)
        .await
        .unwrap();

    let pending = fx.pending_notifications().await;
    assert_eq!(pending.len(), 1);
    let record = &pending[0];
    assert_eq!(
        record.audience,
        NotificationAudience::Sponsor {
            sponsor_id: fx.sponsor.id
        }
    );
    assert_eq!(record.payload.kind, "checkpoint_ready");
    assert_eq!(record.recipients.len(), 2);
    assert_eq!(record.channels, vec![Channel::Email, Channel::InApp]);
    assert!(fx.gateway.emailed().is_empty());

    assert_eq!(fx.worker.sweep().await.unwrap(), 1);

    let mut emailed = fx.gateway.emailed();
    emailed.sort();
    assert_eq!(emailed, vec!["csr@acme.org", "lead@acme.org"]);
    assert_eq!(fx.gateway.pushed_to(), vec![UserId::from("sponsor-owner")]);
    assert!(fx.pending_notifications().await.is_empty());
}

#[tokio::test]
async fn owner_listed_explicitly_is_notified_once() {
    let fx = Fixture::with_gateway(RecordingGateway::default(), |s| {
        s.with_preferences(NotificationPreferences {
            channels: vec![Channel::Email],
            recipients: vec![owner_recipient()],
            ..Default::default()
        })
    })
    .await;

    let resolved = NotificationDispatcher::resolve_recipients(&fx.sponsor);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].user_id, Some(UserId::from("sponsor-owner")));
    assert_eq!(resolved[0].email.as_deref(), Some("csr@acme.org"));

    fx.service
        .trigger(&fx.program_id, n(1), &fx.admin)
        .await
        .unwrap();
    fx.worker.sweep().await.unwrap();
    assert_eq!(fx.gateway.emailed(), vec!["csr@acme.org"]);
}

#[tokio::test]
async fn default_channel_is_in_app_only() {
    let fx = Fixture::new().await;
    fx.service
        .trigger(&fx.program_id, n(1), &fx.admin)
        .await
        .unwrap();
    fx.worker.sweep().await.unwrap();

    assert!(fx.gateway.emailed().is_empty());
    assert_eq!(fx.gateway.pushed_to(), vec![UserId::from("sponsor-owner")]);

    let records = fx.notifications().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].channels, vec![Channel::InApp]);
    assert_eq!(records[0].status, NotificationStatus::Delivered);
}

#[tokio::test]
async fn broken_gateway_never_fails_transitions() {
    let fx = Fixture::with_gateway(RecordingGateway::broken(), with_email_channel).await;

    fx.service
        .trigger(&fx.program_id, n(1), &fx.admin)
        .await
        .unwrap();
    let outcome = fx
        .service
        .acknowledge(&fx.program_id, n(1), &fx.owner)
        .await
        .unwrap();
    assert_eq!(outcome.checkpoint.status, CheckpointStatus::Completed);

    for _ in 0..3 {
        fx.worker.sweep().await.unwrap();
    }

    let records = fx.notifications().await;
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .all(|r| r.status == NotificationStatus::Failed && r.attempts == 3));
    assert!(fx.gateway.emailed().is_empty());
}

#[tokio::test]
async fn failing_recipient_does_not_block_others() {
    let fx = Fixture::with_gateway(
        RecordingGateway::failing_on(&["lead@acme.org"]),
        with_email_channel,
    )
    .await;
    fx.service
        .trigger(&fx.program_id, n(1), &fx.admin)
        .await
        .unwrap();

    fx.worker.sweep().await.unwrap();
    assert_eq!(fx.gateway.emailed(), vec!["csr@acme.org"]);
    let pending = fx.pending_notifications().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].delivered_to, vec!["csr@acme.org"]);

    fx.gateway.heal();
    fx.worker.sweep().await.unwrap();
    assert_eq!(fx.gateway.emailed(), vec!["csr@acme.org", "lead@acme.org"]);

    let records = fx.notifications().await;
    assert_eq!(records[0].status, NotificationStatus::Delivered);
    assert_eq!(records[0].attempts, 2);
}

#[tokio::test]
async fn disabled_preferences_keep_a_skipped_record() {
    let fx = Fixture::with_gateway(RecordingGateway::default(), |s| {
        let s = with_email_channel(s);
        let mut preferences = s.notification_preferences.clone();
        preferences.enabled = false;
        s.with_preferences(preferences)
    })
    .await;

    fx.service
        .trigger(&fx.program_id, n(1), &fx.admin)
        .await
        .unwrap();
    assert_eq!(fx.worker.sweep().await.unwrap(), 0);

    let records = fx.notifications().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, NotificationStatus::Skipped);
    assert!(fx.gateway.emailed().is_empty());
    assert!(fx.gateway.pushed_to().is_empty());
}

#[tokio::test]
async fn acknowledgment_notifies_every_admin() {
    let fx = Fixture::with_gateway(
        RecordingGateway::failing_on(&["ops@platform.org"]),
        |s| s,
    )
    .await;
    fx.complete_through(1).await;

    let admin_records: Vec<_> = fx
        .notifications()
        .await
        .into_iter()
        .filter(|r| matches!(r.audience, NotificationAudience::Admin { .. }))
        .collect();
    assert_eq!(admin_records.len(), 2);
    assert!(admin_records
        .iter()
        .all(|r| r.payload.kind == "checkpoint_acknowledged"));

    fx.worker.sweep().await.unwrap();
    assert_eq!(fx.gateway.emailed(), vec!["audit@platform.org"]);
}

#[tokio::test]
async fn inline_mode_delivers_without_a_worker() {
    let storage = Arc::new(InMemoryStorage::new());
    let gateway = Arc::new(RecordingGateway::failing_on(&["lead@acme.org"]));
    let dispatcher = Arc::new(NotificationDispatcher::inline(
        storage.clone(),
        gateway.clone(),
    ));
    assert_eq!(dispatcher.mode(), DeliveryMode::Inline);
    let service = CheckpointService::new(storage.clone(), dispatcher);

    storage
        .upsert_user(User {
            id: UserId::from("admin-1"),
            email: Some("ops@platform.org".into()),
            name: Some("Ops".into()),
            role: Role::Admin,
        })
        .await
        .unwrap();
    let sponsor = with_email_channel(
        Sponsor::new(UserId::from("sponsor-owner"), "Acme Foundation").with_email("csr@acme.org"),
    );
    storage.upsert_sponsor(sponsor.clone()).await.unwrap();

    let admin = Actor::admin("admin-1");
    let program = service
        .provision_program(
            NewProgram {
                sponsor_id: sponsor.id,
                name: "Inline".into(),
                start_date: None,
                end_date: None,
                metrics: None,
            },
            &admin,
        )
        .await
        .unwrap();

    service.trigger(&program.id, n(1), &admin).await.unwrap();
    wait_until_settled(&storage).await;

    assert_eq!(gateway.emailed(), vec!["csr@acme.org"]);
    let records = csr_store::NotificationStorage::list_notifications_for_sponsor(
        storage.as_ref(),
        &sponsor.id,
        10,
    )
    .await
    .unwrap();
    assert_eq!(records[0].status, NotificationStatus::PartiallyDelivered);
    assert_eq!(records[0].attempts, 1);
}
