#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use csr_checkpoints::{
    CheckpointService, DeliveryError, DeliveryGateway, DeliveryWorker, NotificationDispatcher,
    RetryPolicy, WorkerConfig,
};
use csr_store::{InMemoryStorage, NotificationStorage, SponsorStorage, UserStorage};
use csr_types::{
    Actor, CheckpointNumber, NewProgram, Notification, NotificationStatus, ProgramId,
    RealtimeEvent, Role, Sponsor, User, UserId,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Gateway that records every call and fails on demand
#[derive(Default)]
pub struct RecordingGateway {
    pub emails: Mutex<Vec<(String, String)>>,
    pub pushes: Mutex<Vec<(UserId, RealtimeEvent)>>,
    pub failing_addresses: Mutex<HashSet<String>>,
    pub fail_everything: Mutex<bool>,
}

impl RecordingGateway {
    pub fn failing_on(addresses: &[&str]) -> Self {
        let gateway = Self::default();
        gateway
            .failing_addresses
            .lock()
            .unwrap()
            .extend(addresses.iter().map(|a| a.to_string()));
        gateway
    }

    pub fn broken() -> Self {
        let gateway = Self::default();
        *gateway.fail_everything.lock().unwrap() = true;
        gateway
    }

    pub fn heal(&self) {
        *self.fail_everything.lock().unwrap() = false;
        self.failing_addresses.lock().unwrap().clear();
    }

    pub fn emailed(&self) -> Vec<String> {
        self.emails.lock().unwrap().iter().map(|(to, _)| to.clone()).collect()
    }

    pub fn pushed_to(&self) -> Vec<UserId> {
        self.pushes.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }
}

#[async_trait]
impl DeliveryGateway for RecordingGateway {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<(), DeliveryError> {
        if *self.fail_everything.lock().unwrap() || self.failing_addresses.lock().unwrap().contains(to)
        {
            return Err(DeliveryError::Email(format!("relay rejected {}", to)));
        }
        self.emails
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }

    async fn push_to_user(
        &self,
        user_id: &UserId,
        event: &RealtimeEvent,
    ) -> Result<(), DeliveryError> {
        if *self.fail_everything.lock().unwrap() {
            return Err(DeliveryError::Unavailable("hub offline".into()));
        }
        self.pushes
            .lock()
            .unwrap()
            .push((user_id.clone(), event.clone()));
        Ok(())
    }
}

/// A provisioned program with one sponsor and two admins
pub struct Fixture {
    pub storage: Arc<InMemoryStorage>,
    pub gateway: Arc<RecordingGateway>,
    pub service: CheckpointService,
    pub worker: Arc<DeliveryWorker>,
    pub sponsor: Sponsor,
    pub program_id: ProgramId,
    pub admin: Actor,
    pub owner: Actor,
}

pub fn n(value: u8) -> CheckpointNumber {
    CheckpointNumber::new(value).unwrap()
}

impl Fixture {
    /// Outbox-mode fixture; deliveries happen only when the test runs the worker
    pub async fn new() -> Self {
        Self::with_gateway(RecordingGateway::default(), |s| s).await
    }

    pub async fn with_gateway(
        gateway: RecordingGateway,
        customize: impl FnOnce(Sponsor) -> Sponsor,
    ) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let gateway = Arc::new(gateway);

        let (worker, _rx) = DeliveryWorker::new(
            storage.clone(),
            gateway.clone(),
            WorkerConfig {
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_backoff: Duration::ZERO,
                },
                sweep_interval: Duration::from_secs(3600),
                batch_size: 100,
            },
        );
        let dispatcher = Arc::new(NotificationDispatcher::outbox(
            storage.clone(),
            gateway.clone(),
            worker.sender(),
        ));
        let service = CheckpointService::new(storage.clone(), dispatcher);

        for (id, email) in [("admin-1", "ops@platform.org"), ("admin-2", "audit@platform.org")] {
            storage
                .upsert_user(User {
                    id: UserId::from(id),
                    email: Some(email.to_string()),
                    name: None,
                    role: Role::Admin,
                })
                .await
                .unwrap();
        }

        let sponsor = customize(
            Sponsor::new(UserId::from("sponsor-owner"), "Acme Foundation")
                .with_email("csr@acme.org"),
        );
        storage.upsert_sponsor(sponsor.clone()).await.unwrap();

        let admin = Actor::admin("admin-1");
        let program = service
            .provision_program(
                NewProgram {
                    sponsor_id: sponsor.id,
                    name: "Financial Literacy 2025".into(),
                    start_date: None,
                    end_date: None,
                    metrics: None,
                },
                &admin,
            )
            .await
            .unwrap();

        Self {
            storage,
            gateway,
            service,
            worker,
            owner: Actor::sponsor(sponsor.user_id.clone()),
            sponsor,
            program_id: program.id,
            admin,
        }
    }

    /// Trigger and acknowledge checkpoints `1..=through`
    pub async fn complete_through(&self, through: u8) {
        for i in 1..=through {
            self.service
                .trigger(&self.program_id, n(i), &self.admin)
                .await
                .unwrap();
            self.service
                .acknowledge(&self.program_id, n(i), &self.owner)
                .await
                .unwrap();
        }
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        let mut all = self
            .storage
            .list_notifications_for_sponsor(&self.sponsor.id, 100)
            .await
            .unwrap();
        for admin in ["admin-1", "admin-2"] {
            all.extend(
                self.storage
                    .list_notifications_for_user(&UserId::from(admin), 100)
                    .await
                    .unwrap(),
            );
        }
        all
    }

    pub async fn pending_notifications(&self) -> Vec<Notification> {
        let mut pending: Vec<_> = self
            .notifications()
            .await
            .into_iter()
            .filter(|n| n.status == NotificationStatus::Pending)
            .collect();
        pending.sort_by_key(|n| n.created_at);
        pending
    }
}

/// Poll until no notification record is pending
pub async fn wait_until_settled(storage: &InMemoryStorage) {
    for _ in 0..200 {
        // Zero backoff makes every pending record due immediately.
        let pending = storage.list_due_notifications(Utc::now(), 100).await.unwrap();
        if pending.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("notifications did not settle");
}
