//! Notification dispatch and delivery
//!
//! - [`NotificationDispatcher`] resolves recipients and channels and persists records
//! - [`DeliveryWorker`] delivers pending records with retries
//! - [`DeliveryGateway`] is the port to email and realtime transports

mod dispatcher;
mod gateway;
mod worker;

pub use dispatcher::{DeliveryMode, NotificationDispatcher};
pub use gateway::{DeliveryError, DeliveryGateway};
pub use worker::{DeliveryWorker, RetryPolicy, WorkerConfig};
