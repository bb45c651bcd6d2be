//! Real-time notification fanout

pub mod hub;
pub mod publisher;

pub use hub::{NotificationHub, Subscriber};
pub use publisher::{publish_with_retry, spawn_publish};
