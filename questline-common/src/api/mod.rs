//! Shared API request/response types

pub mod types;

pub use types::{EventReceipt, HealthResponse, ReceiptStatus};
