//! Quest engagement pipeline
//!
//! Event flow: router → resolver → {engagement state machine | generic
//! credit} → ledger → badge trigger → notification fanout.

pub mod badges;
pub mod catalog;
pub mod engagement;
pub mod ledger;
pub mod resolver;
pub mod router;

pub use badges::{BadgeEvaluator, NullBadgeEvaluator};
pub use ledger::{CreditOutcome, CreditRequest, DedupPolicy, ExperienceLedger, NullXpForwarder, XpForwarder};
pub use router::EventRouter;
