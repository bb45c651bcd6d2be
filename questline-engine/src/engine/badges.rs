//! Badge evaluation seam
//!
//! Badge criteria live in an external service; the engine only needs
//! "evaluate and award for this user" after a quest completion, so that
//! completion notifications can carry freshly-earned badges. Evaluator
//! failures are caught at the call site and never abort the ledger
//! commit that already happened.

use futures::future::BoxFuture;
use questline_common::db::models::BadgeAward;
use questline_common::Result;
use tracing::debug;
use uuid::Uuid;

pub trait BadgeEvaluator: Send + Sync {
    /// Evaluate all badge criteria for the user and return newly
    /// awarded badges
    fn evaluate_and_award(&self, user_id: Uuid) -> BoxFuture<'_, Result<Vec<BadgeAward>>>;
}

/// Default evaluator: no badge service wired in, nothing is ever awarded
pub struct NullBadgeEvaluator;

impl BadgeEvaluator for NullBadgeEvaluator {
    fn evaluate_and_award(&self, user_id: Uuid) -> BoxFuture<'_, Result<Vec<BadgeAward>>> {
        Box::pin(async move {
            debug!("No badge evaluator configured for user {}", user_id);
            Ok(Vec::new())
        })
    }
}
