//! Downstream consumers
//!
//! Event handlers run by the consumer runtime: round-up investing on
//! completed payments and spending classification on recorded transactions.

mod classifier;
mod round_up;
mod spending;

pub use classifier::{
    CategoryRule, Classification, RuleBasedClassifier, SpendingClassifier, ANOMALY_REASON,
    FALLBACK_CATEGORY,
};
pub use round_up::{RoundUpHandler, ROUND_UP_GROUP};
pub use spending::{SpendingClassifierHandler, SPENDING_GROUP};
