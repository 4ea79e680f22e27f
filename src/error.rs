//! Planner error taxonomy
//!
//! Every variant is recoverable: callers keep the last good state and retry
//! on the next trigger.

use crate::services::cost_governor::LimitType;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlannerError {
    /// A hard constraint rejected a proposed move.
    #[error("move rejected: {reason}")]
    Validation { reason: String },

    /// The travel-time provider failed or timed out.
    #[error("travel-time provider failed: {0}")]
    Provider(String),

    /// The cost governor blocked the call before it was made.
    #[error("travel-time request blocked by {limit} limit")]
    AdmissionRejected {
        limit: LimitType,
        retry_after_secs: Option<u64>,
    },

    /// Writing to the planner backend failed.
    #[error("backend write failed: {0}")]
    Persistence(String),

    #[error("unknown order {0}")]
    UnknownOrder(String),

    #[error("no plan loaded for technician {0}")]
    UnknownTechnician(String),
}

impl PlannerError {
    pub fn validation(reason: impl Into<String>) -> Self {
        PlannerError::Validation {
            reason: reason.into(),
        }
    }

    /// Failures that clear up by retrying on a later trigger.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlannerError::Provider(_) | PlannerError::AdmissionRejected { .. } | PlannerError::Persistence(_)
        )
    }
}

pub type PlannerResult<T> = std::result::Result<T, PlannerError>;
