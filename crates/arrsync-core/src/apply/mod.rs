//! Applying scheduled change operations through service adapters

pub mod binding;
pub mod executor;

use std::time::Duration;

use serde::{Serialize, Serializer};

use arrsync_model::ResourceId;

use crate::plan::Operation;

pub use binding::IdIndex;
pub use executor::Executor;

/// Retry and dry-run settings for one apply phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyPolicy {
    /// Total attempts per mutation, including the first
    pub max_attempts: usize,
    /// Delay before the first retry; doubles on each further retry
    pub base_backoff: Duration,
    /// Record what would be done without calling any mutation
    pub dry_run: bool,
}

impl Default for ApplyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            dry_run: false,
        }
    }
}

impl ApplyPolicy {
    /// Delay after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: usize) -> Duration {
        arrsync_client::backoff(self.base_backoff, attempt)
    }
}

/// Final state of one change operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// The mutation was accepted by the service
    Applied,
    /// Nothing to do
    Unchanged,
    /// Dry run: the mutation would have been issued
    Planned,
    /// The service or the binding step rejected the operation
    Failed { error: String },
    /// A referenced resource did not reach its desired state
    Blocked {
        #[serde(serialize_with = "display")]
        by: ResourceId,
    },
    /// The run was cancelled before the operation was dispatched
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::Applied | Outcome::Unchanged | Outcome::Planned
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Unchanged => "unchanged",
            Outcome::Planned => "planned",
            Outcome::Failed { .. } => "failed",
            Outcome::Blocked { .. } => "blocked",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one scheduled operation
#[derive(Debug, Clone, PartialEq)]
pub struct OpResult {
    /// Position in the schedule
    pub position: usize,
    pub id: ResourceId,
    pub operation: Operation,
    pub changed: Vec<String>,
    pub outcome: Outcome,
    /// Adapter calls made, including retries
    pub attempts: usize,
}

fn display<S: Serializer>(id: &ResourceId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}
