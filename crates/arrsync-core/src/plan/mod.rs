//! Change planning: live defaults, diffing and dependency scheduling

pub mod defaults;
pub mod differ;
pub mod scheduler;

pub use defaults::fill_live_defaults;
pub use differ::{ChangeOp, FieldChange, Operation, diff};
pub use scheduler::{DependencyGraph, EdgeKind, Schedule, ScheduledOp, check_acyclic, schedule};
