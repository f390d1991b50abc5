//! Command implementations for arrsync-cli

pub mod sync;
pub mod validate;

pub use sync::{run_plan, run_sync};
pub use validate::run_validate;
