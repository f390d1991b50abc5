//! Reconciliation engine for arrsync
//!
//! This crate turns a declarative document into a converged set of services:
//!
//! - **config**: parse the document (YAML, JSON or TOML) into a validated
//!   desired-state graph
//! - **fetch**: read live state from every declared service concurrently,
//!   isolating failing services
//! - **plan**: diff desired against live and order the resulting change
//!   operations by their dependencies
//! - **apply**: execute the schedule with one worker per service, binding
//!   references to remote ids as they become known
//! - **report**: a per-resource account of the run
//!
//! # Architecture
//!
//! ```text
//!                  arrsync-cli
//!                       |
//!                  arrsync-core
//!                   /        \
//!        arrsync-client    arrsync-model
//! ```
//!
//! # Example
//!
//! ```ignore
//! use arrsync_core::{Document, SyncEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(document: &Document, engine: SyncEngine) -> arrsync_core::Result<()> {
//!     let report = engine.run(document, CancellationToken::new()).await?;
//!     std::process::exit(report.exit_code());
//! }
//! ```

pub mod apply;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod plan;
pub mod report;

pub use apply::{ApplyPolicy, Executor, IdIndex, OpResult, Outcome};
pub use config::{DesiredState, Document, DocumentFormat, ServiceDecl, ServiceProfile};
pub use engine::{SyncEngine, SyncOptions, SyncRun};
pub use error::{DocumentError, Error, Result};
pub use fetch::{FetchFailure, LiveState, fetch_live};
pub use plan::{ChangeOp, Operation, Schedule, ScheduledOp, diff, schedule};
pub use report::{EntrySummary, ReportEntry, Summary, SyncReport};
