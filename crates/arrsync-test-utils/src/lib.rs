//! Shared test utilities for the arrsync workspace.
//!
//! This crate provides in-memory stand-ins for managed services so engine
//! and CLI tests can run without a network. It is a dev-dependency only,
//! never published.
//!
//! # Modules
//!
//! - [`journal`]: [`Journal`] of adapter calls across all fake services
//! - [`service`]: [`FakeService`], an in-memory [`arrsync_client::ServiceAdapter`]
//!   with fault injection
//! - [`documents`]: document fixtures and [`DocumentFile`] for on-disk tests

pub mod documents;
pub mod journal;
pub mod service;

pub use documents::DocumentFile;
pub use journal::{Action, Call, Journal};
pub use service::FakeService;
