//! Normalized resource model for arrsync
//!
//! Every managed service speaks its own REST dialect; this crate defines the
//! single representation the reconciliation engine works with:
//!
//! - [`ServiceType`]: the flavour of a managed service
//! - [`ResourceKind`]: what kind of object a resource is, with its static
//!   dependency table, reference schema and capabilities
//! - [`Resource`] / [`ResourceId`]: one object identified by
//!   `(service, kind, natural key)`
//! - [`FieldValue`]: JSON-like values plus references by natural key
//! - [`ResourceGraph`]: a keyed set of resources from one side of a sync
//!
//! The crate is pure: no I/O, no async.

pub mod error;
pub mod graph;
pub mod kind;
pub mod resource;
pub mod schema;
pub mod service;
pub mod value;

pub use error::{Error, Result};
pub use graph::ResourceGraph;
pub use kind::ResourceKind;
pub use resource::{Origin, ReferenceEdge, RemoteHandle, Resource, ResourceId};
pub use schema::{ListMode, ReferenceField};
pub use service::{ServiceRole, ServiceType};
pub use value::FieldValue;
