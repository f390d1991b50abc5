//! Configuration document and desired-state loading

pub mod document;
pub mod loader;

pub use document::{Document, DocumentFormat, KindDecl, PruneDecl, ServiceDecl};
pub use loader::{DesiredState, ServiceProfile};
