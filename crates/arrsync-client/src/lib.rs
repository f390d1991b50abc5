//! Service adapters for arrsync
//!
//! [`ServiceAdapter`] is the only way the sync engine talks to a managed
//! service. [`ArrAdapter`] implements it over the REST API shared by
//! Prowlarr, Sonarr, Radarr and Lidarr.

pub mod adapter;
pub mod arr;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod http;

pub use adapter::{Applied, ServiceAdapter};
pub use arr::ArrAdapter;
pub use endpoint::ServiceEndpoint;
pub use error::{AdapterError, AdapterResult};
pub use http::{HttpClient, backoff};
