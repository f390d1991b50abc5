//! Service types managed by arrsync

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Role a service plays in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceRole {
    /// Aggregates indexers and pushes them to library managers
    IndexerManager,
    /// Manages a media library (series, movies, music)
    LibraryManager,
}

/// The flavour of a managed service
///
/// Determines the REST API prefix and which resource kinds the service
/// understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Prowlarr,
    Sonarr,
    Radarr,
    Lidarr,
}

impl ServiceType {
    /// All known service types.
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Prowlarr,
        ServiceType::Sonarr,
        ServiceType::Radarr,
        ServiceType::Lidarr,
    ];

    /// Lowercase identifier used in documents
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Prowlarr => "prowlarr",
            ServiceType::Sonarr => "sonarr",
            ServiceType::Radarr => "radarr",
            ServiceType::Lidarr => "lidarr",
        }
    }

    /// REST API prefix relative to the service base URL
    pub fn api_prefix(&self) -> &'static str {
        match self {
            ServiceType::Prowlarr | ServiceType::Lidarr => "/api/v1",
            ServiceType::Sonarr | ServiceType::Radarr => "/api/v3",
        }
    }

    pub fn role(&self) -> ServiceRole {
        match self {
            ServiceType::Prowlarr => ServiceRole::IndexerManager,
            _ => ServiceRole::LibraryManager,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownServiceType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_prefix() {
        assert_eq!(ServiceType::Prowlarr.api_prefix(), "/api/v1");
        assert_eq!(ServiceType::Lidarr.api_prefix(), "/api/v1");
        assert_eq!(ServiceType::Sonarr.api_prefix(), "/api/v3");
        assert_eq!(ServiceType::Radarr.api_prefix(), "/api/v3");
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("Sonarr".parse::<ServiceType>().unwrap(), ServiceType::Sonarr);
        assert!("plex".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_roles() {
        assert_eq!(ServiceType::Prowlarr.role(), ServiceRole::IndexerManager);
        assert_eq!(ServiceType::Radarr.role(), ServiceRole::LibraryManager);
    }
}
