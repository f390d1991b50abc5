//! Resource kinds and their static dependency table
//!
//! Each [`ResourceKind`] carries:
//! - a service affinity (which [`ServiceType`]s expose it)
//! - the kinds it may reference, which fixes the intrinsic apply order
//! - the field that holds its natural key
//! - its REST collection path
//!
//! Most kinds are collections of named objects. [`ResourceKind::Config`] is
//! the exception: each key is a settings section that always exists exactly
//! once per service and can only be updated.
//!
//! Variants are declared in dependency rank order, so the derived `Ord`
//! places every kind after the kinds it depends on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::service::{ServiceRole, ServiceType};

/// A kind of configuration object managed on a remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Tag,
    AppProfile,
    QualityDefinition,
    MetadataProfile,
    CustomFormat,
    DownloadClient,
    IndexerProxy,
    Application,
    Notification,
    Indexer,
    QualityProfile,
    ReleaseProfile,
    RootFolder,
    Config,
}

use ResourceKind::*;
use ServiceType::{Lidarr, Prowlarr, Radarr, Sonarr};

impl ResourceKind {
    /// All kinds in dependency rank order.
    pub const ALL: [ResourceKind; 14] = [
        Tag,
        AppProfile,
        QualityDefinition,
        MetadataProfile,
        CustomFormat,
        DownloadClient,
        IndexerProxy,
        Application,
        Notification,
        Indexer,
        QualityProfile,
        ReleaseProfile,
        RootFolder,
        Config,
    ];

    /// camelCase name as written in documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag => "tag",
            AppProfile => "appProfile",
            QualityDefinition => "qualityDefinition",
            MetadataProfile => "metadataProfile",
            CustomFormat => "customFormat",
            DownloadClient => "downloadClient",
            IndexerProxy => "indexerProxy",
            Application => "application",
            Notification => "notification",
            Indexer => "indexer",
            QualityProfile => "qualityProfile",
            ReleaseProfile => "releaseProfile",
            RootFolder => "rootFolder",
            Config => "config",
        }
    }

    /// Position in the intrinsic dependency order
    pub fn rank(&self) -> usize {
        *self as usize
    }

    /// Field that carries the natural key on the wire
    ///
    /// Config sections are named by their URL, so their key field never
    /// appears in a request body.
    pub fn key_field(&self) -> &'static str {
        match self {
            Tag => "label",
            QualityDefinition => "title",
            RootFolder => "path",
            Config => "section",
            _ => "name",
        }
    }

    /// Normalize a natural key. Tag labels are case-insensitive remotely.
    pub fn normalize_key(&self, key: &str) -> String {
        match self {
            Tag => key.trim().to_lowercase(),
            _ => key.to_string(),
        }
    }

    /// REST collection path below the service API prefix
    pub fn api_path(&self) -> &'static str {
        match self {
            Tag => "/tag",
            AppProfile => "/appprofile",
            QualityDefinition => "/qualitydefinition",
            MetadataProfile => "/metadataprofile",
            CustomFormat => "/customformat",
            DownloadClient => "/downloadclient",
            IndexerProxy => "/indexerproxy",
            Application => "/applications",
            Notification => "/notification",
            Indexer => "/indexer",
            QualityProfile => "/qualityprofile",
            ReleaseProfile => "/releaseprofile",
            RootFolder => "/rootfolder",
            Config => "/config",
        }
    }

    /// Service types that expose this kind
    pub fn affinity(&self) -> &'static [ServiceType] {
        match self {
            Tag | DownloadClient | Notification | Config => &[Prowlarr, Sonarr, Radarr, Lidarr],
            AppProfile | IndexerProxy | Application | Indexer => &[Prowlarr],
            QualityDefinition | CustomFormat | QualityProfile | RootFolder => {
                &[Sonarr, Radarr, Lidarr]
            }
            ReleaseProfile => &[Sonarr, Lidarr],
            MetadataProfile => &[Lidarr],
        }
    }

    pub fn supported_by(&self, service_type: ServiceType) -> bool {
        self.affinity().contains(&service_type)
    }

    /// Kinds that must be reconciled before this one on the same service
    pub fn dependencies(&self) -> &'static [ResourceKind] {
        match self {
            Tag | AppProfile | QualityDefinition | MetadataProfile | CustomFormat | Config => &[],
            DownloadClient | IndexerProxy | Application | Notification => &[Tag],
            Indexer => &[Tag, AppProfile, IndexerProxy],
            QualityProfile => &[QualityDefinition, CustomFormat],
            ReleaseProfile => &[Tag],
            RootFolder => &[Tag, QualityProfile, MetadataProfile],
        }
    }

    /// Kinds on *other* services that must be reconciled first
    ///
    /// Library managers consume indexers pushed by the indexer manager, so
    /// their release profiles wait for indexer changes.
    pub fn cross_service_dependencies(
        &self,
        service_type: ServiceType,
    ) -> &'static [(ServiceRole, ResourceKind)] {
        match (self, service_type.role()) {
            (ReleaseProfile, ServiceRole::LibraryManager) => {
                &[(ServiceRole::IndexerManager, Indexer)]
            }
            _ => &[],
        }
    }

    /// Whether new instances can be created remotely
    pub fn can_create(&self) -> bool {
        !matches!(self, QualityDefinition | MetadataProfile | Config)
    }

    /// Whether instances can be deleted remotely
    pub fn can_delete(&self) -> bool {
        !matches!(self, QualityDefinition | MetadataProfile | Config)
    }

    /// Kinds with one object per key, addressed by key instead of by id
    pub fn is_singleton(&self) -> bool {
        matches!(self, Config)
    }

    /// Keys a singleton kind has on a service; empty for collection kinds
    pub fn sections(&self, service_type: ServiceType) -> &'static [&'static str] {
        match (self, service_type.role()) {
            (Config, ServiceRole::IndexerManager) => &["host", "ui"],
            (Config, ServiceRole::LibraryManager) => &["host", "ui", "naming", "mediamanagement"],
            _ => &[],
        }
    }

    /// Kinds that are declared implicitly when a desired resource
    /// references them by name
    pub fn declared_by_use(&self) -> bool {
        matches!(self, Tag | MetadataProfile)
    }

    /// Contract kinds carry an `implementation` and a `fields` array on the wire
    /// and are created from a `/schema` template.
    pub fn is_contract(&self) -> bool {
        matches!(
            self,
            DownloadClient | IndexerProxy | Application | Notification | Indexer
        )
    }

    /// Field matched against `/schema` entries when creating a contract kind
    pub fn template_field(&self) -> Option<&'static str> {
        match self {
            Indexer => Some("definitionName"),
            k if k.is_contract() => Some("implementation"),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}
