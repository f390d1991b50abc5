//! The declarative configuration document
//!
//! ```yaml
//! services:
//!   sonarr:
//!     type: sonarr
//!     url: http://sonarr:8989
//!     apiKeyEnv: SONARR_API_KEY
//!     prune:
//!       customFormat: true
//!     resources:
//!       customFormat:
//!         HDR:
//!           specifications: [...]
//!       rootFolder:
//!         - /data/tv
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use arrsync_model::{ResourceKind, ServiceType};

use crate::error::DocumentError;

/// Serialization format of a document file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    /// Detect the format from a file extension.
    ///
    /// - `.yaml`, `.yml` -> YAML
    /// - `.json` -> JSON
    /// - `.toml` -> TOML
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match extension.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            "json" => Ok(DocumentFormat::Json),
            "toml" => Ok(DocumentFormat::Toml),
            _ => Err(DocumentError::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DocumentFormat::Yaml => "YAML",
            DocumentFormat::Json => "JSON",
            DocumentFormat::Toml => "TOML",
        }
    }
}

/// Root of the configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDecl>,
}

/// One managed service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceDecl {
    #[serde(rename = "type")]
    pub service_type: ServiceType,

    /// Base URL without API prefix
    pub url: String,

    /// Literal API key; prefer `apiKeyEnv` or `apiKeyFile`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// File holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<PathBuf>,

    #[serde(default)]
    pub prune: PruneDecl,

    /// Declarations by kind name
    #[serde(default)]
    pub resources: BTreeMap<String, KindDecl>,
}

/// Pruning switch as written in the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PruneDecl {
    /// One switch for every managed kind
    All(bool),
    /// Per-kind switches; unlisted kinds are not pruned
    PerKind(BTreeMap<String, bool>),
}

impl Default for PruneDecl {
    fn default() -> Self {
        PruneDecl::All(false)
    }
}

/// Declarations of one kind
///
/// Either a map from natural key to fields, or a list of declarations that
/// carry their key in the kind's key field. A bare string in list form is
/// shorthand for a declaration holding only the key.
///
/// A key repeated in map form is a parse error; JSON and YAML parsers
/// would otherwise keep only the last entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KindDecl {
    Keyed(BTreeMap<String, Value>),
    Listed(Vec<Value>),
}

impl<'de> Deserialize<'de> for KindDecl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(KindDeclVisitor)
    }
}

struct KindDeclVisitor;

impl<'de> Visitor<'de> for KindDeclVisitor {
    type Value = KindDecl;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of declarations by key or a list of declarations")
    }

    fn visit_map<A>(self, mut map: A) -> Result<KindDecl, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            match entries.entry(key) {
                Entry::Occupied(entry) => {
                    return Err(de::Error::custom(format!("duplicate key '{}'", entry.key())));
                }
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }
        Ok(KindDecl::Keyed(entries))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<KindDecl, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(KindDecl::Listed(items))
    }
}

impl Document {
    /// Load a document, detecting the format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Read`], [`DocumentError::Parse`] or
    /// [`DocumentError::UnsupportedFormat`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let format = DocumentFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| DocumentError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content, format).map_err(|message| DocumentError::Parse {
            path: path.to_path_buf(),
            format: format.label().to_string(),
            message,
        })
    }

    /// Parse document text in the given format.
    pub fn parse(content: &str, format: DocumentFormat) -> Result<Self, String> {
        match format {
            DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            DocumentFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

impl ServiceDecl {
    /// Whether live-only resources of `kind` may be deleted
    pub fn prunes(&self, kind: ResourceKind) -> bool {
        match &self.prune {
            PruneDecl::All(all) => *all,
            PruneDecl::PerKind(kinds) => kinds
                .iter()
                .any(|(name, on)| *on && name.parse::<ResourceKind>().ok() == Some(kind)),
        }
    }
}
