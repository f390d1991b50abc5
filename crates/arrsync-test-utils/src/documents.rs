//! Document fixtures.
//!
//! The constants are complete YAML documents for the common test scenarios.
//! Service URLs point nowhere; pair them with [`crate::FakeService`]s or use
//! them where no network is involved.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// One Sonarr instance with a quality profile that scores a custom format.
pub const HDR_PROFILE: &str = r#"
services:
  tv:
    type: sonarr
    url: http://sonarr.invalid
    apiKey: tv-key
    resources:
      customFormat:
        HDR:
          includeCustomFormatWhenRenaming: false
          specifications:
            - name: HDR10
              implementation: ReleaseTitleSpecification
              negate: false
              required: true
              fields:
                value: '\bHDR(10)?\b'
      qualityProfile:
        UHD:
          upgradeAllowed: true
          minFormatScore: 0
          formatItems:
            - format: HDR
              score: 100
"#;

/// Two custom formats sharing one name.
pub const DUPLICATE_KEYS: &str = r#"
services:
  tv:
    type: sonarr
    url: http://sonarr.invalid
    apiKey: tv-key
    resources:
      customFormat:
        - name: HDR
          includeCustomFormatWhenRenaming: false
        - name: HDR
          includeCustomFormatWhenRenaming: true
"#;

/// A quality profile scoring a custom format nobody declares.
pub const UNRESOLVED_REFERENCE: &str = r#"
services:
  tv:
    type: sonarr
    url: http://sonarr.invalid
    apiKey: tv-key
    resources:
      qualityProfile:
        UHD:
          formatItems:
            - format: HDR
              score: 100
"#;

/// An indexer manager feeding two library managers.
pub const MULTI_SERVICE: &str = r#"
services:
  indexers:
    type: prowlarr
    url: http://prowlarr.invalid
    apiKey: idx-key
    resources:
      appProfile:
        Standard:
          enableRss: true
      indexer:
        Nyaa:
          definitionName: nyaasi
          appProfileId: Standard
          tags: [anime]
  tv:
    type: sonarr
    url: http://sonarr.invalid
    apiKey: tv-key
    resources:
      releaseProfile:
        Anime subs:
          required: [subs]
          indexerId: 0
          tags: [anime]
  movies:
    type: radarr
    url: http://radarr.invalid
    apiKey: movies-key
    resources:
      customFormat:
        Remux:
          includeCustomFormatWhenRenaming: false
          specifications: []
"#;

/// A document written to a temporary directory.
///
/// The directory lives as long as the value does.
pub struct DocumentFile {
    _dir: TempDir,
    path: PathBuf,
}

impl DocumentFile {
    /// Write `content` to `arrsync.yaml`.
    pub fn yaml(content: &str) -> Self {
        Self::named("arrsync.yaml", content)
    }

    /// Write `content` under a file name of your choosing; the extension
    /// selects the format.
    pub fn named(file_name: &str, content: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(file_name);
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("could not write {}: {e}", path.display()));
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
