use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// One tracked bundle in the local manifest cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalItem {
    pub remote_filename: String,
    pub local_basename: String,
    pub file_hash: String,
}

/// Local JSON manifest cache, keyed by the bundle's local path. The JSON
/// layout (camelCase keys) matches the cache files the original tool wrote,
/// so existing state carries over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalManifest {
    pub version: String,
    pub items: BTreeMap<String, LocalItem>,
}

impl Default for LocalManifest {
    fn default() -> Self {
        LocalManifest {
            version: "0".to_string(),
            items: BTreeMap::new(),
        }
    }
}

impl LocalManifest {
    /// Load from disk; a missing file reads as the default ("never updated")
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No local manifest, starting from version 0");
            return Ok(LocalManifest::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to disk, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(hash: &str) -> LocalItem {
        LocalItem {
            remote_filename: format!("https://cdn.example/{}", hash),
            local_basename: "game_ui_common.bundle".to_string(),
            file_hash: hash.to_string(),
        }
    }

    #[test]
    fn test_missing_file_defaults() {
        let manifest = LocalManifest::load(Path::new("/nonexistent/PackageManifest_X.json")).unwrap();
        assert_eq!(manifest.version, "0");
        assert!(manifest.items.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("PackageManifest_DefaultPackage.json");

        let mut manifest = LocalManifest::default();
        manifest.version = "2024.1.1".to_string();
        manifest
            .items
            .insert("./DefaultPackage/game_ui_common".to_string(), item("abc123"));
        manifest.save(&path).unwrap();

        let loaded = LocalManifest::load(&path).unwrap();
        assert_eq!(loaded.version, "2024.1.1");
        assert_eq!(
            loaded.items["./DefaultPackage/game_ui_common"].file_hash,
            "abc123"
        );
    }

    #[test]
    fn test_json_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");

        let mut manifest = LocalManifest::default();
        manifest.items.insert("k".to_string(), item("h"));
        manifest.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"remoteFilename\""));
        assert!(raw.contains("\"localBasename\""));
        assert!(raw.contains("\"fileHash\""));
    }

    #[test]
    fn test_corrupt_cache_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(LocalManifest::load(&path).is_err());
    }
}
