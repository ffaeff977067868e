use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cache::{LocalItem, LocalManifest};
use crate::error::Result;
use crate::manifest::PackageManifest;

/// Stale bundles to fetch plus the versions the diff was taken between.
/// `items` is empty when the local state is already current.
#[derive(Debug)]
pub struct UpdatePlan {
    pub local_version: String,
    pub remote_version: String,
    pub items: BTreeMap<String, LocalItem>,
}

/// Tracks the remote package version against the local manifest cache and
/// produces download plans.
pub struct VersionManager {
    package: String,
    remote: String,
    local_dir: PathBuf,
    client: reqwest::Client,
}

impl VersionManager {
    pub fn new(package: &str, remote: &str, local_dir: &Path, client: reqwest::Client) -> Self {
        let mut remote = remote.to_string();
        if !remote.ends_with('/') {
            remote.push('/');
        }
        VersionManager {
            package: package.to_string(),
            remote,
            local_dir: local_dir.to_path_buf(),
            client,
        }
    }

    /// Path of the local JSON cache file
    pub fn manifest_file_path(&self) -> PathBuf {
        self.local_dir
            .join(format!("PackageManifest_{}.json", self.package))
    }

    pub fn local_manifest(&self) -> Result<LocalManifest> {
        LocalManifest::load(&self.manifest_file_path())
    }

    pub fn local_version(&self) -> Result<String> {
        Ok(self.local_manifest()?.version)
    }

    /// Fetch the current remote package version. The timestamp query defeats
    /// CDN caching of the version file.
    pub async fn remote_version(&self) -> Result<String> {
        let url = format!(
            "{}PackageManifest_{}.version?t={}",
            self.remote,
            self.package,
            chrono::Utc::now().timestamp_millis()
        );
        debug!(%url, "Fetching remote version");
        let body = self.client.get(&url).send().await?.error_for_status()?.text().await?;
        Ok(body.trim().to_string())
    }

    /// Fetch and parse the remote binary manifest for a version
    pub async fn remote_manifest(&self, version: &str) -> Result<PackageManifest> {
        let url = format!(
            "{}PackageManifest_{}_{}.bytes",
            self.remote, self.package, version
        );
        debug!(%url, "Fetching remote manifest");
        let body = self.client.get(&url).send().await?.error_for_status()?.bytes().await?;
        PackageManifest::parse(&body)
    }

    /// Reduce a package manifest to the per-bundle records the cache tracks
    pub fn simplify(&self, manifest: &PackageManifest) -> BTreeMap<String, LocalItem> {
        manifest
            .bundles
            .iter()
            .map(|bundle| {
                let key = self
                    .local_dir
                    .join(&bundle.bundle_name)
                    .to_string_lossy()
                    .into_owned();
                (
                    key,
                    LocalItem {
                        remote_filename: format!("{}{}", self.remote, bundle.file_hash),
                        local_basename: format!("{}.bundle", bundle.bundle_name),
                        file_hash: bundle.file_hash.clone(),
                    },
                )
            })
            .collect()
    }

    /// Diff the remote manifest against the local cache. Returns an empty
    /// plan when the remote version matches the cached one.
    pub async fn plan_update(&self) -> Result<UpdatePlan> {
        let local = self.local_manifest()?;
        let remote_version = self.remote_version().await?;

        if local.version == remote_version {
            info!(version = %remote_version, "Local cache already at remote version");
            return Ok(UpdatePlan {
                local_version: local.version,
                remote_version,
                items: BTreeMap::new(),
            });
        }

        let manifest = self.remote_manifest(&remote_version).await?;
        let remote_items = self.simplify(&manifest);
        let items = diff_items(&remote_items, &local.items);

        info!(
            local = %local.version,
            remote = %remote_version,
            stale = items.len(),
            total = remote_items.len(),
            "Computed update plan"
        );
        Ok(UpdatePlan {
            local_version: local.version,
            remote_version,
            items,
        })
    }

    /// Record a finished download pass. Downloaded items are merged into the
    /// existing cache rather than replacing it, so records for unchanged
    /// bundles survive; the stored version moves forward only when the full
    /// plan was downloaded.
    pub fn persist(
        &self,
        downloaded: &BTreeMap<String, LocalItem>,
        remote_version: &str,
        complete: bool,
    ) -> Result<()> {
        let mut local = self.local_manifest()?;
        for (key, item) in downloaded {
            local.items.insert(key.clone(), item.clone());
        }
        if complete {
            local.version = remote_version.to_string();
        }
        local.save(&self.manifest_file_path())
    }
}

/// Items present remotely that are absent locally or carry a different hash
pub fn diff_items(
    remote: &BTreeMap<String, LocalItem>,
    local: &BTreeMap<String, LocalItem>,
) -> BTreeMap<String, LocalItem> {
    remote
        .iter()
        .filter(|(key, item)| {
            local
                .get(*key)
                .map_or(true, |existing| existing.file_hash != item.file_hash)
        })
        .map(|(key, item)| (key.clone(), item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(hash: &str) -> LocalItem {
        LocalItem {
            remote_filename: format!("https://cdn.example/{}", hash),
            local_basename: "b.bundle".to_string(),
            file_hash: hash.to_string(),
        }
    }

    fn manager_in(dir: &Path) -> VersionManager {
        VersionManager::new(
            "DefaultPackage",
            "https://cdn.example/DefaultPackage",
            dir,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_diff_flags_new_and_changed() {
        let mut remote = BTreeMap::new();
        remote.insert("a".to_string(), item("h1"));
        remote.insert("b".to_string(), item("h2"));
        remote.insert("c".to_string(), item("h3"));

        let mut local = BTreeMap::new();
        local.insert("a".to_string(), item("h1")); // unchanged
        local.insert("b".to_string(), item("old")); // changed

        let stale = diff_items(&remote, &local);
        assert_eq!(stale.len(), 2);
        assert!(stale.contains_key("b"));
        assert!(stale.contains_key("c"));
    }

    #[test]
    fn test_simplify_keys_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());

        let manifest =
            PackageManifest::parse(&crate::manifest::sample_manifest_bytes("7")).unwrap();
        let items = manager.simplify(&manifest);
        assert_eq!(items.len(), 2);

        let key = dir
            .path()
            .join("game_ui_activitylistpreview")
            .to_string_lossy()
            .into_owned();
        let item = &items[&key];
        assert_eq!(
            item.remote_filename,
            "https://cdn.example/DefaultPackage/d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(item.local_basename, "game_ui_activitylistpreview.bundle");
    }

    #[test]
    fn test_persist_merges_and_gates_version() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());

        // Seed the cache with one record
        let mut seeded = BTreeMap::new();
        seeded.insert("untouched".to_string(), item("keep"));
        manager.persist(&seeded, "1", true).unwrap();

        // A filtered (incomplete) pass must keep the old version but add
        // its items
        let mut partial = BTreeMap::new();
        partial.insert("new".to_string(), item("h9"));
        manager.persist(&partial, "2", false).unwrap();

        let local = manager.local_manifest().unwrap();
        assert_eq!(local.version, "1");
        assert_eq!(local.items.len(), 2);
        assert_eq!(local.items["untouched"].file_hash, "keep");

        // A complete pass moves the version forward
        manager.persist(&BTreeMap::new(), "2", true).unwrap();
        assert_eq!(manager.local_version().unwrap(), "2");
    }

    #[test]
    fn test_remote_base_gets_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        let manifest =
            PackageManifest::parse(&crate::manifest::sample_manifest_bytes("7")).unwrap();
        for item in manager.simplify(&manifest).values() {
            assert!(item.remote_filename.starts_with("https://cdn.example/DefaultPackage/"));
        }
    }
}
