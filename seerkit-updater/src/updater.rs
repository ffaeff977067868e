use std::path::{Path, PathBuf};

use tracing::info;

use crate::download::{Downloader, DownloadTask};
use crate::error::Result;
use crate::manager::VersionManager;

/// CDN layout and headers the game client uses
pub const DEFAULT_REMOTE: &str =
    "https://newseer.61.com/Assets/StandaloneWindows64/DefaultPackage/";
pub const DEFAULT_LOCAL_DIR: &str = "./DefaultPackage/";
pub const DEFAULT_PACKAGE: &str = "DefaultPackage";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Linux; Android 6.0.1) AppleWebKit/537.36 Chrome/55 Mobile";
pub const DEFAULT_REFERER: &str = "https://newseer.61.com";

/// Keyword filter applied by default; the preview-extraction workflow only
/// needs the activity list bundle.
pub const DEFAULT_INCLUDE: &[&str] = &["activityListPreview"];

/// Where the updater talks to and where it puts files
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub package: String,
    pub remote: String,
    pub local_dir: PathBuf,
    pub user_agent: String,
    pub referer: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        UpdaterConfig {
            package: DEFAULT_PACKAGE.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIR),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
        }
    }
}

/// Per-run knobs
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub concurrency: usize,
    /// Case-insensitive substrings a bundle's local path must contain to be
    /// downloaded; empty means everything in the plan.
    pub include: Vec<String>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            concurrency: 20,
            include: DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What an update run did
#[derive(Debug, Clone)]
pub struct UpdateSummary {
    pub local_version: String,
    pub remote_version: String,
    /// Stale bundles in the full plan, before keyword filtering
    pub planned: usize,
    pub downloaded: usize,
}

/// Orchestrates plan, filter, download, and cache persistence
pub struct Updater {
    manager: VersionManager,
    config: UpdaterConfig,
}

impl Updater {
    pub fn new(config: UpdaterConfig) -> Self {
        let client = reqwest::Client::new();
        let manager = VersionManager::new(
            &config.package,
            &config.remote,
            &config.local_dir,
            client,
        );
        Updater { manager, config }
    }

    /// Check the remote version and download whatever is stale
    pub async fn update(&self, options: &UpdateOptions) -> Result<UpdateSummary> {
        let plan = self.manager.plan_update().await?;
        if plan.items.is_empty() {
            info!("Nothing to update");
            return Ok(UpdateSummary {
                local_version: plan.local_version,
                remote_version: plan.remote_version,
                planned: 0,
                downloaded: 0,
            });
        }

        let planned = plan.items.len();
        let selected = filter_items(plan.items, &options.include);
        if selected.is_empty() {
            info!(planned, "No planned bundle matches the include keywords");
            return Ok(UpdateSummary {
                local_version: plan.local_version,
                remote_version: plan.remote_version,
                planned,
                downloaded: 0,
            });
        }
        info!(
            planned,
            selected = selected.len(),
            "Downloading stale bundles"
        );

        let tasks: Vec<DownloadTask> = selected
            .iter()
            .map(|(key, item)| DownloadTask {
                url: item.remote_filename.clone(),
                dest: PathBuf::from(key),
                md5: item.file_hash.clone(),
            })
            .collect();

        let downloader = Downloader::new(
            &self.config.user_agent,
            &self.config.referer,
            options.concurrency,
        )?;
        downloader.download_all(tasks).await?;

        // A keyword-filtered pass leaves the cached version behind so the
        // skipped bundles stay on the next plan.
        let complete = selected.len() == planned;
        self.manager
            .persist(&selected, &plan.remote_version, complete)?;

        info!(downloaded = selected.len(), "Update finished");
        Ok(UpdateSummary {
            local_version: plan.local_version,
            remote_version: plan.remote_version,
            planned,
            downloaded: selected.len(),
        })
    }

    /// Cached vs remote version, no downloads
    pub async fn version_info(&self) -> Result<(String, String)> {
        let local = self.manager.local_version()?;
        let remote = self.manager.remote_version().await?;
        Ok((local, remote))
    }

    pub fn local_dir(&self) -> &Path {
        &self.config.local_dir
    }
}

/// Keep items whose key contains any include keyword, case-insensitive.
/// An empty keyword list keeps everything.
fn filter_items(
    items: std::collections::BTreeMap<String, crate::cache::LocalItem>,
    include: &[String],
) -> std::collections::BTreeMap<String, crate::cache::LocalItem> {
    if include.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            include.iter().any(|kw| key.contains(&kw.to_lowercase()))
        })
        .collect()
}
