use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use seerkit_updater::{UpdateOptions, Updater, UpdaterConfig};

use crate::ui::{info, success};

/// Check the CDN for a newer package version and download changed bundles
#[derive(Args)]
pub struct UpdateCommand {
    /// Maximum concurrent downloads
    #[arg(long, default_value = "20")]
    pub concurrency: usize,

    /// Only download bundles whose path contains one of these keywords
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Download every stale bundle, ignoring the default keyword filter
    #[arg(long)]
    pub all: bool,

    /// Only report the cached and remote versions, downloading nothing
    #[arg(long)]
    pub check: bool,

    /// Remote package base URL
    #[arg(long)]
    pub remote: Option<String>,

    /// Local directory bundles are downloaded into
    #[arg(long)]
    pub local: Option<PathBuf>,

    /// Package name
    #[arg(long)]
    pub package: Option<String>,
}

impl UpdateCommand {
    pub fn execute(&self) -> Result<()> {
        let mut config = UpdaterConfig::default();
        if let Some(remote) = &self.remote {
            config.remote = remote.clone();
        }
        if let Some(local) = &self.local {
            config.local_dir = local.clone();
        }
        if let Some(package) = &self.package {
            config.package = package.clone();
        }

        let mut options = UpdateOptions {
            concurrency: self.concurrency,
            ..UpdateOptions::default()
        };
        if self.all {
            options.include.clear();
        } else if !self.include.is_empty() {
            options.include = self.include.clone();
        }

        let updater = Updater::new(config);

        // The updater is async end to end; one current-thread runtime is
        // plenty for a CLI invocation.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build async runtime")?;

        if self.check {
            let (local, remote) = runtime.block_on(updater.version_info())?;
            info(&format!(
                "Local version {} in {}, remote version {}",
                local,
                updater.local_dir().display(),
                remote
            ));
            if local == remote {
                success("Up to date");
            }
            return Ok(());
        }

        let summary = runtime.block_on(updater.update(&options))?;

        if summary.planned == 0 {
            info(&format!(
                "Already up to date (version {})",
                summary.remote_version
            ));
        } else {
            success(&format!(
                "Updated {} of {} stale bundles ({} -> {})",
                summary.downloaded, summary.planned, summary.local_version, summary.remote_version
            ));
        }
        Ok(())
    }
}
