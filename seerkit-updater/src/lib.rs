//! YooAsset CDN client for seerkit.
//!
//! Parses the binary PackageManifest format, diffs the remote manifest
//! against a local JSON cache, and downloads stale bundles concurrently
//! with MD5 verification.

pub mod bytes;
pub mod cache;
pub mod download;
pub mod error;
pub mod manager;
pub mod manifest;
pub mod updater;

pub use cache::{LocalItem, LocalManifest};
pub use download::{DownloadTask, Downloader};
pub use error::{Result, UpdateError};
pub use manager::{UpdatePlan, VersionManager};
pub use manifest::{AssetInfo, BundleInfo, PackageManifest};
pub use updater::{UpdateOptions, UpdateSummary, Updater, UpdaterConfig};
