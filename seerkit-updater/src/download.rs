use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{Result, UpdateError};

const DEFAULT_CONCURRENCY: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One file to fetch: where from, where to, and the MD5 it must match
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub md5: String,
}

/// Concurrency-bounded downloader with per-file MD5 verification. Bytes are
/// hashed as they stream in and only written to disk once the digest checks
/// out, so a failed download never leaves a bad file behind.
pub struct Downloader {
    client: reqwest::Client,
    concurrency: usize,
}

impl Downloader {
    pub fn new(user_agent: &str, referer: &str, concurrency: usize) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, value);
        }
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Downloader {
            client,
            concurrency: if concurrency == 0 {
                DEFAULT_CONCURRENCY
            } else {
                concurrency
            },
        })
    }

    /// Download every task, failing if any one of them fails. All tasks run
    /// to completion before an error is returned, so one bad file does not
    /// cancel the rest of the batch.
    pub async fn download_all(&self, tasks: Vec<DownloadTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let progress = MultiProgress::new();
        let overall = progress.add(ProgressBar::new(tasks.len() as u64));
        overall.set_style(overall_style());

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let client = self.client.clone();
            let semaphore = Arc::clone(&semaphore);
            let progress = progress.clone();
            let overall = overall.clone();

            handles.push(tokio::spawn(async move {
                // Semaphore lives as long as the spawner, acquire can't fail
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = fetch_one(&client, &task, &progress).await;
                overall.inc(1);
                result
            }));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(%err, "Download failed");
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(UpdateError::Join(err));
                }
            }
        }
        overall.finish_and_clear();

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Stream one file, verifying its MD5 before anything touches disk
async fn fetch_one(
    client: &reqwest::Client,
    task: &DownloadTask,
    progress: &MultiProgress,
) -> Result<()> {
    debug!(url = %task.url, dest = %task.dest.display(), "Downloading");

    let response = client.get(&task.url).send().await?.error_for_status()?;

    let bar = match response.content_length() {
        Some(length) => {
            let bar = progress.add(ProgressBar::new(length));
            bar.set_style(byte_style());
            bar.set_message(
                task.dest
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            Some(bar)
        }
        None => None,
    };

    let mut hasher = Md5::new();
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        body.extend_from_slice(&chunk);
        if let Some(bar) = &bar {
            bar.inc(chunk.len() as u64);
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(&task.md5) {
        return Err(UpdateError::HashMismatch {
            url: task.url.clone(),
            expected: task.md5.to_lowercase(),
            actual,
        });
    }

    if let Some(parent) = task.dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&task.dest, &body)?;
    Ok(())
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
        .unwrap()
        .progress_chars("#>-")
}

fn byte_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes}")
        .unwrap()
        .progress_chars("#>-")
}
