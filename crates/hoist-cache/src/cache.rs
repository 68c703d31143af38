//! The cache proper: policy evaluation, single-flight downloads, TTL
//! revalidation, checksum verification, and atomic publication.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use hoist_util::errors::HoistError;
use hoist_util::fs as hfs;

use crate::checksum::{self, ChecksumOption};
use crate::config::CacheConfig;
use crate::credentials::CredentialStore;
use crate::download::{DownloadOutcome, Downloader, Validators};
use crate::events::{FetchEvents, NoEvents};
use crate::layout;
use crate::lock::{FileLock, KeyedLocks};
use crate::policy::CachePolicy;

/// A URL-addressed local artifact cache.
///
/// Cheap to clone; clones share the worker pool, the per-path locks, and
/// the cancellation flag.
#[derive(Clone)]
pub struct Cache {
    root: PathBuf,
    policies: Vec<CachePolicy>,
    ttl: Duration,
    request_timeout: Option<Duration>,
    checksums: Vec<ChecksumOption>,
    downloader: Downloader,
    locks: Arc<KeyedLocks>,
    pool: Arc<Semaphore>,
    events: Arc<dyn FetchEvents>,
    cancelled: Arc<AtomicBool>,
}

impl Cache {
    pub fn new(config: CacheConfig) -> miette::Result<Self> {
        Self::with_events(config, Arc::new(NoEvents))
    }

    pub fn with_events(config: CacheConfig, events: Arc<dyn FetchEvents>) -> miette::Result<Self> {
        let client = Downloader::build_client(config.connect_timeout, config.read_timeout)?;
        let downloader = Downloader::new(
            client,
            CredentialStore::new(config.credentials),
            config.retry_count,
            config.ssl_retry_count,
            config.max_redirections,
        );
        Ok(Self {
            root: config.root,
            policies: config.policies,
            ttl: config.ttl,
            request_timeout: config.request_timeout,
            checksums: checksum::default_ladder(),
            downloader,
            locks: Arc::new(KeyedLocks::new()),
            pool: Arc::new(Semaphore::new(config.parallel.max(1))),
            events,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policies(&self) -> &[CachePolicy] {
        &self.policies
    }

    /// Cooperatively cancel all in-flight and future fetches. Interrupted
    /// downloads delete their `.part` files and surface as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// The local path a URL caches to, whether or not it exists yet.
    pub fn path_for(&self, url: &str) -> miette::Result<PathBuf> {
        layout::url_to_path(&self.root, url)
    }

    /// Fetch a non-changing URL with the configured policy chain.
    pub async fn fetch(&self, url: &str) -> miette::Result<PathBuf> {
        self.fetch_changing(url, false).await
    }

    /// Fetch a URL, marking it as changing (snapshot) or not.
    pub async fn fetch_changing(&self, url: &str, changing: bool) -> miette::Result<PathBuf> {
        let policies = self.policies.clone();
        self.fetch_with(url, changing, &policies).await
    }

    /// Fetch with an explicit policy chain, first policy that yields a
    /// result wins.
    pub async fn fetch_with(
        &self,
        url: &str,
        changing: bool,
        policies: &[CachePolicy],
    ) -> miette::Result<PathBuf> {
        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|_| HoistError::Cancelled)?;
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(HoistError::Cancelled.into());
        }

        let result = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_policies(url, changing, policies))
                .await
                .unwrap_or_else(|_| {
                    Err(HoistError::Transport {
                        url: url.to_string(),
                        message: format!("request exceeded the {limit:?} wall-clock budget"),
                    }
                    .into())
                }),
            None => self.run_policies(url, changing, policies).await,
        };
        if let Err(ref e) = result {
            self.events.failed(url, &format!("{e:?}"));
        }
        result
    }

    /// Fetch and read the file contents in one go.
    pub async fn fetch_bytes(&self, url: &str, changing: bool) -> miette::Result<Vec<u8>> {
        let path = self.fetch_changing(url, changing).await?;
        tokio::fs::read(&path).await.map_err(|e| HoistError::Io(e).into())
    }

    async fn run_policies(
        &self,
        url: &str,
        changing: bool,
        policies: &[CachePolicy],
    ) -> miette::Result<PathBuf> {
        let path = layout::url_to_path(&self.root, url)?;

        for policy in policies {
            match policy {
                CachePolicy::LocalOnly => {
                    if path.is_file() {
                        return Ok(path);
                    }
                    // defer to the next policy, if any
                }
                CachePolicy::FetchMissing => {
                    if path.is_file() {
                        return Ok(path);
                    }
                    return self.download(url, &path, false).await;
                }
                CachePolicy::Update => {
                    return self.download(url, &path, true).await;
                }
                CachePolicy::LocalUpdate | CachePolicy::LocalUpdateChanging => {
                    if !path.is_file() {
                        return self.download(url, &path, false).await;
                    }
                    let revalidates =
                        *policy == CachePolicy::LocalUpdate || changing;
                    if revalidates && self.is_stale(&path) {
                        return self.revalidate(url, &path).await;
                    }
                    return Ok(path);
                }
            }
        }

        Err(HoistError::NotInCache {
            url: url.to_string(),
        }
        .into())
    }

    fn is_stale(&self, path: &Path) -> bool {
        match hfs::file_age_secs(&layout::last_check_path(path)) {
            Some(age) => age > self.ttl.as_secs(),
            None => true,
        }
    }

    /// Download under the single-flight locks and publish atomically.
    async fn download(&self, url: &str, path: &Path, force: bool) -> miette::Result<PathBuf> {
        let _task_guard = self.locks.lock(path).await;
        let _file_lock = FileLock::acquire(&layout::lock_path(path))
            .await
            .map_err(HoistError::Io)?;

        // Another task or process may have published while we waited.
        if !force && path.is_file() {
            return Ok(path.to_path_buf());
        }

        let part = layout::part_path(path);
        let outcome = self
            .downloader
            .download_to(url, &part, None, self.events.as_ref(), &self.cancelled)
            .await;

        match outcome {
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                Err(e)
            }
            Ok(DownloadOutcome::NotFound) => {
                let _ = std::fs::remove_file(&part);
                Err(HoistError::NotFound {
                    subject: url.to_string(),
                }
                .into())
            }
            Ok(DownloadOutcome::NotModified) => {
                // only possible with conditional headers; treat as published
                Ok(path.to_path_buf())
            }
            Ok(DownloadOutcome::Downloaded { validators }) => {
                self.publish(url, path, &part, &validators).await
            }
        }
    }

    /// Conditional revalidation of an existing cached file.
    async fn revalidate(&self, url: &str, path: &Path) -> miette::Result<PathBuf> {
        let _task_guard = self.locks.lock(path).await;
        let _file_lock = FileLock::acquire(&layout::lock_path(path))
            .await
            .map_err(HoistError::Io)?;

        if !self.is_stale(path) {
            // A concurrent revalidation already ran.
            return Ok(path.to_path_buf());
        }

        let stored = read_last_check(&layout::last_check_path(path));
        let part = layout::part_path(path);
        let outcome = self
            .downloader
            .download_to(url, &part, Some(&stored), self.events.as_ref(), &self.cancelled)
            .await;

        match outcome {
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                Err(e)
            }
            Ok(DownloadOutcome::NotModified) => {
                let _ = std::fs::remove_file(&part);
                hfs::touch(&layout::last_check_path(path)).map_err(HoistError::Io)?;
                tracing::debug!("revalidated {url}: not modified");
                Ok(path.to_path_buf())
            }
            Ok(DownloadOutcome::NotFound) => {
                // Upstream dropped the file; the cached copy stays usable.
                let _ = std::fs::remove_file(&part);
                tracing::warn!("{url} vanished upstream, keeping the cached copy");
                hfs::touch(&layout::last_check_path(path)).map_err(HoistError::Io)?;
                Ok(path.to_path_buf())
            }
            Ok(DownloadOutcome::Downloaded { validators }) => {
                tracing::debug!("revalidated {url}: replaced");
                self.publish(url, path, &part, &validators).await
            }
        }
    }

    /// Verify the `.part` against the checksum ladder, write the freshness
    /// sidecar, then rename into place. The rename is last so any observer
    /// of the final path also sees its sidecars.
    async fn publish(
        &self,
        url: &str,
        path: &Path,
        part: &Path,
        validators: &Validators,
    ) -> miette::Result<PathBuf> {
        if let Err(e) = self.verify(url, path, part).await {
            let _ = std::fs::remove_file(part);
            return Err(e);
        }

        write_last_check(&layout::last_check_path(path), validators)
            .map_err(HoistError::Io)?;
        hfs::commit_rename(part, path).map_err(HoistError::Io)?;
        self.events.finished(url);
        Ok(path.to_path_buf())
    }

    /// Walk the checksum ladder: verify with the first algorithm whose
    /// sidecar can be fetched, demote on a missing sidecar, accept when the
    /// ladder ends with `None`.
    async fn verify(&self, url: &str, path: &Path, part: &Path) -> miette::Result<()> {
        for option in &self.checksums {
            match option {
                ChecksumOption::None => {
                    tracing::warn!("no checksum available for {url}, accepting");
                    return Ok(());
                }
                ChecksumOption::Verify(algorithm) => {
                    let sidecar_url = format!("{url}.{}", algorithm.extension());
                    let sidecar_path = layout::checksum_path(path, algorithm.extension());
                    match self.fetch_sidecar(&sidecar_url, &sidecar_path).await? {
                        None => continue, // demote to the next option
                        Some(sidecar) => {
                            let content =
                                std::fs::read_to_string(&sidecar).map_err(HoistError::Io)?;
                            let expected = checksum::extract_hash(&content);
                            return checksum::verify_file(*algorithm, part, url, &expected);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetch a checksum sidecar through the cache pipeline. Sidecars are
    /// not themselves checksum-verified. Returns `None` on a 404.
    async fn fetch_sidecar(
        &self,
        url: &str,
        path: &Path,
    ) -> miette::Result<Option<PathBuf>> {
        if path.is_file() {
            return Ok(Some(path.to_path_buf()));
        }

        let _task_guard = self.locks.lock(path).await;
        let _file_lock = FileLock::acquire(&layout::lock_path(path))
            .await
            .map_err(HoistError::Io)?;
        if path.is_file() {
            return Ok(Some(path.to_path_buf()));
        }

        let part = layout::part_path(path);
        let outcome = self
            .downloader
            .download_to(url, &part, None, self.events.as_ref(), &self.cancelled)
            .await;
        match outcome {
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                Err(e)
            }
            Ok(DownloadOutcome::NotFound) | Ok(DownloadOutcome::NotModified) => {
                let _ = std::fs::remove_file(&part);
                Ok(None)
            }
            Ok(DownloadOutcome::Downloaded { .. }) => {
                hfs::commit_rename(&part, path).map_err(HoistError::Io)?;
                Ok(Some(path.to_path_buf()))
            }
        }
    }
}

/// Persist response validators to the `.lastCheck` sidecar. The file's
/// mtime is the TTL gate; its contents are replayed as conditional headers.
fn write_last_check(path: &Path, validators: &Validators) -> std::io::Result<()> {
    let mut content = String::new();
    if let Some(ref lm) = validators.last_modified {
        content.push_str(&format!("last-modified={lm}\n"));
    }
    if let Some(ref etag) = validators.etag {
        content.push_str(&format!("etag={etag}\n"));
    }
    hfs::write_atomic(path, content.as_bytes())
}

fn read_last_check(path: &Path) -> Validators {
    let mut validators = Validators::default();
    let Ok(content) = std::fs::read_to_string(path) else {
        return validators;
    };
    for line in content.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key {
                "last-modified" => validators.last_modified = Some(value.to_string()),
                "etag" => validators.etag = Some(value.to_string()),
                _ => {}
            }
        }
    }
    validators
}
