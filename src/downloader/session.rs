//! Per-target orchestration: probe, plan, resume, transfer, verify.

use super::config::DownloaderConfig;
use crate::download::{verify, DownloadTarget, Status, Summary, TransferMode, Verification};
use crate::error::{Error, Result};
use crate::http::{Capabilities, RangeProbe};
use crate::progress::ProgressTracker;
use crate::resume::{ManifestHeader, ResumeKey, ResumeManifest, ResumeStore, MANIFEST_VERSION};
use crate::segment::{ChunkPlan, ChunkPlanner, ConnectionWorkerPool, SingleStreamFallback};

use reqwest_middleware::ClientWithMiddleware;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::{self, OpenOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Probing,
    Planning,
    Resuming,
    Transferring,
    Verifying,
    Succeeded,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Probing => "probing",
            SessionState::Planning => "planning",
            SessionState::Resuming => "resuming",
            SessionState::Transferring => "transferring",
            SessionState::Verifying => "verifying",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

enum Finished {
    Skipped(String),
    Verified(Verification),
}

/// Downloads one [`DownloadTarget`] and produces its [`Summary`].
pub struct DownloadSession<'a> {
    config: &'a DownloaderConfig,
    client: &'a ClientWithMiddleware,
    target: &'a DownloadTarget,
    cancel: CancellationToken,
    destination: PathBuf,
    state: SessionState,
    mode: Option<TransferMode>,
    total: Option<u64>,
}

impl<'a> DownloadSession<'a> {
    pub fn new(
        config: &'a DownloaderConfig,
        client: &'a ClientWithMiddleware,
        target: &'a DownloadTarget,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            destination: config.destination_for(target),
            config,
            client,
            target,
            cancel,
            state: SessionState::Probing,
            mode: None,
            total: target.expected_size,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!("{:?}: {} -> {}", self.destination, self.state, next);
        self.state = next;
    }

    /// Run the session to completion. Never fails; errors end up in the summary.
    #[instrument(skip_all, fields(url = %self.target.url, destination = ?self.destination))]
    pub async fn run(mut self) -> Summary {
        let started = Instant::now();
        let tracker = Arc::new(ProgressTracker::new(
            &self.destination,
            self.config.on_progress.clone(),
        ));

        info!("Downloading {} to {:?}", self.target.url, self.destination);
        let outcome = self.execute(&tracker).await;

        let summary = Summary::new(self.target.with_size(self.total))
            .with_transfer(tracker.fetched(), tracker.resumed(), self.total)
            .with_elapsed(started.elapsed());
        let summary = match self.mode {
            Some(mode) => summary.with_mode(mode),
            None => summary,
        };

        let summary = match outcome {
            Ok(Finished::Skipped(reason)) => {
                self.transition(SessionState::Succeeded);
                info!("Skipped {:?}: {}", self.destination, reason);
                summary.skip(reason)
            }
            Ok(Finished::Verified(Verification::Mismatch { expected, actual })) => {
                self.transition(SessionState::Failed);
                let error = Error::VerificationMismatch {
                    algorithm: self
                        .target
                        .hash
                        .as_ref()
                        .map(|h| h.algorithm.name().to_string())
                        .unwrap_or_default(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                };
                warn!("{:?}: {}", self.destination, error);
                summary
                    .fail_with(&error)
                    .with_verification(Verification::Mismatch { expected, actual })
            }
            Ok(Finished::Verified(verification)) => {
                self.transition(SessionState::Succeeded);
                info!(
                    "Finished {:?} in {:.2?}",
                    self.destination,
                    summary.elapsed()
                );
                summary
                    .with_verification(verification)
                    .with_status(Status::Success)
            }
            Err(error) => {
                self.transition(SessionState::Failed);
                warn!("Download of {} failed: {}", self.target.url, error);
                summary.fail_with(&error)
            }
        };
        summary
    }

    async fn execute(&mut self, tracker: &Arc<ProgressTracker>) -> Result<Finished> {
        if let Some(parent) = self.destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(parent, e))?;
        }
        let store = Arc::new(ResumeStore::new(
            self.config.resume_directory_for(&self.destination),
        ));

        if let Some(reason) = self.existing_file_matches(&store).await? {
            return Ok(Finished::Skipped(reason));
        }

        self.transition(SessionState::Probing);
        let probe = RangeProbe::new(self.client.clone(), self.config.attempt_timeout);
        let probed = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            probed = probe.probe_with_retries(&self.target.url, self.config.probe_retries, &self.config.retry) => probed,
        };
        let capabilities = match probed {
            Ok(capabilities) => capabilities,
            Err(e) => {
                warn!("{}; falling back to a single stream", e);
                Capabilities::default()
            }
        };
        self.total = capabilities.total_size.or(self.total);
        tracker.set_total(self.total);

        let key = match capabilities.total_size {
            Some(total) if capabilities.supports_ranges => {
                self.segmented(total, &capabilities, &store, tracker).await?
            }
            _ => self.single_stream(&store, tracker).await?,
        };

        self.transition(SessionState::Verifying);
        let verification = verify(&self.destination, self.target.hash.as_ref()).await?;
        if !verification.is_mismatch() {
            store.clear(&key).await?;
        }
        Ok(Finished::Verified(verification))
    }

    /// Reason to skip when the destination already holds the expected content.
    async fn existing_file_matches(&self, store: &ResumeStore) -> Result<Option<String>> {
        let Some(ref expected) = self.target.hash else {
            return Ok(None);
        };
        if self.config.overwrite || !fs::try_exists(&self.destination).await.unwrap_or(false) {
            return Ok(None);
        }

        let key = ResumeKey::derive(&self.target.url, &self.destination).await?;
        if store.load(&key).await?.is_some() {
            return Ok(None);
        }

        match verify(&self.destination, Some(expected)).await? {
            Verification::Matched(_) => Ok(Some("File exists with matching hash".into())),
            _ => Ok(None),
        }
    }

    async fn segmented(
        &mut self,
        total: u64,
        capabilities: &Capabilities,
        store: &Arc<ResumeStore>,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<ResumeKey> {
        self.mode = Some(TransferMode::Segmented);

        self.transition(SessionState::Planning);
        let plan = ChunkPlanner::new(self.config.chunk_size, self.config.max_connections)?
            .plan(total)?;
        debug!(
            "Planned {} chunks of {} bytes",
            plan.ranges.len(),
            plan.chunk_size
        );

        self.transition(SessionState::Resuming);
        let mut key = ResumeKey::derive(&self.target.url, &self.destination).await?;
        let manifest = match store.load(&key).await? {
            Some(manifest) if !self.config.overwrite => {
                match self.check_manifest(&plan, &manifest, capabilities).await {
                    Ok(()) => Some(manifest),
                    Err(e) => {
                        warn!("{}; starting over", e);
                        store.clear(&key).await?;
                        None
                    }
                }
            }
            _ => None,
        };

        let completed = match manifest {
            Some(manifest) => {
                info!(
                    "Resuming with {} of {} bytes already on disk",
                    manifest.completed_bytes(),
                    total
                );
                manifest.completed
            }
            None => {
                key = self.prepare_destination(&plan, capabilities, store).await?;
                BTreeSet::new()
            }
        };

        let remaining = plan.remaining(&completed);
        let pending: u64 = remaining.iter().map(|r| r.len()).sum();
        tracker.resume_from(total - pending);

        self.transition(SessionState::Transferring);
        ConnectionWorkerPool::new(
            self.client.clone(),
            self.target.url.clone(),
            &self.destination,
            total,
            store.clone(),
            key.clone(),
            tracker.clone(),
        )
        .workers(plan.worker_count())
        .attempt_timeout(self.config.attempt_timeout)
        .retry(self.config.retry.clone())
        .if_range(capabilities.validator())
        .limiter(self.config.connection_limit.clone())
        .cancel(self.cancel.clone())
        .run(remaining)
        .await?;

        Ok(key)
    }

    /// A record is only applied to the file and resource it was written for.
    async fn check_manifest(
        &self,
        plan: &ChunkPlan,
        manifest: &ResumeManifest,
        capabilities: &Capabilities,
    ) -> Result<()> {
        let header = &manifest.header;
        if header.url != self.target.url.as_str() {
            return Err(Error::ResumeStateInvalid(format!(
                "record was written for {}",
                header.url
            )));
        }
        plan.accepts(manifest)?;

        if header.etag.is_some() && header.etag != capabilities.etag {
            return Err(Error::ResumeStateInvalid("ETag changed".into()));
        }
        if header.last_modified.is_some() && header.last_modified != capabilities.last_modified {
            return Err(Error::ResumeStateInvalid("Last-Modified changed".into()));
        }

        let on_disk = fs::metadata(&self.destination)
            .await
            .map_err(|e| Error::storage(&self.destination, e))?
            .len();
        if on_disk != plan.total_size {
            return Err(Error::ResumeStateInvalid(format!(
                "destination holds {} bytes, expected {}",
                on_disk, plan.total_size
            )));
        }
        Ok(())
    }

    /// Create the pre-sized destination and a fresh record for it.
    async fn prepare_destination(
        &self,
        plan: &ChunkPlan,
        capabilities: &Capabilities,
        store: &ResumeStore,
    ) -> Result<ResumeKey> {
        let path = self.destination.as_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| Error::storage(path, e))?;
        file.set_len(plan.total_size)
            .await
            .map_err(|e| Error::storage(path, e))?;
        file.sync_all().await.map_err(|e| Error::storage(path, e))?;
        drop(file);

        let key = ResumeKey::derive(&self.target.url, path).await?;
        let file_identity = key
            .file()
            .ok_or_else(|| Error::Internal(format!("{} vanished", path.display())))?;
        let header = ManifestHeader {
            version: MANIFEST_VERSION,
            url: self.target.url.to_string(),
            destination: key.destination().display().to_string(),
            total_size: plan.total_size,
            chunk_size: plan.chunk_size,
            algorithm: self
                .target
                .hash
                .as_ref()
                .map(|h| h.algorithm.name())
                .unwrap_or("none")
                .to_string(),
            file: file_identity,
            etag: capabilities.etag.clone(),
            last_modified: capabilities.last_modified.clone(),
        };
        store.initialize(&key, &header).await?;
        Ok(key)
    }

    async fn single_stream(
        &mut self,
        store: &ResumeStore,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<ResumeKey> {
        self.mode = Some(TransferMode::SingleStream);
        info!("Server does not serve ranges, using a single stream");

        let key = ResumeKey::derive(&self.target.url, &self.destination).await?;
        store.clear(&key).await?;

        let _permit = match self.config.connection_limit.clone() {
            Some(limit) => tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                permit = limit.acquire_owned() => Some(
                    permit.map_err(|_| Error::Internal("connection limiter closed".into()))?,
                ),
            },
            None => None,
        };

        self.transition(SessionState::Transferring);
        let written = SingleStreamFallback::new(
            self.client.clone(),
            self.target.url.clone(),
            &self.destination,
            tracker.clone(),
        )
        .attempt_timeout(self.config.attempt_timeout)
        .retry(self.config.retry.clone())
        .cancel(self.cancel.clone())
        .run()
        .await?;

        self.total = self.total.or(Some(written));
        Ok(key)
    }
}

/// Remove the resume record of `destination`.
pub(crate) async fn discard(
    config: &DownloaderConfig,
    target: &DownloadTarget,
    destination: &Path,
) -> Result<()> {
    let key = ResumeKey::derive(&target.url, destination).await?;
    ResumeStore::new(config.resume_directory_for(destination))
        .clear(&key)
        .await
}
