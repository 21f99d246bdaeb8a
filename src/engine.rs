//! Transfer engine.
//!
//! One pass: list both sides, diff satellite against local, then move each
//! missing file through its own state machine:
//!
//! ```text
//! Pending -> Transferring -> Succeeded -> Removing -> Removed
//!    |             |                         |
//!    v             v                         v
//! Skipped    TransferFailed             RemoveFailed
//! ```
//!
//! Files are processed one at a time so every speed sample belongs to a
//! single transfer. A failure in one file is logged and the loop moves on.

use crate::error::{Error, Result};
use crate::exec::{CommandSpec, Runner};
use crate::gateway::{Gateway, Removal};
use crate::inventory::{FileInventory, FileRecord};
use crate::location::Location;
use crate::speed::{measured_speed, SpeedTracker, UNIT};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Engine behaviour that comes from config.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub create_video_folders: bool,
    /// Lowercase, without the leading dot.
    pub video_extensions: HashSet<String>,
}

impl EngineOptions {
    pub fn new<I, S>(create_video_folders: bool, video_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            create_video_folders,
            video_extensions: video_extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_video(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .map(|ext| {
                self.video_extensions
                    .contains(&ext.to_string_lossy().to_ascii_lowercase())
            })
            .unwrap_or(false)
    }

    /// Per-title folder for `name`, if it gets one.
    fn folder_for<'a>(&self, name: &'a str) -> Option<&'a str> {
        if !self.create_video_folders || !self.is_video(name) {
            return None;
        }
        Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new(false, Vec::<String>::new())
    }
}

/// Result of comparing the satellite against the local side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    NoNewFiles,
    /// Names present on the satellite and still absent locally.
    Files(Vec<String>),
}

impl Diff {
    pub fn files(&self) -> &[String] {
        match self {
            Diff::NoNewFiles => &[],
            Diff::Files(files) => files,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Diff::NoNewFiles)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    /// Already present at the destination.
    Skipped,
    Transferring,
    TransferFailed,
    /// Copied; removal disabled or not attempted.
    Succeeded,
    Removing,
    Removed,
    /// Copied, but the download client did not remove it.
    RemoveFailed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferState::Skipped
                | TransferState::TransferFailed
                | TransferState::Succeeded
                | TransferState::Removed
                | TransferState::RemoveFailed
        )
    }

    /// Whether the copy itself went through.
    pub fn transferred(self) -> bool {
        matches!(
            self,
            TransferState::Succeeded
                | TransferState::Removing
                | TransferState::Removed
                | TransferState::RemoveFailed
        )
    }
}

/// What happened to one file during a pass.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub file: FileRecord,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub state: TransferState,
    /// States passed through before `state`, oldest first.
    pub history: Vec<TransferState>,
    /// Measured speed in Mbps, when the size was known.
    pub speed: Option<u64>,
    pub error: Option<String>,
}

impl TransferRecord {
    fn new(name: &str) -> Self {
        Self {
            file: FileRecord::new(name),
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            state: TransferState::Pending,
            history: Vec::new(),
            speed: None,
            error: None,
        }
    }

    fn advance(&mut self, next: TransferState) {
        tracing::trace!(file = %self.file.name, from = ?self.state, to = ?next, "State change");
        self.history.push(self.state);
        self.state = next;
    }
}

/// Counters for one pass, plus the per-file records.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub satellite_files: usize,
    pub local_files: usize,
    pub candidates: usize,
    pub attempted: usize,
    pub skipped: usize,
    pub transferred: usize,
    pub transfer_failed: usize,
    pub removed: usize,
    pub remove_failed: usize,
    pub records: Vec<TransferRecord>,
}

impl PassReport {
    fn record(&mut self, record: TransferRecord) {
        match record.state {
            TransferState::Skipped => self.skipped += 1,
            TransferState::TransferFailed => {
                self.attempted += 1;
                self.transfer_failed += 1;
            }
            state if state.transferred() => {
                self.attempted += 1;
                self.transferred += 1;
                match state {
                    TransferState::Removed => self.removed += 1,
                    TransferState::RemoveFailed => self.remove_failed += 1,
                    _ => {}
                }
            }
            _ => {}
        }
        self.records.push(record);
    }
}

pub struct TransferEngine {
    satellite: FileInventory,
    local: FileInventory,
    speed: SpeedTracker,
    gateway: Gateway,
    runner: Arc<dyn Runner>,
    options: EngineOptions,
}

impl TransferEngine {
    pub fn new(
        satellite: FileInventory,
        local: FileInventory,
        speed: SpeedTracker,
        gateway: Gateway,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self {
            satellite,
            local,
            speed,
            gateway,
            runner,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn satellite(&self) -> &FileInventory {
        &self.satellite
    }

    pub fn local(&self) -> &FileInventory {
        &self.local
    }

    pub fn speed(&self) -> &SpeedTracker {
        &self.speed
    }

    /// List both sides. A listing failure ends the pass.
    pub async fn refresh(&mut self) -> Result<()> {
        let remote = self.satellite.list().await?;
        if remote.is_empty() {
            tracing::info!("No remote files found");
        }

        let local = self.local.list().await?;
        if local.is_empty() {
            tracing::info!("No local files found");
        }

        Ok(())
    }

    /// Files on the satellite that are missing locally.
    ///
    /// Starts from the set difference of the two snapshots, then re-checks
    /// each candidate against the local side in case it appeared after the
    /// listing was taken.
    pub async fn diff(&self) -> Diff {
        let local: HashSet<&str> = self.local.names().collect();
        let mut files = Vec::new();

        for name in self.satellite.names().filter(|n| !local.contains(n)) {
            match self.present_locally(name).await {
                Ok(true) => {
                    tracing::debug!(file = name, "Present locally, dropping from diff");
                }
                Ok(false) => files.push(name.to_string()),
                Err(e) => {
                    tracing::warn!(file = name, error = %e, "Could not verify local copy");
                    files.push(name.to_string());
                }
            }
        }

        tracing::debug!(
            satellite = self.satellite.len(),
            local = self.local.len(),
            missing = files.len(),
            "Diff computed"
        );

        if files.is_empty() {
            Diff::NoNewFiles
        } else {
            Diff::Files(files)
        }
    }

    /// Run one full pass.
    pub async fn run(&mut self) -> Result<PassReport> {
        self.refresh().await?;

        let mut report = PassReport {
            satellite_files: self.satellite.len(),
            local_files: self.local.len(),
            ..Default::default()
        };

        let files = match self.diff().await {
            Diff::NoNewFiles => {
                tracing::info!("No new files found to travel on the great transatlantic express");
                return Ok(report);
            }
            Diff::Files(files) => files,
        };

        report.candidates = files.len();
        tracing::info!(count = files.len(), files = ?files, "New files");

        for name in &files {
            let record = self.transfer_one(name).await;
            report.record(record);
        }

        tracing::info!(
            found = report.satellite_files,
            new = report.candidates,
            attempted = report.attempted,
            transferred = report.transferred,
            failed = report.transfer_failed,
            skipped = report.skipped,
            removed = report.removed,
            remove_failed = report.remove_failed,
            "Pass finished"
        );

        Ok(report)
    }

    /// Move a single file through the state machine. Never fails; the
    /// outcome is in the returned record.
    pub async fn transfer_one(&mut self, name: &str) -> TransferRecord {
        let mut record = TransferRecord::new(name);
        tracing::info!(file = name, "Moving file");

        match self.present_locally(name).await {
            Ok(true) => {
                tracing::info!(file = name, "File already exists at destination, skipping");
                record.advance(TransferState::Skipped);
                return record;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(file = name, error = %e, "Could not check destination, transferring anyway");
            }
        }

        match self.satellite.size_of(name).await {
            Ok(size) => {
                tracing::debug!(file = name, size = %size.human, bytes = size.bytes, "Size");
                if let Some(eta) = self.speed.estimate_transfer_time(size.bytes) {
                    tracing::info!(
                        file = name,
                        size = %size.human,
                        estimate_secs = eta.as_secs(),
                        "Estimated transfer time"
                    );
                }
                record.file = record.file.with_size(size);
            }
            Err(e) => {
                tracing::warn!(file = name, error = %e, "Size unknown, no speed telemetry for this file");
            }
        }

        let folder = self.prepare_folder(name).await;
        let command = self.copy_command(name, folder);

        record.advance(TransferState::Transferring);
        record.started_at = Utc::now();
        let clock = Instant::now();
        let result = self.runner.run(&command).await;
        record.elapsed = clock.elapsed();

        if let Err(e) = check_copy(name, result) {
            tracing::error!(
                file = name,
                command = %command,
                elapsed_secs = record.elapsed.as_secs(),
                error = %e,
                "Transfer failed"
            );
            record.advance(TransferState::TransferFailed);
            record.error = Some(e.to_string());
            return record;
        }

        if let Some(bytes) = record.file.bytes() {
            let sample = measured_speed(bytes, record.elapsed);
            record.speed = Some(sample);
            if let Err(e) = self.speed.update(sample) {
                tracing::warn!(error = %e, "Failed to persist speed estimate");
            }
        }

        record.advance(TransferState::Succeeded);
        tracing::info!(
            file = name,
            elapsed_secs = record.elapsed.as_secs(),
            speed = record.speed,
            unit = UNIT,
            average = self.speed.estimate(),
            "Transfer finished"
        );

        if self.gateway.is_enabled() {
            record.advance(TransferState::Removing);
            let outcome = match self.gateway.remove(name).await {
                Ok(Removal::Removed) => {
                    tracing::info!(file = name, "Successfully removed from download client");
                    TransferState::Removed
                }
                Ok(Removal::NotFound) => {
                    tracing::error!(file = name, "Download client has no item with this name");
                    record.error = Some(format!("{} not found in download client", name));
                    TransferState::RemoveFailed
                }
                Err(e) => {
                    tracing::error!(file = name, error = %e, "Removal failed");
                    record.error = Some(e.to_string());
                    TransferState::RemoveFailed
                }
            };
            record.advance(outcome);
        }

        record
    }

    /// Whether `name` is already on the local side, directly under the root
    /// or inside its per-title folder.
    async fn present_locally(&self, name: &str) -> Result<bool> {
        if self.local.contains(name).await? {
            return Ok(true);
        }
        match self.options.folder_for(name) {
            Some(folder) => self.local.contains(&format!("{}/{}", folder, name)).await,
            None => Ok(false),
        }
    }

    /// Create the per-title folder for video files. Returns the folder to
    /// copy into, or `None` to copy into the root.
    async fn prepare_folder<'a>(&self, name: &'a str) -> Option<&'a str> {
        let folder = self.options.folder_for(name)?;
        let Location::Local { root } = self.local.location() else {
            return None;
        };

        let path = root.join(folder);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {
                tracing::info!(file = name, folder, "Created folder");
                Some(folder)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_dir() => {
                        tracing::warn!(file = name, folder, "Folder already exists");
                        Some(folder)
                    }
                    _ => {
                        tracing::error!(
                            file = name,
                            folder,
                            "Folder path is taken by something else, copying into destination root"
                        );
                        None
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    file = name,
                    folder,
                    error = %e,
                    "Could not create folder, copying into destination root"
                );
                None
            }
        }
    }

    fn copy_command(&self, name: &str, folder: Option<&str>) -> CommandSpec {
        let source = self.satellite.location().rsync_ref(name);
        let mut dest = match folder {
            Some(folder) => self.local.location().rsync_ref(folder),
            None => self.local.location().rsync_ref(""),
        };
        if !dest.ends_with('/') {
            dest.push('/');
        }

        CommandSpec::new("rsync")
            .args(["-rz", "--protect-args"])
            .arg(source)
            .arg(dest)
    }
}

/// Any stderr output counts as a failed copy.
fn check_copy(name: &str, result: io::Result<crate::exec::CommandOutput>) -> Result<()> {
    let output = result.map_err(|e| Error::Transfer {
        file: name.to_string(),
        message: format!("could not run rsync: {}", e),
    })?;

    if !output.stderr_lossy().is_empty() || !output.success {
        return Err(Error::Transfer {
            file: name.to_string(),
            message: output.diagnostic(),
        });
    }

    let stdout = output.stdout_lossy();
    if !stdout.trim().is_empty() {
        tracing::debug!(file = name, output = %stdout.trim(), "Rsync output");
    }
    Ok(())
}
