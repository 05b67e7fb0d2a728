use chrono::{DateTime, Local};
use ir_saver_common::config::SaverConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::cache::FrameCache;
use crate::writer::{ImageWriter, PngWriter};
use crate::StartupError;

const FILE_PREFIX: &str = "ir_image_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Destination of a save made at `at`:
/// `{directory}/ir_image_YYYYMMDD_HHMMSS.png`.
///
/// Two saves within the same second map to the same path; the later one
/// overwrites the earlier.
pub fn save_path(directory: &Path, at: &DateTime<Local>) -> PathBuf {
    directory.join(format!("{FILE_PREFIX}{}.png", at.format(TIMESTAMP_FORMAT)))
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Saved(PathBuf),
    /// Nothing has been received yet.
    NoFrame,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaverStats {
    pub saved: u64,
    pub skipped: u64,
    pub failed: u64,
    pub last_saved: Option<PathBuf>,
}

impl SaverStats {
    fn record(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Saved(path) => {
                self.saved += 1;
                self.last_saved = Some(path.clone());
            }
            TickOutcome::NoFrame => self.skipped += 1,
            TickOutcome::Failed => self.failed += 1,
        }
    }
}

/// Writes the cached frame to a new timestamped file on every tick.
///
/// Ticks never fail: a missing frame is a warning and a write error is
/// logged, and the schedule carries on either way. The timer is re-armed
/// only once a save has completed, so ticks are at least `interval` apart
/// and drift later when the disk is slow.
pub struct PeriodicSaver<W: ImageWriter = PngWriter> {
    cache: FrameCache,
    directory: PathBuf,
    interval: Duration,
    writer: Arc<W>,
    span: Span,
}

impl PeriodicSaver<PngWriter> {
    pub fn new(config: &SaverConfig, cache: FrameCache) -> Result<Self, StartupError> {
        Self::with_writer(config, cache, PngWriter)
    }
}

impl<W: ImageWriter> PeriodicSaver<W> {
    /// Create the saver, making sure the output directory exists first.
    pub fn with_writer(
        config: &SaverConfig,
        cache: FrameCache,
        writer: W,
    ) -> Result<Self, StartupError> {
        let span = info_span!(
            "ir_image_saver",
            directory = %config.directory.display(),
            interval_secs = config.interval_secs
        );
        let interval = config.interval()?;
        span.in_scope(|| ensure_directory(&config.directory))?;

        Ok(Self {
            cache,
            directory: config.directory.clone(),
            interval,
            writer: Arc::new(writer),
            span,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Save the currently cached frame once.
    pub async fn tick(&self) -> TickOutcome {
        self.save_latest().instrument(self.span.clone()).await
    }

    async fn save_latest(&self) -> TickOutcome {
        let Some(frame) = self.cache.peek() else {
            warn!("no image received yet");
            return TickOutcome::NoFrame;
        };

        let path = save_path(&self.directory, &Local::now());
        let writer = Arc::clone(&self.writer);
        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || writer.write(&target, &frame)).await;

        match result {
            Ok(Ok(())) => {
                info!(path = %path.display(), "saved image");
                TickOutcome::Saved(path)
            }
            Ok(Err(e)) => {
                error!(
                    error = %e,
                    path = %path.display(),
                    writer = self.writer.name(),
                    "failed to save image"
                );
                TickOutcome::Failed
            }
            Err(e) => {
                error!(error = %e, path = %path.display(), "image writer task panicked");
                TickOutcome::Failed
            }
        }
    }

    /// Start the schedule on the current runtime. The first tick fires one
    /// interval from now.
    pub fn spawn(self) -> SaverHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let span = self.span.clone();
        let task = tokio::spawn(self.run(shutdown_rx).instrument(span));
        SaverHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> SaverStats {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = SaverStats::default();
        info!("periodic saver started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let outcome = self.tick().await;
            stats.record(&outcome);
            // Next tick is one full interval after this save completed.
            ticker.reset();
        }

        info!(
            saved = stats.saved,
            skipped = stats.skipped,
            failed = stats.failed,
            "periodic saver stopped"
        );
        stats
    }
}

/// Owns a running [`PeriodicSaver`]. Dropping the handle also stops the
/// schedule, but without waiting for it.
pub struct SaverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<SaverStats>,
}

impl SaverHandle {
    /// Cancel the timer and wait for the task to finish. A save already in
    /// progress runs to completion first.
    pub async fn stop(self) -> SaverStats {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "periodic saver task failed");
                SaverStats::default()
            }
        }
    }
}

fn ensure_directory(dir: &Path) -> Result<(), StartupError> {
    if dir.is_dir() {
        debug!(path = %dir.display(), "save directory exists");
        return Ok(());
    }
    if dir.exists() {
        return Err(StartupError::NotADirectory(dir.display().to_string()));
    }
    std::fs::create_dir_all(dir)
        .map_err(|e| StartupError::CreateDirectory(dir.display().to_string(), e))?;
    info!(path = %dir.display(), "created directory");
    Ok(())
}
