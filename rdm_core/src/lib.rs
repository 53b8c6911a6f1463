//! A resumable, multi-mirror segmented file downloader with a persisted
//! piece manifest.
//!
//! Given one or more mirror URLs for the same resource, [`Downloader`]
//! fetches it into a destination file by tiling it into fixed-size
//! pieces and downloading them concurrently over HTTP byte-range
//! requests, verifying each piece's SHA-256 and journaling progress to a
//! small SQLite-backed manifest so an interrupted download resumes
//! without repeating completed work. Servers without byte-range support
//! fall back to a single resumable stream.

pub mod config;
pub mod error;
pub mod manifest;
pub mod piece;
pub mod pool;
pub mod progress;
pub mod prober;
pub mod sequential;
pub mod session;
pub mod verifier;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;

pub use config::DownloaderConfig;
pub use error::DownloadError;
pub use piece::{Piece, PieceStatus};
pub use progress::{ProgressEvent, ProgressNotifier, ProgressObserver, ProgressSnapshot};

use manifest::Manifest;
use piece::plan_pieces;

/// Entry point: one instance per `(urls, dest)` pair (spec §6 core API).
pub struct Downloader {
    urls: Vec<String>,
    dest: PathBuf,
    config: DownloaderConfig,
    session: session::Session,
}

impl Downloader {
    /// Validate `config` and `urls`, and build the shared HTTP session.
    pub fn new(
        urls: Vec<String>,
        dest: impl Into<PathBuf>,
        config: DownloaderConfig,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        let urls = config::validate_urls(&urls)?;
        let session = session::Session::new(&config)?;
        Ok(Self {
            urls,
            dest: dest.into(),
            config,
            session,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Run to completion with no progress reporting.
    pub async fn download(&self) -> Result<(), DownloadError> {
        self.download_with_progress(None).await
    }

    /// Run to completion, registering `observer` on a background
    /// aggregator task fed by the worker pool / sequential fallback.
    pub async fn download_with_observer(
        &self,
        observer: Box<dyn ProgressObserver>,
    ) -> Result<(), DownloadError> {
        let (tx, rx) = mpsc::channel(256);
        let mut notifier = ProgressNotifier::new();
        notifier.add_observer(observer);
        let notifier_handle = tokio::spawn(notifier.run(rx));

        let result = self.download_with_progress(Some(tx)).await;
        let _ = notifier_handle.await;
        result
    }

    /// The full sequence of spec §4.8: probe, persist, prepare, plan or
    /// reload, verify, dispatch. Idempotent — re-running against a fully
    /// `done` manifest performs no network I/O.
    async fn download_with_progress(
        &self,
        progress_tx: Option<mpsc::Sender<Result<ProgressEvent, String>>>,
    ) -> Result<(), DownloadError> {
        let manifest = Manifest::open(&self.dest)?;

        let (file_size, range_supported) = self.resolve_capabilities(&manifest).await?;

        let file = if range_supported {
            writer::prepare_range_destination(&self.dest, file_size)?
        } else {
            writer::prepare_sequential_destination(&self.dest, file_size)?
        };

        let mut pieces = self.load_or_plan_pieces(&manifest, file_size)?;

        verifier::reverify_done_pieces(&manifest, &file, &mut pieces)?;

        let pending: Vec<Piece> = pieces
            .into_iter()
            .filter(|p| p.status != PieceStatus::Done)
            .collect();

        if pending.is_empty() {
            log::info!("[downloader] all pieces already done, nothing to do");
            return Ok(());
        }

        if range_supported {
            pool::run(
                &self.session,
                Arc::new(manifest),
                Arc::new(file),
                pending,
                &self.urls,
                self.config.concurrency,
                progress_tx,
            )
            .await
        } else {
            sequential::run(
                &self.session,
                &manifest,
                Arc::new(StdMutex::new(file)),
                &self.urls[0],
                file_size,
                pending,
            )
            .await
        }
    }

    /// `file_size`/`range_supported` are probed once and persisted; every
    /// later call reads them back from the manifest instead of re-probing.
    async fn resolve_capabilities(&self, manifest: &Manifest) -> Result<(u64, bool), DownloadError> {
        if let Some(fs) = manifest.get_meta("file_size")? {
            let file_size: u64 = fs.parse().unwrap_or(0);
            let range_supported = manifest.get_meta("range_supported")?.as_deref() == Some("1");
            return Ok((file_size, range_supported));
        }

        let probe = prober::probe(&self.session.client, &self.urls[0]).await;
        if probe.file_size == 0 {
            return Err(DownloadError::Probe);
        }
        manifest.set_meta("file_size", &probe.file_size.to_string())?;
        manifest.set_meta(
            "range_supported",
            if probe.range_supported { "1" } else { "0" },
        )?;
        Ok((probe.file_size, probe.range_supported))
    }

    /// Plans pieces once (gated by the `initialised` meta flag) or
    /// reloads the frozen piece table on every later call.
    fn load_or_plan_pieces(
        &self,
        manifest: &Manifest,
        file_size: u64,
    ) -> Result<Vec<Piece>, DownloadError> {
        if manifest.get_meta("initialised")?.is_some() {
            return Ok(manifest.load_pieces()?);
        }
        let planned = plan_pieces(file_size, self.config.piece_size);
        for piece in &planned {
            manifest.replace_piece(piece)?;
        }
        manifest.set_meta("initialised", "1")?;
        Ok(planned)
    }
}
