//! Error taxonomy for the segmented downloader.

/// All the ways a download can fail.
///
/// Transient per-mirror failures (a single network error, a bad status
/// from one of several mirrors) never surface as a `DownloadError` — they
/// drive mirror failover inside the worker pool instead. Only the kinds
/// below are fatal to a `download()` call.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("probe error: could not determine file size from any mirror")]
    Probe,

    #[error("piece {0} failed: all mirrors exhausted")]
    PieceFailed(u64),

    #[error("sequential fallback failed: unexpected status {0}")]
    SequentialFailed(u16),

    #[error("manifest error: {0}")]
    Manifest(#[from] rusqlite::Error),

    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
