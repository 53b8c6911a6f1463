//! Typed configuration record, replacing the dynamic-typed options object
//! of the source this crate generalizes (spec §9 "Dynamic-typed
//! config/options").

use std::time::Duration;

use crate::error::DownloadError;

pub const DEFAULT_PIECE_SIZE: u64 = 4 * 1024 * 1024;
pub const DEFAULT_CONCURRENCY: u16 = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub piece_size: u64,
    pub concurrency: u16,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            piece_size: DEFAULT_PIECE_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("rdm_core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DownloaderConfig {
    /// Validates the bounds spec §6 requires: non-positive piece size or
    /// concurrency is a `ConfigError`.
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.piece_size == 0 {
            return Err(DownloadError::Config(
                "piece_size must be greater than zero".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(DownloadError::Config(
                "concurrency must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Validates the mirror URL list: at least one non-empty URL, per spec §6.
pub fn validate_urls(urls: &[String]) -> Result<Vec<String>, DownloadError> {
    let cleaned: Vec<String> = urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if cleaned.is_empty() {
        return Err(DownloadError::Config(
            "at least one non-empty URL must be provided".into(),
        ));
    }
    Ok(cleaned)
}
