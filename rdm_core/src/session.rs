//! A process-lifetime HTTP client carrying the downloader's shared
//! configuration, owned by one `Downloader` instance (spec §3, "Session").
//!
//! Unlike a module-level singleton client, this is constructed fresh on
//! `Downloader::new` and dropped with it — tests build their own.

use std::time::Duration;

use reqwest::Client;

use crate::config::DownloaderConfig;
use crate::error::DownloadError;

#[derive(Clone)]
pub struct Session {
    pub client: Client,
}

impl Session {
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .tcp_nodelay(true)
            // Byte offsets computed from Content-Length must stay valid —
            // a transparently decompressed body would desync them.
            .no_gzip()
            .no_deflate()
            .no_brotli()
            .build()
            .map_err(DownloadError::Network)?;
        Ok(Self { client })
    }
}
