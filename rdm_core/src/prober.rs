//! Server prober (spec §4.2): discovers total size and byte-range
//! capability of a mirror. Only the first mirror is ever probed; its
//! report is authoritative for the whole download.

use reqwest::{Client, StatusCode};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeResult {
    pub file_size: u64,
    pub range_supported: bool,
}

/// Probe `url` for size and Range support. Any network exception yields
/// `(0, false)` rather than propagating — the caller (the top-level
/// `download()`) is the one that decides a zero size is fatal.
pub async fn probe(client: &Client, url: &str) -> ProbeResult {
    let head = match client.head(url).send().await {
        Ok(resp) => Some(resp),
        Err(e) => {
            log::debug!("[probe] HEAD {} failed: {}", url, e);
            None
        }
    };

    let resp = match head {
        Some(resp) if resp.status().as_u16() < 400 => resp,
        _ => match client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                log::debug!("[probe] GET {} failed: {}", url, e);
                return ProbeResult::default();
            }
        },
    };

    let file_size = resp
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let accept_ranges_bytes = resp
        .headers()
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("bytes"))
        .unwrap_or(false);

    let range_supported = if accept_ranges_bytes {
        true
    } else {
        probe_range(client, url).await
    };

    log::info!(
        "[probe] {}: file_size={}, range_supported={}",
        url,
        file_size,
        range_supported
    );

    ProbeResult {
        file_size,
        range_supported,
    }
}

/// Confirm Range support with a single-byte probe request.
async fn probe_range(client: &Client, url: &str) -> bool {
    match client
        .get(url)
        .header(reqwest::header::RANGE, "bytes=0-0")
        .send()
        .await
    {
        Ok(resp) => resp.status() == StatusCode::PARTIAL_CONTENT,
        Err(e) => {
            log::debug!("[probe] range probe {} failed: {}", url, e);
            false
        }
    }
}
