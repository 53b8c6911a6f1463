//! Worker pool for range mode (spec §4.6): a fixed number of concurrent
//! fetchers drain a shared queue of pending pieces, trying each mirror in
//! order per piece. Generalizes the teacher's per-piece `tokio::spawn` +
//! `join_all` dispatch from a one-shot batch of same-sized pieces into a
//! queue-draining pool sized by `concurrency`, with mirror failover
//! layered in rather than a single fixed URL.

use std::collections::VecDeque;
use std::fs::File;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::DownloadError;
use crate::manifest::Manifest;
use crate::piece::{Piece, PieceStatus};
use crate::progress::ProgressEvent;
use crate::session::Session;
use crate::writer;

/// Run the pool to completion. Returns the first fatal `PieceFailed` if
/// any piece exhausted every mirror; already-completed pieces remain
/// durable in `manifest` either way. Once a worker hits a fatal error it
/// stops dispatching new work to the queue — in-flight siblings are left
/// to finish their current piece rather than aborted mid-write, so the
/// destination and manifest never disagree.
///
/// Each piece is journaled into `manifest` and reported to `progress_tx`
/// from inside the worker that fetched it, the instant its bytes are on
/// disk — not deferred to a post-join sweep. That's what gives crash
/// consistency at piece granularity (spec §4.1/§4.6): a kill mid-run
/// leaves every piece that had actually finished marked `done`.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    session: &Session,
    manifest: Arc<Manifest>,
    file: Arc<File>,
    pending: Vec<Piece>,
    urls: &[String],
    concurrency: u16,
    progress_tx: Option<mpsc::Sender<Result<ProgressEvent, String>>>,
) -> Result<(), DownloadError> {
    let total = pending.len() as u64;
    let queue = Arc::new(Mutex::new(VecDeque::from(pending)));
    let cancel = CancellationToken::new();
    let urls = Arc::new(urls.to_vec());
    let done_count = Arc::new(Mutex::new(0u64));

    let mut handles = Vec::with_capacity(concurrency as usize);
    for _ in 0..concurrency.max(1) {
        let queue = Arc::clone(&queue);
        let client = session.client.clone();
        let urls = Arc::clone(&urls);
        let file = Arc::clone(&file);
        let cancel = cancel.clone();
        let manifest = Arc::clone(&manifest);
        let progress_tx = progress_tx.clone();
        let done_count = Arc::clone(&done_count);

        handles.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let piece = {
                    let mut q = queue.lock().await;
                    q.pop_front()
                };
                let Some(piece) = piece else { break };

                match fetch_piece(&client, &urls, &file, piece).await {
                    Ok(mut piece) => {
                        piece.status = PieceStatus::Done;
                        if let Err(e) = manifest.replace_piece(&piece) {
                            cancel.cancel();
                            return Some(DownloadError::from(e));
                        }

                        let count = {
                            let mut count = done_count.lock().await;
                            *count += 1;
                            *count
                        };
                        log::info!("[pool] piece {} done ({}/{})", piece.idx, count, total);

                        if let Some(tx) = &progress_tx {
                            let _ = tx
                                .send(Ok(ProgressEvent {
                                    piece_idx: piece.idx,
                                    bytes_delta: piece.len(),
                                    total_bytes: piece.len(),
                                }))
                                .await;
                        }
                    }
                    Err(e) => {
                        cancel.cancel();
                        return Some(e);
                    }
                }
            }
            None
        }));
    }

    let mut first_error: Option<DownloadError> = None;

    for handle in handles {
        let error = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                log::error!("[pool] worker task panicked: {}", join_err);
                None
            }
        };
        if first_error.is_none() {
            first_error = error;
        }
    }

    if let (Some(e), Some(tx)) = (&first_error, &progress_tx) {
        let _ = tx.send(Err(e.to_string())).await;
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Try `urls` in order for one piece, writing and hashing on first
/// success. Returns the piece with `sha256` and `last_url` populated.
async fn fetch_piece(
    client: &Client,
    urls: &[String],
    file: &File,
    mut piece: Piece,
) -> Result<Piece, DownloadError> {
    for url in urls {
        match fetch_from_mirror(client, url, &piece).await {
            Ok(bytes) => {
                let mut hasher = Sha256::new();
                hasher.update(&bytes);
                let digest = hex::encode(hasher.finalize());

                writer::write_at(file, &bytes, piece.start)?;

                piece.sha256 = Some(digest);
                piece.last_url = Some(url.clone());
                return Ok(piece);
            }
            Err(e) => {
                log::warn!(
                    "[pool] piece {} failed against {}: {}, trying next mirror",
                    piece.idx,
                    url,
                    e
                );
            }
        }
    }
    Err(DownloadError::PieceFailed(piece.idx))
}

/// Fetch `piece`'s byte range from a single mirror with bounded retries,
/// returning the raw body. Exponential backoff mirrors the teacher's
/// per-segment retry (100ms, 200ms, 400ms).
async fn fetch_from_mirror(
    client: &Client,
    url: &str,
    piece: &Piece,
) -> Result<Vec<u8>, DownloadError> {
    let mut retries = 0usize;
    const MAX_RETRIES: usize = 3;

    loop {
        let range = format!("bytes={}-{}", piece.start, piece.end);
        let result = client
            .get(url)
            .header(reqwest::header::RANGE, range)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let status = resp.status();
                if status == StatusCode::PARTIAL_CONTENT || status == StatusCode::OK {
                    let bytes = resp.bytes().await.map_err(DownloadError::Network)?;
                    if bytes.len() as u64 != piece.len() {
                        log::warn!(
                            "[pool] piece {} from {}: expected {} bytes, got {}",
                            piece.idx,
                            url,
                            piece.len(),
                            bytes.len()
                        );
                        return Err(DownloadError::PieceFailed(piece.idx));
                    }
                    return Ok(bytes.to_vec());
                }
                return Err(DownloadError::PieceFailed(piece.idx));
            }
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    return Err(DownloadError::Network(e));
                }
                let delay_ms = 100u64 * (1u64 << retries.min(5));
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
