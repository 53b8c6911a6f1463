//! Progress reporting (spec §4.7): raw per-piece byte deltas flow over an
//! mpsc channel into a background aggregator, which fans out smoothed
//! snapshots to every registered observer. Generalizes the teacher's
//! `progress/` aggregation pipeline (`ProgressNotifier` + EMA speed) from
//! per-segment string ids to the fixed-size piece indices this crate
//! uses, and drops the per-piece UI rendering that lived alongside it —
//! that now belongs entirely to the observers a caller registers.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// EMA smoothing factor for per-piece speed. 0.3 = responsive but stable.
const EMA_ALPHA: f64 = 0.3;

/// A single piece's byte delta, reported as bytes land on disk.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub piece_idx: u64,
    pub bytes_delta: u64,
    pub total_bytes: u64,
}

/// Per-piece progress snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PieceSnapshot {
    pub piece_idx: u64,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub speed: f64,
    pub eta_secs: f64,
}

/// Aggregate progress snapshot for the whole download.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub pieces: Vec<PieceSnapshot>,
    pub total_bytes_downloaded: u64,
    pub total_bytes: u64,
    pub speed: f64,
    pub eta_secs: f64,
    pub done: bool,
}

impl ProgressSnapshot {
    pub fn empty() -> Self {
        Self {
            pieces: Vec::new(),
            total_bytes_downloaded: 0,
            total_bytes: 0,
            speed: 0.0,
            eta_secs: 0.0,
            done: false,
        }
    }
}

/// Anything that wants to observe download progress.
///
/// `on_progress` fires once per received event, `on_complete` fires once
/// when the channel closes cleanly, `on_error` fires once on a fatal
/// error and suppresses `on_complete`.
#[async_trait]
pub trait ProgressObserver: Send + Sync + 'static {
    async fn on_progress(&self, snapshot: &ProgressSnapshot);
    async fn on_complete(&self, snapshot: &ProgressSnapshot);
    async fn on_error(&self, error: &str);
}

struct PieceProgress {
    piece_idx: u64,
    bytes_downloaded: u64,
    total_bytes: u64,
    speed: f64,
    last_update: Instant,
}

/// Consumes `Result<ProgressEvent, String>` from the download's progress
/// channel and fans out aggregated snapshots to registered observers.
pub struct ProgressNotifier {
    observers: Vec<Box<dyn ProgressObserver>>,
    pieces: HashMap<u64, PieceProgress>,
    piece_order: Vec<u64>,
    start_time: Instant,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            pieces: HashMap::new(),
            piece_order: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    /// Drain the channel until it closes or a fatal error arrives.
    pub async fn run(mut self, mut progress_rx: mpsc::Receiver<Result<ProgressEvent, String>>) {
        while let Some(msg) = progress_rx.recv().await {
            match msg {
                Ok(ev) => {
                    let snapshot = self.handle_event(ev);
                    for observer in &self.observers {
                        observer.on_progress(&snapshot).await;
                    }
                }
                Err(error) => {
                    for observer in &self.observers {
                        observer.on_error(&error).await;
                    }
                    return;
                }
            }
        }
        self.finish().await;
    }

    fn handle_event(&mut self, ev: ProgressEvent) -> ProgressSnapshot {
        let now = Instant::now();

        let piece = self.pieces.entry(ev.piece_idx).or_insert_with(|| {
            self.piece_order.push(ev.piece_idx);
            PieceProgress {
                piece_idx: ev.piece_idx,
                bytes_downloaded: 0,
                total_bytes: ev.total_bytes,
                speed: 0.0,
                last_update: now,
            }
        });

        piece.bytes_downloaded += ev.bytes_delta;
        if piece.total_bytes == 0 {
            piece.total_bytes = ev.total_bytes;
        }

        let elapsed = now.duration_since(piece.last_update).as_secs_f64();
        if elapsed > 0.0 {
            let instant_speed = ev.bytes_delta as f64 / elapsed;
            piece.speed = EMA_ALPHA * instant_speed + (1.0 - EMA_ALPHA) * piece.speed;
            piece.last_update = now;
        }

        self.build_snapshot()
    }

    fn build_snapshot(&self) -> ProgressSnapshot {
        let total_bytes: u64 = self.pieces.values().map(|p| p.total_bytes).sum();
        let total_downloaded: u64 = self.pieces.values().map(|p| p.bytes_downloaded).sum();
        let combined_speed: f64 = self.pieces.values().map(|p| p.speed).sum();
        let remaining = total_bytes.saturating_sub(total_downloaded);
        let eta = if combined_speed > 0.0 {
            remaining as f64 / combined_speed
        } else {
            0.0
        };

        let piece_snapshots = self
            .piece_order
            .iter()
            .filter_map(|id| self.pieces.get(id))
            .map(|p| {
                let rem = p.total_bytes.saturating_sub(p.bytes_downloaded);
                let piece_eta = if p.speed > 0.0 { rem as f64 / p.speed } else { 0.0 };
                PieceSnapshot {
                    piece_idx: p.piece_idx,
                    bytes_downloaded: p.bytes_downloaded,
                    total_bytes: p.total_bytes,
                    speed: p.speed,
                    eta_secs: piece_eta,
                }
            })
            .collect();

        ProgressSnapshot {
            pieces: piece_snapshots,
            total_bytes_downloaded: total_downloaded,
            total_bytes,
            speed: combined_speed,
            eta_secs: eta,
            done: false,
        }
    }

    async fn finish(self) {
        let elapsed = self.start_time.elapsed();
        let total_downloaded: u64 = self.pieces.values().map(|p| p.bytes_downloaded).sum();
        let avg_speed = if elapsed.as_secs_f64() > 0.0 {
            total_downloaded as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let mut final_snapshot = self.build_snapshot();
        final_snapshot.done = true;
        final_snapshot.speed = avg_speed;
        final_snapshot.eta_secs = 0.0;

        for observer in &self.observers {
            observer.on_complete(&final_snapshot).await;
        }
    }
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable byte formatting, for observers that render to a terminal.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}
