//! Resume-time integrity check (spec §4.5): every piece the manifest
//! claims is `done` gets its bytes re-read from the destination and
//! re-hashed before being trusted. A mismatch demotes it back to
//! `pending` so the worker pool re-fetches it instead of shipping a
//! corrupt file.

use std::fs::File;

use sha2::{Digest, Sha256};

use crate::error::DownloadError;
use crate::manifest::Manifest;
use crate::piece::{Piece, PieceStatus};
use crate::writer;

/// Hash the bytes at `[piece.start, piece.end]` in `file`.
pub fn hash_range(file: &File, piece: &Piece) -> Result<String, DownloadError> {
    let mut buf = vec![0u8; piece.len() as usize];
    writer::read_at(file, &mut buf, piece.start)?;
    let mut hasher = Sha256::new();
    hasher.update(&buf);
    Ok(hex::encode(hasher.finalize()))
}

/// Re-verify every `done` piece against the destination on disk,
/// demoting and persisting any whose digest no longer matches. Pieces
/// that were never finished, or whose bytes can't even be read back
/// (truncated destination), are demoted too — a read failure is treated
/// as "not actually there".
pub fn reverify_done_pieces(
    manifest: &Manifest,
    file: &File,
    pieces: &mut [Piece],
) -> Result<(), DownloadError> {
    for piece in pieces.iter_mut() {
        if piece.status != PieceStatus::Done {
            continue;
        }
        let recomputed = hash_range(file, piece).ok();
        let matches = match (&piece.sha256, &recomputed) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        if !matches {
            log::warn!(
                "[verifier] piece {} failed re-verification, demoting to pending",
                piece.idx
            );
            piece.status = PieceStatus::Pending;
            piece.sha256 = None;
            manifest.replace_piece(piece)?;
        }
    }
    Ok(())
}
