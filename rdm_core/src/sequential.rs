//! Sequential fallback (spec §4.7), used when the prober finds no byte-range
//! support. A single stream is resumed by appending from the destination's
//! current length; every piece is hashed and journaled `done` once the
//! stream reaches EOF.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use crate::error::DownloadError;
use crate::manifest::Manifest;
use crate::piece::{Piece, PieceStatus};
use crate::session::Session;
use crate::writer;

/// Stream the resource from `url` into `file`, resuming from the file's
/// current length, then hash and journal every piece as `done`.
pub async fn run(
    session: &Session,
    manifest: &Manifest,
    file: Arc<std::sync::Mutex<File>>,
    url: &str,
    file_size: u64,
    mut pieces: Vec<Piece>,
) -> Result<(), DownloadError> {
    let existing_size = {
        let f = file.lock().unwrap();
        f.metadata()?.len()
    };

    let existing_size = if existing_size > file_size {
        log::warn!(
            "[sequential] existing size {} exceeds file_size {}, truncating",
            existing_size,
            file_size
        );
        let f = file.lock().unwrap();
        f.set_len(0)?;
        0
    } else {
        existing_size
    };

    let mut builder = session.client.get(url);
    if existing_size > 0 {
        builder = builder.header(reqwest::header::RANGE, format!("bytes={}-", existing_size));
    }
    let resp = builder.send().await.map_err(DownloadError::Network)?;
    let status = resp.status();

    // A 200 to a ranged request means the server ignored Range and is
    // sending the full resource from byte 0 — truncate before appending,
    // or the prior bytes would be duplicated at the head of the file.
    let append_offset = if existing_size > 0 && status == StatusCode::OK {
        log::warn!(
            "[sequential] server returned 200 to a ranged request, truncating existing {} bytes",
            existing_size
        );
        let f = file.lock().unwrap();
        f.set_len(0)?;
        0
    } else if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
        existing_size
    } else {
        return Err(DownloadError::SequentialFailed(status.as_u16()));
    };

    {
        let mut f = file.lock().unwrap();
        use std::io::Seek;
        f.seek(std::io::SeekFrom::Start(append_offset))?;
    }

    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(DownloadError::Network)?;
        let f = file.lock().unwrap();
        (&*f).write_all(&chunk)?;
    }
    {
        let f = file.lock().unwrap();
        f.sync_data().ok();
    }

    let f = file.lock().unwrap();
    for piece in pieces.iter_mut() {
        let mut buf = vec![0u8; piece.len() as usize];
        writer::read_at(&f, &mut buf, piece.start)?;
        let mut hasher = Sha256::new();
        hasher.update(&buf);
        piece.sha256 = Some(hex::encode(hasher.finalize()));
        piece.status = PieceStatus::Done;
        piece.last_url = Some(url.to_string());
        manifest.replace_piece(piece)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloaderConfig;
    use crate::piece::plan_pieces;
    use crate::writer::prepare_sequential_destination;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn streams_full_body_and_journals_all_pieces_done() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"1234567".to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let file = prepare_sequential_destination(&dest, 7).unwrap();
        let manifest = Manifest::open(&dest).unwrap();
        let session = Session::new(&DownloaderConfig::default()).unwrap();
        let pieces = plan_pieces(7, 4);

        let url = format!("{}/f", server.uri());
        run(
            &session,
            &manifest,
            Arc::new(StdMutex::new(file)),
            &url,
            7,
            pieces,
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"1234567");
        let loaded = manifest.load_pieces().unwrap();
        assert!(loaded.iter().all(|p| p.status == PieceStatus::Done));
        assert!(loaded.iter().all(|p| p.sha256.is_some()));
    }

    #[tokio::test]
    async fn unacceptable_status_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let file = prepare_sequential_destination(&dest, 7).unwrap();
        let manifest = Manifest::open(&dest).unwrap();
        let session = Session::new(&DownloaderConfig::default()).unwrap();
        let pieces = plan_pieces(7, 4);

        let url = format!("{}/f", server.uri());
        let result = run(
            &session,
            &manifest,
            Arc::new(StdMutex::new(file)),
            &url,
            7,
            pieces,
        )
        .await;
        assert!(matches!(result, Err(DownloadError::SequentialFailed(403))));
    }
}
