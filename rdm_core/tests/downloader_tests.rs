//! End-to-end scenarios for `Downloader`, run against a range-aware mock
//! server. Mirrors the teacher's `RangeResponder` pattern: one responder
//! that slices a fixed body according to the incoming `Range` header,
//! rather than per-offset canned mocks.

use std::time::Duration;

use rdm_core::{DownloadError, Downloader, DownloaderConfig};
use tempfile::tempdir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn config(piece_size: u64, concurrency: u16) -> DownloaderConfig {
    DownloaderConfig {
        piece_size,
        concurrency,
        timeout: Duration::from_secs(5),
        user_agent: "rdm-tests/0.1".to_string(),
    }
}

struct RangeResponder {
    body: Vec<u8>,
}

impl wiremock::Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if let Some(range_header) = request.headers.get(&reqwest::header::RANGE) {
            let range_str = range_header.to_str().unwrap_or("");
            if let Some((start, end)) = parse_range(range_str, self.body.len()) {
                let slice = &self.body[start..=end];
                return ResponseTemplate::new(206)
                    .set_body_bytes(slice.to_vec())
                    .insert_header(
                        "Content-Range",
                        format!("bytes {}-{}/{}", start, end, self.body.len()),
                    );
            }
        }
        ResponseTemplate::new(200).set_body_bytes(self.body.clone())
    }
}

fn parse_range(header: &str, body_len: usize) -> Option<(usize, usize)> {
    let s = header.strip_prefix("bytes=")?;
    let mut parts = s.splitn(2, '-');
    let start: usize = parts.next()?.parse().ok()?;
    let end_part = parts.next()?;
    let end = if end_part.is_empty() {
        body_len - 1
    } else {
        end_part.parse::<usize>().ok()?
    };
    Some((start, end.min(body_len - 1)))
}

async fn mount_head(server: &MockServer, content_length: usize, accept_ranges: bool) {
    let mut resp = ResponseTemplate::new(200).insert_header("Content-Length", content_length.to_string().as_str());
    if accept_ranges {
        resp = resp.insert_header("Accept-Ranges", "bytes");
    } else {
        resp = resp.insert_header("Accept-Ranges", "none");
    }
    Mock::given(method("HEAD")).respond_with(resp).mount(server).await;
}

/// S1: single mirror, range support, exact piece tiling.
#[tokio::test]
async fn s1_single_mirror_range_success() {
    let body = b"ABCDEFGHIJ".to_vec();
    let server = MockServer::start().await;
    mount_head(&server, body.len(), true).await;
    Mock::given(method("GET"))
        .respond_with(RangeResponder { body: body.clone() })
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let downloader = Downloader::new(vec![server.uri()], &dest, config(4, 2)).unwrap();
    downloader.download().await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

/// S2: resume after crash — a fresh `Downloader` against the same
/// destination reloads the piece table and only fetches what's pending.
#[tokio::test]
async fn s2_resume_after_crash_only_fetches_pending_piece() {
    let body = b"ABCDEFGHIJ".to_vec();
    let server = MockServer::start().await;
    mount_head(&server, body.len(), true).await;
    Mock::given(method("GET"))
        .respond_with(RangeResponder { body: body.clone() })
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");

    let first = Downloader::new(vec![server.uri()], &dest, config(4, 2)).unwrap();
    first.download().await.unwrap();

    let manifest = rdm_core::manifest::Manifest::open(&dest).unwrap();
    let mut pieces = manifest.load_pieces().unwrap();
    pieces[1].status = rdm_core::PieceStatus::Pending;
    pieces[1].sha256 = None;
    manifest.replace_piece(&pieces[1]).unwrap();
    std::fs::write(&dest, b"ABCD____IJ").unwrap();

    let second = Downloader::new(vec![server.uri()], &dest, config(4, 2)).unwrap();
    second.download().await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    let reloaded = manifest.load_pieces().unwrap();
    assert_eq!(reloaded[1].last_url.as_deref(), Some(server.uri().as_str()));
}

/// S3: mirror failover — the bad mirror always fails, the good one serves.
#[tokio::test]
async fn s3_mirror_failover() {
    let body = b"ABCD".to_vec();
    let bad = MockServer::start().await;
    let good = MockServer::start().await;
    mount_head(&bad, body.len(), true).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&bad)
        .await;
    Mock::given(method("GET"))
        .respond_with(RangeResponder { body: body.clone() })
        .mount(&good)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let downloader = Downloader::new(vec![bad.uri(), good.uri()], &dest, config(4, 1)).unwrap();
    downloader.download().await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    let manifest = rdm_core::manifest::Manifest::open(&dest).unwrap();
    let pieces = manifest.load_pieces().unwrap();
    assert!(pieces.iter().all(|p| p.last_url.as_deref() == Some(good.uri().as_str())));
}

/// S4: sequential fallback — no range support advertised or honored.
#[tokio::test]
async fn s4_sequential_fallback() {
    let body = b"1234567".to_vec();
    let server = MockServer::start().await;
    mount_head(&server, body.len(), false).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let downloader = Downloader::new(vec![server.uri()], &dest, config(4, 2)).unwrap();
    downloader.download().await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    let manifest = rdm_core::manifest::Manifest::open(&dest).unwrap();
    let pieces = manifest.load_pieces().unwrap();
    assert!(pieces.iter().all(|p| p.status == rdm_core::PieceStatus::Done));
    assert!(pieces.iter().all(|p| p.sha256.is_some()));
}

/// S5: corruption re-verification — externally tamper with a completed
/// piece, re-run, expect the verifier to demote and repair it.
#[tokio::test]
async fn s5_corruption_reverification_repairs_destination() {
    let body = b"ABCDEFGHIJ".to_vec();
    let server = MockServer::start().await;
    mount_head(&server, body.len(), true).await;
    Mock::given(method("GET"))
        .respond_with(RangeResponder { body: body.clone() })
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let downloader = Downloader::new(vec![server.uri()], &dest, config(4, 2)).unwrap();
    downloader.download().await.unwrap();

    // Corrupt byte 5, inside piece 1 ([4,7]).
    let mut corrupted = std::fs::read(&dest).unwrap();
    corrupted[5] = b'X';
    std::fs::write(&dest, &corrupted).unwrap();

    downloader.download().await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

/// S6: empty URL list fails with a configuration error, nothing created.
#[test]
fn s6_empty_url_list_is_a_config_error() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let result = Downloader::new(vec![], &dest, config(4, 2));
    assert!(matches!(result, Err(DownloadError::Config(_))));
    assert!(!dest.exists());
}
