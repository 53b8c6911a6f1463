use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;

use rdm_core::{DownloaderConfig, Downloader};

mod terminal_observer;
use terminal_observer::TerminalProgressObserver;

#[derive(Parser)]
#[command(name = "rdm", about = "Resumable multi-mirror segmented downloader")]
struct Args {
    /// Mirror URLs serving the same resource, tried in order per piece.
    #[arg(required = true)]
    urls: Vec<String>,

    /// Output file path.
    #[arg(short, long, default_value = "downloaded_file")]
    output: PathBuf,

    /// Piece size in bytes.
    #[arg(long, default_value_t = rdm_core::config::DEFAULT_PIECE_SIZE)]
    piece_size: u64,

    /// Number of concurrent workers.
    #[arg(short, long, default_value_t = rdm_core::config::DEFAULT_CONCURRENCY)]
    concurrency: u16,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = rdm_core::config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = DownloaderConfig {
        piece_size: args.piece_size,
        concurrency: args.concurrency,
        timeout: Duration::from_secs(args.timeout_secs),
        user_agent: format!("rdm_cli/{}", env!("CARGO_PKG_VERSION")),
    };

    let downloader = match Downloader::new(args.urls.clone(), &args.output, config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Starting download: {:?} -> {}", args.urls, args.output.display());
    let start = Instant::now();

    match downloader
        .download_with_observer(Box::new(TerminalProgressObserver::new()))
        .await
    {
        Ok(()) => {
            println!("Download completed in {:.2}s", start.elapsed().as_secs_f64());
        }
        Err(e) => {
            eprintln!("Download failed: {}", e);
            std::process::exit(1);
        }
    }
}
