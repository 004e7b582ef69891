//! Command line front end of the fastget library.

use clap::Parser;
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use fastget::download::{DownloadTarget, ExpectedHash, HashAlgorithm, Status, Summary};
use fastget::downloader::DownloaderBuilder;
use fastget::progress::{ProgressDisplay, StyleOptions};
use fastget::utils::{format_bytes, parse_size};
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Download files over HTTP(S) with several connections per file.
///
/// Interrupted downloads resume where they stopped when run again.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL(s) of the files to download.
    #[arg(required = true, num_args = 1..)]
    urls: Vec<String>,

    /// Output file, or output directory when several URLs are given.
    #[arg(short, long, env = "FASTGET_OUTPUT")]
    output: Option<PathBuf>,

    /// Connections per file.
    #[arg(short, long, env = "FASTGET_CONNECTIONS", default_value_t = 16)]
    connections: usize,

    /// Chunk size, e.g. 8m, 512k or 1.5g.
    #[arg(short = 's', long, env = "FASTGET_CHUNK_SIZE", default_value = "8m", value_parser = chunk_size)]
    chunk_size: u64,

    /// Seconds to wait for the server before an attempt is abandoned.
    #[arg(short, long, env = "FASTGET_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Retries per chunk.
    #[arg(short, long, env = "FASTGET_RETRIES", default_value_t = 5)]
    retries: u32,

    /// Expected hex digest of the file.
    #[arg(long, env = "FASTGET_HASH")]
    hash: Option<String>,

    /// Digest algorithm (sha256 or md5); guessed from the digest length otherwise.
    #[arg(long, env = "FASTGET_HASH_ALGORITHM", requires = "hash")]
    hash_algorithm: Option<HashAlgorithm>,

    /// Directory holding resume records. Defaults to the output directory.
    #[arg(long, env = "FASTGET_RESUME_DIR")]
    resume_dir: Option<PathBuf>,

    /// Files downloaded at once.
    #[arg(short = 'j', long, env = "FASTGET_JOBS", default_value_t = 4)]
    jobs: usize,

    /// Hide progress bars.
    #[arg(short, long, env = "FASTGET_QUIET")]
    quiet: bool,
}

fn chunk_size(value: &str) -> std::result::Result<u64, String> {
    match parse_size(value) {
        Ok(0) => Err("chunk size must be greater than zero".into()),
        Ok(size) => Ok(size),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value).wrap_err_with(|| format!("invalid URL {value:?}"))
}

/// Resolve the output layout into a working directory and the targets.
fn targets(args: &Args) -> Result<(PathBuf, Vec<DownloadTarget>)> {
    let hash = match args.hash {
        Some(ref digest) => Some(ExpectedHash::parse(digest, args.hash_algorithm)?),
        None => None,
    };

    if let [url] = args.urls.as_slice() {
        let url = parse_url(url)?;
        let mut target = DownloadTarget::try_from(&url)?;
        let directory = match args.output {
            Some(ref dir) if dir.is_dir() => dir.clone(),
            Some(ref file) => {
                target.destination = file.clone();
                PathBuf::from(".")
            }
            None => PathBuf::from("."),
        };
        if let Some(hash) = hash {
            target = target.with_hash(hash);
        }
        return Ok((directory, vec![target]));
    }

    if hash.is_some() {
        bail!("--hash only applies to a single URL");
    }
    let directory = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
    if directory.exists() && !directory.is_dir() {
        bail!("{} must be a directory when several URLs are given", directory.display());
    }
    std::fs::create_dir_all(&directory)
        .wrap_err_with(|| format!("cannot create {}", directory.display()))?;

    let targets = args
        .urls
        .iter()
        .map(|u| -> Result<DownloadTarget> { Ok(DownloadTarget::try_from(&parse_url(u)?)?) })
        .collect::<Result<Vec<_>>>()?;
    Ok((directory, targets))
}

fn report(summary: &Summary) -> String {
    let name = summary.target().destination.display();
    match summary.status() {
        Status::Success => format!(
            "✓ {} {} in {:.1?} ({} resumed)",
            name,
            format_bytes(summary.transferred() + summary.resumed()),
            summary.elapsed(),
            format_bytes(summary.resumed()),
        ),
        Status::Skipped(reason) => format!("- {}: {}", name, reason),
        Status::HashMismatch(msg) => format!("✗ {}: {}", name, msg),
        Status::Fail(msg) => format!("✗ {}: {}", name, msg),
        Status::Cancelled => format!("✗ {}: cancelled", name),
        Status::NotStarted => format!("? {}: not started", name),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fastget=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (directory, targets) = targets(&args)?;

    let style = if args.quiet {
        StyleOptions::hidden()
    } else {
        StyleOptions::default()
    };
    let display = Arc::new(ProgressDisplay::new(style, targets.len()));

    let on_progress = display.clone();
    let on_complete = display.clone();
    let root = directory.clone();
    let quiet = args.quiet;
    let downloader = DownloaderBuilder::new()
        .directory(directory)
        .max_connections(args.connections)
        .chunk_size(args.chunk_size)
        .attempt_timeout(Duration::from_secs(args.timeout))
        .retries(args.retries)
        .concurrent_downloads(args.jobs)
        .on_progress(move |event| on_progress.update(event))
        .on_complete(move |summary| {
            on_complete.finish_child(&root.join(&summary.target().destination));
            if !quiet || !summary.is_success() {
                on_complete.println(report(summary));
            }
        });
    let downloader = match args.resume_dir {
        Some(ref dir) => downloader.resume_directory(dir.clone()),
        None => downloader,
    }
    .build();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let summaries = downloader.download_with_cancel(&targets, cancel).await;
    display.finish();

    let failed = summaries
        .iter()
        .filter(|s| !matches!(s.status(), Status::Success | Status::Skipped(_)))
        .count();
    if failed > 0 {
        return Err(eyre!("{} of {} downloads failed", failed, summaries.len()));
    }
    Ok(())
}
