use fastget::download::DownloadTarget;
use fastget::downloader::DownloaderBuilder;
use fastget::resume::{ResumeKey, ResumeManifest, ResumeStore};
use fastget::HttpClientConfig;

use httpmock::prelude::*;
use httpmock::Mock;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

// Common test constants
pub const TEST_DOMAIN: &str = "http://domain.com/file.zip";
pub const TEST_USER_AGENT: &str = "fastget-test-agent";

/// Creates a temporary directory for testing purposes
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Creates a temporary file with the given content
pub fn create_temp_file(dir: &Path, filename: &str, content: &[u8]) -> PathBuf {
    let file_path = dir.join(filename);
    fs::write(&file_path, content).expect("Failed to write temporary file");
    file_path
}

/// Random payload of `size` bytes.
pub fn random_payload(size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; size];
    rand::rng().fill(&mut payload[..]);
    payload
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Asserts that a file has the expected size
pub fn assert_file_size(path: &Path, expected_size: u64) {
    let metadata = fs::metadata(path).expect("Failed to get file metadata");
    assert_eq!(
        metadata.len(),
        expected_size,
        "File size mismatch at path: {:?}",
        path
    );
}

// === Mock Server Helpers ===

/// Answer the range probe like a server serving `size` bytes.
pub async fn mock_probe<'a>(server: &'a MockServer, path: &str, payload: &[u8]) -> Mock<'a> {
    let size = payload.len();
    let first = payload[..1].to_vec();
    let path = path.to_string();
    server
        .mock_async(|when, then| {
            when.method(GET).path(path).header("range", "bytes=0-0");
            then.status(206)
                .header("content-range", format!("bytes 0-0/{size}"))
                .body(first);
        })
        .await
}

/// Serve `start..=end` of `payload` as a 206 answer.
pub async fn mock_range<'a>(
    server: &'a MockServer,
    path: &str,
    payload: &[u8],
    start: usize,
    end: usize,
) -> Mock<'a> {
    let size = payload.len();
    let body = payload[start..=end].to_vec();
    let path = path.to_string();
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(path)
                .header("range", format!("bytes={start}-{end}"));
            then.status(206)
                .header("content-range", format!("bytes {start}-{end}/{size}"))
                .body(body);
        })
        .await
}

/// Answer `start..=end` with `status` and no body.
pub async fn mock_range_status<'a>(
    server: &'a MockServer,
    path: &str,
    start: usize,
    end: usize,
    status: u16,
) -> Mock<'a> {
    let path = path.to_string();
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path(path)
                .header("range", format!("bytes={start}-{end}"));
            then.status(status);
        })
        .await
}

/// Mock every chunk of `payload` split every `chunk` bytes.
pub async fn mock_chunks<'a>(
    server: &'a MockServer,
    path: &str,
    payload: &[u8],
    chunk: usize,
) -> Vec<Mock<'a>> {
    let mut mocks = Vec::new();
    let mut start = 0;
    while start < payload.len() {
        let end = (start + chunk).min(payload.len()) - 1;
        mocks.push(mock_range(server, path, payload, start, end).await);
        start = end + 1;
    }
    mocks
}

/// A server that ignores `Range` and always answers 200 with the whole body.
pub async fn mock_whole<'a>(server: &'a MockServer, path: &str, payload: &[u8]) -> Mock<'a> {
    let body = payload.to_vec();
    let path = path.to_string();
    server
        .mock_async(|when, then| {
            when.method(GET).path(path);
            then.status(200).body(body);
        })
        .await
}

pub fn target(server: &MockServer, path: &str, destination: &str) -> DownloadTarget {
    let url = Url::parse(&server.url(path)).expect("Invalid mock URL");
    DownloadTarget::new(&url, destination)
}

// === Downloader Builder Helpers ===

/// Downloader writing into `dir` with fast backoff and no probe retries.
pub fn test_downloader_builder(dir: &Path) -> DownloaderBuilder {
    DownloaderBuilder::new()
        .directory(dir.to_path_buf())
        .attempt_timeout(Duration::from_secs(5))
        .backoff(Duration::from_millis(1), Duration::from_millis(2))
        .probe_retries(0)
}

/// Load the resume record of `target` downloaded into `dir`.
pub async fn load_manifest(dir: &Path, target: &DownloadTarget) -> Option<ResumeManifest> {
    let destination = dir.join(&target.destination);
    let key = ResumeKey::derive(&target.url, &destination)
        .await
        .expect("Failed to derive resume key");
    ResumeStore::new(dir)
        .load(&key)
        .await
        .expect("Failed to load resume record")
}

// === HTTP Configuration Helpers ===

/// Creates test headers with common user agent
pub fn create_test_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(TEST_USER_AGENT));
    headers
}

/// Creates a test HTTP client configuration with custom retries
pub fn create_test_http_config_with_retries(retries: u32) -> HttpClientConfig {
    HttpClientConfig {
        retries,
        headers: Some(create_test_headers()),
        ..HttpClientConfig::default()
    }
}
