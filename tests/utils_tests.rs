//! Tests for utils module functionality.

use fastget::http::{create_http_client, RangeProbe};
use fastget::utils::{
    filename_from_url, format_bytes, get_content_length, parse_content_range_total, parse_size,
};

use httpmock::prelude::*;
use reqwest::Url;
use std::time::Duration;

mod common;
use common::helpers::*;

#[test]
fn test_parse_content_range_total() {
    let cases = [
        ("bytes 0-1023/2048", Some(2048)),
        ("bytes 0-0/1", Some(1)),
        ("bytes 0-0/*", None),
        ("bytes 0-1023", None),
        ("invalid", None),
    ];
    for (header, expected) in cases {
        assert_eq!(parse_content_range_total(header), expected, "{header}");
    }
}

#[test]
fn test_chunk_size_units() {
    assert_eq!(parse_size("8m").unwrap(), 8 * 1024 * 1024);
    assert_eq!(parse_size("8MB").unwrap(), 8 * 1024 * 1024);
    assert_eq!(parse_size("8MiB").unwrap(), 8 * 1024 * 1024);
    assert_eq!(parse_size("512k").unwrap(), 512 * 1024);
    assert_eq!(parse_size("1.5g").unwrap(), 1536 * 1024 * 1024);
    assert_eq!(parse_size("4096").unwrap(), 4096);
    assert!(parse_size("eight").is_err());
    assert_eq!(format_bytes(2048), "2.00 KB");
}

#[test]
fn test_filename_from_test_domain() {
    let url = Url::parse(TEST_DOMAIN).unwrap();
    assert_eq!(filename_from_url(&url), "file.zip");
}

#[tokio::test]
async fn test_get_content_length_from_partial_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sized");
            then.status(206)
                .header("content-range", "bytes 0-0/2048")
                .body("x");
        })
        .await;

    let response = reqwest::Client::new()
        .get(server.url("/sized"))
        .header("range", "bytes=0-0")
        .send()
        .await
        .unwrap();
    assert_eq!(get_content_length(&response), Some(2048));
}

#[tokio::test]
async fn test_get_content_length_from_full_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/plain");
            then.status(200).body(vec![0u8; 512]);
        })
        .await;

    let response = reqwest::get(server.url("/plain")).await.unwrap();
    assert_eq!(get_content_length(&response), Some(512));
}

#[tokio::test]
async fn test_probe_reports_ranges_and_size() {
    let server = MockServer::start_async().await;
    let payload = random_payload(4096);
    let probe_mock = mock_probe(&server, "/big.iso", &payload).await;

    let client = create_http_client(create_test_http_config_with_retries(0)).unwrap();
    let capabilities = RangeProbe::new(client, Duration::from_secs(5))
        .probe(&Url::parse(&server.url("/big.iso")).unwrap())
        .await
        .unwrap();

    assert!(capabilities.supports_ranges);
    assert_eq!(capabilities.total_size, Some(4096));
    probe_mock.assert_async().await;
}

#[tokio::test]
async fn test_probe_sends_default_headers() {
    let server = MockServer::start_async().await;
    let agent = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/ua.bin")
                .header("user-agent", TEST_USER_AGENT);
            then.status(200).body("whole");
        })
        .await;

    let client = create_http_client(create_test_http_config_with_retries(0)).unwrap();
    let capabilities = RangeProbe::new(client, Duration::from_secs(5))
        .probe(&Url::parse(&server.url("/ua.bin")).unwrap())
        .await
        .unwrap();

    assert!(!capabilities.supports_ranges);
    assert_eq!(capabilities.total_size, Some(5));
    agent.assert_async().await;
}
