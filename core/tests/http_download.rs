//! End-to-end downloads against local mock mirrors.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use md5::{Digest, Md5};
use mfetch_core::checksum::Verification;
use mfetch_core::config::EngineConfig;
use mfetch_core::progress::NullRenderer;
use mfetch_core::{CoreError, CoreResult, DownloadEngine, DownloadReport};
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

struct RangeResponder {
    content: Vec<u8>,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_range);
        match range {
            Some((start, end)) => {
                let end = end.min(self.content.len() - 1);
                ResponseTemplate::new(206).set_body_bytes(self.content[start..=end].to_vec())
            }
            None => ResponseTemplate::new(200).set_body_bytes(self.content.clone()),
        }
    }
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

fn content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 % 256) as u8).collect()
}

fn quoted_md5(bytes: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(bytes)))
}

async fn mirror(content: &[u8], etag: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", etag)
                .set_body_bytes(content.to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(RangeResponder {
            content: content.to_vec(),
        })
        .mount(&server)
        .await;
    server
}

fn config(chunk_size: u64) -> EngineConfig {
    EngineConfig {
        chunk_size,
        backoff_unit: Duration::from_millis(5),
        connect_timeout: Duration::from_secs(5),
        request_timeout: Some(Duration::from_secs(30)),
        ..EngineConfig::default()
    }
}

async fn run_blocking(
    config: EngineConfig,
    urls: Vec<String>,
    dest: PathBuf,
) -> CoreResult<DownloadReport> {
    tokio::task::spawn_blocking(move || {
        let engine = DownloadEngine::new(config)?;
        engine.run(&urls, &dest, NullRenderer)
    })
    .await
    .expect("blocking task")
}

fn part_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("part"))
        .count()
}

#[tokio::test(flavor = "multi_thread")]
async fn downloads_from_two_mirrors_and_verifies() {
    let body = content(20_000);
    let etag = quoted_md5(&body);
    let first = mirror(&body, &etag).await;
    let second = mirror(&body, &etag).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");

    let report = run_blocking(
        config(4_096),
        vec![first.uri(), second.uri()],
        dest.clone(),
    )
    .await
    .expect("download");

    assert_eq!(report.chunks, 5);
    assert_eq!(report.sources.len(), 2);
    assert!(matches!(report.verification, Verification::Verified { .. }));
    assert_eq!(fs::read(&dest).unwrap(), body);
    assert_eq!(part_files(dir.path()), 0);

    let mut ranges = Vec::new();
    for server in [&first, &second] {
        for request in server.received_requests().await.unwrap() {
            if request.method.as_str() == "GET" {
                let value = request.headers.get("range").unwrap().to_str().unwrap();
                ranges.push(value.to_string());
            }
        }
    }
    ranges.sort();
    assert_eq!(
        ranges,
        vec![
            "bytes=0-4095",
            "bytes=12288-16383",
            "bytes=16384-19999",
            "bytes=4096-8191",
            "bytes=8192-12287",
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn weak_validator_aborts_before_any_get() {
    let body = content(1_000);
    let server = mirror(&body, "W/\"abc\"").await;
    let dir = tempfile::tempdir().unwrap();

    let err = run_blocking(config(256), vec![server.uri()], dir.path().join("f"))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::WeakValidator { .. }));
    let gets = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(gets, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_probe_drops_the_mirror() {
    let body = content(3_000);
    let good = mirror(&body, &quoted_md5(&body)).await;
    let broken = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&broken)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");

    let report = run_blocking(config(1_024), vec![broken.uri(), good.uri()], dest.clone())
        .await
        .expect("download");

    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.rejected.len(), 1);
    assert!(report.rejected[0].reason.contains("404"));
    assert_eq!(fs::read(&dest).unwrap(), body);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_retried() {
    let body = content(2_048);
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", quoted_md5(&body).as_str())
                .set_body_bytes(body.clone()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("range", "bytes=1024-2047"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(RangeResponder {
            content: body.clone(),
        })
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");

    let report = run_blocking(config(1_024), vec![server.uri()], dest.clone())
        .await
        .expect("download");

    assert!(matches!(report.verification, Verification::Verified { .. }));
    assert_eq!(fs::read(&dest).unwrap(), body);
    let gets = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(gets, 4);
}
