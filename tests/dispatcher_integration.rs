//! Integration tests for the download dispatcher against a mock HTTP server.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use image_loader::{
    DownloadDispatcher, DownloadError, HttpClient, HttpTimeouts, ImageReference, OutputLayout,
    SearchTerm,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return socket_skip_return();
        };
        mock_server
    }};
}

// ==================== Helpers ====================

fn term(raw: &str) -> SearchTerm {
    SearchTerm::parse(raw).expect("non-blank term")
}

fn reference(raw: &str, locator: impl Into<String>) -> ImageReference {
    ImageReference::new(term(raw), locator)
}

/// Creates a dispatcher rooted at `root` with the directories for `terms` in place.
fn dispatcher_for(
    root: &Path,
    concurrency: usize,
    terms: &[&str],
) -> Result<DownloadDispatcher, Box<dyn std::error::Error>> {
    let layout = OutputLayout::new(root);
    for raw in terms {
        layout.ensure_directory(&term(raw))?;
    }
    Ok(DownloadDispatcher::new(
        concurrency,
        HttpClient::new(),
        layout,
    )?)
}

fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(ToString::to_string).collect()
}

// ==================== Remote Downloads ====================

#[tokio::test]
async fn test_download_all_saves_every_reference() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    for i in 1..=3 {
        Mock::given(method("GET"))
            .and(path(format!("/img/{i}.jpg")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![i as u8; 16]))
            .mount(&mock_server)
            .await;
    }

    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 4, &["cats"])?;
    let references = (1..=3)
        .map(|i| reference("cats", format!("{}/img/{i}.jpg", mock_server.uri())))
        .collect();

    let results = dispatcher.download_all(references).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(
        file_names(&root.path().join("cats")),
        names(&["cats_1.jpg", "cats_2.jpg", "cats_3.jpg"])
    );
    for result in &results {
        let saved = result.path().expect("saved path");
        assert_eq!(std::fs::metadata(saved)?.len(), 16);
    }
    let stats = dispatcher.stats();
    assert_eq!(stats.submitted(), 3);
    assert_eq!(stats.completed(), 3);
    assert_eq!(stats.failed(), 0);
    Ok(())
}

#[tokio::test]
async fn test_download_all_isolates_failures() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    for i in [1, 3, 5] {
        Mock::given(method("GET"))
            .and(path(format!("/img/{i}.jpg")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/img/2.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/4.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 3, &["cats"])?;
    let references = (1..=5)
        .map(|i| reference("cats", format!("{}/img/{i}.jpg", mock_server.uri())))
        .collect();

    let results = dispatcher.download_all(references).await;

    // Results come back in submission order.
    let outcomes: Vec<bool> = results.iter().map(|r| r.is_success()).collect();
    assert_eq!(outcomes, vec![true, false, true, false, true]);
    assert!(matches!(
        results[1].error(),
        Some(DownloadError::HttpStatus { status: 404, .. })
    ));
    assert!(matches!(
        results[3].error(),
        Some(DownloadError::HttpStatus { status: 500, .. })
    ));

    // Each reference keeps the number of its position; failures leave gaps.
    assert_eq!(
        file_names(&root.path().join("cats")),
        names(&["cats_1.jpg", "cats_3.jpg", "cats_5.jpg"])
    );
    assert_eq!(dispatcher.stats().failed(), 2);
    assert_eq!(dispatcher.stats().completed(), 3);
    Ok(())
}

#[tokio::test]
async fn test_slow_first_reference_keeps_first_number() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/first.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"first".to_vec())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/second.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
        .mount(&mock_server)
        .await;

    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 4, &["cats"])?;
    let results = dispatcher
        .download_all(vec![
            reference("cats", format!("{}/first.jpg", mock_server.uri())),
            reference("cats", format!("{}/second.jpg", mock_server.uri())),
        ])
        .await;

    let dir = root.path().join("cats");
    assert_eq!(results[0].path(), Some(dir.join("cats_1.jpg").as_path()));
    assert_eq!(results[1].path(), Some(dir.join("cats_2.jpg").as_path()));
    assert_eq!(std::fs::read(dir.join("cats_1.jpg"))?, b"first");
    assert_eq!(std::fs::read(dir.join("cats_2.jpg"))?, b"second");
    Ok(())
}

#[tokio::test]
async fn test_download_all_routes_each_term_to_its_directory()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .mount(&mock_server)
        .await;

    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 4, &["cats", "dogs big"])?;
    let uri = mock_server.uri();
    let references = vec![
        reference("cats", format!("{uri}/c1.jpg")),
        reference("dogs big", format!("{uri}/d1.jpg")),
        reference("cats", format!("{uri}/c2.jpg")),
        reference("dogs big", format!("{uri}/d2.jpg")),
    ];

    let results = dispatcher.download_all(references).await;

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(
        file_names(&root.path().join("cats")),
        names(&["cats_1.jpg", "cats_2.jpg"])
    );
    assert_eq!(
        file_names(&root.path().join("dogs+big")),
        names(&["dogs+big_1.jpg", "dogs+big_2.jpg"])
    );
    Ok(())
}

#[tokio::test]
async fn test_rerun_continues_numbering_without_overwriting()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/first.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first".to_vec()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/second.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
        .mount(&mock_server)
        .await;

    let root = TempDir::new()?;
    let uri = mock_server.uri();

    let first_run = dispatcher_for(root.path(), 2, &["cats"])?;
    let results = first_run
        .download_all(vec![
            reference("cats", format!("{uri}/first.jpg")),
            reference("cats", format!("{uri}/first.jpg")),
        ])
        .await;
    assert!(results.iter().all(|r| r.is_success()));

    let second_run = dispatcher_for(root.path(), 2, &["cats"])?;
    let results = second_run
        .download_all(vec![
            reference("cats", format!("{uri}/second.jpg")),
            reference("cats", format!("{uri}/second.jpg")),
        ])
        .await;
    assert!(results.iter().all(|r| r.is_success()));

    let dir = root.path().join("cats");
    assert_eq!(
        file_names(&dir),
        names(&["cats_1.jpg", "cats_2.jpg", "cats_3.jpg", "cats_4.jpg"])
    );
    assert_eq!(std::fs::read(dir.join("cats_1.jpg"))?, b"first");
    assert_eq!(std::fs::read(dir.join("cats_2.jpg"))?, b"first");
    assert_eq!(std::fs::read(dir.join("cats_3.jpg"))?, b"second");
    assert_eq!(std::fs::read(dir.join("cats_4.jpg"))?, b"second");
    Ok(())
}

#[tokio::test]
async fn test_concurrency_limit_serializes_downloads() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"jpeg".to_vec())
                .set_delay(Duration::from_millis(150)),
        )
        .mount(&mock_server)
        .await;

    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 1, &["cats"])?;
    let references = (0..4)
        .map(|i| reference("cats", format!("{}/{i}.jpg", mock_server.uri())))
        .collect();

    let started = Instant::now();
    let results = dispatcher.download_all(references).await;

    assert!(results.iter().all(|r| r.is_success()));
    assert!(
        started.elapsed() >= Duration::from_millis(600),
        "one permit should force sequential downloads, took {:?}",
        started.elapsed()
    );
    Ok(())
}

#[tokio::test]
async fn test_slow_response_times_out() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"jpeg".to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let root = TempDir::new()?;
    let layout = OutputLayout::new(root.path());
    layout.ensure_directory(&term("cats"))?;
    let client = HttpClient::with_timeouts(HttpTimeouts {
        connect: Duration::from_secs(1),
        read: Duration::from_millis(200),
    });
    let dispatcher = DownloadDispatcher::new(2, client, layout)?;

    let results = dispatcher
        .download_all(vec![reference(
            "cats",
            format!("{}/slow.jpg", mock_server.uri()),
        )])
        .await;

    assert!(matches!(
        results[0].error(),
        Some(DownloadError::Timeout { .. })
    ));
    assert!(file_names(&root.path().join("cats")).is_empty());
    Ok(())
}

// ==================== Inline and Invalid Locators ====================

#[tokio::test]
async fn test_inline_payload_written_without_network() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 2, &["cats"])?;

    let results = dispatcher
        .download_all(vec![
            reference("cats", "data:image/jpeg;base64,aGVsbG8="),
            reference("cats", "data:image/svg+xml,%3Csvg%2F%3E"),
        ])
        .await;

    assert!(results.iter().all(|r| r.is_success()));
    let dir = root.path().join("cats");
    assert_eq!(std::fs::read(dir.join("cats_1.jpg"))?, b"hello");
    assert_eq!(std::fs::read(dir.join("cats_2.jpg"))?, b"<svg/>");
    Ok(())
}

#[tokio::test]
async fn test_unsupported_locators_fail_individually() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 2, &["cats"])?;

    let results = dispatcher
        .download_all(vec![
            reference("cats", "ftp://img.test/a.jpg"),
            reference("cats", "data:image/jpeg;base64,"),
            reference("cats", "data:image/png;base64,aGk="),
        ])
        .await;

    assert!(matches!(
        results[0].error(),
        Some(DownloadError::InvalidLocator { .. })
    ));
    assert!(matches!(
        results[1].error(),
        Some(DownloadError::Decode { .. })
    ));
    assert!(results[2].is_success());
    assert_eq!(file_names(&root.path().join("cats")), names(&["cats_3.jpg"]));
    Ok(())
}

#[tokio::test]
async fn test_missing_directory_fails_with_io_error() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let dispatcher = DownloadDispatcher::new(1, HttpClient::new(), OutputLayout::new(root.path()))?;

    let results = dispatcher
        .download_all(vec![reference("cats", "data:image/png;base64,aGk=")])
        .await;

    assert!(matches!(results[0].error(), Some(DownloadError::Io { .. })));
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_returns_no_results() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let dispatcher = dispatcher_for(root.path(), 2, &[])?;

    let results = dispatcher.download_all(Vec::new()).await;

    assert!(results.is_empty());
    assert_eq!(dispatcher.stats().total(), 0);
    Ok(())
}
