//! One-shot download behavior: streams to disk, reports progress, never
//! enters the retry state machine.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{harness, MockTransport};
use redial_core::download::DownloadTask;
use redial_core::error::{DispatchError, TransportError};
use url::Url;

fn source_url() -> Url {
    Url::parse("https://cdn.example.com/assets/photo.jpg").unwrap()
}

#[tokio::test]
async fn download_writes_file_and_reports_final_location() {
    let dir = tempfile::tempdir().unwrap();
    let body = b"jpeg bytes".to_vec();
    let h = harness(MockTransport::scripted(vec![]).download_body(Ok(body.clone())));

    let fractions = Arc::new(Mutex::new(Vec::new()));
    let final_path = Arc::new(Mutex::new(None));

    let fractions_in = fractions.clone();
    let final_path_in = final_path.clone();
    let task = DownloadTask::new(source_url(), dir.path(), "photo.jpg")
        .progress(move |fraction| {
            fractions_in.lock().unwrap().push(fraction);
        })
        .success(move |path| {
            *final_path_in.lock().unwrap() = Some(path);
        })
        .failure(|error| panic!("unexpected download failure: {error}"));

    h.dispatcher.download(task).wait().await;

    let path = final_path.lock().unwrap().clone().expect("success handler ran");
    assert_eq!(path, dir.path().join("photo.jpg"));
    assert_eq!(std::fs::read(&path).unwrap(), body);

    let seen = fractions.lock().unwrap().clone();
    assert_eq!(seen.last().copied(), Some(1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn download_failure_reaches_failure_handler() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        MockTransport::scripted(vec![])
            .download_body(Err(TransportError::Connection("refused".into()))),
    );

    let failures = Arc::new(AtomicUsize::new(0));
    let failures_in = failures.clone();
    let task = DownloadTask::new(source_url(), dir.path(), "photo.jpg")
        .success(|path| panic!("unexpected success: {}", path.display()))
        .failure(move |error| {
            assert!(matches!(error, DispatchError::Transport { .. }));
            failures_in.fetch_add(1, Ordering::SeqCst);
        });

    h.dispatcher.download(task).wait().await;

    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("photo.jpg").exists());
}

#[tokio::test]
async fn downloads_do_not_touch_the_dispatch_table() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(MockTransport::scripted(vec![]).download_body(Ok(b"x".to_vec())));

    let handle = h
        .dispatcher
        .download(DownloadTask::new(source_url(), dir.path(), "x.bin"));
    handle.wait().await;

    // No request submissions happened; the table never saw the download.
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn cancelled_download_invokes_no_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(MockTransport::scripted(vec![]).download_body(Ok(b"slow".to_vec())));

    let invoked = Arc::new(AtomicUsize::new(0));
    let invoked_success = invoked.clone();
    let invoked_failure = invoked.clone();
    let task = DownloadTask::new(source_url(), dir.path(), "slow.bin")
        .success(move |_| {
            invoked_success.fetch_add(1, Ordering::SeqCst);
        })
        .failure(move |_| {
            invoked_failure.fetch_add(1, Ordering::SeqCst);
        });

    let handle = h.dispatcher.download(task);
    handle.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}
