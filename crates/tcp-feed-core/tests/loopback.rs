//! End-to-end transfers over real loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use rand::{RngCore, SeedableRng};
use tcp_feed_core::{
    FeedError, NullProgress, PacingConfig, Receiver, ReceiverConfig, SenderConfig, WatchProgress,
    send_file,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

/// A loopback port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Bind a capture host on an ephemeral loopback port.
async fn capture_host(output: Option<std::path::PathBuf>, append: bool) -> (Receiver, u16) {
    let receiver = Receiver::bind(ReceiverConfig {
        host: "127.0.0.1".into(),
        port: 0,
        output,
        append,
        ..Default::default()
    })
    .await
    .unwrap();
    let port = receiver.local_addr().unwrap().port();
    (receiver, port)
}

/// Connect a plain client, write `data`, close.
async fn push(port: u16, data: &[u8]) {
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(data).await.unwrap();
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_peer_fails_before_source_is_opened() {
    let config = SenderConfig {
        host: "127.0.0.1".into(),
        port: closed_port().await,
        // Would be an OpenSource error if the file were touched first.
        source: "/definitely/not/here.bin".into(),
        ..Default::default()
    };

    let err = send_file(config, &mut NullProgress, Arc::new(Notify::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Connect { .. }), "{err}");
}

#[tokio::test]
async fn invalid_config_is_rejected_before_connecting() {
    let config = SenderConfig {
        chunk_size: 0,
        ..Default::default()
    };
    let err = send_file(config, &mut NullProgress, Arc::new(Notify::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Config(_)), "{err}");
}

#[tokio::test]
async fn file_arrives_byte_exact_at_capture_host() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("noHeader.bin");
    let output = dir.path().join("data.bin");

    let mut data = vec![0u8; 10_000];
    rand::rngs::StdRng::seed_from_u64(7).fill_bytes(&mut data);
    std::fs::write(&source, &data).unwrap();

    let (receiver, port) = capture_host(Some(output.clone()), false).await;
    let capture =
        tokio::spawn(async move { receiver.accept_and_capture(&mut NullProgress).await });

    let config = SenderConfig {
        host: "127.0.0.1".into(),
        port,
        source,
        pacing: PacingConfig::FixedDelay { delay_ms: 1 },
        ..Default::default()
    };
    let (mut progress, rx) = WatchProgress::channel();
    // Runs on a worker task, the way the dashboard front end drives it.
    let transfer = tokio::spawn(async move {
        send_file(config, &mut progress, Arc::new(Notify::new())).await
    });
    let report = tokio::time::timeout(Duration::from_secs(10), transfer)
        .await
        .expect("send timed out")
        .expect("send task panicked")
        .expect("send failed");

    assert_eq!(report.bytes_sent, 10_000);
    assert_eq!(report.chunks_sent, 10);
    assert_eq!(report.last_chunk_len, 10_000 - 9 * 1035);
    let state = rx.borrow().clone();
    assert!(state.finished);
    assert_eq!(state.position, 10_000);

    let captured = tokio::time::timeout(Duration::from_secs(10), capture)
        .await
        .expect("capture timed out")
        .expect("capture task panicked")
        .expect("capture failed");
    assert_eq!(captured.bytes_received, 10_000);
    assert_eq!(captured.records, 9);
    assert_eq!(captured.trailing_bytes, 10_000 - 9 * 1036);
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[tokio::test]
async fn capture_host_can_be_shut_down_while_waiting() {
    let receiver = Receiver::bind(ReceiverConfig {
        host: "127.0.0.1".into(),
        port: 0,
        output: None,
        ..Default::default()
    })
    .await
    .unwrap();
    let shutdown = Arc::new(Notify::new());
    let receiver = receiver.with_shutdown(shutdown.clone());
    shutdown.notify_one();

    let err = receiver
        .accept_and_capture(&mut NullProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Cancelled { bytes: 0 }), "{err}");
}

#[tokio::test]
async fn capture_host_can_be_shut_down_mid_stream() {
    let (receiver, port) = capture_host(None, false).await;
    let shutdown = Arc::new(Notify::new());
    let receiver = receiver.with_shutdown(shutdown.clone());
    let capture =
        tokio::spawn(async move { receiver.accept_and_capture(&mut NullProgress).await });

    // One full record and part of the next, then the client goes quiet.
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(&[1u8; 1036 + 100]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!capture.is_finished());

    shutdown.notify_one();
    let err = tokio::time::timeout(Duration::from_secs(10), capture)
        .await
        .expect("capture did not stop")
        .expect("capture task panicked")
        .unwrap_err();
    assert!(matches!(err, FeedError::Cancelled { bytes: 1036 }), "{err}");
    drop(client);
}

#[tokio::test]
async fn capture_output_is_truncated_unless_appending() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.bin");
    std::fs::write(&output, b"stale bytes from an earlier run").unwrap();

    let (receiver, port) = capture_host(Some(output.clone()), false).await;
    let capture =
        tokio::spawn(async move { receiver.accept_and_capture(&mut NullProgress).await });
    push(port, b"first").await;
    let report = capture.await.unwrap().unwrap();
    assert_eq!(report.bytes_received, 5);
    assert_eq!(std::fs::read(&output).unwrap(), b"first");

    let (receiver, port) = capture_host(Some(output.clone()), true).await;
    let capture =
        tokio::spawn(async move { receiver.accept_and_capture(&mut NullProgress).await });
    push(port, b"second").await;
    capture.await.unwrap().unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), b"firstsecond");
}
