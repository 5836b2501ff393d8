//! Spawning, early exits and registration timeouts.

use std::time::{Duration, Instant};

use labd::client::{ClientError, SupervisorClient};
use labd::rpc::ErrorKind;
use labd::supervisor::ModulePath;

use super::start_with_launcher;

#[tokio::test]
async fn missing_launcher_is_a_spawn_error() {
    let handle = start_with_launcher(&["/nonexistent/labd-launcher"], 5_000).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());

    let err = client
        .start(&ModulePath::parse("devs test_psu.py").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotStarted(ref r) if r.kind == ErrorKind::Spawn));
    assert!(handle.adapters().await.is_empty());

    handle.shutdown_and_wait().await;
}

#[cfg(unix)]
#[tokio::test]
async fn child_exiting_before_registration_fails_fast() {
    let handle = start_with_launcher(&["sh", "-c", "exit 3"], 30_000).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());

    let started = Instant::now();
    let err = client
        .ensure(&ModulePath::parse("devs test_psu.py").unwrap())
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));
    match err {
        ClientError::NotStarted(remote) => {
            assert_eq!(remote.kind, ErrorKind::Spawn);
            assert!(remote.message.contains("test_psu"), "{}", remote.message);
        }
        other => panic!("expected NotStarted, got {other:?}"),
    }
    assert!(handle.adapters().await.is_empty());

    handle.shutdown_and_wait().await;
}

#[cfg(unix)]
#[tokio::test]
async fn registration_timeout_rolls_back_the_record() {
    let handle = start_with_launcher(&["sh", "-c", "sleep 30"], 300).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());
    let module = ModulePath::parse("devs test_psu.py").unwrap();

    let err = client.ensure(&module).await.unwrap_err();
    assert!(matches!(err, ClientError::NotStarted(ref r) if r.kind == ErrorKind::Timeout));
    assert!(handle.adapters().await.is_empty());

    // A later ENSURE starts over instead of joining a dead handshake.
    let err = client.ensure(&module).await.unwrap_err();
    assert!(matches!(err, ClientError::NotStarted(ref r) if r.kind == ErrorKind::Timeout));

    handle.shutdown_and_wait().await;
}
