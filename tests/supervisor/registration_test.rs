//! Registration handshake driven by hand against stand-in children.

#![cfg(unix)]

use std::time::Duration;

use labd::client::{ClientError, SupervisorClient};
use labd::rpc::{exchange, ErrorKind, Request, Response};
use labd::supervisor::{AdapterId, ModulePath, ProcessState};

use super::start_with_launcher;

/// A child that never registers on its own.
const SILENT_CHILD: &[&str] = &["sh", "-c", "sleep 30"];

async fn wait_for_state(
    handle: &labd::supervisor::ServerHandle,
    state: ProcessState,
) -> Option<u32> {
    for _ in 0..100 {
        if let Some(summary) = handle.adapters().await.into_iter().find(|s| s.state == state) {
            return summary.pid;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::test]
async fn start_answers_only_after_port_registration() {
    let handle = start_with_launcher(SILENT_CHILD, 10_000).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());
    let module = ModulePath::parse("devs test_psu.py").unwrap();

    let start = tokio::spawn({
        let client = client.clone();
        async move { client.start(&module).await }
    });

    assert!(wait_for_state(&handle, ProcessState::AwaitingRegistration)
        .await
        .is_some());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!start.is_finished(), "START answered before registration");

    client
        .register(&AdapterId::Sequential(1), 41_234)
        .await
        .expect("PORT rejected");

    let port = start.await.unwrap().expect("START failed");
    assert_eq!(port, 41_234);

    let adapters = handle.adapters().await;
    assert_eq!(adapters[0].state, ProcessState::Registered);
    assert_eq!(adapters[0].port, Some(41_234));

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn registration_for_unknown_identifier_is_a_lookup_error() {
    let handle = start_with_launcher(SILENT_CHILD, 10_000).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());

    let err = client
        .register(&AdapterId::Named("ghost".into()), 4000)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref r) if r.kind == ErrorKind::Lookup));

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn second_registration_is_rejected() {
    let handle = start_with_launcher(SILENT_CHILD, 10_000).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());
    let module = ModulePath::parse("devs test_psu.py").unwrap();

    let ensure = tokio::spawn({
        let client = client.clone();
        async move { client.ensure(&module).await }
    });
    wait_for_state(&handle, ProcessState::AwaitingRegistration).await;

    let id = AdapterId::Named("test_psu".into());
    client.register(&id, 40_001).await.unwrap();
    assert_eq!(ensure.await.unwrap().unwrap(), 40_001);

    let err = client.register(&id, 40_002).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref r) if r.kind == ErrorKind::Protocol));

    // The original registration stands.
    let module = ModulePath::parse("devs test_psu.py").unwrap();
    assert_eq!(client.ensure(&module).await.unwrap(), 40_001);

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn unknown_and_malformed_commands_get_protocol_errors() {
    let handle = start_with_launcher(SILENT_CHILD, 10_000).await;
    let addr = handle.local_addr();

    for request in [
        Request::new("RESTART", "devs test_psu.py"),
        Request::new("STOP", "not-a-port"),
        Request::new("ENSURE", "devs ../../etc/passwd"),
        Request::new("ENSURE", "devs 42.py"),
        Request::bare("PORT"),
    ] {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let response = exchange(&mut stream, &request, 1024).await.unwrap();
        match response {
            Response::Err(err) => assert_eq!(err.kind, ErrorKind::Protocol, "{request:?}"),
            Response::Ok(body) => panic!("{request:?} succeeded with {body:?}"),
        }
    }

    // The supervisor keeps serving after bad requests.
    let client = SupervisorClient::new(addr.to_string());
    let err = client.stop(4000).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref r) if r.kind == ErrorKind::Lookup));

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn supervisor_stays_responsive_while_handshakes_are_pending() {
    let handle = start_with_launcher(SILENT_CHILD, 10_000).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());

    let pending: Vec<_> = (0..3)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .start(&ModulePath::parse("devs test_psu.py").unwrap())
                    .await
            })
        })
        .collect();

    // Control requests are still answered promptly.
    let quick = client.clone().with_timeout(Duration::from_secs(2));
    let err = quick.stop(4000).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(_)));

    for _ in 0..100 {
        if handle.adapters().await.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for id in 1..=3u64 {
        client
            .register(&AdapterId::Sequential(id), 42_000 + u16::try_from(id).unwrap())
            .await
            .unwrap();
    }

    let mut ports: Vec<u16> = Vec::new();
    for task in pending {
        ports.push(task.await.unwrap().unwrap());
    }
    ports.sort_unstable();
    assert_eq!(ports, vec![42_001, 42_002, 42_003]);

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn port_of_crashed_adapter_can_be_reused() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let handle = start_with_launcher(SILENT_CHILD, 10_000).await;
    let client = SupervisorClient::new(handle.local_addr().to_string());
    let module = ModulePath::parse("devs test_psu.py").unwrap();

    let first = tokio::spawn({
        let client = client.clone();
        let module = module.clone();
        async move { client.start(&module).await }
    });
    let pid = wait_for_state(&handle, ProcessState::AwaitingRegistration)
        .await
        .expect("first child never spawned");
    client
        .register(&AdapterId::Sequential(1), 41_555)
        .await
        .expect("PORT rejected");
    assert_eq!(first.await.unwrap().unwrap(), 41_555);

    // The adapter dies without a STOP.
    kill(Pid::from_raw(i32::try_from(pid).unwrap()), Signal::SIGKILL).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.start(&module).await }
    });
    assert!(wait_for_state(&handle, ProcessState::AwaitingRegistration)
        .await
        .is_some());
    client
        .register(&AdapterId::Sequential(2), 41_555)
        .await
        .expect("port of the crashed adapter was not released");
    assert_eq!(second.await.unwrap().unwrap(), 41_555);

    let adapters = handle.adapters().await;
    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].id, "2");

    handle.shutdown_and_wait().await;
}
