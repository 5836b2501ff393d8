//! End-to-end tests: a supervisor spawning real `labd adapter` children.

use std::time::Duration;

use labd::client::{AdapterClient, AdapterSession, ClientError, SupervisorClient};
use labd::config::SupervisorConfig;
use labd::devices::TestPsuProxy;
use labd::rpc::ErrorKind;
use labd::supervisor::{ModulePath, ProcessState, ServerHandle, SupervisorServer};

/// Start a supervisor on an ephemeral port that launches this crate's binary.
async fn start_supervisor() -> (ServerHandle, SupervisorClient) {
    let config = SupervisorConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        launcher: vec![env!("CARGO_BIN_EXE_labd").to_string(), "adapter".to_string()],
        registration_timeout_ms: 20_000,
        stop_timeout_ms: 2_000,
        ..SupervisorConfig::default()
    };
    let server = SupervisorServer::bind(config)
        .await
        .expect("Failed to bind supervisor");
    let handle = server.start().expect("Failed to start supervisor");
    let client = SupervisorClient::new(handle.local_addr().to_string());
    (handle, client)
}

fn psu_module() -> ModulePath {
    ModulePath::parse("devs test_psu.py").unwrap()
}

#[tokio::test]
async fn start_returns_a_connectable_port() {
    let (handle, supervisor) = start_supervisor().await;

    let port = supervisor.start(&psu_module()).await.expect("START failed");
    assert_ne!(port, 0);

    // The port is valid the moment START answers.
    let adapter = AdapterClient::new("127.0.0.1", port);
    assert_eq!(adapter.echo(b"ready?").await.unwrap(), b"ready?");

    let adapters = handle.adapters().await;
    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].id, "1");
    assert_eq!(adapters[0].port, Some(port));
    assert_eq!(adapters[0].state, ProcessState::Registered);

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn ensure_twice_reuses_the_same_adapter() {
    let (handle, supervisor) = start_supervisor().await;

    let first = supervisor.ensure(&psu_module()).await.unwrap();
    let second = supervisor.ensure(&psu_module()).await.unwrap();
    assert_eq!(first, second);

    let adapters = handle.adapters().await;
    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].id, "test_psu");

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn concurrent_ensure_spawns_once() {
    let (handle, supervisor) = start_supervisor().await;
    let module = psu_module();

    let (a, b) = tokio::join!(supervisor.ensure(&module), supervisor.ensure(&module));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(handle.adapters().await.len(), 1);

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn consecutive_starts_get_distinct_identifiers() {
    let (handle, supervisor) = start_supervisor().await;

    let first = supervisor.start(&psu_module()).await.unwrap();
    let second = supervisor
        .start(&ModulePath::parse("devs laser_diode.py").unwrap())
        .await
        .unwrap();
    assert_ne!(first, second);

    let ids: Vec<String> = handle.adapters().await.into_iter().map(|a| a.id).collect();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn stop_terminates_the_adapter() {
    let (handle, supervisor) = start_supervisor().await;

    let port = supervisor.start(&psu_module()).await.unwrap();
    supervisor.stop(port).await.expect("STOP failed");

    assert!(handle.adapters().await.is_empty());
    let err = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);

    // The port is no longer known.
    let err = supervisor.stop(port).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(ref r) if r.kind == ErrorKind::Lookup));

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn ensure_after_stop_spawns_a_new_adapter() {
    let (handle, supervisor) = start_supervisor().await;

    let first = supervisor.ensure(&psu_module()).await.unwrap();
    supervisor.stop(first).await.unwrap();
    let second = supervisor.ensure(&psu_module()).await.unwrap();

    let adapter = AdapterClient::new("127.0.0.1", second);
    assert_eq!(adapter.echo(b"again").await.unwrap(), b"again");
    assert_eq!(handle.adapters().await.len(), 1);

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn session_drives_the_power_supply() {
    let (handle, supervisor) = start_supervisor().await;

    let session = AdapterSession::start(supervisor, &psu_module()).await.unwrap();
    let client = session.client();

    client.call("output_setattr", "1").await.unwrap();
    assert_eq!(client.call("output_getattr", Vec::new()).await.unwrap(), vec![0x01]);
    client.set_bool("output", false).await.unwrap();
    assert!(!client.get_bool("output").await.unwrap());

    let port = session.port();
    session.stop().await.unwrap();
    assert!(AdapterClient::new("127.0.0.1", port).echo(b"x").await.is_err());

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn dropped_session_stops_its_adapter() {
    let (handle, supervisor) = start_supervisor().await;

    let session = AdapterSession::start(supervisor, &psu_module()).await.unwrap();
    drop(session);

    let mut remaining = handle.adapters().await.len();
    for _ in 0..50 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        remaining = handle.adapters().await.len();
    }
    assert_eq!(remaining, 0);

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn typed_proxy_reads_back_setpoints() {
    let (handle, supervisor) = start_supervisor().await;

    let psu = TestPsuProxy::connect(supervisor).await.unwrap();
    assert_eq!(psu.echo("hello psu").await.unwrap(), "hello psu");

    psu.set_voltage_setpoint(5.0).await.unwrap();
    psu.set_current_setpoint(0.1).await.unwrap();
    assert!((psu.voltage_setpoint().await.unwrap() - 5.0).abs() < f32::EPSILON);
    assert!(psu.measured_voltage().await.unwrap().abs() < f32::EPSILON);

    psu.set_output(true).await.unwrap();
    assert!(psu.output().await.unwrap());
    assert!((psu.measured_current().await.unwrap() - 0.1).abs() < f32::EPSILON);

    psu.release().await.unwrap();
    assert!(handle.adapters().await.is_empty());

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn unknown_device_fails_to_start() {
    let (handle, supervisor) = start_supervisor().await;

    let module = ModulePath::parse("devs announcer.py").unwrap();
    let err = supervisor.start(&module).await.unwrap_err();
    match err {
        ClientError::NotStarted(remote) => assert_eq!(remote.kind, ErrorKind::Spawn),
        other => panic!("expected NotStarted, got {other:?}"),
    }
    assert!(handle.adapters().await.is_empty());

    handle.shutdown_and_wait().await;
}

#[tokio::test]
async fn shutdown_terminates_every_adapter() {
    let (handle, supervisor) = start_supervisor().await;

    let a = supervisor.start(&psu_module()).await.unwrap();
    let b = supervisor.ensure(&psu_module()).await.unwrap();
    handle.shutdown_and_wait().await;

    for port in [a, b] {
        assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
