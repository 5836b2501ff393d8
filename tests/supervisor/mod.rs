//! Supervisor module tests.

mod registration_test;
mod spawn_test;

use labd::config::SupervisorConfig;
use labd::supervisor::{ServerHandle, SupervisorServer};

/// Start a supervisor on an ephemeral loopback port with `launcher`.
pub async fn start_with_launcher(launcher: &[&str], registration_timeout_ms: u64) -> ServerHandle {
    let config = SupervisorConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        launcher: launcher.iter().map(ToString::to_string).collect(),
        registration_timeout_ms,
        stop_timeout_ms: 1_000,
        ..SupervisorConfig::default()
    };
    SupervisorServer::bind(config)
        .await
        .expect("Failed to bind supervisor")
        .start()
        .expect("Failed to start supervisor")
}

/// Verify the public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use labd::supervisor::{
        AdapterCommand, AdapterId, Begin, ControlCommand, ModulePath, ProcessState, ProcessTable,
        RegistrationEvent, RegistryError, WaitError,
    };

    let mut table = ProcessTable::new();
    let (id, _waiter) = table.begin_sequential();
    assert_eq!(id, AdapterId::Sequential(1));
    assert!(matches!(
        table.begin(&AdapterId::Named("psu".into())),
        Begin::Created(_)
    ));

    let event = RegistrationEvent::new();
    assert!(!event.is_signaled());

    let module = ModulePath::parse("devs test_psu.py").unwrap();
    let _ = AdapterCommand::new(module.resolve(std::path::Path::new("/srv/lab")), id);
    let _ = ControlCommand::Ensure(module);

    let _: fn() -> RegistryError = || RegistryError::UnknownPort(1);
    let _ = WaitError::Abandoned;
    let _ = ProcessState::Registered;
}
