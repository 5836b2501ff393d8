//! Exit status and output of the `labd` subcommands.

use std::process::{Command, Output};

use tokio::net::TcpListener;

fn labd(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_labd"))
        .args(args)
        .env_remove("LABD_SUPERVISOR")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute labd")
}

/// An address nothing is listening on.
fn dead_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

#[test]
fn adapter_with_unknown_device_fails() {
    let output = labd(&["adapter", "devs/announcer.py", "3"]);
    assert!(!output.status.success());
}

#[test]
fn supervised_adapter_exits_when_supervisor_is_gone() {
    let output = labd(&["--supervisor", &dead_address(), "adapter", "devs/test_psu.py", "7"]);
    assert!(!output.status.success());
}

#[test]
fn start_rejects_escaping_module_path() {
    let output = labd(&["--supervisor", &dead_address(), "start", "..", "x.py"]);
    assert!(!output.status.success());
}

#[test]
fn stop_without_supervisor_fails() {
    let output = labd(&["--supervisor", &dead_address(), "stop", "4000"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn config_file_supplies_the_supervisor_address() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labd.toml");
    std::fs::write(
        &path,
        format!("[client]\nsupervisor = \"{}\"\ncontrol_timeout_ms = 2000\n", dead_address()),
    )
    .unwrap();

    let output = labd(&["--config", path.to_str().unwrap(), "stop", "4000"]);
    assert!(!output.status.success());
}

#[test]
fn invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labd.toml");
    std::fs::write(&path, "[client\nsupervisor = ").unwrap();

    let output = labd(&["--config", path.to_str().unwrap(), "stop", "4000"]);
    assert!(!output.status.success());
}

#[tokio::test]
async fn call_reaches_a_standalone_adapter() {
    // Reserve a free port for the standalone adapter.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labd.toml");
    std::fs::write(
        &path,
        format!("[adapter]\nbind = \"127.0.0.1\"\nstandalone_port = {port}\n"),
    )
    .unwrap();
    let config = path.to_str().unwrap().to_string();

    let mut adapter = tokio::process::Command::new(env!("CARGO_BIN_EXE_labd"))
        .args(["--config", &config, "adapter", "devs/test_psu.py"])
        .env_remove("LABD_SUPERVISOR")
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let mut ready = false;
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(ready, "standalone adapter never came up");

    let port_arg = port.to_string();
    let output = tokio::task::spawn_blocking(move || {
        labd(&["call", "--host", "127.0.0.1", &port_arg, "_echo", "hello bench"])
    })
    .await
    .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hello bench"));

    adapter.kill().await.unwrap();
}
