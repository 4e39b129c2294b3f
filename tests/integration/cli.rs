#[path = "common/mod.rs"]
mod common;

use std::{process::Command as StdCommand, thread, time::Duration};

use assert_cmd::Command;
use common::{ServiceSpec, write_setting};
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn help_describes_the_daemon() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wardend"));
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("service supervisor daemon"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn missing_setting_file_exits_nonzero() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wardend"));
    cmd.arg("--config")
        .arg("/nonexistent/warden.setting.xml")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn malformed_setting_file_exits_nonzero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    std::fs::write(&path, "<servMgmtSetting><version>").unwrap();

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wardend"));
    cmd.arg("--config")
        .arg(path.to_str().unwrap())
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_log_level_is_rejected_by_clap() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wardend"));
    cmd.arg("--log-level")
        .arg("verbose")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized log level"));
}

#[test]
fn interrupt_shuts_the_daemon_down_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[ServiceSpec::new("steady", "automatic", "/bin/sleep").with_param("30")],
    );

    let mut daemon = StdCommand::new(assert_cmd::cargo::cargo_bin!("wardend"))
        .arg("--config")
        .arg(path.to_str().unwrap())
        .arg("--log-level")
        .arg("debug")
        .spawn()
        .expect("failed to spawn wardend");

    // Give it time to boot and launch the automatic service.
    thread::sleep(Duration::from_millis(1500));

    kill(Pid::from_raw(daemon.id() as i32), Signal::SIGINT).unwrap();
    let status = daemon.wait().unwrap();
    assert!(status.success(), "daemon exited with {status}");
}
