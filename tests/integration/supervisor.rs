#[path = "common/mod.rs"]
mod common;

use std::{thread, time::Duration};

use common::{ServiceSpec, wait_for_status, write_setting};
use tempfile::tempdir;
use warden::{
    error::SupervisorError,
    service::ServiceStatus,
    supervisor::{InitParams, Supervisor},
    test_utils::signal_lock,
};

#[test]
fn cold_boot_retries_crashing_automatic_service_into_error() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[ServiceSpec::new("a", "automatic", "/bin/true")],
    );

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    // /bin/true exits immediately; three retries (0s, 1s, 2s) burn the
    // budget and the service parks in error.
    wait_for_status(&handle, "a", ServiceStatus::Error, Duration::from_secs(15));

    let listing = handle.list_services().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].status, ServiceStatus::Error);
}

#[test]
fn zero_retry_budget_fails_after_a_single_crash() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        0,
        &[ServiceSpec::new("oneshot", "automatic", "/bin/true")],
    );

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    wait_for_status(
        &supervisor.handle(),
        "oneshot",
        ServiceStatus::Error,
        Duration::from_secs(5),
    );
}

#[test]
fn manual_service_waits_for_an_operator_start() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[ServiceSpec::new("b", "manual", "/bin/sleep").with_param("30")],
    );

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    assert_eq!(
        handle.service_info("b").unwrap().status,
        ServiceStatus::Stopped
    );

    handle.start_service("b").unwrap();
    wait_for_status(&handle, "b", ServiceStatus::Running, Duration::from_secs(2));

    handle.stop_service("b").unwrap();
    assert_eq!(
        handle.service_info("b").unwrap().status,
        ServiceStatus::Stopped
    );
}

#[test]
fn stop_during_retry_delay_is_honoured() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        10,
        &[ServiceSpec::new("c", "automatic", "/bin/true")],
    );

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    // By now the service has crashed at least once and is either freshly
    // respawned or waiting out a restart delay; either way it reads as
    // running and the stop must take.
    thread::sleep(Duration::from_millis(400));
    handle.stop_service("c").unwrap();
    assert_eq!(
        handle.service_info("c").unwrap().status,
        ServiceStatus::Stopped
    );

    // Any pending restart timer fires as a no-op.
    thread::sleep(Duration::from_millis(2500));
    assert_eq!(
        handle.service_info("c").unwrap().status,
        ServiceStatus::Stopped
    );
}

#[test]
fn shutdown_invalidates_the_management_api() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[ServiceSpec::new("b", "manual", "/bin/sleep").with_param("30")],
    );

    let mut supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();
    supervisor.shutdown().unwrap();

    assert!(matches!(
        handle.list_services(),
        Err(SupervisorError::ShutDown)
    ));
    assert!(matches!(
        handle.start_service("b"),
        Err(SupervisorError::ShutDown)
    ));
}

#[test]
fn boot_fails_when_an_automatic_service_cannot_spawn() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[ServiceSpec::new("ghost", "automatic", "/nonexistent/bin/ghost")],
    );

    let err = Supervisor::init(InitParams::new(&path)).unwrap_err();
    assert!(matches!(err, SupervisorError::SpawnFailed { .. }));
}

#[test]
fn errored_service_accepts_an_operator_start() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        0,
        &[ServiceSpec::new("flaky", "manual", "/bin/true")],
    );

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    handle.start_service("flaky").unwrap();
    // /bin/true exits at once and the empty budget parks it in error.
    wait_for_status(&handle, "flaky", ServiceStatus::Error, Duration::from_secs(5));

    // Error is terminal only until the operator asks again.
    handle.start_service("flaky").unwrap();
    wait_for_status(&handle, "flaky", ServiceStatus::Error, Duration::from_secs(5));
}

#[test]
fn long_running_service_survives_the_reap_loop() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[ServiceSpec::new("steady", "automatic", "/bin/sleep").with_param("30")],
    );

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    wait_for_status(
        &handle,
        "steady",
        ServiceStatus::Running,
        Duration::from_secs(2),
    );
    // No spurious restarts or exits for a well-behaved child.
    thread::sleep(Duration::from_millis(500));
    assert_eq!(
        handle.service_info("steady").unwrap().status,
        ServiceStatus::Running
    );
}
