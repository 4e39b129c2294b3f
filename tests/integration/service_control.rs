#[path = "common/mod.rs"]
mod common;

use std::{fs, time::Duration};

use common::{ServiceSpec, wait_for_status, write_setting};
use tempfile::tempdir;
use warden::{
    error::SupervisorError,
    service::{ServiceStatus, StartupType},
    supervisor::{InitParams, Supervisor},
    test_utils::signal_lock,
};

#[test]
fn unknown_service_is_reported_on_every_operation() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(&path, 3, &[ServiceSpec::new("b", "manual", "/bin/true")]);

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    assert!(matches!(
        handle.service_info("nosuch"),
        Err(SupervisorError::ServiceNotFound(_))
    ));
    assert!(matches!(
        handle.start_service("nosuch"),
        Err(SupervisorError::ServiceNotFound(_))
    ));
    assert!(matches!(
        handle.stop_service("nosuch"),
        Err(SupervisorError::ServiceNotFound(_))
    ));
    assert!(matches!(
        handle.set_startup_type("nosuch", StartupType::Manual),
        Err(SupervisorError::ServiceNotFound(_))
    ));
}

#[test]
fn listing_preserves_declaration_order() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[
            ServiceSpec::new("zeta", "manual", "/bin/true"),
            ServiceSpec::new("alpha", "manual", "/bin/true"),
            ServiceSpec::new("mid", "manual", "/bin/true"),
        ],
    );

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let listing = supervisor.handle().list_services().unwrap();
    let names: Vec<_> = listing.iter().map(|info| info.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    assert!(
        listing
            .iter()
            .all(|info| info.status == ServiceStatus::Stopped)
    );
}

#[test]
fn start_and_stop_in_target_state_are_idempotent() {
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

    // Stopping a stopped service succeeds with no effect.
    handle.stop_service("b").unwrap();
    assert_eq!(
        handle.service_info("b").unwrap().status,
        ServiceStatus::Stopped
    );

    handle.start_service("b").unwrap();
    wait_for_status(&handle, "b", ServiceStatus::Running, Duration::from_secs(2));

    // Starting a running service succeeds with no effect.
    handle.start_service("b").unwrap();
    assert_eq!(
        handle.service_info("b").unwrap().status,
        ServiceStatus::Running
    );

    handle.stop_service("b").unwrap();
    handle.stop_service("b").unwrap();
    assert_eq!(
        handle.service_info("b").unwrap().status,
        ServiceStatus::Stopped
    );
}

#[test]
fn startup_type_change_persists_across_a_restart() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    write_setting(
        &path,
        3,
        &[ServiceSpec::new("b", "manual", "/bin/sleep").with_param("30")],
    );

    {
        let mut supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
        let handle = supervisor.handle();
        assert_eq!(
            handle.service_info("b").unwrap().startup_type,
            StartupType::Manual
        );

        handle
            .set_startup_type("b", StartupType::Automatic)
            .unwrap();
        // Unchanged-type calls are accepted without rewriting anything.
        handle
            .set_startup_type("b", StartupType::Automatic)
            .unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("<startupType>automatic</startupType>"));
        supervisor.shutdown().unwrap();
    }

    // A fresh daemon now launches the service at boot.
    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();
    wait_for_status(&handle, "b", ServiceStatus::Running, Duration::from_secs(2));
    assert_eq!(
        handle.service_info("b").unwrap().startup_type,
        StartupType::Automatic
    );
    handle.stop_service("b").unwrap();
}

#[test]
fn failed_persistence_rolls_the_record_back() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let nested = dir.path().join("cfg");
    fs::create_dir(&nested).unwrap();
    let path = nested.join("warden.setting.xml");
    write_setting(&path, 3, &[ServiceSpec::new("b", "manual", "/bin/true")]);

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    // With the directory gone the write-back cannot land.
    fs::remove_dir_all(&nested).unwrap();
    let err = handle
        .set_startup_type("b", StartupType::Automatic)
        .unwrap_err();
    assert!(matches!(err, SupervisorError::PersistFailed(_)));
    assert_eq!(
        handle.service_info("b").unwrap().startup_type,
        StartupType::Manual
    );
}

#[test]
fn malformed_service_entry_is_absent_from_the_listing() {
    let _lock = signal_lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("warden.setting.xml");
    // "broken" has no cmdPath; the rest of the file still loads.
    let body = "<?xml version=\"1.0\"?>\n\
<servMgmtSetting>\n\
\x20 <version>1.0</version>\n\
\x20 <globalSetting>\n\
\x20   <maxFailureRetryCount>3</maxFailureRetryCount>\n\
\x20 </globalSetting>\n\
\x20 <serviceSetting>\n\
\x20   <service>\n\
\x20     <name>broken</name>\n\
\x20     <startupType>manual</startupType>\n\
\x20   </service>\n\
\x20   <service>\n\
\x20     <name>healthy</name>\n\
\x20     <startupType>manual</startupType>\n\
\x20     <cmdPath>/bin/true</cmdPath>\n\
\x20   </service>\n\
\x20 </serviceSetting>\n\
</servMgmtSetting>\n";
    fs::write(&path, body).unwrap();

    let supervisor = Supervisor::init(InitParams::new(&path)).unwrap();
    let handle = supervisor.handle();

    let names: Vec<_> = handle
        .list_services()
        .unwrap()
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(names, vec!["healthy"]);
    assert!(matches!(
        handle.service_info("broken"),
        Err(SupervisorError::ServiceNotFound(_))
    ));
}
