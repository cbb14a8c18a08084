#[path = "common/mod.rs"]
mod common;

use std::time::Duration;

use common::{stub_inactive_service_manager, stub_service_manager, stub_stateful_service_manager};
use tempfile::tempdir;
use topeupdate::service::{ServiceController, ServiceStatus};

#[test]
fn stop_then_start_round_trip_against_active_stub() {
    let dir = tempdir().expect("tempdir");
    let manager = stub_stateful_service_manager(dir.path());
    let controller = ServiceController::new(manager.to_str().unwrap());

    assert_eq!(controller.status("device-api"), ServiceStatus::Active);
    controller
        .stop("device-api", Duration::from_secs(2))
        .expect("stop should succeed once the stub reports inactive");
    assert_eq!(controller.status("device-api"), ServiceStatus::Inactive);

    controller
        .start("device-api", Duration::from_secs(2))
        .expect("start should succeed once the stub reports active again");
    assert_eq!(controller.status("device-api"), ServiceStatus::Active);
}

#[test]
fn stop_times_out_against_a_stub_that_never_reports_inactive() {
    let dir = tempdir().expect("tempdir");
    let manager = stub_service_manager(dir.path());
    let controller = ServiceController::new(manager.to_str().unwrap());

    let err = controller
        .stop("device-api", Duration::from_millis(300))
        .unwrap_err();
    assert!(matches!(
        err,
        topeupdate::error::ServiceError::StopTimeout(name) if name == "device-api"
    ));
}

#[test]
fn start_times_out_against_a_stub_that_stays_inactive() {
    let dir = tempdir().expect("tempdir");
    let manager = stub_inactive_service_manager(dir.path());
    let controller = ServiceController::new(manager.to_str().unwrap());

    let err = controller
        .start("device-api", Duration::from_millis(300))
        .unwrap_err();
    assert!(matches!(
        err,
        topeupdate::error::ServiceError::StartTimeout(name) if name == "device-api"
    ));
}
