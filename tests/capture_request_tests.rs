// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for capture request submission and session merging

mod common;

use std::sync::Arc;

use camera_pipeline::{
    AvailabilityRegistry, Camera, CameraState, CaptureConfig, CaptureTemplate, HardwareTarget,
    OptionValue, OutputTarget, SessionConfig, SessionEventHook, UseCase,
};
use common::{FakeCall, fake_backend};

fn target(name: &str, hw: u64) -> Arc<OutputTarget> {
    Arc::new(OutputTarget::immediate(name.to_string(), HardwareTarget(hw)))
}

#[tokio::test]
async fn test_requests_buffer_until_session_configured() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let preview = target("preview", 1);
    let still = target("still", 2);
    let use_case = UseCase::new(
        "photo",
        SessionConfig::builder()
            .add_target(Arc::clone(&preview))
            .add_non_repeating_target(Arc::clone(&still))
            .build(),
    );
    camera.attach_use_cases(vec![use_case]);

    // Submitted before the device even opened.
    camera.submit_capture_requests(vec![
        CaptureConfig::builder()
            .set_template(CaptureTemplate::StillCapture)
            .add_target(Arc::clone(&still))
            .build(),
    ]);
    camera.idle().await;
    assert_eq!(ctl.call_count(&FakeCall::CaptureBurst(1)), 0);

    ctl.deliver_device_opened();
    camera.idle().await;
    assert_eq!(ctl.call_count(&FakeCall::CaptureBurst(1)), 0);

    ctl.configure_next_session();
    camera.idle().await;
    assert_eq!(
        ctl.call_count(&FakeCall::CaptureBurst(1)),
        1,
        "Buffered request should flush once the session is configured"
    );
}

#[tokio::test]
async fn test_request_without_targets_borrows_repeating_targets() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let preview = target("preview", 1);
    let use_case = UseCase::new(
        "preview",
        SessionConfig::builder().add_target(preview).build(),
    );
    let id = use_case.id();
    camera.attach_use_cases(vec![use_case]);
    camera.set_use_case_active(id);
    camera.idle().await;
    ctl.deliver_device_opened();
    camera.idle().await;
    ctl.configure_next_session();
    camera.idle().await;

    camera.submit_capture_requests(vec![
        CaptureConfig::builder()
            .set_use_repeating_targets(true)
            .build(),
    ]);
    camera.idle().await;
    assert_eq!(
        ctl.call_count(&FakeCall::CaptureBurst(1)),
        1,
        "The request should be issued against the repeating targets"
    );
}

#[tokio::test]
async fn test_request_without_any_usable_targets_is_dropped() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let preview = target("preview", 1);
    let use_case = UseCase::new(
        "preview",
        SessionConfig::builder().add_target(preview).build(),
    );
    camera.attach_use_cases(vec![use_case]);
    camera.idle().await;
    ctl.deliver_device_opened();
    camera.idle().await;
    ctl.configure_next_session();
    camera.idle().await;

    // No targets of its own and no repeating config to borrow from, since
    // the use case was never activated.
    camera.submit_capture_requests(vec![
        CaptureConfig::builder()
            .set_use_repeating_targets(true)
            .build(),
    ]);
    camera.idle().await;
    assert_eq!(ctl.call_count(&FakeCall::CaptureBurst(1)), 0);
}

#[tokio::test]
async fn test_conflicting_use_cases_never_reach_hardware() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let a = UseCase::new(
        "a",
        SessionConfig::builder()
            .add_target(target("a", 1))
            .insert_option("fps", OptionValue::Int(30))
            .build(),
    );
    let b = UseCase::new(
        "b",
        SessionConfig::builder()
            .add_target(target("b", 2))
            .insert_option("fps", OptionValue::Int(60))
            .build(),
    );
    camera.attach_use_cases(vec![a, b]);
    camera.idle().await;
    ctl.deliver_device_opened();
    camera.idle().await;

    assert_eq!(camera.state(), CameraState::Open);
    assert_eq!(
        ctl.pending_session_count(),
        0,
        "An invalid merge must not create a hardware session"
    );
}

#[tokio::test]
async fn test_reset_use_case_rebuilds_session() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let preview = target("preview", 1);
    let mut use_case = UseCase::new(
        "preview",
        SessionConfig::builder().add_target(preview).build(),
    );
    camera.attach_use_cases(vec![use_case.clone()]);
    camera.idle().await;
    ctl.deliver_device_opened();
    camera.idle().await;
    ctl.configure_next_session();
    camera.idle().await;
    assert_eq!(ctl.call_count(&FakeCall::CreateSession(1)), 1);

    // The use case now needs an extra output, which requires a new session.
    use_case.set_session_config(
        SessionConfig::builder()
            .add_target(target("preview", 1))
            .add_non_repeating_target(target("still", 2))
            .build(),
    );
    camera.reset_use_case(use_case);
    camera.idle().await;
    assert_eq!(ctl.call_count(&FakeCall::CloseSession), 1);
    assert_eq!(
        ctl.call_count(&FakeCall::CreateSession(2)),
        1,
        "The replacement session should span both outputs"
    );
}

#[tokio::test]
async fn test_updated_config_reissues_repeating_request() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let preview = target("preview", 1);
    let mut use_case = UseCase::new(
        "preview",
        SessionConfig::builder()
            .add_target(Arc::clone(&preview))
            .build(),
    );
    let id = use_case.id();
    camera.attach_use_cases(vec![use_case.clone()]);
    camera.set_use_case_active(id);
    camera.idle().await;
    ctl.deliver_device_opened();
    camera.idle().await;
    ctl.configure_next_session();
    camera.idle().await;
    assert_eq!(
        ctl.call_count(&FakeCall::SetRepeating(vec![HardwareTarget(1)])),
        1
    );

    // Same outputs, new options: the repeating request is rebuilt in place.
    use_case.set_session_config(
        SessionConfig::builder()
            .add_target(preview)
            .insert_repeating_option("fps", OptionValue::Int(60))
            .build(),
    );
    camera.update_use_case(use_case);
    camera.idle().await;
    assert_eq!(
        ctl.call_count(&FakeCall::SetRepeating(vec![HardwareTarget(1)])),
        2,
        "A config update on identical outputs reissues the repeating request"
    );
    assert_eq!(
        ctl.call_count(&FakeCall::CloseSession),
        0,
        "No session rebuild for an options-only change"
    );
}

struct FlushOnDisable;

impl SessionEventHook for FlushOnDisable {
    fn on_disable_session(&self) -> Vec<CaptureConfig> {
        vec![CaptureConfig::builder().build()]
    }
}

#[tokio::test]
async fn test_close_issues_disable_hook_one_shot() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let use_case = UseCase::new(
        "preview",
        SessionConfig::builder()
            .add_target(target("preview", 1))
            .add_event_hook(Arc::new(FlushOnDisable))
            .build(),
    );
    let id = use_case.id();
    camera.attach_use_cases(vec![use_case]);
    camera.set_use_case_active(id);
    camera.idle().await;
    ctl.deliver_device_opened();
    camera.idle().await;
    ctl.configure_next_session();
    camera.idle().await;

    camera.close();
    camera.idle().await;
    assert_eq!(
        ctl.call_count(&FakeCall::CaptureBurst(1)),
        1,
        "Closing should flush the disable hook one-shot before teardown"
    );
    assert_eq!(ctl.call_count(&FakeCall::CloseSession), 1);
}

#[tokio::test]
async fn test_reset_of_unattached_use_case_is_ignored() {
    let registry = AvailabilityRegistry::new(1);
    let (backend, ctl) = fake_backend();
    let camera = Camera::new("cam0", backend, registry);

    let use_case = UseCase::new(
        "preview",
        SessionConfig::builder().add_target(target("preview", 1)).build(),
    );
    let id = use_case.id();
    camera.reset_use_case(use_case);
    camera.idle().await;
    assert!(!camera.is_use_case_online(id));
    assert!(
        ctl.calls().is_empty(),
        "A use case that was never attached must not touch the device"
    );
}
