// SPDX-License-Identifier: GPL-3.0-only

//! Shared fake capture backend for integration tests
//!
//! The fake records every call the camera core makes and hands hardware
//! completion back only when the test asks for it, so tests can observe the
//! intermediate lifecycle states.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

use camera_pipeline::{
    BackendError, BackendResult, CaptureBackend, DeviceErrorCode, DeviceEventSender, DeviceHandle,
    HardwareRequest, HardwareTarget, SessionEventSender, SessionHandle,
};

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    OpenDevice(String),
    CreateSession(usize),
    SetRepeating(Vec<HardwareTarget>),
    CaptureBurst(usize),
    AbortCaptures,
    CloseSession,
    CloseDevice,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<FakeCall>,
    fail_next_open: bool,
    device_events: Option<DeviceEventSender>,
    device_close_requested: bool,
    /// Sessions whose creation was requested but not yet resolved
    pending_sessions: VecDeque<SessionEventSender>,
    /// Sessions whose close was requested but not yet acknowledged
    pending_session_closes: VecDeque<SessionEventSender>,
}

/// Backend half handed to the camera
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

/// Test half controlling when hardware responses arrive
pub struct BackendControl {
    state: Arc<Mutex<FakeState>>,
}

static TRACING: Once = Once::new();

/// Route core logs through the test harness, filtered by `RUST_LOG`
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn fake_backend() -> (Box<dyn CaptureBackend>, BackendControl) {
    init_tracing();
    let state = Arc::new(Mutex::new(FakeState::default()));
    (
        Box::new(FakeBackend {
            state: Arc::clone(&state),
        }),
        BackendControl { state },
    )
}

impl CaptureBackend for FakeBackend {
    fn open_device(&mut self, camera_id: &str, events: DeviceEventSender) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(FakeCall::OpenDevice(camera_id.to_string()));
        if state.fail_next_open {
            state.fail_next_open = false;
            return Err(BackendError::OpenFailed("injected failure".into()));
        }
        state.device_events = Some(events);
        Ok(())
    }
}

struct FakeDevice {
    state: Arc<Mutex<FakeState>>,
}

impl DeviceHandle for FakeDevice {
    fn create_session(
        &mut self,
        targets: Vec<HardwareTarget>,
        _initial: HardwareRequest,
        events: SessionEventSender,
    ) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(FakeCall::CreateSession(targets.len()));
        state.pending_sessions.push_back(events);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(FakeCall::CloseDevice);
        state.device_close_requested = true;
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
    events: SessionEventSender,
}

impl SessionHandle for FakeSession {
    fn set_repeating(&mut self, request: HardwareRequest) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(FakeCall::SetRepeating(request.targets));
        Ok(())
    }

    fn capture_burst(&mut self, requests: Vec<HardwareRequest>) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(FakeCall::CaptureBurst(requests.len()));
        Ok(())
    }

    fn abort_captures(&mut self) {
        self.state.lock().unwrap().calls.push(FakeCall::AbortCaptures);
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(FakeCall::CloseSession);
        state.pending_session_closes.push_back(self.events.clone());
    }
}

impl BackendControl {
    /// Everything the camera asked of the backend so far, in order
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, call: &FakeCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Make the next `open_device` fail synchronously
    pub fn fail_next_open(&self) {
        self.state.lock().unwrap().fail_next_open = true;
    }

    /// Resolve the outstanding device open with a live handle
    pub fn deliver_device_opened(&self) {
        let (events, handle) = {
            let mut state = self.state.lock().unwrap();
            state.device_close_requested = false;
            let events = state
                .device_events
                .clone()
                .expect("no device open in flight");
            (
                events,
                Box::new(FakeDevice {
                    state: Arc::clone(&self.state),
                }),
            )
        };
        events.opened(handle);
    }

    pub fn deliver_device_error(&self, code: DeviceErrorCode) {
        self.device_events().error(code);
    }

    pub fn deliver_device_disconnected(&self) {
        self.device_events().disconnected();
    }

    /// Acknowledge a requested device close
    pub fn ack_device_close(&self) {
        {
            let state = self.state.lock().unwrap();
            assert!(state.device_close_requested, "no device close requested");
        }
        self.device_events().closed();
    }

    pub fn device_close_requested(&self) -> bool {
        self.state.lock().unwrap().device_close_requested
    }

    /// Resolve the oldest outstanding session creation as configured
    pub fn configure_next_session(&self) {
        let events = self.next_pending_session();
        let handle = Box::new(FakeSession {
            state: Arc::clone(&self.state),
            events: events.clone(),
        });
        events.configured(handle);
    }

    /// Resolve the oldest outstanding session creation as failed
    pub fn fail_next_session(&self) {
        let events = self.next_pending_session();
        let handle = Box::new(FakeSession {
            state: Arc::clone(&self.state),
            events: events.clone(),
        });
        events.configure_failed(handle);
    }

    /// Acknowledge the oldest requested session close
    pub fn ack_session_close(&self) {
        let events = self
            .state
            .lock()
            .unwrap()
            .pending_session_closes
            .pop_front()
            .expect("no session close requested");
        events.closed();
    }

    pub fn pending_session_count(&self) -> usize {
        self.state.lock().unwrap().pending_sessions.len()
    }

    fn device_events(&self) -> DeviceEventSender {
        self.state
            .lock()
            .unwrap()
            .device_events
            .clone()
            .expect("no device open in flight")
    }

    fn next_pending_session(&self) -> SessionEventSender {
        self.state
            .lock()
            .unwrap()
            .pending_sessions
            .pop_front()
            .expect("no session creation in flight")
    }
}
