// SPDX-License-Identifier: GPL-3.0-only

//! Camera device lifecycle controller
//!
//! A [`Camera`] is a cheap handle to an actor task owning all mutable camera
//! state. Every command and every hardware callback is funneled through one
//! FIFO channel and processed by that task, so state transitions observe a
//! single serialized order and the state machines never need locks.
//!
//! The device walks `Initialized → PendingOpen → Opening → Opened` on the
//! way up and `Closing → Initialized` (or `Releasing → Released`) on the way
//! down, with `Reopening` covering both error recovery and an open request
//! that raced an in-progress close. The physical device handle is only
//! closed once every superseded capture session has finished releasing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::attach_state::{UseCase, UseCaseAttachState, UseCaseId};
use crate::availability::AvailabilityRegistry;
use crate::capture_session::CaptureSession;
use crate::config::CaptureConfig;
use crate::errors::DeviceErrorCode;
use crate::hardware::{
    CaptureBackend, DeviceEvent, DeviceEventSender, DeviceHandle, SessionEvent, SessionEventSender,
    SessionId,
};
use crate::output_target::OutputTarget;
use crate::signal::{Completion, CompletionSignal};

/// Observable lifecycle state of a camera.
///
/// A deliberately coarser view than the internal machine: consumers see one
/// `Opening` whether it is a first open or an error-recovery reopen, and a
/// fully closed camera simply reads `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraState {
    /// No device open; the camera is reusable
    Closed,
    /// Waiting for a device slot to free up
    PendingOpen,
    /// A device open (or reopen) is in flight
    Opening,
    /// Device open; capture sessions can be created
    Open,
    /// Device close in flight; returns to `Closed`
    Closing,
    /// Tearing down for good
    Releasing,
    /// Terminal state; the handle can be dropped
    Released,
}

/// Internal lifecycle states, one-to-one with the transition rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InternalState {
    /// Constructed, or fully closed and reusable
    Initialized,
    /// Waiting for a device slot to free up
    PendingOpen,
    /// Device open requested, waiting for the hardware
    Opening,
    /// Device open; capture sessions can be created
    Opened,
    /// Closing; returns to `Initialized` once the device reports closed
    Closing,
    /// Closing with the intent to open again afterwards
    Reopening,
    /// Tearing down for good
    Releasing,
    /// Terminal state
    Released,
}

impl InternalState {
    fn public(self) -> CameraState {
        match self {
            InternalState::Initialized => CameraState::Closed,
            InternalState::PendingOpen => CameraState::PendingOpen,
            InternalState::Opening | InternalState::Reopening => CameraState::Opening,
            InternalState::Opened => CameraState::Open,
            InternalState::Closing => CameraState::Closing,
            InternalState::Releasing => CameraState::Releasing,
            InternalState::Released => CameraState::Released,
        }
    }
}

pub(crate) enum CameraMessage {
    Open,
    Close,
    Release(oneshot::Sender<Completion>),
    AttachUseCases(Vec<UseCase>),
    DetachUseCases(Vec<UseCaseId>),
    UseCaseActive(UseCaseId),
    UseCaseInactive(UseCaseId),
    UseCaseUpdated(UseCase),
    UseCaseReset(UseCase),
    SubmitCaptureRequests(Vec<CaptureConfig>),
    DeviceEvent(DeviceEvent),
    SessionEvent(SessionId, SessionEvent),
    Ping(oneshot::Sender<()>),
}

/// Handle to one camera's serialized control context.
///
/// All methods post a command and return immediately; effects become
/// visible through [`observe_state`](Self::observe_state), the use case
/// queries and backend activity.
pub struct Camera {
    id: String,
    tx: mpsc::UnboundedSender<CameraMessage>,
    state_rx: watch::Receiver<CameraState>,
    ledger: Arc<Mutex<UseCaseAttachState>>,
}

impl Camera {
    /// Create the camera and spawn its actor task on the current runtime
    pub fn new(
        id: impl Into<String>,
        backend: Box<dyn CaptureBackend>,
        availability: AvailabilityRegistry,
    ) -> Self {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(CameraState::Closed);
        let ledger = Arc::new(Mutex::new(UseCaseAttachState::new(id.clone())));

        let actor = CameraActor {
            id: id.clone(),
            state: InternalState::Initialized,
            backend,
            device: None,
            device_close_requested: false,
            device_error: None,
            session: CaptureSession::new(SessionId(0)),
            next_session_id: 1,
            releasing_sessions: HashMap::new(),
            ledger: Arc::clone(&ledger),
            state_tx,
            rx,
            self_tx: tx.downgrade(),
            availability: availability.clone(),
            availability_rx: availability.observe(),
            release_signal: CompletionSignal::new(),
        };
        tokio::spawn(actor.run());

        Self {
            id,
            tx,
            state_rx,
            ledger,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request the device to open; parks in `PendingOpen` when no slot is
    /// available and retries automatically
    pub fn open(&self) {
        self.send(CameraMessage::Open);
    }

    /// Close the device, keeping the camera reusable
    pub fn close(&self) {
        self.send(CameraMessage::Close);
    }

    /// Release the camera permanently.
    ///
    /// The returned completion resolves once the device has fully closed and
    /// the camera reached `Released`. Idempotent.
    pub async fn release(&self) -> Completion {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(CameraMessage::Release(reply_tx)).is_err() {
            return Completion::resolved();
        }
        reply_rx.await.unwrap_or_else(|_| Completion::resolved())
    }

    /// Current lifecycle state
    pub fn state(&self) -> CameraState {
        *self.state_rx.borrow()
    }

    /// Observe lifecycle state transitions
    pub fn observe_state(&self) -> watch::Receiver<CameraState> {
        self.state_rx.clone()
    }

    /// Attach use cases, opening the device if necessary
    pub fn attach_use_cases(&self, use_cases: Vec<UseCase>) {
        self.send(CameraMessage::AttachUseCases(use_cases));
    }

    /// Detach use cases; the device closes once none remain online
    pub fn detach_use_cases(&self, ids: Vec<UseCaseId>) {
        self.send(CameraMessage::DetachUseCases(ids));
    }

    /// Mark an online use case as wanting repeating captures
    pub fn set_use_case_active(&self, id: UseCaseId) {
        self.send(CameraMessage::UseCaseActive(id));
    }

    pub fn set_use_case_inactive(&self, id: UseCaseId) {
        self.send(CameraMessage::UseCaseInactive(id));
    }

    /// Push a use case's updated session config into the repeating request
    pub fn update_use_case(&self, use_case: UseCase) {
        self.send(CameraMessage::UseCaseUpdated(use_case));
    }

    /// Rebuild the capture session after a use case changed its outputs
    pub fn reset_use_case(&self, use_case: UseCase) {
        self.send(CameraMessage::UseCaseReset(use_case));
    }

    /// Submit one-shot capture requests; buffered until a session is open
    pub fn submit_capture_requests(&self, configs: Vec<CaptureConfig>) {
        self.send(CameraMessage::SubmitCaptureRequests(configs));
    }

    pub fn is_use_case_online(&self, id: UseCaseId) -> bool {
        self.ledger.lock().unwrap().is_online(id)
    }

    pub fn is_use_case_active(&self, id: UseCaseId) -> bool {
        self.ledger.lock().unwrap().is_active(id)
    }

    pub fn online_use_case_names(&self) -> Vec<String> {
        self.ledger.lock().unwrap().online_names()
    }

    /// Wait until every command posted so far has been processed
    pub async fn idle(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(CameraMessage::Ping(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    fn send(&self, msg: CameraMessage) {
        if self.tx.send(msg).is_err() {
            warn!(camera = %self.id, "Camera context is gone, dropping command");
        }
    }
}

struct CameraActor {
    id: String,
    state: InternalState,
    backend: Box<dyn CaptureBackend>,
    device: Option<Box<dyn DeviceHandle>>,
    device_close_requested: bool,
    /// Last error the device reported; cleared on every open attempt
    device_error: Option<DeviceErrorCode>,
    session: CaptureSession,
    next_session_id: u64,
    /// Superseded sessions still tearing down. The device handle stays open
    /// until this is empty.
    releasing_sessions: HashMap<SessionId, CaptureSession>,
    ledger: Arc<Mutex<UseCaseAttachState>>,
    state_tx: watch::Sender<CameraState>,
    rx: mpsc::UnboundedReceiver<CameraMessage>,
    /// Weak so the channel closes, and the actor exits, once every handle
    /// and event sender is gone
    self_tx: mpsc::WeakUnboundedSender<CameraMessage>,
    availability: AvailabilityRegistry,
    availability_rx: watch::Receiver<usize>,
    release_signal: CompletionSignal,
}

impl CameraActor {
    async fn run(mut self) {
        debug!(camera = %self.id, "Camera context started");
        let mut watch_open = true;
        loop {
            tokio::select! {
                biased;
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg),
                        // Every handle and event sender is gone.
                        None => break,
                    }
                }
                changed = self.availability_rx.changed(), if watch_open => {
                    match changed {
                        Ok(()) => self.handle_availability_change(),
                        Err(_) => watch_open = false,
                    }
                }
            }
        }
        debug!(camera = %self.id, "Camera context stopped");
    }

    fn handle_message(&mut self, msg: CameraMessage) {
        match msg {
            CameraMessage::Open => self.open(),
            CameraMessage::Close => self.close(),
            CameraMessage::Release(reply) => {
                let completion = self.release();
                let _ = reply.send(completion);
            }
            CameraMessage::AttachUseCases(use_cases) => self.attach_use_cases(use_cases),
            CameraMessage::DetachUseCases(ids) => self.detach_use_cases(ids),
            CameraMessage::UseCaseActive(id) => {
                self.ledger.lock().unwrap().set_active(id);
                self.update_capture_session_config();
            }
            CameraMessage::UseCaseInactive(id) => {
                self.ledger.lock().unwrap().set_inactive(id);
                self.update_capture_session_config();
            }
            CameraMessage::UseCaseUpdated(use_case) => {
                self.ledger.lock().unwrap().update(&use_case);
                self.update_capture_session_config();
            }
            CameraMessage::UseCaseReset(use_case) => self.reset_use_case(use_case),
            CameraMessage::SubmitCaptureRequests(configs) => self.submit_capture_requests(configs),
            CameraMessage::DeviceEvent(event) => self.handle_device_event(event),
            CameraMessage::SessionEvent(id, event) => self.handle_session_event(id, event),
            CameraMessage::Ping(ack) => {
                let _ = ack.send(());
            }
        }
    }

    fn handle_availability_change(&mut self) {
        if self.state == InternalState::PendingOpen && self.availability.available() > 0 {
            info!(camera = %self.id, "Device slot freed up, retrying open");
            self.try_open_device();
        }
    }

    fn set_state(&mut self, state: InternalState) {
        if self.state == state {
            return;
        }
        debug!(camera = %self.id, from = ?self.state, to = ?state, "Camera state transition");
        self.state = state;
        let public = state.public();
        self.state_tx.send_if_modified(|current| {
            if *current == public {
                false
            } else {
                *current = public;
                true
            }
        });
    }

    // ---- user commands ----

    fn open(&mut self) {
        match self.state {
            InternalState::Initialized | InternalState::PendingOpen => self.try_open_device(),
            InternalState::Closing => {
                self.set_state(InternalState::Reopening);
                // The device is still physically open while superseded
                // sessions tear down; if it is healthy we can skip the
                // close/reopen round trip entirely.
                if !self.releasing_sessions.is_empty()
                    && self.device_error.is_none()
                    && self.device.is_some()
                {
                    self.set_state(InternalState::Opened);
                    self.open_capture_session();
                }
            }
            _ => debug!(camera = %self.id, state = ?self.state, "open() ignored"),
        }
    }

    fn close(&mut self) {
        match self.state {
            InternalState::Opened => {
                self.set_state(InternalState::Closing);
                self.close_camera(false);
            }
            InternalState::Opening | InternalState::Reopening => {
                // No usable device yet; the pending open resolves into the
                // close path.
                self.set_state(InternalState::Closing);
            }
            InternalState::PendingOpen => self.set_state(InternalState::Initialized),
            _ => debug!(camera = %self.id, state = ?self.state, "close() ignored"),
        }
    }

    fn release(&mut self) -> Completion {
        match self.state {
            InternalState::Released => Completion::resolved(),
            InternalState::Releasing => self.release_signal.subscribe(),
            InternalState::Initialized | InternalState::PendingOpen => {
                self.set_state(InternalState::Releasing);
                let completion = self.release_signal.subscribe();
                self.finish_close();
                completion
            }
            InternalState::Opened => {
                self.set_state(InternalState::Releasing);
                let completion = self.release_signal.subscribe();
                self.close_camera(true);
                completion
            }
            InternalState::Opening | InternalState::Reopening | InternalState::Closing => {
                self.set_state(InternalState::Releasing);
                self.release_signal.subscribe()
            }
        }
    }

    fn attach_use_cases(&mut self, use_cases: Vec<UseCase>) {
        if use_cases.is_empty() {
            return;
        }
        {
            let mut ledger = self.ledger.lock().unwrap();
            for use_case in &use_cases {
                ledger.set_online(use_case);
            }
        }
        info!(
            camera = %self.id,
            online = ?self.ledger.lock().unwrap().online_names(),
            "Use cases attached"
        );
        self.open();
        // The session outputs changed, so the current session is replaced.
        self.reset_capture_session(false);
        self.update_capture_session_config();
        if self.state == InternalState::Opened {
            self.open_capture_session();
        }
    }

    fn detach_use_cases(&mut self, ids: Vec<UseCaseId>) {
        if ids.is_empty() {
            return;
        }
        let remaining = {
            let mut ledger = self.ledger.lock().unwrap();
            for id in ids {
                ledger.set_offline(id);
            }
            ledger.online_count()
        };
        if remaining == 0 {
            info!(camera = %self.id, "Last use case detached, closing");
            // In-flight captures serve no consumer anymore; abort them
            // before the regular close path.
            self.reset_capture_session(true);
            self.close();
            return;
        }
        self.reset_capture_session(false);
        self.update_capture_session_config();
        if self.state == InternalState::Opened {
            self.open_capture_session();
        }
    }

    fn reset_use_case(&mut self, use_case: UseCase) {
        let online = {
            let mut ledger = self.ledger.lock().unwrap();
            let online = ledger.is_online(use_case.id());
            if online {
                ledger.update(&use_case);
            }
            online
        };
        if !online {
            warn!(camera = %self.id, use_case = %use_case.name(), "Reset of an offline use case ignored");
            return;
        }
        self.reset_capture_session(false);
        self.update_capture_session_config();
        if self.state == InternalState::Opened {
            self.open_capture_session();
        }
    }

    fn submit_capture_requests(&mut self, configs: Vec<CaptureConfig>) {
        if matches!(self.state, InternalState::Releasing | InternalState::Released) {
            warn!(camera = %self.id, "Camera released, dropping capture requests");
            return;
        }
        let mut prepared = Vec::new();
        for config in configs {
            if config.targets().is_empty() && config.use_repeating_targets() {
                match self.repeating_targets() {
                    Some(targets) if !targets.is_empty() => {
                        let mut builder = config.to_builder();
                        for target in targets {
                            builder = builder.add_target(target);
                        }
                        prepared.push(builder.build());
                    }
                    _ => {
                        warn!(
                            camera = %self.id,
                            "No repeating targets to attach, dropping capture request"
                        );
                    }
                }
            } else {
                prepared.push(config);
            }
        }
        if !prepared.is_empty() {
            self.session.issue_capture_requests(prepared);
        }
    }

    fn repeating_targets(&self) -> Option<Vec<Arc<OutputTarget>>> {
        self.session
            .session_config()
            .map(|config| config.repeating().targets().to_vec())
    }

    // ---- device plumbing ----

    fn try_open_device(&mut self) {
        self.device_error = None;
        self.device_close_requested = false;
        if self.availability.available() == 0 {
            info!(camera = %self.id, "No device slots available, waiting for one");
            self.set_state(InternalState::PendingOpen);
            return;
        }
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        self.set_state(InternalState::Opening);
        info!(camera = %self.id, "Opening camera device");
        let events = DeviceEventSender::new(tx);
        if let Err(e) = self.backend.open_device(&self.id, events) {
            error!(camera = %self.id, error = %e, "Unable to request device open");
            self.set_state(InternalState::Initialized);
        }
    }

    /// Tear down the current capture session (carrying its configuration and
    /// unissued requests into a fresh one) and close the device once every
    /// superseded session has finished releasing
    fn close_camera(&mut self, abort_in_flight: bool) {
        debug!(camera = %self.id, abort_in_flight, "Closing camera device");
        self.reset_capture_session(abort_in_flight);
        self.maybe_close_device();
    }

    /// Replace the current session with a fresh one.
    ///
    /// The old session's config and unissued one-shots carry over, so a
    /// consumer-visible reconfiguration never silently drops requests. The
    /// old session keeps living in the pending-release registry until the
    /// hardware confirms its teardown.
    fn reset_capture_session(&mut self, abort_in_flight: bool) {
        let next_id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        let mut old = std::mem::replace(&mut self.session, CaptureSession::new(next_id));

        if let Some(config) = old.session_config().cloned() {
            self.session.set_session_config(config);
        }
        let unissued = old.pending_captures();
        if !unissued.is_empty() {
            debug!(camera = %self.id, count = unissued.len(), "Carrying over unissued requests");
            self.session.issue_capture_requests(unissued);
        }

        debug!(
            camera = %self.id,
            session = %old.id(),
            state = ?old.state(),
            "Releasing capture session"
        );
        old.close();
        let _ = old.release(abort_in_flight);
        if !old.is_released() {
            self.releasing_sessions.insert(old.id(), old);
        }
    }

    /// Close the device handle once no superseded session remains and the
    /// lifecycle actually wants it closed
    fn maybe_close_device(&mut self) {
        if !self.releasing_sessions.is_empty() || !self.close_wanted() {
            return;
        }
        match self.device.as_mut() {
            Some(device) => {
                if !self.device_close_requested {
                    self.device_close_requested = true;
                    debug!(camera = %self.id, "All sessions released, closing device handle");
                    device.close();
                }
            }
            // Nothing physical to close; jump straight to the closed
            // transition.
            None => self.on_device_closed(),
        }
    }

    fn close_wanted(&self) -> bool {
        matches!(self.state, InternalState::Closing | InternalState::Releasing)
            || (self.state == InternalState::Reopening && self.device_error.is_some())
    }

    fn finish_close(&mut self) {
        self.device = None;
        match self.state {
            InternalState::Releasing => {
                self.set_state(InternalState::Released);
                // A dead camera must not report stale consumers.
                self.ledger.lock().unwrap().clear();
                self.release_signal.resolve();
                info!(camera = %self.id, "Camera released");
            }
            InternalState::Closing => {
                self.set_state(InternalState::Initialized);
                info!(camera = %self.id, "Camera closed");
            }
            _ => panic!("finish_close() not possible in state {:?}", self.state),
        }
    }

    // ---- hardware events ----

    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened(handle) => self.on_device_opened(handle),
            DeviceEvent::Closed => {
                if self.device.take().is_some() {
                    self.availability.device_closed();
                }
                self.on_device_closed();
            }
            DeviceEvent::Disconnected => self.on_device_disconnected(),
            DeviceEvent::Error(code) => self.on_device_error(code),
        }
    }

    fn on_device_opened(&mut self, handle: Box<dyn DeviceHandle>) {
        debug!(camera = %self.id, state = ?self.state, "Camera device opened");
        self.device = Some(handle);
        self.device_error = None;
        self.availability.device_opened();
        match self.state {
            InternalState::Opening | InternalState::Reopening => {
                self.set_state(InternalState::Opened);
                self.open_capture_session();
            }
            InternalState::Closing | InternalState::Releasing => {
                // Closed while the open was in flight; throw the device
                // straight back.
                self.maybe_close_device();
            }
            _ => panic!("Opened event not possible in state {:?}", self.state),
        }
    }

    fn on_device_closed(&mut self) {
        debug!(camera = %self.id, state = ?self.state, "Camera device closed");
        match self.state {
            InternalState::Closing | InternalState::Releasing => self.finish_close(),
            // Error recovery or open-during-close; the device is fully gone,
            // start over.
            InternalState::Reopening => self.try_open_device(),
            _ => panic!("Closed event not possible in state {:?}", self.state),
        }
    }

    fn on_device_disconnected(&mut self) {
        match self.state {
            InternalState::Opening
            | InternalState::Opened
            | InternalState::Closing
            | InternalState::Reopening
            | InternalState::Releasing => {
                // The device cannot come back; force a full release.
                error!(camera = %self.id, "Camera device disconnected, releasing");
                self.set_state(InternalState::Releasing);
                self.close_camera(false);
                if self.device.is_none() {
                    // Disconnect raced the open; no Closed event will follow.
                    self.finish_close();
                }
            }
            _ => panic!("Disconnected event not possible in state {:?}", self.state),
        }
    }

    fn on_device_error(&mut self, code: DeviceErrorCode) {
        self.device_error = Some(code);
        match self.state {
            InternalState::Closing | InternalState::Releasing => {
                error!(
                    camera = %self.id,
                    code = %code,
                    "Device error while closing, continuing teardown"
                );
                self.close_camera(false);
                if self.device.is_none() {
                    // The error preempted the open; no Closed event will
                    // follow.
                    self.finish_close();
                }
            }
            InternalState::Opening | InternalState::Opened | InternalState::Reopening => {
                if code.is_transient() {
                    info!(
                        camera = %self.id,
                        code = %code,
                        "Transient device error, closing and reopening"
                    );
                    self.set_state(InternalState::Reopening);
                } else {
                    error!(camera = %self.id, code = %code, "Fatal device error, closing");
                    self.set_state(InternalState::Closing);
                }
                self.close_camera(false);
                if self.device.is_none() {
                    // The error preempted the open; no Closed event will
                    // follow.
                    if self.state == InternalState::Reopening {
                        self.try_open_device();
                    } else {
                        self.finish_close();
                    }
                }
            }
            _ => panic!("Error event not possible in state {:?}", self.state),
        }
    }

    fn handle_session_event(&mut self, id: SessionId, event: SessionEvent) {
        if id == self.session.id() {
            self.session.handle_event(event);
            return;
        }
        if let Some(session) = self.releasing_sessions.get_mut(&id) {
            session.handle_event(event);
            if session.is_released() {
                debug!(camera = %self.id, session = %id, "Superseded session released");
                self.releasing_sessions.remove(&id);
                self.maybe_close_device();
            }
            return;
        }
        debug!(camera = %self.id, session = %id, "Dropping event for unknown session");
    }

    // ---- capture session management ----

    /// Push the merged config of the active online use cases into the
    /// current session's repeating request
    fn update_capture_session_config(&mut self) {
        let builder = self.ledger.lock().unwrap().active_and_online_merge();
        if builder.fragment_count() == 0 {
            return;
        }
        if !builder.is_valid() {
            error!(
                camera = %self.id,
                conflicts = ?builder.invalid_keys(),
                "Unable to update session config, use cases disagree on options"
            );
            return;
        }
        self.session.set_session_config(builder.build());
    }

    /// Open the current session over the union of all online outputs
    fn open_capture_session(&mut self) {
        if self.state != InternalState::Opened {
            panic!("open_capture_session() not possible in state {:?}", self.state);
        }
        let builder = self.ledger.lock().unwrap().online_merge();
        if builder.fragment_count() == 0 {
            debug!(camera = %self.id, "No online use cases, not opening a session");
            return;
        }
        if !builder.is_valid() {
            error!(
                camera = %self.id,
                conflicts = ?builder.invalid_keys(),
                "Unable to open capture session, use cases disagree on options"
            );
            return;
        }
        let config = builder.build();
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let Some(device) = self.device.as_mut() else {
            error!(camera = %self.id, "No device handle, cannot open capture session");
            return;
        };
        let events = SessionEventSender::new(self.session.id(), tx);
        self.session.open(&config, device.as_mut(), events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BackendResult;

    struct NullBackend;

    impl CaptureBackend for NullBackend {
        fn open_device(
            &mut self,
            _camera_id: &str,
            _events: DeviceEventSender,
        ) -> BackendResult<()> {
            Ok(())
        }
    }

    fn actor() -> CameraActor {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, _state_rx) = watch::channel(CameraState::Closed);
        let availability = AvailabilityRegistry::new(1);
        CameraActor {
            id: "cam0".into(),
            state: InternalState::Initialized,
            backend: Box::new(NullBackend),
            device: None,
            device_close_requested: false,
            device_error: None,
            session: CaptureSession::new(SessionId(0)),
            next_session_id: 1,
            releasing_sessions: HashMap::new(),
            ledger: Arc::new(Mutex::new(UseCaseAttachState::new("cam0"))),
            state_tx,
            rx,
            self_tx: tx.downgrade(),
            availability: availability.clone(),
            availability_rx: availability.observe(),
            release_signal: CompletionSignal::new(),
        }
    }

    #[test]
    #[should_panic(expected = "Disconnected event not possible")]
    fn test_disconnect_without_open_in_flight_faults() {
        let mut actor = actor();
        actor.on_device_disconnected();
    }
}
