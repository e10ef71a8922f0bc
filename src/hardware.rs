// SPDX-License-Identifier: GPL-3.0-only

//! Hardware capture backend abstraction
//!
//! The camera core never talks to platform capture APIs directly; it drives
//! a [`CaptureBackend`] implementation through three object-safe traits
//! (backend, open device, configured session) and receives results as
//! events. The platform delivers its callbacks on whatever execution context
//! it likes; the [`DeviceEventSender`] / [`SessionEventSender`] posters
//! re-route every callback onto the owning camera's serialized context, so
//! backend implementations never need to think about ordering.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

use crate::camera::CameraMessage;
use crate::config::{CaptureTemplate, ImplementationOptions};
use crate::errors::{BackendResult, DeviceErrorCode};

/// Identity of a resolved hardware output destination.
///
/// Two deferrable output targets may resolve to the same hardware target;
/// session creation deduplicates on this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareTarget(pub u64);

impl fmt::Display for HardwareTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hw:{}", self.0)
    }
}

/// Identity of a capture session instance within one camera.
///
/// Superseded sessions keep their id while their teardown completes, so
/// late hardware callbacks still find their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A fully-built request as submitted to hardware
#[derive(Debug, Clone)]
pub struct HardwareRequest {
    pub template: CaptureTemplate,
    pub targets: Vec<HardwareTarget>,
    pub options: ImplementationOptions,
}

/// Asynchronous results of device-level operations
pub enum DeviceEvent {
    /// The device finished opening; the handle is now live
    Opened(Box<dyn DeviceHandle>),
    /// The device handle finished closing
    Closed,
    /// The device was taken away (unplugged, stolen by another client)
    Disconnected,
    /// The device reported an error
    Error(DeviceErrorCode),
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Opened(_) => write!(f, "Opened"),
            DeviceEvent::Closed => write!(f, "Closed"),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::Error(code) => write!(f, "Error({code})"),
        }
    }
}

/// Asynchronous results of session-level operations
pub enum SessionEvent {
    /// The hardware session was configured and can accept requests
    Configured(Box<dyn SessionHandle>),
    /// The hardware session could not be configured; the handle is returned
    /// so it can still be closed
    ConfigureFailed(Box<dyn SessionHandle>),
    /// The hardware session finished closing
    Closed,
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Configured(_) => write!(f, "Configured"),
            SessionEvent::ConfigureFailed(_) => write!(f, "ConfigureFailed"),
            SessionEvent::Closed => write!(f, "Closed"),
        }
    }
}

/// Posts device events onto the owning camera's serialized context
#[derive(Clone)]
pub struct DeviceEventSender {
    tx: mpsc::UnboundedSender<CameraMessage>,
}

impl DeviceEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CameraMessage>) -> Self {
        Self { tx }
    }

    pub fn opened(&self, handle: Box<dyn DeviceHandle>) {
        self.post(DeviceEvent::Opened(handle));
    }

    pub fn closed(&self) {
        self.post(DeviceEvent::Closed);
    }

    pub fn disconnected(&self) {
        self.post(DeviceEvent::Disconnected);
    }

    pub fn error(&self, code: DeviceErrorCode) {
        self.post(DeviceEvent::Error(code));
    }

    fn post(&self, event: DeviceEvent) {
        trace!(event = ?event, "Posting device event");
        // A closed channel means the camera actor is gone; late callbacks
        // after full release are dropped on the floor.
        let _ = self.tx.send(CameraMessage::DeviceEvent(event));
    }
}

/// Posts session events, tagged with the session they belong to, onto the
/// owning camera's serialized context
#[derive(Clone)]
pub struct SessionEventSender {
    session: SessionId,
    tx: mpsc::UnboundedSender<CameraMessage>,
}

impl SessionEventSender {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<CameraMessage>) -> Self {
        Self { session, tx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn configured(&self, handle: Box<dyn SessionHandle>) {
        self.post(SessionEvent::Configured(handle));
    }

    pub fn configure_failed(&self, handle: Box<dyn SessionHandle>) {
        self.post(SessionEvent::ConfigureFailed(handle));
    }

    pub fn closed(&self) {
        self.post(SessionEvent::Closed);
    }

    fn post(&self, event: SessionEvent) {
        trace!(session = %self.session, event = ?event, "Posting session event");
        let _ = self.tx.send(CameraMessage::SessionEvent(self.session, event));
    }
}

/// Entry point into a platform capture backend
pub trait CaptureBackend: Send {
    /// Request an asynchronous device open.
    ///
    /// A successful return only means the request was submitted; the open
    /// itself resolves through [`DeviceEvent::Opened`] (or an error event)
    /// on `events`.
    fn open_device(&mut self, camera_id: &str, events: DeviceEventSender) -> BackendResult<()>;
}

/// An open hardware capture device
pub trait DeviceHandle: Send {
    /// Request creation of a hardware capture session over `targets`.
    ///
    /// `initial` carries the session parameters derived from the repeating
    /// config plus any preset options. Resolution arrives as a
    /// [`SessionEvent`] on `events`.
    fn create_session(
        &mut self,
        targets: Vec<HardwareTarget>,
        initial: HardwareRequest,
        events: SessionEventSender,
    ) -> BackendResult<()>;

    /// Request an asynchronous close; completion arrives as
    /// [`DeviceEvent::Closed`]
    fn close(&mut self);
}

/// A configured hardware capture session
pub trait SessionHandle: Send {
    /// Replace the continuous repeating request
    fn set_repeating(&mut self, request: HardwareRequest) -> BackendResult<()>;

    /// Submit a batch of one-shot requests
    fn capture_burst(&mut self, requests: Vec<HardwareRequest>) -> BackendResult<()>;

    /// Abort all in-flight captures
    fn abort_captures(&mut self);

    /// Request an asynchronous close; completion arrives as
    /// [`SessionEvent::Closed`]
    fn close(&mut self);
}
