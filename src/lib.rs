// SPDX-License-Identifier: GPL-3.0-only

//! Camera pipeline core - device and capture session lifecycle management
//!
//! This library coordinates camera hardware through an asynchronous,
//! event-driven core: each [`Camera`] runs its state machines on a single
//! serialized task, hardware callbacks are re-routed onto that task, and
//! consumers describe what they need as use cases whose session configs are
//! merged and validated before anything reaches the backend.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`camera`]: Device lifecycle controller and its serialized context,
//!   driving the internal capture session state machine
//! - [`attach_state`]: Ledger of online/active use cases per camera
//! - [`config`]: Session and capture request configuration, merging
//! - [`output_target`]: Deferrable output destinations with attach tracking
//! - [`hardware`]: Backend traits and the event plumbing behind them
//! - [`availability`]: Shared open-device slot accounting
//!
//! # Example
//!
//! ```ignore
//! let registry = AvailabilityRegistry::new(1);
//! let camera = Camera::new("cam0", backend, registry);
//! camera.attach_use_cases(vec![preview]);
//! camera.set_use_case_active(preview_id);
//! ```

pub mod attach_state;
pub mod availability;
pub mod camera;
pub(crate) mod capture_session;
pub mod config;
pub mod errors;
pub mod hardware;
pub mod output_target;
pub mod signal;

// Re-export commonly used types
pub use attach_state::{UseCase, UseCaseId};
pub use availability::AvailabilityRegistry;
pub use camera::{Camera, CameraState};
pub use config::{
    CaptureConfig, CaptureTemplate, ImplementationOptions, OptionValue, SessionConfig,
    SessionEventHook,
};
pub use errors::{BackendError, BackendResult, DeviceErrorCode, TargetError};
pub use hardware::{
    CaptureBackend, DeviceEventSender, DeviceHandle, HardwareRequest, HardwareTarget,
    SessionEventSender, SessionHandle, SessionId,
};
pub use output_target::{OutputTarget, OutputTargetId};
pub use signal::Completion;
