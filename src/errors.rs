// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera pipeline

use std::fmt;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error codes reported by the hardware capture backend for an open device.
///
/// Codes are classified as transient or fatal. Transient codes are recovered
/// automatically by a close-then-reopen cycle; everything else forces the
/// device closed with no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorCode {
    /// The device is held by another client
    InUse,
    /// The platform-wide limit of concurrently open devices was hit
    MaxDevicesInUse,
    /// The device has been disabled by policy
    Disabled,
    /// The device encountered a fatal fault
    DeviceFault,
    /// The platform capture service encountered a fatal fault
    ServiceFault,
}

impl DeviceErrorCode {
    /// Whether this code is recoverable by closing and reopening the device
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::InUse | Self::MaxDevicesInUse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InUse => "ERROR_DEVICE_IN_USE",
            Self::MaxDevicesInUse => "ERROR_MAX_DEVICES_IN_USE",
            Self::Disabled => "ERROR_DEVICE_DISABLED",
            Self::DeviceFault => "ERROR_DEVICE_FAULT",
            Self::ServiceFault => "ERROR_SERVICE_FAULT",
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned synchronously by the hardware capture backend
#[derive(Debug, Clone)]
pub enum BackendError {
    /// The device open request could not be submitted
    OpenFailed(String),
    /// The hardware session could not be created
    SessionCreationFailed(String),
    /// A capture request could not be submitted
    RequestFailed(String),
    /// The device handle is no longer usable
    Disconnected,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::OpenFailed(msg) => write!(f, "Device open failed: {}", msg),
            BackendError::SessionCreationFailed(msg) => {
                write!(f, "Session creation failed: {}", msg)
            }
            BackendError::RequestFailed(msg) => write!(f, "Capture request failed: {}", msg),
            BackendError::Disconnected => write!(f, "Device disconnected"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Errors raised while resolving a deferrable output target
#[derive(Debug, Clone)]
pub enum TargetError {
    /// The target's provider could not produce a hardware target
    ResolutionFailed(String),
    /// The target's underlying resources were already discarded
    AlreadyReleased,
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::ResolutionFailed(msg) => write!(f, "Target resolution failed: {}", msg),
            TargetError::AlreadyReleased => write!(f, "Target already released"),
        }
    }
}

impl std::error::Error for TargetError {}
