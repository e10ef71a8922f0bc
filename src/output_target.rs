// SPDX-License-Identifier: GPL-3.0-only

//! Deferrable output targets
//!
//! An [`OutputTarget`] is a lazily-resolved handle to a hardware output
//! destination (a display surface, a buffer queue). It is owned by the use
//! case that declared it and shared with capture sessions by attachment:
//! a session notifies the target exactly once when it starts using it and
//! exactly once when it stops. Resolution runs through a provider callback
//! every time a session opens, so a target reused by a later session is
//! re-validated rather than trusted.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;
use uuid::Uuid;

use crate::errors::TargetError;
use crate::hardware::HardwareTarget;

/// Unique identity of an output target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputTargetId(Uuid);

impl OutputTargetId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OutputTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Diagnostic snapshot of a target's last resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResolution {
    /// Never resolved
    Deferred,
    /// Last resolution produced this hardware target
    Resolved(HardwareTarget),
    /// Last resolution failed
    Failed,
}

type TargetProvider = Box<dyn Fn() -> Result<HardwareTarget, TargetError> + Send + Sync>;

/// A lazily-resolved, reference-counted hardware output destination
pub struct OutputTarget {
    id: OutputTargetId,
    label: String,
    provider: TargetProvider,
    resolution: Mutex<TargetResolution>,
    attach_count: AtomicUsize,
}

impl OutputTarget {
    /// Create a target backed by a resolution provider.
    ///
    /// # Arguments
    /// * `label` - Descriptive name used in logging
    /// * `provider` - Produces the concrete hardware target; called once per
    ///   session that resolves this target
    pub fn new<F>(label: impl Into<String>, provider: F) -> Self
    where
        F: Fn() -> Result<HardwareTarget, TargetError> + Send + Sync + 'static,
    {
        Self {
            id: OutputTargetId::new(),
            label: label.into(),
            provider: Box::new(provider),
            resolution: Mutex::new(TargetResolution::Deferred),
            attach_count: AtomicUsize::new(0),
        }
    }

    /// Create a target that always resolves to a fixed hardware target
    pub fn immediate(label: impl Into<String>, target: HardwareTarget) -> Self {
        Self::new(label, move || Ok(target))
    }

    pub fn id(&self) -> OutputTargetId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Resolve the target to a concrete hardware target.
    ///
    /// Runs the provider unconditionally so that reuse across sessions
    /// re-validates the underlying resource.
    pub fn resolve(&self) -> Result<HardwareTarget, TargetError> {
        match (self.provider)() {
            Ok(target) => {
                *self.resolution.lock().unwrap() = TargetResolution::Resolved(target);
                Ok(target)
            }
            Err(e) => {
                *self.resolution.lock().unwrap() = TargetResolution::Failed;
                Err(e)
            }
        }
    }

    /// The last observed resolution state
    pub fn resolution(&self) -> TargetResolution {
        *self.resolution.lock().unwrap()
    }

    /// Notify the target that a session started using it
    pub fn notify_attached(&self) {
        self.attach_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Notify the target that a session stopped using it.
    ///
    /// Attach/detach must be paired exactly; an unmatched detach is an
    /// invariant breach and faults.
    pub fn notify_detached(&self) {
        let previous = self.attach_count.fetch_sub(1, Ordering::SeqCst);
        if previous == 0 {
            self.attach_count.fetch_add(1, Ordering::SeqCst);
            panic!(
                "notify_detached() without matching notify_attached() on target {}",
                self.id
            );
        }
    }

    /// Number of sessions currently attached
    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputTarget")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("resolution", &self.resolution())
            .field("attach_count", &self.attach_count())
            .finish()
    }
}

impl Drop for OutputTarget {
    fn drop(&mut self) {
        let count = self.attach_count.load(Ordering::SeqCst);
        if count != 0 {
            warn!(
                target_id = %self.id,
                label = %self.label,
                attach_count = count,
                "Output target dropped while still attached"
            );
        }
    }
}
