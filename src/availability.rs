// SPDX-License-Identifier: GPL-3.0-only

//! Device availability tracking
//!
//! The platform only allows a bounded number of capture devices open at
//! once. Every camera shares one [`AvailabilityRegistry`]; a camera that
//! cannot get a slot parks in its pending-open state and observes the
//! available count, retrying whenever a slot frees up.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::debug;

struct RegistryInner {
    max_open: usize,
    open: Mutex<usize>,
    available_tx: watch::Sender<usize>,
}

/// Shared registry of open-device slots
#[derive(Clone)]
pub struct AvailabilityRegistry {
    inner: Arc<RegistryInner>,
}

impl AvailabilityRegistry {
    /// Create a registry allowing at most `max_open` concurrently open devices
    pub fn new(max_open: usize) -> Self {
        let (available_tx, _) = watch::channel(max_open);
        Self {
            inner: Arc::new(RegistryInner {
                max_open,
                open: Mutex::new(0),
                available_tx,
            }),
        }
    }

    /// Number of devices that may still be opened
    pub fn available(&self) -> usize {
        *self.inner.available_tx.borrow()
    }

    /// Observe the available-slot count
    pub fn observe(&self) -> watch::Receiver<usize> {
        self.inner.available_tx.subscribe()
    }

    /// Record that a device finished opening
    pub fn device_opened(&self) {
        let mut open = self.inner.open.lock().unwrap();
        *open += 1;
        let available = self.inner.max_open.saturating_sub(*open);
        debug!(open = *open, available, "Device opened");
        // send_replace stores the value even with no receiver alive.
        self.inner.available_tx.send_replace(available);
    }

    /// Record that a device finished closing
    pub fn device_closed(&self) {
        let mut open = self.inner.open.lock().unwrap();
        *open = open.saturating_sub(1);
        let available = self.inner.max_open.saturating_sub(*open);
        debug!(open = *open, available, "Device closed");
        self.inner.available_tx.send_replace(available);
    }
}
