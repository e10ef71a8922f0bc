// SPDX-License-Identifier: GPL-3.0-only

//! Use case attachment ledger
//!
//! Tracks, per logical consumer, whether it is online (its outputs are part
//! of the configured session) and active (it currently wants repeating
//! captures), together with its session config fragment. The ledger exposes
//! two merge views: "online" decides what a session is opened over, and
//! "active and online" decides what the repeating request contains. Merges
//! are recomputed on every query, never cached across mutations.

use std::fmt;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, SessionMergeBuilder};

/// Unique identity of a use case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseCaseId(Uuid);

impl UseCaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UseCaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UseCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical consumer of the camera: identity plus its current session
/// config fragment
#[derive(Clone)]
pub struct UseCase {
    id: UseCaseId,
    name: String,
    session_config: SessionConfig,
}

impl UseCase {
    pub fn new(name: impl Into<String>, session_config: SessionConfig) -> Self {
        Self {
            id: UseCaseId::new(),
            name: name.into(),
            session_config,
        }
    }

    pub fn id(&self) -> UseCaseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Replace the fragment, keeping the identity. Used by consumers that
    /// reconfigure between attach and detach.
    pub fn set_session_config(&mut self, session_config: SessionConfig) {
        self.session_config = session_config;
    }
}

struct AttachEntry {
    id: UseCaseId,
    name: String,
    session_config: SessionConfig,
    active: bool,
}

/// Per-camera bookkeeping of attached use cases.
///
/// Entries exist only while the use case is online; insertion order is
/// preserved so merge results are deterministic ("first fragment" rules).
pub struct UseCaseAttachState {
    camera_id: String,
    entries: Vec<AttachEntry>,
}

impl UseCaseAttachState {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            entries: Vec::new(),
        }
    }

    fn entry_mut(&mut self, id: UseCaseId) -> Option<&mut AttachEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Mark a use case online, storing (or refreshing) its fragment
    pub fn set_online(&mut self, use_case: &UseCase) {
        if let Some(entry) = self.entry_mut(use_case.id()) {
            entry.session_config = use_case.session_config().clone();
            return;
        }
        debug!(
            camera = %self.camera_id,
            use_case = %use_case.name(),
            "Use case online"
        );
        self.entries.push(AttachEntry {
            id: use_case.id(),
            name: use_case.name().to_string(),
            session_config: use_case.session_config().clone(),
            active: false,
        });
    }

    /// Remove a use case from the ledger entirely
    pub fn set_offline(&mut self, id: UseCaseId) {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() != before {
            debug!(camera = %self.camera_id, use_case = %id, "Use case offline");
        }
    }

    /// Mark an online use case as requesting repeating captures
    pub fn set_active(&mut self, id: UseCaseId) {
        match self.entry_mut(id) {
            Some(entry) => entry.active = true,
            None => warn!(use_case = %id, "set_active on a use case that is not online"),
        }
    }

    pub fn set_inactive(&mut self, id: UseCaseId) {
        match self.entry_mut(id) {
            Some(entry) => entry.active = false,
            None => warn!(use_case = %id, "set_inactive on a use case that is not online"),
        }
    }

    /// Replace the stored fragment of an online use case
    pub fn update(&mut self, use_case: &UseCase) {
        match self.entry_mut(use_case.id()) {
            Some(entry) => entry.session_config = use_case.session_config().clone(),
            None => warn!(
                use_case = %use_case.name(),
                "update on a use case that is not online"
            ),
        }
    }

    pub fn is_online(&self, id: UseCaseId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn is_active(&self, id: UseCaseId) -> bool {
        self.entries.iter().any(|e| e.id == id && e.active)
    }

    pub fn online_count(&self) -> usize {
        self.entries.len()
    }

    pub fn online_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Drop every entry. Used when the device is forcibly released so that
    /// consumer queries reflect the dead device.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Merge view over every online use case (what a session opens over)
    pub fn online_merge(&self) -> SessionMergeBuilder {
        let mut builder = SessionMergeBuilder::new();
        for entry in &self.entries {
            builder.add(&entry.session_config);
        }
        builder
    }

    /// Merge view over the online use cases that are also active (what the
    /// repeating request is built from)
    pub fn active_and_online_merge(&self) -> SessionMergeBuilder {
        let mut builder = SessionMergeBuilder::new();
        for entry in self.entries.iter().filter(|e| e.active) {
            builder.add(&entry.session_config);
        }
        builder
    }
}
