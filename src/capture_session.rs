// SPDX-License-Identifier: GPL-3.0-only

//! Capture session state machine
//!
//! A [`CaptureSession`] owns exactly one underlying hardware session. It can
//! be opened a single time; once closed it is permanently closed and the
//! camera creates a fresh instance. A superseded instance keeps running its
//! own state machine (driven by late hardware events) until it reaches
//! `Released`, at which point every output target it attached has been
//! detached exactly once and its release signal has resolved.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::{
    CaptureConfig, ImplementationOptions, SessionConfig, merge_hook_options, targets_subset,
};
use crate::hardware::{
    DeviceHandle, HardwareRequest, HardwareTarget, SessionEvent, SessionEventSender, SessionHandle,
    SessionId,
};
use crate::output_target::{OutputTarget, OutputTargetId};
use crate::signal::{Completion, CompletionSignal};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Constructed but the hardware session has not been requested
    Initialized,
    /// Hardware session creation is in flight
    Opening,
    /// Hardware session configured; requests can be issued
    Opened,
    /// Closed by the camera; the hardware handle stays valid until it
    /// reports closed
    Closed,
    /// Hardware teardown in flight
    Releasing,
    /// Terminal state; all resources detached
    Released,
}

pub(crate) struct CaptureSession {
    id: SessionId,
    state: SessionState,
    /// The configuration driving the repeating request, if any
    session_config: Option<SessionConfig>,
    /// One-shot requests buffered until the session is opened
    pending_captures: Vec<CaptureConfig>,
    /// Mapping from output target identity to the hardware target it
    /// resolved to when this session was opened
    resolved_targets: HashMap<OutputTargetId, HardwareTarget>,
    /// Targets notified of attachment; drained on detach so the pairing
    /// happens exactly once
    attached_targets: Vec<Arc<OutputTarget>>,
    handle: Option<Box<dyn SessionHandle>>,
    /// Cached hook options from the last repeating build, layered under
    /// per-request options for bursts
    on_repeating_options: Option<ImplementationOptions>,
    release_signal: CompletionSignal,
}

impl CaptureSession {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Initialized,
            session_config: None,
            pending_captures: Vec::new(),
            resolved_targets: HashMap::new(),
            attached_targets: Vec::new(),
            handle: None,
            on_repeating_options: None,
            release_signal: CompletionSignal::new(),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn is_released(&self) -> bool {
        self.state == SessionState::Released
    }

    pub(crate) fn session_config(&self) -> Option<&SessionConfig> {
        self.session_config.as_ref()
    }

    /// Unissued one-shot requests, for carrying over into a successor session
    pub(crate) fn pending_captures(&self) -> Vec<CaptureConfig> {
        self.pending_captures.clone()
    }

    /// Set the active configuration.
    ///
    /// Buffered before the session opens. On an opened session the new
    /// configuration's outputs must be a subset of the outputs resolved at
    /// open time (outputs cannot be added after open); a violating update is
    /// logged and not issued.
    pub(crate) fn set_session_config(&mut self, config: SessionConfig) {
        match self.state {
            SessionState::Initialized | SessionState::Opening => {
                self.session_config = Some(config);
            }
            SessionState::Opened => {
                let known = targets_subset(config.outputs(), |id| {
                    self.resolved_targets.contains_key(&id)
                });
                self.session_config = Some(config);
                if !known {
                    error!(
                        session = %self.id,
                        "Session config references outputs not resolved at open"
                    );
                    return;
                }
                debug!(session = %self.id, "Issuing repeating request after config update");
                self.issue_repeating_capture_requests();
            }
            SessionState::Closed => {
                // Reachable when a configuration failure preceded a use case
                // update; the camera replaces this session, so the update
                // has nowhere to go.
                error!(session = %self.id, "Ignoring config update on a closed session");
            }
            SessionState::Releasing | SessionState::Released => {
                panic!(
                    "set_session_config() not possible in state {:?}",
                    self.state
                );
            }
        }
    }

    /// Open the hardware session over `config`'s outputs.
    ///
    /// Resolves every output target (re-validating targets reused from an
    /// earlier session), deduplicates targets aliasing the same hardware
    /// output, notifies each output of attachment, folds preset hook options
    /// into the initial session parameters and requests creation.
    pub(crate) fn open(
        &mut self,
        config: &SessionConfig,
        device: &mut dyn DeviceHandle,
        events: SessionEventSender,
    ) {
        if self.state != SessionState::Initialized {
            error!(session = %self.id, state = ?self.state, "open() not allowed");
            return;
        }

        let mut resolved = HashMap::new();
        let mut unique_targets = Vec::new();
        for target in config.outputs() {
            match target.resolve() {
                Ok(hw) => {
                    resolved.insert(target.id(), hw);
                    if !unique_targets.contains(&hw) {
                        unique_targets.push(hw);
                    }
                }
                Err(e) => {
                    error!(
                        session = %self.id,
                        target = %target.label(),
                        error = %e,
                        "Unable to resolve output target, aborting session open"
                    );
                    return;
                }
            }
        }
        if unique_targets.is_empty() {
            error!(session = %self.id, "Unable to open capture session with no targets");
            return;
        }

        for target in config.outputs() {
            target.notify_attached();
        }
        self.attached_targets = config.outputs().to_vec();
        self.resolved_targets = resolved;
        self.state = SessionState::Opening;
        debug!(session = %self.id, targets = unique_targets.len(), "Opening capture session");

        // Preset hook options are folded into the initial session parameters
        // derived from the repeating config.
        let mut preset_configs = Vec::new();
        for hook in config.hooks() {
            preset_configs.extend(hook.on_preset_session());
        }
        let mut options = config.repeating().options().clone();
        for preset in &preset_configs {
            options.apply_over(preset.options());
        }
        let initial = HardwareRequest {
            template: config.repeating().template(),
            targets: Vec::new(),
            options,
        };

        if let Err(e) = device.create_session(unique_targets, initial, events) {
            error!(session = %self.id, error = %e, "Unable to request session creation");
        }
    }

    /// Close the session.
    ///
    /// On an opened session any `on_disable_session` hook requests are
    /// issued first; the hardware handle stays valid until it reports
    /// closed. A never-opened session finalizes directly.
    pub(crate) fn close(&mut self) {
        match self.state {
            SessionState::Initialized => {
                self.state = SessionState::Released;
                self.release_signal.resolve();
            }
            SessionState::Opened => {
                if self.session_config.is_some() {
                    let mut disable_configs = Vec::new();
                    if let Some(config) = &self.session_config {
                        for hook in config.hooks() {
                            disable_configs.extend(hook.on_disable_session());
                        }
                    }
                    if !disable_configs.is_empty() {
                        let prepared = self.prepare_hook_requests(disable_configs);
                        self.issue_capture_requests(prepared);
                    }
                }
                self.state = SessionState::Closed;
                self.session_config = None;
                self.on_repeating_options = None;
            }
            SessionState::Opening => {
                self.state = SessionState::Closed;
                self.session_config = None;
                self.on_repeating_options = None;
            }
            SessionState::Closed | SessionState::Releasing | SessionState::Released => {}
        }
    }

    /// Release the session, optionally aborting in-flight captures.
    ///
    /// The returned completion resolves once the hardware confirms the
    /// session closed. Idempotent; every caller observes the same signal.
    /// A session still `Opening` defers the hardware close until the
    /// configuration resolves.
    pub(crate) fn release(&mut self, abort_in_flight: bool) -> Completion {
        match self.state {
            SessionState::Opened | SessionState::Closed => {
                if let Some(handle) = self.handle.as_mut() {
                    if abort_in_flight {
                        handle.abort_captures();
                    }
                    handle.close();
                }
                self.state = SessionState::Releasing;
                self.release_signal.subscribe()
            }
            SessionState::Opening => {
                // No hardware handle yet; the Configured/ConfigureFailed
                // event closes it.
                self.state = SessionState::Releasing;
                self.release_signal.subscribe()
            }
            SessionState::Releasing => self.release_signal.subscribe(),
            SessionState::Initialized => {
                self.state = SessionState::Released;
                self.release_signal.resolve();
                Completion::resolved()
            }
            SessionState::Released => Completion::resolved(),
        }
    }

    /// Issue one-shot capture requests, buffering until the session opens
    pub(crate) fn issue_capture_requests(&mut self, configs: Vec<CaptureConfig>) {
        match self.state {
            SessionState::Initialized | SessionState::Opening => {
                self.pending_captures.extend(configs);
            }
            SessionState::Opened => {
                self.pending_captures.extend(configs);
                self.issue_burst_capture_requests();
            }
            SessionState::Closed | SessionState::Releasing | SessionState::Released => {
                panic!(
                    "issue_capture_requests() not possible in state {:?}",
                    self.state
                );
            }
        }
    }

    /// Build and submit the repeating request.
    ///
    /// Option priority, lowest first: base session config options, then
    /// event-hook `on_repeating` options (merged first-write-wins across
    /// hooks). The hook options are cached for layering under burst
    /// requests.
    pub(crate) fn issue_repeating_capture_requests(&mut self) {
        let (repeating, hooks) = match &self.session_config {
            Some(config) => (config.repeating().clone(), config.hooks().to_vec()),
            None => {
                debug!(session = %self.id, "Skipping repeating request, no configuration");
                return;
            }
        };
        if repeating.targets().is_empty() {
            debug!(session = %self.id, "Skipping repeating request with no targets");
            return;
        }

        let mut hook_configs = Vec::new();
        for hook in &hooks {
            hook_configs.extend(hook.on_repeating());
        }
        let hook_options = merge_hook_options(&hook_configs);

        let mut options = repeating.options().clone();
        options.apply_over(&hook_options);
        self.on_repeating_options = Some(hook_options);

        let mut targets = Vec::new();
        for target in repeating.targets() {
            match self.resolved_targets.get(&target.id()) {
                Some(hw) => {
                    if !targets.contains(hw) {
                        targets.push(*hw);
                    }
                }
                None => {
                    warn!(
                        session = %self.id,
                        target = %target.label(),
                        "Skipping repeating request with unresolved target"
                    );
                    return;
                }
            }
        }

        let request = HardwareRequest {
            template: repeating.template(),
            targets,
            options,
        };
        debug!(session = %self.id, "Issuing repeating request");
        match self.handle.as_mut() {
            Some(handle) => {
                if let Err(e) = handle.set_repeating(request) {
                    error!(session = %self.id, error = %e, "Unable to set repeating request");
                }
            }
            None => debug!(session = %self.id, "No hardware session for repeating request"),
        }
    }

    /// Flush buffered one-shot requests as a single burst.
    ///
    /// Requests referencing targets outside the resolved map are dropped
    /// individually; the rest of the batch proceeds.
    fn issue_burst_capture_requests(&mut self) {
        if self.pending_captures.is_empty() {
            return;
        }
        let configs = std::mem::take(&mut self.pending_captures);
        let base_options = self
            .session_config
            .as_ref()
            .map(|c| c.repeating().options().clone())
            .unwrap_or_default();

        let mut requests = Vec::new();
        for config in &configs {
            if config.targets().is_empty() {
                debug!(session = %self.id, "Skipping capture request with no targets");
                continue;
            }

            let mut targets = Vec::new();
            let mut valid = true;
            for target in config.targets() {
                match self.resolved_targets.get(&target.id()) {
                    Some(hw) => {
                        if !targets.contains(hw) {
                            targets.push(*hw);
                        }
                    }
                    None => {
                        warn!(
                            session = %self.id,
                            target = %target.label(),
                            "Dropping capture request referencing an unknown target"
                        );
                        valid = false;
                        break;
                    }
                }
            }
            if !valid {
                continue;
            }

            // Priority, lowest first: session config, hook on-repeating
            // options, per-request options.
            let mut options = base_options.clone();
            if let Some(hook_options) = &self.on_repeating_options {
                options.apply_over(hook_options);
            }
            options.apply_over(config.options());

            requests.push(HardwareRequest {
                template: config.template(),
                targets,
                options,
            });
        }

        if requests.is_empty() {
            debug!(session = %self.id, "Skipping burst with no valid request elements");
            return;
        }
        debug!(session = %self.id, count = requests.len(), "Issuing burst capture request");
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.capture_burst(requests) {
                error!(session = %self.id, error = %e, "Unable to submit burst request");
            }
        }
    }

    /// Drive the state machine from a hardware session event
    pub(crate) fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Configured(handle) => self.on_configured(handle),
            SessionEvent::ConfigureFailed(handle) => self.on_configure_failed(handle),
            SessionEvent::Closed => self.on_closed(),
        }
    }

    fn on_configured(&mut self, handle: Box<dyn SessionHandle>) {
        match self.state {
            SessionState::Opening => {
                self.state = SessionState::Opened;
                self.handle = Some(handle);
                debug!(session = %self.id, "Capture session configured");

                let mut enable_configs = Vec::new();
                if let Some(config) = &self.session_config {
                    for hook in config.hooks() {
                        enable_configs.extend(hook.on_enable_session());
                    }
                }
                if !enable_configs.is_empty() {
                    let prepared = self.prepare_hook_requests(enable_configs);
                    self.issue_capture_requests(prepared);
                }

                self.issue_repeating_capture_requests();
                self.issue_burst_capture_requests();
            }
            SessionState::Closed => {
                // Closed before the hardware confirmed; keep the handle so
                // release can close it.
                self.handle = Some(handle);
            }
            SessionState::Releasing => {
                let mut handle = handle;
                handle.close();
                self.handle = Some(handle);
            }
            SessionState::Initialized | SessionState::Opened | SessionState::Released => {
                panic!("Configured event not possible in state {:?}", self.state);
            }
        }
    }

    fn on_configure_failed(&mut self, handle: Box<dyn SessionHandle>) {
        error!(session = %self.id, state = ?self.state, "Capture session configuration failed");
        match self.state {
            SessionState::Opening | SessionState::Closed => {
                // Recovery belongs to the device controller.
                self.state = SessionState::Closed;
                self.handle = Some(handle);
            }
            SessionState::Releasing => {
                let mut handle = handle;
                handle.close();
                self.handle = Some(handle);
            }
            SessionState::Initialized | SessionState::Opened | SessionState::Released => {
                panic!(
                    "ConfigureFailed event not possible in state {:?}",
                    self.state
                );
            }
        }
    }

    fn on_closed(&mut self) {
        debug!(session = %self.id, "Capture session closed");
        self.state = SessionState::Released;
        self.handle = None;

        // Exactly one detach per attach; the drain prevents a second pass.
        for target in self.attached_targets.drain(..) {
            target.notify_detached();
        }

        self.release_signal.resolve();
    }

    /// Give hook-supplied one-shots the session template and the repeating
    /// targets so they are valid requests for this session
    fn prepare_hook_requests(&self, configs: Vec<CaptureConfig>) -> Vec<CaptureConfig> {
        let Some(session_config) = &self.session_config else {
            return Vec::new();
        };
        configs
            .into_iter()
            .map(|config| {
                let mut builder = config.to_builder().set_template(session_config.template());
                for target in session_config.repeating().targets() {
                    builder = builder.add_target(Arc::clone(target));
                }
                builder.build()
            })
            .collect()
    }
}
