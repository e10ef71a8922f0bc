// SPDX-License-Identifier: GPL-3.0-only

//! Capture and session configuration types
//!
//! A use case describes what it wants from the camera with a
//! [`SessionConfig`]: the output targets it draws frames into, a repeating
//! capture configuration, implementation-level options and optional
//! [`SessionEventHook`]s. The camera merges the configs of all online use
//! cases through a [`SessionMergeBuilder`]; a merge with conflicting option
//! values is invalid and never reaches the hardware.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::output_target::{OutputTarget, OutputTargetId};

/// A single implementation-level option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// An ordered bundle of implementation-level options keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImplementationOptions {
    map: BTreeMap<String, OptionValue>,
}

impl ImplementationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: OptionValue) {
        self.map.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.map.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.map.iter()
    }

    /// Overlay `other` on top of this bundle; values in `other` win.
    ///
    /// Used for priority layering when building requests: lower-priority
    /// options are inserted first and higher-priority bundles are applied
    /// over them.
    pub fn apply_over(&mut self, other: &ImplementationOptions) {
        for (key, value) in other.iter() {
            self.map.insert(key.clone(), value.clone());
        }
    }

    /// Merge `other` keeping the first-written value on key collisions.
    ///
    /// Divergent duplicate values are logged; the earlier write wins. This is
    /// the explicit policy for combining event-hook options.
    pub fn merge_first_write_wins(&mut self, other: &ImplementationOptions) {
        for (key, value) in other.iter() {
            match self.map.get(key) {
                Some(existing) if existing != value => {
                    debug!(
                        option = %key,
                        kept = ?existing,
                        ignored = ?value,
                        "Conflicting option value, keeping first write"
                    );
                }
                Some(_) => {}
                None => {
                    self.map.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Hardware request template a capture request is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureTemplate {
    /// Continuous preview stream
    #[default]
    Preview,
    /// Continuous stream tuned for recording
    Record,
    /// Single high-quality still capture
    StillCapture,
}

/// Configuration of a single capture request (or the repeating request)
#[derive(Clone)]
pub struct CaptureConfig {
    template: CaptureTemplate,
    targets: Vec<Arc<OutputTarget>>,
    options: ImplementationOptions,
    use_repeating_targets: bool,
}

impl CaptureConfig {
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::default()
    }

    /// Start a builder pre-populated from an existing config
    pub fn to_builder(&self) -> CaptureConfigBuilder {
        CaptureConfigBuilder {
            template: self.template,
            targets: self.targets.clone(),
            options: self.options.clone(),
            use_repeating_targets: self.use_repeating_targets,
        }
    }

    pub fn template(&self) -> CaptureTemplate {
        self.template
    }

    pub fn targets(&self) -> &[Arc<OutputTarget>] {
        &self.targets
    }

    pub fn options(&self) -> &ImplementationOptions {
        &self.options
    }

    /// Whether the camera should attach the active repeating targets when the
    /// request carries none of its own
    pub fn use_repeating_targets(&self) -> bool {
        self.use_repeating_targets
    }
}

#[derive(Default)]
pub struct CaptureConfigBuilder {
    template: CaptureTemplate,
    targets: Vec<Arc<OutputTarget>>,
    options: ImplementationOptions,
    use_repeating_targets: bool,
}

impl CaptureConfigBuilder {
    pub fn set_template(mut self, template: CaptureTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn add_target(mut self, target: Arc<OutputTarget>) -> Self {
        if !self.targets.iter().any(|t| t.id() == target.id()) {
            self.targets.push(target);
        }
        self
    }

    pub fn insert_option(mut self, key: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn set_use_repeating_targets(mut self, enabled: bool) -> Self {
        self.use_repeating_targets = enabled;
        self
    }

    pub fn build(self) -> CaptureConfig {
        CaptureConfig {
            template: self.template,
            targets: self.targets,
            options: self.options,
            use_repeating_targets: self.use_repeating_targets,
        }
    }
}

/// Hook supplying extra capture configs at session lifecycle points.
///
/// Hooks are registered on a [`SessionConfig`] and solicited by the capture
/// session: `on_preset_session` before the hardware session is created,
/// `on_enable_session` right after it is configured, `on_repeating` whenever
/// the repeating request is (re)built, and `on_disable_session` just before
/// the session closes.
pub trait SessionEventHook: Send + Sync {
    fn on_preset_session(&self) -> Vec<CaptureConfig> {
        Vec::new()
    }

    fn on_enable_session(&self) -> Vec<CaptureConfig> {
        Vec::new()
    }

    fn on_repeating(&self) -> Vec<CaptureConfig> {
        Vec::new()
    }

    fn on_disable_session(&self) -> Vec<CaptureConfig> {
        Vec::new()
    }
}

/// Merge the options of hook-supplied configs, first write wins
pub(crate) fn merge_hook_options(configs: &[CaptureConfig]) -> ImplementationOptions {
    let mut merged = ImplementationOptions::new();
    for config in configs {
        merged.merge_first_write_wins(config.options());
    }
    merged
}

/// Complete per-consumer session configuration fragment
#[derive(Clone)]
pub struct SessionConfig {
    template: CaptureTemplate,
    outputs: Vec<Arc<OutputTarget>>,
    repeating: CaptureConfig,
    options: ImplementationOptions,
    hooks: Vec<Arc<dyn SessionEventHook>>,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn template(&self) -> CaptureTemplate {
        self.template
    }

    /// All output targets this session uses
    pub fn outputs(&self) -> &[Arc<OutputTarget>] {
        &self.outputs
    }

    /// The repeating request configuration; its targets are a subset of
    /// [`outputs`](Self::outputs)
    pub fn repeating(&self) -> &CaptureConfig {
        &self.repeating
    }

    pub fn options(&self) -> &ImplementationOptions {
        &self.options
    }

    pub fn hooks(&self) -> &[Arc<dyn SessionEventHook>] {
        &self.hooks
    }
}

#[derive(Default)]
pub struct SessionConfigBuilder {
    template: Option<CaptureTemplate>,
    outputs: Vec<Arc<OutputTarget>>,
    repeating_targets: Vec<Arc<OutputTarget>>,
    options: ImplementationOptions,
    repeating_options: ImplementationOptions,
    hooks: Vec<Arc<dyn SessionEventHook>>,
}

impl SessionConfigBuilder {
    pub fn set_template(mut self, template: CaptureTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Add a target used by both the session and its repeating request
    pub fn add_target(mut self, target: Arc<OutputTarget>) -> Self {
        if !self
            .repeating_targets
            .iter()
            .any(|t| t.id() == target.id())
        {
            self.repeating_targets.push(Arc::clone(&target));
        }
        self.add_non_repeating_target(target)
    }

    /// Add a target used by the session but not by the repeating request
    /// (one-shot destinations such as still-capture buffers)
    pub fn add_non_repeating_target(mut self, target: Arc<OutputTarget>) -> Self {
        if !self.outputs.iter().any(|t| t.id() == target.id()) {
            self.outputs.push(target);
        }
        self
    }

    pub fn insert_option(mut self, key: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn insert_repeating_option(mut self, key: impl Into<String>, value: OptionValue) -> Self {
        self.repeating_options.insert(key, value);
        self
    }

    pub fn add_event_hook(mut self, hook: Arc<dyn SessionEventHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> SessionConfig {
        let template = self.template.unwrap_or_default();
        let repeating = CaptureConfig {
            template,
            targets: self.repeating_targets,
            options: self.repeating_options,
            use_repeating_targets: false,
        };
        SessionConfig {
            template,
            outputs: self.outputs,
            repeating,
            options: self.options,
            hooks: self.hooks,
        }
    }
}

/// Validating merge over session config fragments.
///
/// Produces the union of outputs and repeating targets (deduplicated by
/// target identity, insertion order preserved), takes the template from the
/// first fragment that set one, concatenates hooks, and marks the merge
/// invalid when two fragments disagree on an option value. An invalid merge
/// must never be handed to the hardware; callers check [`is_valid`] before
/// [`build`].
///
/// [`is_valid`]: Self::is_valid
/// [`build`]: Self::build
pub struct SessionMergeBuilder {
    template: Option<CaptureTemplate>,
    outputs: Vec<Arc<OutputTarget>>,
    repeating_targets: Vec<Arc<OutputTarget>>,
    options: ImplementationOptions,
    repeating_options: ImplementationOptions,
    hooks: Vec<Arc<dyn SessionEventHook>>,
    invalid_keys: Vec<String>,
    fragments: usize,
}

impl SessionMergeBuilder {
    pub fn new() -> Self {
        Self {
            template: None,
            outputs: Vec::new(),
            repeating_targets: Vec::new(),
            options: ImplementationOptions::new(),
            repeating_options: ImplementationOptions::new(),
            hooks: Vec::new(),
            invalid_keys: Vec::new(),
            fragments: 0,
        }
    }

    /// Fold one fragment into the merge
    pub fn add(&mut self, config: &SessionConfig) {
        self.fragments += 1;

        if self.template.is_none() {
            self.template = Some(config.template());
        }

        for target in config.outputs() {
            if !self.outputs.iter().any(|t| t.id() == target.id()) {
                self.outputs.push(Arc::clone(target));
            }
        }
        for target in config.repeating().targets() {
            if !self
                .repeating_targets
                .iter()
                .any(|t| t.id() == target.id())
            {
                self.repeating_targets.push(Arc::clone(target));
            }
        }

        merge_checked(&mut self.options, config.options(), &mut self.invalid_keys);
        merge_checked(
            &mut self.repeating_options,
            config.repeating().options(),
            &mut self.invalid_keys,
        );

        self.hooks.extend(config.hooks().iter().cloned());
    }

    /// Force a template regardless of what fragments declared
    pub fn override_template(&mut self, template: CaptureTemplate) {
        self.template = Some(template);
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Whether the merged configuration is safe to hand to the hardware
    pub fn is_valid(&self) -> bool {
        self.invalid_keys.is_empty()
    }

    /// Option keys that fragments disagreed on
    pub fn invalid_keys(&self) -> &[String] {
        &self.invalid_keys
    }

    /// Build the merged configuration.
    ///
    /// Faults if the merge is invalid; callers must check
    /// [`is_valid`](Self::is_valid) first.
    pub fn build(self) -> SessionConfig {
        if !self.invalid_keys.is_empty() {
            panic!(
                "build() on invalid session merge, conflicting options: {:?}",
                self.invalid_keys
            );
        }
        let template = self.template.unwrap_or_default();
        SessionConfig {
            template,
            outputs: self.outputs,
            repeating: CaptureConfig {
                template,
                targets: self.repeating_targets,
                options: self.repeating_options,
                use_repeating_targets: false,
            },
            options: self.options,
            hooks: self.hooks,
        }
    }
}

impl Default for SessionMergeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert `src` into `dst`, recording keys whose values disagree
fn merge_checked(
    dst: &mut ImplementationOptions,
    src: &ImplementationOptions,
    invalid: &mut Vec<String>,
) {
    for (key, value) in src.iter() {
        match dst.get(key) {
            Some(existing) if existing != value => {
                if !invalid.contains(key) {
                    invalid.push(key.clone());
                }
            }
            Some(_) => {}
            None => dst.insert(key.clone(), value.clone()),
        }
    }
}

/// Subset check used when updating an opened session: every target of
/// `subset` must satisfy the membership predicate
pub(crate) fn targets_subset(
    subset: &[Arc<OutputTarget>],
    superset: impl Fn(OutputTargetId) -> bool,
) -> bool {
    subset.iter().all(|t| superset(t.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::HardwareTarget;

    fn target(n: u64) -> Arc<OutputTarget> {
        Arc::new(OutputTarget::immediate(format!("t{n}"), HardwareTarget(n)))
    }

    #[test]
    fn test_merge_unions_targets_and_keeps_first_template() {
        let shared = target(1);
        let a = SessionConfig::builder()
            .set_template(CaptureTemplate::Record)
            .add_target(Arc::clone(&shared))
            .build();
        let b = SessionConfig::builder()
            .add_target(Arc::clone(&shared))
            .add_non_repeating_target(target(2))
            .build();

        let mut merge = SessionMergeBuilder::new();
        merge.add(&a);
        merge.add(&b);
        assert!(merge.is_valid());

        let merged = merge.build();
        assert_eq!(merged.template(), CaptureTemplate::Record);
        assert_eq!(merged.outputs().len(), 2);
        assert_eq!(merged.repeating().targets().len(), 1);
    }

    #[test]
    fn test_conflicting_option_marks_merge_invalid() {
        let a = SessionConfig::builder()
            .insert_option("exposure", OptionValue::Int(100))
            .build();
        let b = SessionConfig::builder()
            .insert_option("exposure", OptionValue::Int(200))
            .build();

        let mut merge = SessionMergeBuilder::new();
        merge.add(&a);
        merge.add(&b);
        assert!(!merge.is_valid());
        assert_eq!(merge.invalid_keys(), ["exposure"]);
    }

    #[test]
    fn test_agreeing_options_stay_valid() {
        let a = SessionConfig::builder()
            .insert_option("exposure", OptionValue::Int(100))
            .build();
        let b = SessionConfig::builder()
            .insert_option("exposure", OptionValue::Int(100))
            .insert_option("gain", OptionValue::Float(1.5))
            .build();

        let mut merge = SessionMergeBuilder::new();
        merge.add(&a);
        merge.add(&b);
        assert!(merge.is_valid());
        let merged = merge.build();
        assert_eq!(merged.options().len(), 2);
    }

    #[test]
    #[should_panic(expected = "build() on invalid session merge")]
    fn test_build_on_invalid_merge_faults() {
        let a = SessionConfig::builder()
            .insert_option("fps", OptionValue::Int(30))
            .build();
        let b = SessionConfig::builder()
            .insert_option("fps", OptionValue::Int(60))
            .build();
        let mut merge = SessionMergeBuilder::new();
        merge.add(&a);
        merge.add(&b);
        merge.build();
    }

    #[test]
    fn test_hook_options_first_write_wins() {
        let first = CaptureConfig::builder()
            .insert_option("stabilization", OptionValue::Bool(true))
            .build();
        let second = CaptureConfig::builder()
            .insert_option("stabilization", OptionValue::Bool(false))
            .insert_option("noise_reduction", OptionValue::Bool(true))
            .build();

        let merged = merge_hook_options(&[first, second]);
        assert_eq!(merged.get("stabilization"), Some(&OptionValue::Bool(true)));
        assert_eq!(merged.get("noise_reduction"), Some(&OptionValue::Bool(true)));
    }

    #[test]
    fn test_apply_over_later_wins() {
        let mut base = ImplementationOptions::new();
        base.insert("fps", OptionValue::Int(30));
        let mut overlay = ImplementationOptions::new();
        overlay.insert("fps", OptionValue::Int(60));
        base.apply_over(&overlay);
        assert_eq!(base.get("fps"), Some(&OptionValue::Int(60)));
    }

    #[test]
    fn test_targets_subset() {
        let a = target(1);
        let b = target(2);
        let known = [a.id()];
        assert!(targets_subset(&[Arc::clone(&a)], |id| known.contains(&id)));
        assert!(!targets_subset(
            &[Arc::clone(&a), Arc::clone(&b)],
            |id| known.contains(&id)
        ));
    }
}
