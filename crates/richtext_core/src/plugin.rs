//! Plugin definitions, option merging and plugin instances
//!
//! A [`PluginDefinition`] is pure: it binds a name, default options and a
//! builder that maps *resolved* options to phase handlers. Calling
//! [`create`](PluginDefinition::create) produces an independent
//! [`PluginInstance`] and touches no bus; registration is the manager's job.

use crate::context::{Invocation, PluginContext};
use crate::error::{EventError, PluginSystemError};
use crate::event::{EventName, Phase};
use crate::payload::EventPayload;
use compact_str::CompactString;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Bounds every plugin options type must meet
pub trait PluginOptions: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> PluginOptions for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Typed phase handler as written by plugin authors
pub type PhaseFn<O> =
    Arc<dyn Fn(&PluginContext<'_, O>, &EventPayload) -> Result<bool, EventError> + Send + Sync>;

/// Handler after the options type has been erased
pub type InstanceFn =
    Arc<dyn Fn(Invocation<'_>, &EventPayload) -> Result<bool, EventError> + Send + Sync>;

/// Optional before/on/after handlers for one event name
pub struct PhaseHandlers<O> {
    before: Option<PhaseFn<O>>,
    on: Option<PhaseFn<O>>,
    after: Option<PhaseFn<O>>,
}

impl<O> Default for PhaseHandlers<O> {
    fn default() -> Self {
        Self {
            before: None,
            on: None,
            after: None,
        }
    }
}

impl<O> PhaseHandlers<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard: return `Ok(false)` to veto. Must not have side effects.
    pub fn before<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PluginContext<'_, O>, &EventPayload) -> Result<bool, EventError> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(handler));
        self
    }

    /// Effect: the one place document mutation happens
    pub fn on<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PluginContext<'_, O>, &EventPayload) -> Result<bool, EventError> + Send + Sync + 'static,
    {
        self.on = Some(Arc::new(handler));
        self
    }

    /// Reaction: runs after every `on` handler, result only logged
    pub fn after<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PluginContext<'_, O>, &EventPayload) -> Result<bool, EventError> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(handler));
        self
    }

    pub fn get(&self, phase: Phase) -> Option<&PhaseFn<O>> {
        match phase {
            Phase::Before => self.before.as_ref(),
            Phase::On => self.on.as_ref(),
            Phase::After => self.after.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_none() && self.on.is_none() && self.after.is_none()
    }
}

/// Ordered mapping of event name to phase handlers
pub struct HandlerMap<O> {
    entries: Vec<(EventName, PhaseHandlers<O>)>,
}

impl<O> Default for HandlerMap<O> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<O> HandlerMap<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, name: impl Into<EventName>, handlers: PhaseHandlers<O>) -> Self {
        self.entries.push((name.into(), handlers));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type BuildFn<O> = Arc<dyn Fn(&O) -> HandlerMap<O> + Send + Sync>;

/// Immutable description of a plugin; a factory for [`PluginInstance`]s
pub struct PluginDefinition<O> {
    name: CompactString,
    defaults: Arc<O>,
    build: BuildFn<O>,
}

impl<O> Clone for PluginDefinition<O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            defaults: self.defaults.clone(),
            build: self.build.clone(),
        }
    }
}

impl<O> fmt::Debug for PluginDefinition<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Bind a name, default options and a handler builder into a plugin definition
pub fn define_plugin<O, F>(name: &str, defaults: O, build: F) -> PluginDefinition<O>
where
    O: PluginOptions,
    F: Fn(&O) -> HandlerMap<O> + Send + Sync + 'static,
{
    PluginDefinition {
        name: CompactString::new(name),
        defaults: Arc::new(defaults),
        build: Arc::new(build),
    }
}

impl<O: PluginOptions> PluginDefinition<O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defaults(&self) -> &O {
        &self.defaults
    }

    /// Instantiate with a partial options object merged over the defaults
    pub fn create(&self, overrides: Option<&Value>) -> Result<PluginInstance, PluginSystemError> {
        let options = merge_options(&self.name, self.defaults.as_ref(), overrides)?;
        Ok(self.create_with(options))
    }

    /// Instantiate with the defaults untouched
    pub fn create_default(&self) -> PluginInstance {
        self.create_with(O::clone(&self.defaults))
    }

    /// Instantiate with fully specified options
    pub fn create_with(&self, options: O) -> PluginInstance {
        let snapshot = serde_json::to_value(&options).unwrap_or(Value::Null);
        let options = Arc::new(options);
        let map = (self.build)(options.as_ref());

        let mut bindings = Vec::new();
        for (event, phases) in map.entries {
            for phase in Phase::ALL {
                if let Some(handler) = phases.get(phase) {
                    bindings.push(Binding {
                        event: event.clone(),
                        phase,
                        handler: erase(self.name.clone(), options.clone(), handler.clone()),
                    });
                }
            }
        }

        PluginInstance {
            name: self.name.clone(),
            options: snapshot,
            bindings,
        }
    }
}

fn erase<O: Send + Sync + 'static>(
    plugin: CompactString,
    options: Arc<O>,
    handler: PhaseFn<O>,
) -> InstanceFn {
    Arc::new(move |invocation: Invocation<'_>, payload: &EventPayload| {
        let ctx = PluginContext::new(plugin.as_str(), invocation, options.as_ref());
        handler(&ctx, payload)
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Shallow-merge `overrides` over `defaults`.
///
/// `null` fields keep the default, concrete values replace it, and keys the
/// options type does not know are rejected.
pub fn merge_options<O: PluginOptions>(
    plugin: &str,
    defaults: &O,
    overrides: Option<&Value>,
) -> Result<O, PluginSystemError> {
    let invalid = |reason: String| PluginSystemError::InvalidOptions {
        plugin: plugin.to_string(),
        reason,
    };

    let overrides = match overrides {
        None | Some(Value::Null) => return Ok(defaults.clone()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(invalid(format!("expected an object, got {}", value_kind(other))))
        }
    };

    let mut merged = match serde_json::to_value(defaults)? {
        Value::Object(map) => map,
        other => {
            return Err(invalid(format!(
                "defaults serialize to {}, not an object",
                value_kind(&other)
            )))
        }
    };

    for (key, value) in overrides {
        if !merged.contains_key(key) {
            return Err(invalid(format!("unknown option `{}`", key)));
        }
        if value.is_null() {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }

    serde_json::from_value(Value::Object(merged)).map_err(|e| invalid(e.to_string()))
}

/// One `(event, phase)` registration a plugin instance wants
pub struct Binding {
    pub(crate) event: EventName,
    pub(crate) phase: Phase,
    pub(crate) handler: InstanceFn,
}

/// Fully configured, registrable plugin
pub struct PluginInstance {
    name: CompactString,
    options: Value,
    bindings: Vec<Binding>,
}

impl PluginInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved options, serialized
    pub fn options(&self) -> &Value {
        &self.options
    }

    /// Event names this instance handles, in declaration order
    pub fn events(&self) -> Vec<EventName> {
        let mut events: Vec<EventName> = Vec::new();
        for binding in &self.bindings {
            if !events.contains(&binding.event) {
                events.push(binding.event.clone());
            }
        }
        events
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&EventName, Phase)> {
        self.bindings.iter().map(|b| (&b.event, b.phase))
    }

    pub fn handles(&self, event: &str, phase: Phase) -> bool {
        self.bindings
            .iter()
            .any(|b| b.event.as_str() == event && b.phase == phase)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub(crate) fn into_parts(self) -> (CompactString, Value, Vec<Binding>) {
        (self.name, self.options, self.bindings)
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("bindings", &self.bindings().collect::<Vec<_>>())
            .finish()
    }
}

/// Object-safe factory so heterogeneous definitions can share a catalogue
pub trait PluginFactory: Send + Sync {
    fn plugin_name(&self) -> &str;

    fn default_options(&self) -> Value;

    fn create(&self, overrides: Option<&Value>) -> Result<PluginInstance, PluginSystemError>;
}

impl<O: PluginOptions> PluginFactory for PluginDefinition<O> {
    fn plugin_name(&self) -> &str {
        &self.name
    }

    fn default_options(&self) -> Value {
        serde_json::to_value(self.defaults.as_ref()).unwrap_or(Value::Null)
    }

    fn create(&self, overrides: Option<&Value>) -> Result<PluginInstance, PluginSystemError> {
        PluginDefinition::create(self, overrides)
    }
}
