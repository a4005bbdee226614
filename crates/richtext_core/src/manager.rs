//! Plugin manager: registers plugin instances against the bus and owns their lifecycle

use crate::context::{EditorContext, Invocation};
use crate::error::PluginSystemError;
use crate::event::{Dispatch, DispatchReport, EventBus, EventName, Phase, Subscription};
use crate::logging::DispatchLogger;
use crate::payload::EventPayload;
use crate::plugin::PluginInstance;
use compact_str::CompactString;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const SOURCE: &str = "manager";

/// Configuration for plugin registration checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Reject a plugin whose `on` handler shares an event name with another plugin's
    #[serde(default)]
    pub exclusive_on_handlers: bool,

    /// Maximum number of plugins registered at once
    #[serde(default)]
    pub max_plugins: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Active,
    Disabled,
}

/// Diagnostic snapshot of one registered plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginStatus {
    pub name: String,
    pub state: PluginState,
    pub events: Vec<EventName>,
    pub options: Value,
}

struct RegisteredPlugin {
    order: u64,
    options: Value,
    events: Vec<EventName>,
    subscriptions: Vec<Subscription>,
    enabled: bool,
}

/// Registry of live plugins bound to one [`EventBus`]
pub struct PluginManager {
    bus: EventBus,
    editor: Arc<EditorContext>,
    plugins: DashMap<CompactString, RegisteredPlugin>,
    next_order: AtomicU64,
    config: ManagerConfig,
    logger: Arc<dyn DispatchLogger>,
    // Held across the checks and the insert of one registration
    registration: Mutex<()>,
}

impl PluginManager {
    /// The manager logs through the same injected logger as `bus`
    pub fn new(bus: EventBus, editor: Arc<EditorContext>, config: ManagerConfig) -> Self {
        let logger = bus.logger();
        Self {
            bus,
            editor,
            plugins: DashMap::new(),
            next_order: AtomicU64::new(0),
            config,
            logger,
            registration: Mutex::new(()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn editor(&self) -> &Arc<EditorContext> {
        &self.editor
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Attach every handler of `instance` to the bus.
    ///
    /// Duplicate names are rejected before anything is attached. If attaching
    /// fails halfway, the handlers already attached are removed again.
    pub fn register(&self, instance: PluginInstance) -> Result<(), PluginSystemError> {
        let name = instance.name().trim().to_string();
        if name.is_empty() {
            return Err(PluginSystemError::InvalidPlugin("plugin name is blank".to_string()));
        }

        let _registering = self.registration.lock().unwrap_or_else(|e| e.into_inner());

        if self.plugins.contains_key(name.as_str()) {
            self.logger
                .warn(SOURCE, None, &format!("🚫 Plugin {} is already registered", name));
            return Err(PluginSystemError::PluginAlreadyExists(name));
        }

        if let Some(max_plugins) = self.config.max_plugins {
            if self.plugins.len() >= max_plugins {
                self.logger.warn(
                    SOURCE,
                    None,
                    &format!("🚫 Refusing plugin {}: limit of {} reached", name, max_plugins),
                );
                return Err(PluginSystemError::LimitExceeded(max_plugins));
            }
        }

        if self.config.exclusive_on_handlers {
            for (event, phase) in instance.bindings() {
                if phase == Phase::On && self.has_plugin_on_handler(event.as_str()) {
                    self.logger.warn(
                        SOURCE,
                        Some(event.as_str()),
                        &format!("🚫 Plugin {} conflicts with another plugin's on handler", name),
                    );
                    return Err(PluginSystemError::HandlerConflict {
                        plugin: name,
                        event: event.to_string(),
                    });
                }
            }
        }

        let events = instance.events();
        let (_, options, bindings) = instance.into_parts();

        let mut subscriptions = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let editor = self.editor.clone();
            let weak_bus = self.bus.downgrade();
            let logger = self.bus.logger();
            let handler = binding.handler;

            let attached = self.bus.on_owned_arc(
                &name,
                binding.event,
                binding.phase,
                Arc::new(move |dispatch: &Dispatch<'_>, payload: &EventPayload| {
                    handler(
                        Invocation {
                            dispatch,
                            editor: editor.as_ref(),
                            bus: &weak_bus,
                            logger: logger.as_ref(),
                        },
                        payload,
                    )
                }),
            );

            match attached {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    self.logger.error(
                        SOURCE,
                        None,
                        &format!("❌ Failed to attach handlers for plugin {}: {}", name, e),
                    );
                    for subscription in &subscriptions {
                        subscription.unsubscribe();
                    }
                    return Err(e.into());
                }
            }
        }

        let handler_count = subscriptions.len();
        self.plugins.insert(
            CompactString::new(&name),
            RegisteredPlugin {
                order: self.next_order.fetch_add(1, Ordering::Relaxed),
                options,
                events,
                subscriptions,
                enabled: true,
            },
        );
        self.bus.set_owner_enabled(&name, true);

        self.logger.info(
            SOURCE,
            None,
            &format!("🔌 Registered plugin {} ({} handlers)", name, handler_count),
        );
        Ok(())
    }

    /// Whether a registered plugin already owns an `on` handler for `event`
    fn has_plugin_on_handler(&self, event: &str) -> bool {
        self.bus
            .owners(event, Phase::On)
            .iter()
            .flatten()
            .any(|owner| self.plugins.contains_key(owner.as_str()))
    }

    /// Remove every handler owned by `name`
    pub fn unregister(&self, name: &str) -> Result<(), PluginSystemError> {
        let Some((_, plugin)) = self.plugins.remove(name) else {
            self.logger
                .warn(SOURCE, None, &format!("🚫 Cannot unregister unknown plugin {}", name));
            return Err(PluginSystemError::PluginNotFound(name.to_string()));
        };

        for subscription in &plugin.subscriptions {
            subscription.unsubscribe();
        }
        let stray = self.bus.remove_owner(name);
        if stray > 0 {
            self.logger.warn(
                SOURCE,
                None,
                &format!("🧹 Removed {} stray handlers owned by {}", stray, name),
            );
        }
        self.bus.set_owner_enabled(name, true);

        self.logger.info(SOURCE, None, &format!("🔌 Unregistered plugin {}", name));
        Ok(())
    }

    /// Resume dispatching to a disabled plugin
    pub fn enable(&self, name: &str) -> Result<(), PluginSystemError> {
        self.set_enabled(name, true)
    }

    /// Keep a plugin registered but skip its handlers in every phase
    pub fn disable(&self, name: &str) -> Result<(), PluginSystemError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), PluginSystemError> {
        let Some(mut plugin) = self.plugins.get_mut(name) else {
            self.logger
                .warn(SOURCE, None, &format!("🚫 Cannot toggle unknown plugin {}", name));
            return Err(PluginSystemError::PluginNotFound(name.to_string()));
        };
        plugin.enabled = enabled;
        self.bus.set_owner_enabled(name, enabled);
        let state = if enabled { "enabled" } else { "disabled" };
        self.logger.info(SOURCE, None, &format!("🔧 Plugin {} {}", name, state));
        Ok(())
    }

    /// Convenience pass-through to [`EventBus::emit`]
    pub fn emit(
        &self,
        event: impl Into<EventName>,
        payload: impl Into<EventPayload>,
    ) -> DispatchReport {
        self.bus.emit(event, payload)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.plugins.get(name).map(|p| p.enabled).unwrap_or(false)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Registered plugin names, in registration order
    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<(u64, String)> = self
            .plugins
            .iter()
            .map(|entry| (entry.value().order, entry.key().to_string()))
            .collect();
        names.sort();
        names.into_iter().map(|(_, name)| name).collect()
    }

    /// Diagnostic view of every registered plugin, in registration order
    pub fn statuses(&self) -> Vec<PluginStatus> {
        let mut statuses: Vec<(u64, PluginStatus)> = self
            .plugins
            .iter()
            .map(|entry| {
                let plugin = entry.value();
                (
                    plugin.order,
                    PluginStatus {
                        name: entry.key().to_string(),
                        state: if plugin.enabled {
                            PluginState::Active
                        } else {
                            PluginState::Disabled
                        },
                        events: plugin.events.clone(),
                        options: plugin.options.clone(),
                    },
                )
            })
            .collect();
        statuses.sort_by_key(|(order, _)| *order);
        statuses.into_iter().map(|(_, status)| status).collect()
    }

    /// Unregister everything, most recently registered first
    pub fn shutdown(&self) {
        let names = self.plugin_names();
        self.logger
            .info(SOURCE, None, &format!("🛑 Shutting down {} plugins", names.len()));
        for name in names.iter().rev() {
            if let Err(e) = self.unregister(name) {
                self.logger.error(
                    SOURCE,
                    None,
                    &format!("❌ Plugin shutdown failed for {}: {}", name, e),
                );
            }
        }
        self.logger.info(SOURCE, None, "🧹 Plugin cleanup completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::logging::LogLevel;
    use crate::plugin::{define_plugin, HandlerMap, PhaseHandlers, PluginDefinition};
    use crate::testing::TestHarness;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct MarkOptions {
        event_name: String,
        command: String,
    }

    fn mark(name: &str, event: &str) -> PluginDefinition<MarkOptions> {
        define_plugin(
            name,
            MarkOptions {
                event_name: event.to_string(),
                command: "bold".to_string(),
            },
            |options| {
                HandlerMap::new().event(
                    options.event_name.as_str(),
                    PhaseHandlers::<MarkOptions>::new()
                        .before(|ctx, _| if ctx.is_composing() { ctx.veto("composing") } else { Ok(true) })
                        .on(|ctx, _| {
                            ctx.execute(&Command::new(&ctx.options().command))?;
                            Ok(true)
                        }),
                )
            },
        )
    }

    #[test]
    fn test_register_and_dispatch() {
        let harness = TestHarness::new();
        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();

        assert!(harness.manager.is_registered("bold"));
        assert!(harness.manager.is_enabled("bold"));
        assert_eq!(harness.manager.bus().handler_count("BOLD_CLICKED", Phase::Before), 1);

        let report = harness.manager.emit("BOLD_CLICKED", json!({}));
        assert!(report.succeeded());
        assert_eq!(harness.commands.calls(), vec![Command::new("bold")]);
    }

    #[test]
    fn test_duplicate_registration_rejected_without_side_effects() {
        let harness = TestHarness::new();
        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();

        let err = harness
            .manager
            .register(mark("bold", "OTHER_EVENT").create_default())
            .unwrap_err();
        assert!(matches!(err, PluginSystemError::PluginAlreadyExists(ref n) if n == "bold"));
        assert!(!harness.manager.bus().has_handlers("OTHER_EVENT"));
        assert_eq!(harness.manager.plugin_count(), 1);
    }

    #[test]
    fn test_unregister_restores_bus_state() {
        let harness = TestHarness::new();
        let bus = harness.manager.bus().clone();
        let _ui = bus.on("BOLD_CLICKED", Phase::After, |_, _| Ok(true)).unwrap();

        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();
        harness.manager.register(mark("shadow", "BOLD_CLICKED").create_default()).unwrap();
        assert_eq!(bus.handler_count("BOLD_CLICKED", Phase::On), 2);

        harness.manager.unregister("bold").unwrap();
        assert_eq!(bus.owners("BOLD_CLICKED", Phase::On), vec![Some("shadow".to_string())]);
        assert_eq!(bus.handler_count("BOLD_CLICKED", Phase::After), 1);

        harness.manager.unregister("shadow").unwrap();
        assert_eq!(bus.handler_count("BOLD_CLICKED", Phase::Before), 0);
        assert_eq!(bus.handler_count("BOLD_CLICKED", Phase::On), 0);
        assert_eq!(bus.handler_count("BOLD_CLICKED", Phase::After), 1);

        let err = harness.manager.unregister("bold").unwrap_err();
        assert!(matches!(err, PluginSystemError::PluginNotFound(_)));
    }

    #[test]
    fn test_fresh_instance_can_reuse_name() {
        let harness = TestHarness::new();
        let definition = mark("bold", "BOLD_CLICKED");
        harness.manager.register(definition.create_default()).unwrap();
        harness.manager.unregister("bold").unwrap();
        harness.manager.register(definition.create_default()).unwrap();
        assert!(harness.manager.emit("BOLD_CLICKED", json!({})).succeeded());
        assert_eq!(harness.commands.call_count(), 1);
    }

    #[test]
    fn test_disable_and_enable() {
        let harness = TestHarness::new();
        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();

        harness.manager.disable("bold").unwrap();
        assert!(!harness.manager.is_enabled("bold"));
        assert_eq!(harness.manager.statuses()[0].state, PluginState::Disabled);
        let report = harness.manager.emit("BOLD_CLICKED", json!({}));
        assert_eq!(report.on_succeeded, 0);
        assert_eq!(harness.commands.call_count(), 0);

        harness.manager.enable("bold").unwrap();
        assert!(harness.manager.emit("BOLD_CLICKED", json!({})).succeeded());
        assert!(harness.manager.disable("missing").is_err());
    }

    #[test]
    fn test_exclusive_on_handlers() {
        let harness = TestHarness::with_config(ManagerConfig {
            exclusive_on_handlers: true,
            max_plugins: None,
        });
        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();
        let err = harness
            .manager
            .register(mark("bold_again", "BOLD_CLICKED").create_default())
            .unwrap_err();
        assert!(matches!(err, PluginSystemError::HandlerConflict { .. }));
        assert!(!harness.manager.is_registered("bold_again"));
    }

    #[test]
    fn test_exclusivity_ignores_non_plugin_listeners() {
        let harness = TestHarness::with_config(ManagerConfig {
            exclusive_on_handlers: true,
            max_plugins: None,
        });
        let bus = harness.manager.bus().clone();
        let _ui = bus.on("BOLD_CLICKED", Phase::On, |_, _| Ok(true)).unwrap();
        let _tool = bus.on_owned("toolbar", "BOLD_CLICKED", Phase::On, |_, _| Ok(true)).unwrap();

        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();
        assert_eq!(bus.handler_count("BOLD_CLICKED", Phase::On), 3);

        harness.manager.unregister("bold").unwrap();
        harness.manager.register(mark("shadow", "BOLD_CLICKED").create_default()).unwrap();
        assert!(harness.manager.is_registered("shadow"));
    }

    #[test]
    fn test_lifecycle_is_logged_through_injected_logger() {
        let harness = TestHarness::new();
        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();
        assert!(harness.logger.contains(LogLevel::Info, "Registered plugin bold"));

        assert!(harness.manager.register(mark("bold", "OTHER").create_default()).is_err());
        assert!(harness.logger.contains(LogLevel::Warn, "Plugin bold is already registered"));

        assert!(harness.manager.unregister("missing").is_err());
        assert!(harness.logger.contains(LogLevel::Warn, "unknown plugin missing"));

        harness.manager.disable("bold").unwrap();
        assert!(harness.logger.contains(LogLevel::Info, "Plugin bold disabled"));

        let from_manager = harness
            .logger
            .records()
            .into_iter()
            .filter(|r| r.source == "manager")
            .count();
        assert_eq!(from_manager, 4);
    }

    #[test]
    fn test_plugin_limit() {
        let harness = TestHarness::with_config(ManagerConfig {
            exclusive_on_handlers: false,
            max_plugins: Some(1),
        });
        harness.manager.register(mark("a", "A").create_default()).unwrap();
        let err = harness.manager.register(mark("b", "B").create_default()).unwrap_err();
        assert!(matches!(err, PluginSystemError::LimitExceeded(1)));
    }

    #[test]
    fn test_blank_names_and_bad_event_names_rejected() {
        let harness = TestHarness::new();
        let err = harness.manager.register(mark("  ", "A").create_default()).unwrap_err();
        assert!(matches!(err, PluginSystemError::InvalidPlugin(_)));

        let err = harness.manager.register(mark("empty_event", "").create_default()).unwrap_err();
        assert!(matches!(err, PluginSystemError::EventError(_)));
        assert!(!harness.manager.is_registered("empty_event"));
        assert_eq!(harness.manager.bus().total_handlers(), 0);
    }

    #[test]
    fn test_enumeration_order_and_shutdown() {
        let harness = TestHarness::new();
        for (name, event) in [("zeta", "Z"), ("alpha", "A"), ("mid", "M")] {
            harness.manager.register(mark(name, event).create_default()).unwrap();
        }
        assert_eq!(harness.manager.plugin_names(), vec!["zeta", "alpha", "mid"]);
        let statuses = harness.manager.statuses();
        assert_eq!(statuses[1].events, vec![EventName::new("A")]);
        assert_eq!(statuses[1].options["eventName"], "A");

        harness.manager.shutdown();
        assert_eq!(harness.manager.plugin_count(), 0);
        assert_eq!(harness.manager.bus().total_handlers(), 0);
    }

    #[test]
    fn test_composition_veto_is_logged_as_warning() {
        let harness = TestHarness::new();
        harness.manager.register(mark("bold", "BOLD_CLICKED").create_default()).unwrap();
        harness.selection.composition_start();

        let report = harness.manager.emit("BOLD_CLICKED", json!({}));
        assert!(report.is_blocked());
        assert_eq!(report.blocked_by.as_deref(), Some("bold"));
        assert_eq!(harness.commands.call_count(), 0);
        assert!(harness.logger.contains(LogLevel::Warn, "composing"));
    }
}
