//! # Richtext Core
//!
//! Event-driven engine behind a rich-text formatting toolbar. UI gestures
//! become named events; plugins attach guard, effect and reaction handlers to
//! those events and turn them into editing commands.
//!
//! ## Architecture
//!
//! - **EventBus**: three ordered handler slots per event name (`before`, `on`,
//!   `after`). A `before` veto blocks the dispatch; failures in `on` and
//!   `after` are contained and reported.
//! - **PluginDefinition**: a name, typed default options and a builder from
//!   resolved options to handlers. `create` yields independent instances.
//! - **PluginManager**: owns registered instances, removes all of a plugin's
//!   handlers in one call, and can disable a plugin without unregistering it.
//! - **EditorContext**: the injected collaborators: a [`SelectionState`]
//!   for IME composition, a [`CommandExecutor`] for document mutation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use richtext_core::{
//!     define_plugin, Command, CommandExecutor, CompositionTracker, EditorContext, EventBus,
//!     EventPayload, HandlerMap, ManagerConfig, PhaseHandlers, PluginManager, PluginSystemError,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct BoldOptions {
//!     event_name: String,
//! }
//!
//! let bold = define_plugin(
//!     "bold",
//!     BoldOptions { event_name: "BOLD_CLICKED".into() },
//!     |options| {
//!         HandlerMap::new().event(
//!             options.event_name.as_str(),
//!             PhaseHandlers::<BoldOptions>::new()
//!                 .before(|ctx, _| Ok(!ctx.is_composing()))
//!                 .on(|ctx, _| {
//!                     ctx.execute(&Command::new("bold"))?;
//!                     Ok(true)
//!                 }),
//!         )
//!     },
//! );
//!
//! # fn surface() -> Arc<dyn CommandExecutor> { unimplemented!() }
//! let editor = EditorContext::new(Arc::new(CompositionTracker::new()), surface());
//! let manager = PluginManager::new(EventBus::new(), Arc::new(editor), ManagerConfig::default());
//! manager.register(bold.create_default())?;
//! manager.emit("BOLD_CLICKED", EventPayload::new());
//! # Ok::<(), PluginSystemError>(())
//! ```

pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod logging;
pub mod manager;
pub mod payload;
pub mod plugin;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use command::{Command, CommandExecutor};
pub use context::{
    CompositionTracker, EditorContext, Invocation, PluginContext, SelectionRange, SelectionState,
};
pub use error::{CommandError, EventError, PluginSystemError};
pub use event::{
    Dispatch, DispatchOutcome, DispatchReport, EventBus, EventName, EventStats, Handler,
    HandlerFailure, Phase, Subscription, WeakEventBus, MAX_DISPATCH_DEPTH,
};
pub use logging::{DispatchLogger, LogLevel, LogRecord, NullLogger, TracingLogger};
pub use manager::{ManagerConfig, PluginManager, PluginState, PluginStatus};
pub use payload::{EventPayload, StyleChange, STYLE_CHANGED};
pub use plugin::{
    define_plugin, merge_options, HandlerMap, PhaseHandlers, PluginDefinition, PluginFactory,
    PluginInstance, PluginOptions,
};

/// Version information
pub const RICHTEXT_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the system
pub type Result<T> = std::result::Result<T, PluginSystemError>;
