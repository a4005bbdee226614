//! Error types for the formatting engine core

/// Main error type for plugin registration and lifecycle
#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    /// A plugin with the same name is already registered
    #[error("Plugin already exists: {0}")]
    PluginAlreadyExists(String),

    /// No plugin with that name is registered
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// The plugin instance itself is malformed (blank name, etc.)
    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),

    /// Caller supplied options could not be merged over the defaults
    #[error("Invalid options for plugin {plugin}: {reason}")]
    InvalidOptions { plugin: String, reason: String },

    /// Registering would exceed the configured plugin limit
    #[error("Plugin limit of {0} reached")]
    LimitExceeded(usize),

    /// Another plugin already owns the `on` phase of this event
    #[error("Plugin {plugin} conflicts with an existing `on` handler for {event}")]
    HandlerConflict { plugin: String, event: String },

    /// Event system error
    #[error("Event system error: {0}")]
    EventError(#[from] EventError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Errors that can occur while registering or running event handlers
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Event names must be non-empty
    #[error("Invalid event name: {0:?}")]
    InvalidEventName(String),

    /// Handler execution failed
    #[error("Handler execution failed: {0}")]
    HandlerExecutionFailed(String),

    /// Handler panicked and was caught at the bus boundary
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    /// Payload did not have the shape the handler needs
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The command adapter refused or failed
    #[error("Command failed: {0}")]
    CommandFailed(#[from] CommandError),

    /// Nested emits went deeper than the bus allows
    #[error("Dispatch of {event} exceeded nesting depth {depth}")]
    RecursionLimit { event: String, depth: usize },
}

/// Errors raised by a [`CommandExecutor`](crate::command::CommandExecutor)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The editing surface does not know this command
    #[error("Unsupported command: {0}")]
    Unsupported(String),

    /// The command is known but cannot apply right now
    #[error("Command {command} rejected: {reason}")]
    Rejected { command: String, reason: String },

    /// The editing surface itself failed
    #[error("Editing surface error: {0}")]
    Surface(String),
}

impl From<serde_json::Error> for PluginSystemError {
    fn from(err: serde_json::Error) -> Self {
        PluginSystemError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::InvalidPayload(err.to_string())
    }
}
