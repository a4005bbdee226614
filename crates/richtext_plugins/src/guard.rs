//! Options and guards shared by every built-in plugin

use richtext_core::{EventError, PluginContext};
use serde::{Deserialize, Serialize};

/// Options every built-in plugin accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonOptions {
    /// Event that triggers the plugin
    pub event_name: String,
    /// Veto while an IME composition is open
    pub check_composition: bool,
}

impl CommonOptions {
    pub fn new(event_name: &str) -> Self {
        Self {
            event_name: event_name.to_string(),
            check_composition: true,
        }
    }
}

/// Implemented by every options type that flattens [`CommonOptions`]
pub trait WithCommon {
    fn common(&self) -> &CommonOptions;
}

/// `Ok(false)` (after logging a warning) while composing, when the plugin checks composition
pub fn composition_gate<O: WithCommon>(ctx: &PluginContext<'_, O>) -> Result<bool, EventError> {
    if ctx.options().common().check_composition && ctx.is_composing() {
        return ctx.veto("IME composition in progress");
    }
    Ok(true)
}

/// ASCII case-insensitive allow-list check; no list means everything is allowed
pub fn is_allowed(value: &str, allowed: Option<&[String]>) -> bool {
    match allowed {
        None => true,
        Some(list) => list.iter().any(|entry| entry.trim().eq_ignore_ascii_case(value)),
    }
}
