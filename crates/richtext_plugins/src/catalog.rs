//! Lookup of built-in plugins by name

use crate::{color, font, toggle};
use richtext_core::{PluginFactory, PluginInstance, PluginSystemError};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Every built-in plugin, toggles first
pub fn builtin_factories() -> Vec<Arc<dyn PluginFactory>> {
    let mut factories: Vec<Arc<dyn PluginFactory>> = toggle::ALL_TOGGLES
        .iter()
        .map(|t| Arc::new(toggle::toggle_plugin(*t)) as Arc<dyn PluginFactory>)
        .collect();
    factories.push(Arc::new(color::background_color()));
    factories.push(Arc::new(color::font_color()));
    factories.push(Arc::new(font::font_family()));
    factories.push(Arc::new(font::font_size()));
    factories
}

pub fn builtin_names() -> Vec<String> {
    builtin_factories()
        .iter()
        .map(|f| f.plugin_name().to_string())
        .collect()
}

pub fn find_factory(name: &str) -> Option<Arc<dyn PluginFactory>> {
    builtin_factories().into_iter().find(|f| f.plugin_name() == name)
}

/// Create a built-in plugin by name with optional option overrides
pub fn instantiate(name: &str, overrides: Option<&Value>) -> Result<PluginInstance, PluginSystemError> {
    let factory = find_factory(name).ok_or_else(|| PluginSystemError::PluginNotFound(name.to_string()))?;
    let instance = factory.create(overrides)?;
    debug!("🧩 Created plugin {} with options {}", name, instance.options());
    Ok(instance)
}
