//! Configuration management for the richtext host.
//!
//! This module handles loading, validation, and conversion of the host
//! configuration from TOML files and command-line overrides.

use anyhow::Context;
use richtext_core::ManagerConfig;
use richtext_plugins::builtin_names;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Editing surface settings
    #[serde(default)]
    pub editor: EditorSettings,
    /// Plugin selection and per-plugin options
    #[serde(default)]
    pub plugins: PluginSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorSettings {
    /// Document content the session starts with
    #[serde(default)]
    pub initial_content: String,
}

/// Plugin configuration settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Built-in plugins to register; empty registers all of them
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Reject two plugins claiming the `on` phase of one event
    #[serde(default)]
    pub exclusive_on_handlers: bool,
    #[serde(default)]
    pub max_plugins: Option<usize>,
    /// Option overrides keyed by plugin name, e.g. `[plugins.options.font_size]`
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

/// Logging configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            exclusive_on_handlers: self.plugins.exclusive_on_handlers,
            max_plugins: self.plugins.max_plugins,
        }
    }

    /// Names of the plugins to register, in registration order
    pub fn selected_plugins(&self) -> Vec<String> {
        if self.plugins.enabled.is_empty() {
            builtin_names()
        } else {
            self.plugins.enabled.clone()
        }
    }

    /// Validates the configuration settings.
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        let known = builtin_names();
        for name in &self.plugins.enabled {
            if !known.contains(name) {
                return Err(format!("Unknown plugin in plugins.enabled: {name}"));
            }
        }

        let selected = self.selected_plugins();
        for (name, options) in &self.plugins.options {
            if !known.contains(name) {
                return Err(format!("Options given for unknown plugin: {name}"));
            }
            if !selected.contains(name) {
                return Err(format!("Options given for plugin {name}, which is not enabled"));
            }
            if !options.is_object() {
                return Err(format!("plugins.options.{name} must be a table"));
            }
        }

        if self.plugins.max_plugins == Some(0) {
            return Err("plugins.max_plugins must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.plugins.enabled.is_empty());
        assert_eq!(config.selected_plugins(), builtin_names());
        assert_eq!(config.to_manager_config(), ManagerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_plugin_options() {
        let config: AppConfig = toml::from_str(
            r##"
            [editor]
            initial_content = "Hello"

            [plugins]
            enabled = ["bold", "background_color"]
            exclusive_on_handlers = true

            [plugins.options.background_color]
            allowedColors = ["#00FFFF", "#FFFF00"]
            checkComposition = false

            [logging]
            level = "debug"
            "##,
        )
        .unwrap();

        assert_eq!(config.editor.initial_content, "Hello");
        assert_eq!(config.selected_plugins(), vec!["bold", "background_color"]);
        assert_eq!(
            config.plugins.options["background_color"],
            json!({ "allowedColors": ["#00FFFF", "#FFFF00"], "checkComposition": false })
        );
        assert!(config.to_manager_config().exclusive_on_handlers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.plugins.enabled = vec!["blink".to_string()];
        assert!(config.validate().unwrap_err().contains("blink"));

        let mut config = AppConfig::default();
        config.plugins.enabled = vec!["bold".to_string()];
        config
            .plugins
            .options
            .insert("italic".to_string(), json!({ "checkComposition": false }));
        assert!(config.validate().unwrap_err().contains("not enabled"));

        let mut config = AppConfig::default();
        config.plugins.options.insert("bold".to_string(), json!(3));
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.plugins.max_plugins = Some(0);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_existing_file() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "[logging]\nlevel = \"warn\"\njson_format = true\n")
            .await
            .unwrap();

        let config = AppConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json_format);
        assert_eq!(config.editor, EditorSettings::default());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "[logging\nlevel = ").await.unwrap();
        assert!(AppConfig::load_from_file(file.path()).await.is_err());
    }
}
