//! # Richtext Host
//!
//! Headless stand-in for the editor UI. It loads a TOML configuration,
//! registers the configured formatting plugins against an in-memory document
//! and turns script lines into bus events.
//!
//! ```text
//! richtext --config editor.toml --script demo.session --log-level debug
//! ```

use tracing::error;

mod app;
mod cli;
mod config;
mod document;
mod logging;
mod session;
mod signals;

use app::Application;
use cli::CliArgs;

/// Main entry point for the richtext host.
///
/// Handles the complete application lifecycle including:
/// 1. Command-line argument parsing
/// 2. Configuration loading and logging initialization
/// 3. Application creation and execution
///
/// Called from `main` under `#[tokio::main]`.
pub async fn init() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut logging_config = AppConfig::load_from_file(&args.config_path)
        .await
        .map(|config| config.logging)
        .unwrap_or_default();
    if let Some(level) = &args.log_level {
        logging_config.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&logging_config, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ Failed to start application: {e:#}");
            return Err(e);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Application error: {e:#}");
        return Err(e);
    }

    Ok(())
}

// Re-export main types for library usage
pub use config::{AppConfig, EditorSettings, LoggingSettings, PluginSettings};
pub use document::{AppliedStyles, InMemoryDocument};
pub use session::{parse_line, ScriptCommand, Session, SessionSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use richtext_core::CommandExecutor;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_application_runs_script() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let script_path = dir.path().join("demo.session");

        tokio::fs::write(
            &config_path,
            "[editor]\ninitial_content = \"Hello\"\n\n[plugins]\nenabled = [\"bold\", \"font_color\"]\n",
        )
        .await
        .unwrap();
        tokio::fs::write(
            &script_path,
            "emit BOLD_CLICKED\nemit FONT_COLOR_CHANGED {\"color\": \"red\"}\nstyles\n",
        )
        .await
        .unwrap();

        let args = CliArgs {
            config_path,
            script: Some(script_path),
            log_level: Some("debug".to_string()),
            json_logs: false,
        };
        let app = Application::new(args).await.unwrap();
        app.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_application_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        tokio::fs::write(&config_path, "[plugins]\nenabled = [\"blink\"]\n")
            .await
            .unwrap();

        let args = CliArgs {
            config_path,
            script: None,
            log_level: None,
            json_logs: false,
        };
        let err = Application::new(args).await.err().unwrap();
        assert!(err.to_string().contains("blink"));
    }

    #[tokio::test]
    async fn test_missing_config_creates_default_session() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("fresh.toml");
        let args = CliArgs {
            config_path: config_path.clone(),
            script: None,
            log_level: Some("warn".to_string()),
            json_logs: true,
        };

        Application::new(args).await.unwrap();
        assert!(config_path.exists());

        let session = Session::new(&AppConfig::default()).unwrap();
        assert_eq!(session.document().content(), "");
    }
}
