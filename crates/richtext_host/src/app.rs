//! Main application logic and lifecycle management.
//!
//! The `Application` struct loads configuration, builds the editing session,
//! drives it from a script or stdin, and shuts the plugins down afterwards.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::display_banner;
use crate::session::{Session, SessionSummary};
use crate::signals::wait_for_shutdown;
use anyhow::{anyhow, Context};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{info, warn};

pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Script to run instead of stdin
    script: Option<PathBuf>,
    session: Session,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Register the configured plugins
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let session = Session::new(&config)?;

        Ok(Self {
            config,
            script: args.script,
            session,
        })
    }

    /// Runs the session to completion, then shuts the plugins down.
    pub async fn run(self) -> anyhow::Result<()> {
        self.log_configuration_summary();

        let summary = match &self.script {
            Some(path) => {
                info!("📜 Running script {}", path.display());
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("opening script {}", path.display()))?;
                self.session
                    .run(BufReader::new(file), tokio::io::stdout())
                    .await?
            }
            None => {
                info!("⌨️ Reading commands from stdin, Ctrl+C to stop");
                tokio::select! {
                    summary = self.session.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => summary?,
                    signal = wait_for_shutdown() => {
                        signal?;
                        SessionSummary::default()
                    }
                }
            }
        };

        if summary.errors > 0 {
            warn!("⚠️ {} of {} commands failed", summary.errors, summary.commands);
        }

        info!("🔌 Shutting down plugins...");
        self.session.shutdown();
        self.log_final_statistics(&summary);

        info!("👋 Session complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🔌 Plugins: {}", self.session.manager().plugin_names().join(", "));
        info!(
            "  🧱 Exclusive on handlers: {}",
            self.config.plugins.exclusive_on_handlers
        );
        info!("  📝 Initial content: {} chars", self.config.editor.initial_content.chars().count());
    }

    /// Logs final statistics during shutdown.
    fn log_final_statistics(&self, summary: &SessionSummary) {
        let stats = self.session.manager().bus().stats();
        info!("📊 Final Statistics:");
        info!("  - Commands run: {}", summary.commands);
        info!("  - Dispatches: {}", stats.dispatches);
        info!("  - Blocked: {}", stats.blocked);
        info!("  - Handler failures: {}", stats.handler_failures);
    }
}
