//! Line-oriented session driving the formatting engine.
//!
//! Each line is one command, standing in for a UI gesture or an editor
//! collaborator call:
//!
//! ```text
//! # comment
//! select 0 5
//! emit BACKGROUND_COLOR_CHANGED {"color": "#FFFF00"}
//! compose start
//! emit SUPERSCRIPT_CLICKED
//! compose end
//! disable bold
//! plugins
//! styles
//! ```

use crate::config::AppConfig;
use crate::document::InMemoryDocument;
use anyhow::{bail, Context};
use richtext_core::{
    CommandExecutor, CompositionTracker, DispatchOutcome, DispatchReport, EditorContext, EventBus,
    EventName, EventPayload, Phase, PluginManager, PluginState, SelectionRange, StyleChange,
    Subscription, STYLE_CHANGED,
};
use richtext_plugins::instantiate;
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Emit { event: EventName, payload: EventPayload },
    Compose(bool),
    Select { anchor: usize, focus: usize },
    Enable(String),
    Disable(String),
    Unregister(String),
    Plugins,
    Content(Option<String>),
    Styles,
    Stats,
}

fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}

fn plugin_arg(verb: &str, rest: &str) -> anyhow::Result<String> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        bail!("usage: {verb} <plugin>");
    }
    Ok(rest.to_string())
}

impl FromStr for ScriptCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (verb, rest) = split_word(line.trim());
        let command = match verb {
            "emit" => {
                let (event, json) = split_word(rest);
                if event.is_empty() {
                    bail!("usage: emit <EVENT> [json-object]");
                }
                let payload = if json.is_empty() {
                    EventPayload::new()
                } else {
                    let value: Value =
                        serde_json::from_str(json).with_context(|| format!("bad payload for {event}"))?;
                    if !value.is_object() {
                        bail!("payload for {event} must be a JSON object");
                    }
                    EventPayload::from_value(value)
                };
                ScriptCommand::Emit {
                    event: EventName::new(event),
                    payload,
                }
            }
            "compose" => match rest {
                "start" => ScriptCommand::Compose(true),
                "end" => ScriptCommand::Compose(false),
                _ => bail!("usage: compose start|end"),
            },
            "select" => {
                let (anchor, focus) = split_word(rest);
                let anchor = anchor.parse().context("usage: select <anchor> <focus>")?;
                let focus = focus.parse().context("usage: select <anchor> <focus>")?;
                ScriptCommand::Select { anchor, focus }
            }
            "enable" => ScriptCommand::Enable(plugin_arg(verb, rest)?),
            "disable" => ScriptCommand::Disable(plugin_arg(verb, rest)?),
            "unregister" => ScriptCommand::Unregister(plugin_arg(verb, rest)?),
            "plugins" => ScriptCommand::Plugins,
            "content" if rest.is_empty() => ScriptCommand::Content(None),
            "content" => ScriptCommand::Content(Some(rest.to_string())),
            "styles" => ScriptCommand::Styles,
            "stats" => ScriptCommand::Stats,
            other => bail!("unknown command `{other}`"),
        };
        Ok(command)
    }
}

/// `None` for blank lines and `#` comments
pub fn parse_line(line: &str) -> anyhow::Result<Option<ScriptCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    line.parse().map(Some)
}

fn describe_report(report: &DispatchReport) -> String {
    match report.outcome {
        DispatchOutcome::Unhandled => format!("{}: no handlers", report.event),
        DispatchOutcome::Blocked => format!(
            "{}: blocked by {}",
            report.event,
            report.blocked_by.as_deref().unwrap_or("bus")
        ),
        DispatchOutcome::Completed if report.on_succeeded == 0 && report.on_failed == 0 => {
            format!("{}: no active handlers", report.event)
        }
        DispatchOutcome::Completed if report.on_failed > 0 => format!(
            "{}: {} applied, {} failed",
            report.event, report.on_succeeded, report.on_failed
        ),
        DispatchOutcome::Completed => format!("{}: applied", report.event),
    }
}

/// Counters for one [`Session::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub commands: usize,
    pub errors: usize,
}

/// A document, its plugins, and the toolbar stand-in listening for style changes
pub struct Session {
    manager: PluginManager,
    selection: Arc<CompositionTracker>,
    document: Arc<InMemoryDocument>,
    notifications: Arc<Mutex<Vec<StyleChange>>>,
    _toolbar: Subscription,
}

impl Session {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let selection = Arc::new(CompositionTracker::new());
        let document = Arc::new(InMemoryDocument::new(&config.editor.initial_content));
        let editor = EditorContext::new(selection.clone(), document.clone())
            .with_metadata("host", env!("CARGO_PKG_NAME"));
        let manager = PluginManager::new(EventBus::new(), Arc::new(editor), config.to_manager_config());

        for name in config.selected_plugins() {
            let instance = instantiate(&name, config.plugins.options.get(&name))
                .with_context(|| format!("creating plugin {name}"))?;
            manager
                .register(instance)
                .with_context(|| format!("registering plugin {name}"))?;
        }

        let notifications = Arc::new(Mutex::new(Vec::new()));
        let sink = notifications.clone();
        let toolbar = manager.bus().on(STYLE_CHANGED, Phase::On, move |_, payload| {
            let Some(change) = StyleChange::from_payload(payload) else {
                warn!("🎨 Toolbar ignored a style change without a style");
                return Ok(false);
            };
            match &change.value {
                Some(value) => info!("🎨 Toolbar: {} = {}", change.style, value),
                None => info!("🎨 Toolbar: {} updated", change.style),
            }
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(change);
            Ok(true)
        })?;

        info!("✍️ Session ready with {} plugins", manager.plugin_count());
        Ok(Self {
            manager,
            selection,
            document,
            notifications,
            _toolbar: toolbar,
        })
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn document(&self) -> &InMemoryDocument {
        &self.document
    }

    /// Style changes the toolbar has seen, oldest first
    pub fn notifications(&self) -> Vec<StyleChange> {
        self.notifications.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Run one command and describe the result
    pub fn execute(&self, command: ScriptCommand) -> anyhow::Result<String> {
        let output = match command {
            ScriptCommand::Emit { event, payload } => {
                let report = self.manager.emit(event, payload);
                describe_report(&report)
            }
            ScriptCommand::Compose(true) => {
                self.selection.composition_start();
                "composition started".to_string()
            }
            ScriptCommand::Compose(false) => {
                self.selection.composition_end();
                "composition ended".to_string()
            }
            ScriptCommand::Select { anchor, focus } => {
                let range = SelectionRange::new(anchor, focus);
                self.selection.set_selection(range);
                format!("selected {}..{}", range.start(), range.end())
            }
            ScriptCommand::Enable(name) => {
                self.manager.enable(&name)?;
                format!("{name} enabled")
            }
            ScriptCommand::Disable(name) => {
                self.manager.disable(&name)?;
                format!("{name} disabled")
            }
            ScriptCommand::Unregister(name) => {
                self.manager.unregister(&name)?;
                format!("{name} unregistered")
            }
            ScriptCommand::Plugins => self
                .manager
                .statuses()
                .iter()
                .map(|status| {
                    let state = match status.state {
                        PluginState::Active => "active",
                        PluginState::Disabled => "disabled",
                    };
                    let events: Vec<&str> = status.events.iter().map(|e| e.as_str()).collect();
                    format!("{} ({}) [{}]", status.name, state, events.join(", "))
                })
                .collect::<Vec<_>>()
                .join("\n"),
            ScriptCommand::Content(None) => self.document.content(),
            ScriptCommand::Content(Some(text)) => {
                self.document.set_content(&text)?;
                "content replaced".to_string()
            }
            ScriptCommand::Styles => {
                let styles = self.document.styles();
                if styles.is_empty() {
                    "no styles applied".to_string()
                } else {
                    let mut parts: Vec<String> = styles
                        .toggles
                        .iter()
                        .filter(|(_, on)| **on)
                        .map(|(name, _)| name.clone())
                        .collect();
                    parts.extend(styles.values.iter().map(|(name, value)| format!("{name}={value}")));
                    parts.join(" ")
                }
            }
            ScriptCommand::Stats => {
                let stats = self.manager.bus().stats();
                format!(
                    "dispatches={} blocked={} unhandled={} failures={} handlers={}",
                    stats.dispatches,
                    stats.blocked,
                    stats.unhandled,
                    stats.handler_failures,
                    stats.total_handlers
                )
            }
        };
        Ok(output)
    }

    /// Execute every line of `reader`, writing results to `out`.
    ///
    /// Bad lines are logged and counted; they do not end the session.
    pub async fn run<R, W>(&self, mut reader: R, mut out: W) -> anyhow::Result<SessionSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut summary = SessionSummary::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let raw = strip_line_ending(&buf);
            let result = std::str::from_utf8(raw)
                .context("line is not valid UTF-8")
                .and_then(parse_line)
                .and_then(|command| match command {
                    Some(command) => self.execute(command).map(Some),
                    None => Ok(None),
                });
            match result {
                Ok(Some(output)) => {
                    summary.commands += 1;
                    out.write_all(output.as_bytes()).await?;
                    out.write_all(b"\n").await?;
                }
                Ok(None) => {}
                Err(e) => {
                    summary.commands += 1;
                    summary.errors += 1;
                    warn!("⚠️ {}: {:#}", String::from_utf8_lossy(raw).trim(), e);
                    out.write_all(format!("error: {e:#}\n").as_bytes()).await?;
                }
            }
        }
        out.flush().await?;

        Ok(summary)
    }

    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
