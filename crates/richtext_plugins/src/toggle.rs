//! Inline toggle plugins (bold, italic, ...)
//!
//! All of them share one shape: gate on composition in `before`, run a
//! value-less command in `on`, then announce the new style state.

use crate::events;
use crate::guard::{composition_gate, CommonOptions, WithCommon};
use richtext_core::{define_plugin, Command, HandlerMap, PhaseHandlers, PluginDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOptions {
    #[serde(flatten)]
    pub common: CommonOptions,
}

impl WithCommon for ToggleOptions {
    fn common(&self) -> &CommonOptions {
        &self.common
    }
}

/// Static description of one toggle plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleStyle {
    pub plugin: &'static str,
    pub event: &'static str,
    pub command: &'static str,
    pub style: &'static str,
}

pub const BOLD: ToggleStyle = ToggleStyle {
    plugin: "bold",
    event: events::BOLD_CLICKED,
    command: "bold",
    style: "bold",
};

pub const ITALIC: ToggleStyle = ToggleStyle {
    plugin: "italic",
    event: events::ITALIC_CLICKED,
    command: "italic",
    style: "italic",
};

pub const UNDERLINE: ToggleStyle = ToggleStyle {
    plugin: "underline",
    event: events::UNDERLINE_CLICKED,
    command: "underline",
    style: "underline",
};

pub const STRIKETHROUGH: ToggleStyle = ToggleStyle {
    plugin: "strikethrough",
    event: events::STRIKETHROUGH_CLICKED,
    command: "strikeThrough",
    style: "strikethrough",
};

pub const SUPERSCRIPT: ToggleStyle = ToggleStyle {
    plugin: "superscript",
    event: events::SUPERSCRIPT_CLICKED,
    command: "superscript",
    style: "superscript",
};

pub const SUBSCRIPT: ToggleStyle = ToggleStyle {
    plugin: "subscript",
    event: events::SUBSCRIPT_CLICKED,
    command: "subscript",
    style: "subscript",
};

pub const CLEAR_FORMATTING: ToggleStyle = ToggleStyle {
    plugin: "clear_formatting",
    event: events::CLEAR_FORMATTING_CLICKED,
    command: "removeFormat",
    style: "clearFormatting",
};

pub const ALL_TOGGLES: [ToggleStyle; 7] = [
    BOLD,
    ITALIC,
    UNDERLINE,
    STRIKETHROUGH,
    SUPERSCRIPT,
    SUBSCRIPT,
    CLEAR_FORMATTING,
];

/// Build the plugin definition for a toggle style
pub fn toggle_plugin(toggle: ToggleStyle) -> PluginDefinition<ToggleOptions> {
    define_plugin(
        toggle.plugin,
        ToggleOptions {
            common: CommonOptions::new(toggle.event),
        },
        move |options| {
            HandlerMap::new().event(
                options.common.event_name.as_str(),
                PhaseHandlers::<ToggleOptions>::new()
                    .before(|ctx, _| composition_gate(ctx))
                    .on(move |ctx, _| {
                        ctx.execute(&Command::new(toggle.command))?;
                        let state = ctx.commands().query_state(toggle.command);
                        ctx.notify_style_change(toggle.style, state.map(Value::Bool));
                        Ok(true)
                    }),
            )
        },
    )
}

pub fn bold() -> PluginDefinition<ToggleOptions> {
    toggle_plugin(BOLD)
}

pub fn italic() -> PluginDefinition<ToggleOptions> {
    toggle_plugin(ITALIC)
}

pub fn underline() -> PluginDefinition<ToggleOptions> {
    toggle_plugin(UNDERLINE)
}

pub fn strikethrough() -> PluginDefinition<ToggleOptions> {
    toggle_plugin(STRIKETHROUGH)
}

pub fn superscript() -> PluginDefinition<ToggleOptions> {
    toggle_plugin(SUPERSCRIPT)
}

pub fn subscript() -> PluginDefinition<ToggleOptions> {
    toggle_plugin(SUBSCRIPT)
}

pub fn clear_formatting() -> PluginDefinition<ToggleOptions> {
    toggle_plugin(CLEAR_FORMATTING)
}
