//! Background and font colour plugins

use crate::events;
use crate::guard::{composition_gate, is_allowed, CommonOptions, WithCommon};
use richtext_core::{
    define_plugin, Command, EventError, EventPayload, HandlerMap, PhaseHandlers, PluginDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload field carrying the requested colour
pub const COLOR_FIELD: &str = "color";

const NAMED_COLORS: &[&str] = &[
    "transparent",
    "black",
    "silver",
    "gray",
    "grey",
    "white",
    "maroon",
    "red",
    "purple",
    "fuchsia",
    "magenta",
    "green",
    "lime",
    "olive",
    "yellow",
    "navy",
    "blue",
    "teal",
    "aqua",
    "cyan",
    "orange",
    "pink",
    "brown",
    "gold",
    "indigo",
    "violet",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorOptions {
    #[serde(flatten)]
    pub common: CommonOptions,
    /// Only these colours may be applied; `None` allows any valid colour
    pub allowed_colors: Option<Vec<String>>,
    /// Reject strings that are not recognisable CSS colours
    pub validate_format: bool,
}

impl ColorOptions {
    pub fn new(event_name: &str) -> Self {
        Self {
            common: CommonOptions::new(event_name),
            allowed_colors: None,
            validate_format: true,
        }
    }
}

impl WithCommon for ColorOptions {
    fn common(&self) -> &CommonOptions {
        &self.common
    }
}

/// Static description of one colour plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorStyle {
    pub plugin: &'static str,
    pub event: &'static str,
    pub command: &'static str,
    pub style: &'static str,
}

pub const BACKGROUND_COLOR: ColorStyle = ColorStyle {
    plugin: "background_color",
    event: events::BACKGROUND_COLOR_CHANGED,
    command: "backColor",
    style: "backgroundColor",
};

pub const FONT_COLOR: ColorStyle = ColorStyle {
    plugin: "font_color",
    event: events::FONT_COLOR_CHANGED,
    command: "foreColor",
    style: "color",
};

/// The trimmed `color` string, or `None` when missing, blank or not a string
pub fn extract_color(payload: &EventPayload) -> Option<String> {
    payload
        .str_field(COLOR_FIELD)
        .map(str::trim)
        .filter(|color| !color.is_empty())
        .map(str::to_string)
}

fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(digits) => {
            matches!(digits.len(), 3 | 4 | 6 | 8) && digits.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

fn is_functional_color(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    let Some(open) = lower.find('(') else {
        return false;
    };
    if !matches!(&lower[..open], "rgb" | "rgba" | "hsl" | "hsla") {
        return false;
    }
    let Some(inner) = lower[open + 1..].strip_suffix(')') else {
        return false;
    };

    let args: Vec<&str> = inner
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|arg| !arg.is_empty())
        .collect();
    if !matches!(args.len(), 3 | 4) {
        return false;
    }
    args.iter().all(|arg| {
        let number = arg
            .strip_suffix('%')
            .or_else(|| arg.strip_suffix("deg"))
            .unwrap_or(arg);
        number.parse::<f64>().map(f64::is_finite).unwrap_or(false)
    })
}

/// Hex, `rgb()/rgba()/hsl()/hsla()` notation, or a basic named colour
pub fn is_valid_color(value: &str) -> bool {
    let value = value.trim();
    is_hex_color(value)
        || is_functional_color(value)
        || NAMED_COLORS.iter().any(|name| name.eq_ignore_ascii_case(value))
}

fn check_color(options: &ColorOptions, payload: &EventPayload) -> Result<String, String> {
    let color = extract_color(payload).ok_or_else(|| "no color provided".to_string())?;
    if options.validate_format && !is_valid_color(&color) {
        return Err(format!("invalid color format: {}", color));
    }
    if !is_allowed(&color, options.allowed_colors.as_deref()) {
        return Err(format!("color {} is not allowed", color));
    }
    Ok(color)
}

/// Build the plugin definition for a colour style
pub fn color_plugin(color: ColorStyle) -> PluginDefinition<ColorOptions> {
    define_plugin(color.plugin, ColorOptions::new(color.event), move |options| {
        HandlerMap::new().event(
            options.common.event_name.as_str(),
            PhaseHandlers::<ColorOptions>::new()
                .before(|ctx, payload| {
                    if !composition_gate(ctx)? {
                        return Ok(false);
                    }
                    match check_color(ctx.options(), payload) {
                        Ok(_) => Ok(true),
                        Err(reason) => ctx.veto(&reason),
                    }
                })
                .on(move |ctx, payload| {
                    let value = extract_color(payload)
                        .ok_or_else(|| EventError::InvalidPayload("no color provided".to_string()))?;
                    ctx.execute(&Command::new(color.command).with_value(value.as_str()))?;
                    ctx.notify_style_change(color.style, Some(Value::String(value)));
                    Ok(true)
                }),
        )
    })
}

pub fn background_color() -> PluginDefinition<ColorOptions> {
    color_plugin(BACKGROUND_COLOR)
}

pub fn font_color() -> PluginDefinition<ColorOptions> {
    color_plugin(FONT_COLOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_color_formats() {
        for valid in [
            "#FFF",
            "#ffff",
            "#FFFF00",
            "#ffff0080",
            "rgb(255, 0, 0)",
            "RGBA(255,0,0,0.5)",
            "rgb(255 0 0 / 50%)",
            "hsl(120deg, 100%, 50%)",
            "hsla(120, 100%, 50%, 0.3)",
            "transparent",
            "Red",
        ] {
            assert!(is_valid_color(valid), "{} should be valid", valid);
        }

        for invalid in ["#FFFF0", "#GGGGGG", "FFFF00", "rgb(1,2)", "rgb(a,b,c)", "cmyk(1,2,3,4)", "rgb(1,2,3", "reddish"] {
            assert!(!is_valid_color(invalid), "{} should be invalid", invalid);
        }
    }

    #[test]
    fn test_extract_color_requires_string() {
        assert_eq!(extract_color(&json!({ "color": " #FFFF00 " }).into()), Some("#FFFF00".to_string()));
        assert_eq!(extract_color(&json!({ "color": 123 }).into()), None);
        assert_eq!(extract_color(&json!({ "color": "   " }).into()), None);
        assert_eq!(extract_color(&json!({}).into()), None);
    }

    #[test]
    fn test_check_color_order() {
        let mut options = ColorOptions::new("X");
        options.allowed_colors = Some(vec!["#00FFFF".to_string()]);

        let missing = check_color(&options, &json!({ "color": 123 }).into()).unwrap_err();
        assert_eq!(missing, "no color provided");

        let malformed = check_color(&options, &json!({ "color": "nope" }).into()).unwrap_err();
        assert!(malformed.starts_with("invalid color format"));

        let disallowed = check_color(&options, &json!({ "color": "#FFFF00" }).into()).unwrap_err();
        assert!(disallowed.contains("not allowed"));

        assert_eq!(check_color(&options, &json!({ "color": "#00ffff" }).into()).unwrap(), "#00ffff");

        options.validate_format = false;
        options.allowed_colors = None;
        assert_eq!(check_color(&options, &json!({ "color": "nope" }).into()).unwrap(), "nope");
    }

    #[test]
    fn test_color_options_serialize_camel_case() {
        let value = serde_json::to_value(ColorOptions::new("BACKGROUND_COLOR_CHANGED")).unwrap();
        assert_eq!(
            value,
            json!({
                "eventName": "BACKGROUND_COLOR_CHANGED",
                "checkComposition": true,
                "allowedColors": null,
                "validateFormat": true
            })
        );
    }
}
