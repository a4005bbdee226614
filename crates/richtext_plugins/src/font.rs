//! Font family and font size plugins

use crate::events;
use crate::guard::{composition_gate, is_allowed, CommonOptions, WithCommon};
use richtext_core::{
    define_plugin, Command, EventError, EventPayload, HandlerMap, PhaseHandlers, PluginDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const FONT_FAMILY_FIELD: &str = "fontFamily";
pub const FONT_SIZE_FIELD: &str = "fontSize";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontFamilyOptions {
    #[serde(flatten)]
    pub common: CommonOptions,
    pub allowed_fonts: Option<Vec<String>>,
}

impl WithCommon for FontFamilyOptions {
    fn common(&self) -> &CommonOptions {
        &self.common
    }
}

/// Sizes follow the surface's 1 to 7 scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSizeOptions {
    #[serde(flatten)]
    pub common: CommonOptions,
    pub min_size: u8,
    pub max_size: u8,
}

impl WithCommon for FontSizeOptions {
    fn common(&self) -> &CommonOptions {
        &self.common
    }
}

pub fn extract_font_family(payload: &EventPayload) -> Option<String> {
    payload
        .str_field(FONT_FAMILY_FIELD)
        .map(str::trim)
        .filter(|family| !family.is_empty())
        .map(str::to_string)
}

/// The requested size if it is a whole number; strings and fractions read as absent
pub fn extract_font_size(payload: &EventPayload) -> Option<i64> {
    match payload.get(FONT_SIZE_FIELD)? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

pub fn font_family() -> PluginDefinition<FontFamilyOptions> {
    define_plugin(
        "font_family",
        FontFamilyOptions {
            common: CommonOptions::new(events::FONT_FAMILY_CHANGED),
            allowed_fonts: None,
        },
        |options| {
            HandlerMap::new().event(
                options.common.event_name.as_str(),
                PhaseHandlers::<FontFamilyOptions>::new()
                    .before(|ctx, payload| {
                        if !composition_gate(ctx)? {
                            return Ok(false);
                        }
                        let Some(family) = extract_font_family(payload) else {
                            return ctx.veto("no font family provided");
                        };
                        if !is_allowed(&family, ctx.options().allowed_fonts.as_deref()) {
                            return ctx.veto(&format!("font family {} is not allowed", family));
                        }
                        Ok(true)
                    })
                    .on(|ctx, payload| {
                        let family = extract_font_family(payload).ok_or_else(|| {
                            EventError::InvalidPayload("no font family provided".to_string())
                        })?;
                        ctx.execute(&Command::new("fontName").with_value(family.as_str()))?;
                        ctx.notify_style_change("fontFamily", Some(Value::String(family)));
                        Ok(true)
                    }),
            )
        },
    )
}

pub fn font_size() -> PluginDefinition<FontSizeOptions> {
    define_plugin(
        "font_size",
        FontSizeOptions {
            common: CommonOptions::new(events::FONT_SIZE_CHANGED),
            min_size: 1,
            max_size: 7,
        },
        |options| {
            HandlerMap::new().event(
                options.common.event_name.as_str(),
                PhaseHandlers::<FontSizeOptions>::new()
                    .before(|ctx, payload| {
                        if !composition_gate(ctx)? {
                            return Ok(false);
                        }
                        let Some(size) = extract_font_size(payload) else {
                            return ctx.veto("no font size provided");
                        };
                        let (min, max) = (ctx.options().min_size, ctx.options().max_size);
                        if size < i64::from(min) || size > i64::from(max) {
                            return ctx.veto(&format!("font size {} outside {}..={}", size, min, max));
                        }
                        Ok(true)
                    })
                    .on(|ctx, payload| {
                        let size = extract_font_size(payload).ok_or_else(|| {
                            EventError::InvalidPayload("no font size provided".to_string())
                        })?;
                        ctx.execute(&Command::new("fontSize").with_value(size.to_string()))?;
                        ctx.notify_style_change("fontSize", Some(json!(size)));
                        Ok(true)
                    }),
            )
        },
    )
}
