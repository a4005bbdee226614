//! Built-in formatting plugins
//!
//! Every plugin here is a thin declarative unit over
//! [`richtext_core::define_plugin`]: a composition gate plus payload checks in
//! `before`, one adapter command in `on`, and a
//! [`STYLE_CHANGED`](richtext_core::STYLE_CHANGED) notification on success.

pub mod catalog;
pub mod color;
pub mod events;
pub mod font;
pub mod guard;
pub mod toggle;

pub use catalog::{builtin_factories, builtin_names, find_factory, instantiate};
pub use color::{background_color, font_color, ColorOptions};
pub use font::{font_family, font_size, FontFamilyOptions, FontSizeOptions};
pub use guard::CommonOptions;
pub use toggle::{
    bold, clear_formatting, italic, strikethrough, subscript, superscript, underline, ToggleOptions,
};
