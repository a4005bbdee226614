//! Event names raised by the toolbar

pub use richtext_core::STYLE_CHANGED;

pub const BOLD_CLICKED: &str = "BOLD_CLICKED";
pub const ITALIC_CLICKED: &str = "ITALIC_CLICKED";
pub const UNDERLINE_CLICKED: &str = "UNDERLINE_CLICKED";
pub const STRIKETHROUGH_CLICKED: &str = "STRIKETHROUGH_CLICKED";
pub const SUPERSCRIPT_CLICKED: &str = "SUPERSCRIPT_CLICKED";
pub const SUBSCRIPT_CLICKED: &str = "SUBSCRIPT_CLICKED";
pub const CLEAR_FORMATTING_CLICKED: &str = "CLEAR_FORMATTING_CLICKED";

pub const BACKGROUND_COLOR_CHANGED: &str = "BACKGROUND_COLOR_CHANGED";
pub const FONT_COLOR_CHANGED: &str = "FONT_COLOR_CHANGED";
pub const FONT_FAMILY_CHANGED: &str = "FONT_FAMILY_CHANGED";
pub const FONT_SIZE_CHANGED: &str = "FONT_SIZE_CHANGED";
