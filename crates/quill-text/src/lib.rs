//! Quill Text - Font Engine
//!
//! This crate turns OpenType/TrueType font files and Unicode text into
//! positioned glyphs:
//! - Font file parsing (sfnt directory, cmap, glyf, metrics tables)
//! - Glyph substitution (GSUB lookup types 1-8, GDEF-driven skipping)
//! - Text layout (line breaking, word wrap, tabs, alignment)
//!
//! A text run flows through three stages: a [`shaping::Shaper`] maps the
//! codepoints of a run onto a [`shaping::GlyphStream`], the substitution
//! engine rewrites that stream in place using the font's GSUB rules, and
//! [`layout::generate_layout`] walks the result and emits positioned
//! [`layout::GlyphLayout`] records ready for measurement or rendering.
//!
//! Parsed faces are immutable once constructed and can be shared across
//! threads; each run owns its stream and output.

pub mod font;
pub mod layout;
pub mod shaping;

pub use font::{FontCollection, FontFace, FontId, GlyphId, GlyphMetrics, MetricsProvider, Tag};
pub use layout::{
    generate_layout, AppliedStyle, GlyphLayout, HorizontalAlign, LayoutOptions, Point,
    StyleResolver, UniformStyle, VerticalAlign, WordBreak,
};
pub use shaping::{run_gsub, GlyphStream, GsubTable, Shaper, SubstitutionEngine};

/// Font engine error types
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("malformed font: {table} table, byte {offset}: {reason}")]
    MalformedFont {
        table: &'static str,
        offset: usize,
        reason: &'static str,
    },

    #[error("required font table not found: {0}")]
    TableNotFound(&'static str),

    #[error("nested lookup limit exceeded while applying glyph substitutions")]
    NestingLimitExceeded,
}

pub type Result<T> = std::result::Result<T, TextError>;
