//! Font parsing and metrics
//!
//! From-scratch OpenType/TrueType parsing for the tables the engine
//! consumes: the sfnt directory, `head`/`hhea`/`maxp`/`hmtx`, `cmap`,
//! `glyf`/`loca`, and the `GSUB`/`GDEF` layout tables (parsed in
//! [`crate::shaping`]).

mod cmap;
mod collection;
mod face;
pub mod fixed;
mod glyf;
mod outline;
pub mod reader;

pub use collection::{FontCollection, FontId};
pub use face::FontFace;
pub use outline::{GlyphOutline, OutlineBuilder, OutlineCommand};
pub use reader::FontReader;

#[cfg(test)]
pub(crate) use face::testfont;

/// Glyph identifier within a single font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct GlyphId(pub u16);

impl GlyphId {
    /// The `.notdef` glyph every font carries at index zero.
    pub const NOTDEF: GlyphId = GlyphId(0);
}

/// Four-byte table, script, language or feature tag
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const DEFAULT_SCRIPT: Tag = Tag(*b"DFLT");

    pub const fn as_bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            // Tags are ASCII by construction; escape anything that is not.
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({self})")
    }
}

/// Metrics of one glyph, in font design units.
///
/// `scale_factor` is the design-units-per-em divisor; multiplying a field by
/// `point_size / scale_factor` converts it to user-space units at a given
/// text size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub advance_width: f32,
    pub advance_height: f32,
    pub left_bearing: f32,
    pub ascender: f32,
    /// Negative below the baseline.
    pub descender: f32,
    pub line_height: f32,
    pub scale_factor: f32,
    /// Identity of the owning font, for comparing metrics across runs that
    /// span several fonts.
    pub font_key: usize,
}

/// Read-only metrics access the layout engine depends on.
///
/// Implemented by [`FontFace`]; tests substitute synthetic providers.
pub trait MetricsProvider {
    /// Map a codepoint to its glyph, `None` when the font has no mapping.
    fn glyph_index(&self, codepoint: char) -> Option<GlyphId>;

    /// Metrics for one glyph in design units, `None` for out-of-range ids.
    fn glyph_metrics(&self, glyph: GlyphId) -> Option<GlyphMetrics>;

    /// Design units per em.
    fn scale_factor(&self) -> f32;

    /// Default line height in design units.
    fn line_height(&self) -> f32;

    fn ascender(&self) -> f32;

    fn descender(&self) -> f32;

    /// Stable identity used to tell fonts apart when a run mixes several.
    fn metrics_key(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_display() {
        assert_eq!(Tag(*b"liga").to_string(), "liga");
        assert_eq!(Tag([0x6c, 0x69, 0x67, 0x01]).to_string(), "lig\\x01");
    }

    #[test]
    fn notdef_is_zero() {
        assert_eq!(GlyphId::NOTDEF, GlyphId(0));
    }
}
