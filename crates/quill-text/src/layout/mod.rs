//! Text layout
//!
//! Turns a shaped text run into positioned glyph records: line breaking,
//! soft wrapping, tab stops, horizontal and vertical alignment. The layout
//! engine is a pure function of its inputs; there is no ambient default
//! configuration.

mod engine;
mod linebreak;

pub use engine::generate_layout;
pub use linebreak::{is_cjk, is_newline, BreakEvent, LineBreaks};

use std::ops::Range;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::font::{GlyphId, GlyphMetrics, MetricsProvider};
use crate::shaping::GlyphStream;

/// Horizontal placement of each line inside the wrapping width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical placement of the whole block relative to the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

/// Word breaking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordBreak {
    /// Break at UAX 14 opportunities.
    #[default]
    Normal,
    /// Every codepoint is a wrap candidate.
    BreakAll,
    /// Never wrap inside CJK sequences.
    KeepAll,
}

/// A position in user-space units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Layout configuration for one paragraph.
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub dpi_x: f32,
    pub dpi_y: f32,
    /// Block origin in device units; converted by dpi before use.
    pub origin: Point,
    /// Wrapping width in device units; 0 disables wrapping.
    pub wrapping_width: f32,
    pub horizontal_align: HorizontalAlign,
    pub vertical_align: VerticalAlign,
    pub word_break: WordBreak,
    /// Line height multiplier.
    pub line_spacing: f32,
    /// Tab stop interval, in multiples of the tab glyph's advance.
    pub tab_width: f32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            dpi_x: 96.0,
            dpi_y: 96.0,
            origin: Point::ZERO,
            wrapping_width: 0.0,
            horizontal_align: HorizontalAlign::default(),
            vertical_align: VerticalAlign::default(),
            word_break: WordBreak::default(),
            line_spacing: 1.0,
            tab_width: 4.0,
        }
    }
}

/// One positioned glyph, in logical reading order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphLayout {
    pub grapheme_index: usize,
    pub codepoint: char,
    pub glyph: GlyphId,
    /// Identity of the font the glyph resolved through.
    pub font_key: usize,
    pub location: Point,
    /// Advance width in user-space units.
    pub width: f32,
    /// Advance height in user-space units.
    pub height: f32,
    /// Line height of the line this record was emitted on.
    pub line_height: f32,
    /// Marks the record that opens a line; the alignment sweep keys on it.
    pub start_of_line: bool,
}

type SharedProvider = Arc<dyn MetricsProvider + Send + Sync>;

/// The style in effect for a range of codepoints: a metrics source, a point
/// size and optionally the substituted glyph stream for that range.
#[derive(Clone)]
pub struct AppliedStyle {
    provider: SharedProvider,
    pub point_size: f32,
    pub range: Range<usize>,
    shaped: Option<Arc<GlyphStream>>,
}

/// Glyphs and metrics resolved for one codepoint slot. The metrics carry
/// the widest advance among the slot's glyphs.
pub(crate) struct ResolvedSlot {
    pub glyphs: SmallVec<[GlyphId; 2]>,
    pub metrics: GlyphMetrics,
}

impl AppliedStyle {
    pub fn new(provider: SharedProvider, point_size: f32, range: Range<usize>) -> Self {
        Self {
            provider,
            point_size,
            range,
            shaped: None,
        }
    }

    /// Attach the substituted stream for this style's range; layout then
    /// emits the stream's glyph lists instead of raw cmap mappings.
    pub fn with_stream(mut self, stream: Arc<GlyphStream>) -> Self {
        self.shaped = Some(stream);
        self
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub(crate) fn resolve(&self, cp_index: usize, codepoint: char) -> Option<ResolvedSlot> {
        let glyphs: SmallVec<[GlyphId; 2]> = match &self.shaped {
            Some(stream) => {
                // Slot offsets are codepoint indices relative to the range;
                // offsets consumed by a ligature are absent and skipped.
                let offset = (cp_index - self.range.start) as u32;
                let (_, glyphs) = stream.at_offset(offset)?;
                SmallVec::from_slice(glyphs)
            }
            None => {
                let glyph = self
                    .provider
                    .glyph_index(codepoint)
                    .or_else(|| {
                        // Tabs render with the space glyph's advance.
                        (codepoint == '\t')
                            .then(|| self.provider.glyph_index(' '))
                            .flatten()
                    })
                    .or_else(|| {
                        // Line terminators must reach the dispatch even in
                        // fonts that do not map them.
                        (codepoint == '\r' || is_newline(codepoint)).then_some(GlyphId::NOTDEF)
                    })?;
                SmallVec::from_slice(&[glyph])
            }
        };

        let metrics = glyphs
            .iter()
            .filter_map(|&g| self.provider.glyph_metrics(g))
            .max_by(|a, b| a.advance_width.total_cmp(&b.advance_width))?;
        Some(ResolvedSlot { glyphs, metrics })
    }
}

/// Source of the style covering each codepoint of a run.
pub trait StyleResolver {
    fn style(&self, cp_index: usize, total_cp_count: usize) -> AppliedStyle;
}

/// The common case: one font and size for the whole run.
#[derive(Clone)]
pub struct UniformStyle {
    provider: SharedProvider,
    point_size: f32,
    shaped: Option<Arc<GlyphStream>>,
}

impl UniformStyle {
    pub fn new(provider: SharedProvider, point_size: f32) -> Self {
        Self {
            provider,
            point_size,
            shaped: None,
        }
    }

    pub fn with_stream(mut self, stream: Arc<GlyphStream>) -> Self {
        self.shaped = Some(stream);
        self
    }
}

impl StyleResolver for UniformStyle {
    fn style(&self, _cp_index: usize, total_cp_count: usize) -> AppliedStyle {
        let mut style = AppliedStyle::new(self.provider.clone(), self.point_size, 0..total_cp_count);
        style.shaped = self.shaped.clone();
        style
    }
}
