//! Layout engine
//!
//! One pass over the grapheme clusters of a run: resolve each codepoint
//! through the active style, dispatch on its kind (renderable, carriage
//! return, line terminator, tab, whitespace), soft-wrap when the pen
//! crosses the wrapping width, then place the finished record list
//! vertically and align every line horizontally.

use tracing::trace;

use unicode_segmentation::UnicodeSegmentation;

use super::linebreak::{is_cjk, is_newline, LineBreaks};
use super::{
    AppliedStyle, GlyphLayout, HorizontalAlign, LayoutOptions, Point, StyleResolver,
    VerticalAlign, WordBreak,
};

/// Lay out `text` and return one record per emitted glyph, in logical
/// order. Codepoints the style cannot resolve are skipped; layout itself
/// never fails.
pub fn generate_layout(
    text: &str,
    options: &LayoutOptions,
    styles: &dyn StyleResolver,
) -> Vec<GlyphLayout> {
    let wrapping = options.wrapping_width > 0.0;
    // Under wrapping, trailing whitespace would only manufacture empty
    // lines; drop it before anything else.
    let text = if wrapping { text.trim_end() } else { text };
    if text.is_empty() {
        return Vec::new();
    }

    let origin = Point::new(
        options.origin.x / options.dpi_x,
        options.origin.y / options.dpi_y,
    );
    let max_width = if wrapping {
        options.wrapping_width / options.dpi_x
    } else {
        f32::INFINITY
    };
    let line_origin_x = match options.horizontal_align {
        _ if !wrapping => 0.0,
        HorizontalAlign::Left => 0.0,
        HorizontalAlign::Center => max_width / 2.0,
        HorizontalAlign::Right => max_width,
    };

    let total = text.chars().count();
    let mut breaks = LineBreaks::new(text);
    let mut next_wrappable: isize = breaks.next().map_or(-1, |e| e.position as isize - 1);

    let mut layout: Vec<GlyphLayout> = Vec::new();
    let mut pen = Point::ZERO;
    let mut line_height = 0.0f32;
    let mut line_ascender = 0.0f32;
    let mut line_descender = 0.0f32; // magnitude below the baseline
    let mut top = 0.0f32;
    let mut first_line = true;
    let mut start_of_line = true;
    let mut last_wrappable: isize = -1;
    let mut style: AppliedStyle = styles.style(0, total);
    let mut cp_index = 0usize;

    for (grapheme_index, grapheme) in text.graphemes(true).enumerate() {
        for ch in grapheme.chars() {
            let index = cp_index;
            cp_index += 1;

            if index >= style.range.end {
                style = styles.style(index, total);
            }

            // Unresolvable codepoints occupy no slot.
            let Some(slot) = style.resolve(index, ch) else {
                continue;
            };
            let scale = style.point_size / slot.metrics.scale_factor;
            let advance = slot.metrics.advance_width * scale;
            let advance_height = slot.metrics.advance_height * scale;

            line_height =
                line_height.max(slot.metrics.line_height * options.line_spacing * scale);
            line_ascender = line_ascender.max(slot.metrics.ascender * scale);
            line_descender = line_descender.max(slot.metrics.descender.abs() * scale);
            if first_line {
                top = match options.vertical_align {
                    VerticalAlign::Top => line_ascender,
                    VerticalAlign::Center => (line_ascender + line_descender) / 2.0,
                    VerticalAlign::Bottom => -line_descender,
                };
            }

            // A break opportunity (or break-all mode) records the position
            // after the last solid glyph as the wrap point. Keep-all never
            // records one inside CJK text.
            let at_opportunity = next_wrappable >= 0 && index as isize >= next_wrappable;
            if at_opportunity || options.word_break == WordBreak::BreakAll {
                let held = options.word_break == WordBreak::KeepAll && is_cjk(ch);
                if !held {
                    if let Some(solid) =
                        layout.iter().rposition(|r| !r.codepoint.is_whitespace())
                    {
                        last_wrappable = solid as isize + 1;
                    }
                }
            }
            if at_opportunity {
                // The consumed event may lag several positions behind when
                // slots were skipped; catch up.
                next_wrappable = loop {
                    match breaks.next() {
                        None => break -1,
                        Some(e) => {
                            let candidate = e.position as isize - 1;
                            if candidate > index as isize {
                                break candidate;
                            }
                        }
                    }
                };
            }

            if ch == '\r' {
                // Carriage return restarts the pen; the record itself is
                // flagged as a line start.
                pen.x = 0.0;
                layout.push(GlyphLayout {
                    grapheme_index,
                    codepoint: ch,
                    glyph: slot.glyphs[0],
                    font_key: slot.metrics.font_key,
                    location: pen,
                    width: 0.0,
                    height: advance_height,
                    line_height,
                    start_of_line: true,
                });
                start_of_line = false;
            } else if is_newline(ch) {
                layout.push(GlyphLayout {
                    grapheme_index,
                    codepoint: ch,
                    glyph: slot.glyphs[0],
                    font_key: slot.metrics.font_key,
                    location: pen,
                    width: 0.0,
                    height: advance_height,
                    line_height,
                    start_of_line,
                });
                pen.x = 0.0;
                pen.y += line_height;
                line_height = 0.0;
                line_ascender = 0.0;
                line_descender = 0.0;
                first_line = false;
                last_wrappable = -1;
                start_of_line = true;
            } else if ch == '\t' {
                let tab_stop = advance * options.tab_width;
                let mut width = if tab_stop > 0.0 {
                    tab_stop - pen.x % tab_stop
                } else {
                    advance
                };
                // A tab never renders narrower than its glyph.
                if width < advance {
                    width += tab_stop;
                }
                layout.push(GlyphLayout {
                    grapheme_index,
                    codepoint: ch,
                    glyph: slot.glyphs[0],
                    font_key: slot.metrics.font_key,
                    location: pen,
                    width,
                    height: advance_height,
                    line_height,
                    start_of_line,
                });
                start_of_line = false;
                pen.x += width;
            } else if ch.is_whitespace() {
                layout.push(GlyphLayout {
                    grapheme_index,
                    codepoint: ch,
                    glyph: slot.glyphs[0],
                    font_key: slot.metrics.font_key,
                    location: pen,
                    width: advance,
                    height: advance_height,
                    line_height,
                    start_of_line,
                });
                start_of_line = false;
                pen.x += advance;
            } else {
                // Renderable: one record per glyph in the slot, all at the
                // pen and all carrying the widest advance.
                for &glyph in &slot.glyphs {
                    layout.push(GlyphLayout {
                        grapheme_index,
                        codepoint: ch,
                        glyph,
                        font_key: slot.metrics.font_key,
                        location: pen,
                        width: advance,
                        height: advance_height,
                        line_height,
                        start_of_line,
                    });
                }
                start_of_line = false;
                pen.x += advance;

                if advance > 0.0
                    && pen.x >= max_width
                    && last_wrappable > 0
                    && (last_wrappable as usize) < layout.len()
                {
                    trace!(at = last_wrappable, "soft wrap");
                    rewrap(&mut layout, last_wrappable as usize, line_height);
                    let last = layout.last().expect("wrap keeps at least one record");
                    pen.x = last.location.x + last.width;
                    pen.y += line_height;
                    first_line = false;
                    last_wrappable = -1;
                }
            }
        }
    }

    // Vertical placement of the whole block.
    let total_height = pen.y + line_height;
    let offset_y = match options.vertical_align {
        VerticalAlign::Top => top,
        VerticalAlign::Center => top - total_height / 2.0,
        VerticalAlign::Bottom => top - total_height,
    };

    // Horizontal placement, one line at a time. A line runs up to the next
    // start-of-line record of a different grapheme: multi-glyph graphemes
    // share the flag and must not terminate the scan.
    let mut start = 0;
    while start < layout.len() {
        let line_grapheme = layout[start].grapheme_index;
        let mut end = start + 1;
        while end < layout.len()
            && !(layout[end].start_of_line && layout[end].grapheme_index != line_grapheme)
        {
            end += 1;
        }

        // The line's visible width, not the pen position.
        let width = layout[start..end]
            .iter()
            .map(|r| r.location.x + r.width)
            .fold(0.0f32, f32::max);
        let align_x = match options.horizontal_align {
            _ if !max_width.is_finite() => 0.0,
            HorizontalAlign::Left => line_origin_x,
            HorizontalAlign::Center => line_origin_x - width / 2.0,
            HorizontalAlign::Right => line_origin_x - width,
        };
        for record in &mut layout[start..end] {
            record.location.x += align_x + origin.x;
            record.location.y += offset_y + origin.y;
        }
        start = end;
    }

    layout
}

/// Move the records from `wrap_at` on to the next line: drop the leading
/// whitespace, shift what remains back to the line start and down by one
/// line height, and flag the new line start.
fn rewrap(layout: &mut Vec<GlyphLayout>, wrap_at: usize, line_height: f32) {
    let mut wrapping_offset = layout[wrap_at].location.x;
    while wrap_at < layout.len() && layout[wrap_at].codepoint.is_whitespace() {
        wrapping_offset += layout[wrap_at].width;
        layout.remove(wrap_at);
    }

    for record in &mut layout[wrap_at..] {
        record.location.x -= wrapping_offset;
        record.location.y += line_height;
    }

    // Every record of the leading grapheme carries the flag, the way
    // multi-glyph graphemes are emitted at a natural line start.
    if wrap_at < layout.len() {
        let grapheme = layout[wrap_at].grapheme_index;
        for record in &mut layout[wrap_at..] {
            if record.grapheme_index != grapheme {
                break;
            }
            record.start_of_line = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::super::{UniformStyle, VerticalAlign};
    use super::*;
    use crate::font::{GlyphId, GlyphMetrics, MetricsProvider};
    use crate::shaping::GlyphStream;

    /// Synthetic 1000-upem font with per-glyph advances in design units.
    struct FakeFont {
        upem: f32,
        ascender: f32,
        descender: f32,
        glyphs: HashMap<char, GlyphId>,
        advances: HashMap<GlyphId, f32>,
    }

    impl FakeFont {
        fn new() -> Self {
            let mut font = Self {
                upem: 1000.0,
                ascender: 927.0,
                descender: -310.0,
                glyphs: HashMap::new(),
                advances: HashMap::new(),
            };
            // .notdef is zero-width but always has metrics.
            font.advances.insert(GlyphId::NOTDEF, 0.0);
            font
        }

        fn with_glyph(mut self, ch: char, glyph: u16, advance: f32) -> Self {
            self.glyphs.insert(ch, GlyphId(glyph));
            self.advances.insert(GlyphId(glyph), advance);
            self
        }

        /// 'a'..='z' on glyphs 1..=26, space on 50, all `advance` wide.
        fn monospaced(advance: f32) -> Self {
            let mut font = Self::new().with_glyph(' ', 50, advance);
            for (i, ch) in ('a'..='z').enumerate() {
                font = font.with_glyph(ch, i as u16 + 1, advance);
            }
            font
        }
    }

    impl MetricsProvider for FakeFont {
        fn glyph_index(&self, codepoint: char) -> Option<GlyphId> {
            self.glyphs.get(&codepoint).copied()
        }

        fn glyph_metrics(&self, glyph: GlyphId) -> Option<GlyphMetrics> {
            let advance = *self.advances.get(&glyph)?;
            Some(GlyphMetrics {
                advance_width: advance,
                advance_height: self.line_height(),
                left_bearing: 0.0,
                ascender: self.ascender,
                descender: self.descender,
                line_height: self.line_height(),
                scale_factor: self.upem,
                font_key: self.metrics_key(),
            })
        }

        fn scale_factor(&self) -> f32 {
            self.upem
        }

        fn line_height(&self) -> f32 {
            self.ascender - self.descender
        }

        fn ascender(&self) -> f32 {
            self.ascender
        }

        fn descender(&self) -> f32 {
            self.descender
        }

        fn metrics_key(&self) -> usize {
            1
        }
    }

    fn style_of(font: FakeFont, point_size: f32) -> UniformStyle {
        UniformStyle::new(Arc::new(font), point_size)
    }

    fn max_extent(layout: &[GlyphLayout]) -> f32 {
        layout
            .iter()
            .map(|r| r.location.x + r.width)
            .fold(0.0, f32::max)
    }

    #[test]
    fn whitespace_run_measures_its_advances() {
        // Ten spaces, 0.2 em each, at 30 pt / 72 dpi: 60 units wide, one
        // line of ascender+descender scaled to the point size.
        let font = FakeFont::new().with_glyph(' ', 3, 200.0);
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            ..LayoutOptions::default()
        };
        let layout = generate_layout("          ", &options, &style_of(font, 30.0));
        assert_eq!(layout.len(), 10);
        assert!((max_extent(&layout) - 60.0).abs() < 1e-3);
        assert!((layout[9].line_height - 37.11).abs() < 0.01);
        assert!(layout[0].start_of_line);
        assert!(!layout[1].start_of_line);
    }

    #[test]
    fn newline_opens_a_second_line() {
        let font = FakeFont::monospaced(600.0);
        let layout = generate_layout(
            "abc\ndef",
            &LayoutOptions::default(),
            &style_of(font, 10.0),
        );
        // Three glyphs, the newline record, three glyphs.
        assert_eq!(layout.len(), 7);
        let line_height = layout[0].line_height;
        assert_eq!(layout[3].width, 0.0);
        assert!(layout[4].start_of_line);
        for record in &layout[4..] {
            assert!(record.location.x >= 0.0);
            assert!((record.location.y - (layout[0].location.y + line_height)).abs() < 1e-3);
        }
    }

    #[test]
    fn soft_wrap_moves_the_overflow_and_drops_the_space() {
        // 6 units per glyph at 10 pt. "hello world" is 66 units; wrap at 70
        // so "foo" overflows.
        let font = FakeFont::monospaced(600.0);
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            wrapping_width: 70.0 * 72.0,
            ..LayoutOptions::default()
        };
        let layout = generate_layout("hello world foo", &options, &style_of(font, 10.0));

        // The wrapped space is gone: 11 records on line 1, 3 on line 2.
        assert_eq!(layout.len(), 14);
        let line_height = layout[0].line_height;
        let first_baseline = layout[0].location.y;
        let foo = &layout[11..];
        assert!(foo[0].start_of_line);
        assert_eq!(foo.iter().map(|r| r.codepoint).collect::<String>(), "foo");
        for (i, record) in foo.iter().enumerate() {
            assert!((record.location.x - 6.0 * i as f32).abs() < 1e-3);
            assert!((record.location.y - (first_baseline + line_height)).abs() < 1e-3);
        }
        // Line 1 still ends with "world" at its original place.
        assert_eq!(layout[10].codepoint, 'd');
        assert!((layout[10].location.x - 60.0).abs() < 1e-3);
        assert!((layout[10].location.y - first_baseline).abs() < 1e-3);
    }

    #[test]
    fn tab_snaps_to_the_next_stop() {
        // Space advance 7.5 at 30 pt, tab width 4: stops every 30 units.
        // 'a' advances the pen to 10, so the tab fills 20.
        let font = FakeFont::new()
            .with_glyph(' ', 3, 250.0)
            .with_glyph('a', 4, 1000.0 / 3.0);
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            ..LayoutOptions::default()
        };
        let layout = generate_layout("a\t", &options, &style_of(font, 30.0));
        assert_eq!(layout.len(), 2);
        assert!((layout[1].width - 20.0).abs() < 1e-3);
        assert!((layout[1].location.x + layout[1].width - 30.0).abs() < 1e-3);
    }

    #[test]
    fn tab_never_renders_narrower_than_its_glyph() {
        // Pen lands at 29 of a 30-unit stop: the single remaining unit is
        // narrower than the 7.5-unit tab glyph, so a whole stop is added.
        let font = FakeFont::new()
            .with_glyph(' ', 3, 250.0)
            .with_glyph('w', 4, 966.6667);
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            ..LayoutOptions::default()
        };
        let layout = generate_layout("w\t", &options, &style_of(font, 30.0));
        assert!((layout[1].width - 31.0).abs() < 1e-3);
    }

    #[test]
    fn empty_inputs_yield_empty_layouts() {
        let font = FakeFont::monospaced(600.0);
        let style = style_of(font, 10.0);
        assert!(generate_layout("", &LayoutOptions::default(), &style).is_empty());

        let wrapped = LayoutOptions {
            wrapping_width: 100.0,
            ..LayoutOptions::default()
        };
        assert!(generate_layout("   \t  ", &wrapped, &style).is_empty());
    }

    #[test]
    fn layout_is_idempotent() {
        let font = FakeFont::monospaced(600.0);
        let options = LayoutOptions {
            wrapping_width: 40.0 * 96.0,
            horizontal_align: HorizontalAlign::Center,
            vertical_align: VerticalAlign::Center,
            ..LayoutOptions::default()
        };
        let style = style_of(font, 10.0);
        let first = generate_layout("one two three four", &options, &style);
        let second = generate_layout("one two three four", &options, &style);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn missing_glyphs_are_skipped() {
        let font = FakeFont::new().with_glyph('a', 1, 500.0);
        let layout = generate_layout("aXa", &LayoutOptions::default(), &style_of(font, 10.0));
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].codepoint, 'a');
        assert_eq!(layout[1].codepoint, 'a');
        // The second 'a' sits where the first ended: the skipped slot
        // consumed no space.
        assert!((layout[1].location.x - 5.0).abs() < 1e-3);
    }

    #[test]
    fn right_alignment_flushes_lines_to_the_width() {
        let font = FakeFont::monospaced(600.0);
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            wrapping_width: 60.0 * 72.0,
            horizontal_align: HorizontalAlign::Right,
            ..LayoutOptions::default()
        };
        // "abc" is 18 units; right-aligned inside 60.
        let layout = generate_layout("abc", &options, &style_of(font, 10.0));
        assert!((layout[0].location.x - 42.0).abs() < 1e-3);
        assert!((max_extent(&layout) - 60.0).abs() < 1e-3);
    }

    #[test]
    fn center_alignment_splits_the_slack() {
        let font = FakeFont::monospaced(600.0);
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            wrapping_width: 60.0 * 72.0,
            horizontal_align: HorizontalAlign::Center,
            ..LayoutOptions::default()
        };
        let layout = generate_layout("abc", &options, &style_of(font, 10.0));
        assert!((layout[0].location.x - 21.0).abs() < 1e-3);
    }

    #[test]
    fn shaped_stream_drives_the_records() {
        // A ligature merged "fi" into one glyph at offset 0; offset 1 is
        // gone. An expanded slot emits all its glyphs at one position.
        let mut font = FakeFont::new()
            .with_glyph('f', 1, 500.0)
            .with_glyph('i', 2, 500.0)
            .with_glyph('x', 3, 500.0);
        font.advances.insert(GlyphId(30), 800.0);
        font.advances.insert(GlyphId(4), 300.0);

        let mut stream = GlyphStream::new();
        stream.add(GlyphId(1), 'f', 0);
        stream.add(GlyphId(2), 'i', 1);
        stream.add(GlyphId(3), 'x', 2);
        stream.merge(0, 2, GlyphId(30));
        // After the collapse the 'x' slot sits at dense position 1.
        stream.expand(1, &[GlyphId(3), GlyphId(4)]);

        let style = style_of(font, 10.0).with_stream(Arc::new(stream));
        let layout = generate_layout("fix", &LayoutOptions::default(), &style);

        // One record for the ligature, two sharing the expanded slot.
        assert_eq!(layout.len(), 3);
        assert_eq!(layout[0].glyph, GlyphId(30));
        assert_eq!(layout[1].glyph, GlyphId(3));
        assert_eq!(layout[2].glyph, GlyphId(4));
        assert_eq!(layout[1].location, layout[2].location);
        assert_eq!(layout[1].width, layout[2].width);
        // The expanded slot advances by its widest glyph.
        assert!((layout[1].location.x - 8.0).abs() < 1e-3);
        assert!((max_extent(&layout) - 13.0).abs() < 1e-3);
    }

    #[test]
    fn break_all_wraps_inside_words() {
        let font = FakeFont::monospaced(600.0);
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            wrapping_width: 20.0 * 72.0,
            word_break: WordBreak::BreakAll,
            ..LayoutOptions::default()
        };
        let layout = generate_layout("abcdef", &options, &style_of(font, 10.0));
        // 6 units per glyph, 20 wide: three glyphs per line.
        let line_height = layout[0].line_height;
        let first_baseline = layout[0].location.y;
        let second_line: String = layout
            .iter()
            .filter(|r| (r.location.y - (first_baseline + line_height)).abs() < 1e-3)
            .map(|r| r.codepoint)
            .collect();
        assert_eq!(second_line, "def");
    }

    #[test]
    fn keep_all_holds_cjk_together() {
        let mut font = FakeFont::monospaced(600.0);
        for (i, ch) in "漢字列".chars().enumerate() {
            font = font.with_glyph(ch, 100 + i as u16, 1000.0);
        }
        let options = LayoutOptions {
            dpi_x: 72.0,
            dpi_y: 72.0,
            wrapping_width: 25.0 * 72.0,
            word_break: WordBreak::KeepAll,
            ..LayoutOptions::default()
        };
        let layout = generate_layout("漢字列", &options, &style_of(font, 10.0));
        // 10 units per ideograph, 25 available: keep-all refuses the wrap,
        // so every record shares the first baseline.
        assert_eq!(layout.len(), 3);
        let first_baseline = layout[0].location.y;
        assert!(layout
            .iter()
            .all(|r| (r.location.y - first_baseline).abs() < 1e-3));
    }

    #[test]
    fn vertical_center_shifts_by_half_the_height() {
        let font = FakeFont::monospaced(600.0);
        let top_options = LayoutOptions::default();
        let center_options = LayoutOptions {
            vertical_align: VerticalAlign::Center,
            ..LayoutOptions::default()
        };
        let style = style_of(font, 10.0);
        let top = generate_layout("ab", &top_options, &style);
        let centered = generate_layout("ab", &center_options, &style);
        let line_height = top[0].line_height;
        // Top places the baseline at the ascender; center subtracts half
        // the block height and uses the midline.
        let expected = (top[0].location.y - line_height / 2.0)
            - (927.0 - (927.0 + 310.0) / 2.0) * 10.0 / 1000.0;
        assert!((centered[0].location.y - expected).abs() < 1e-3);
    }
}
