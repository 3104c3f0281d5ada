//! Codepoint-run shaping

use crate::font::{FontFace, GlyphId, MetricsProvider, Tag};
use crate::Result;

use super::engine::run_gsub;
use super::stream::GlyphStream;

/// Maps a codepoint run onto a [`GlyphStream`] and rewrites it with the
/// face's substitution rules.
pub struct Shaper<'a> {
    face: &'a FontFace,
    script: Tag,
    language: Option<Tag>,
    features: Vec<Tag>,
}

impl<'a> Shaper<'a> {
    pub fn new(face: &'a FontFace) -> Self {
        Self {
            face,
            script: Tag::DEFAULT_SCRIPT,
            language: None,
            features: Vec::new(),
        }
    }

    /// Script the run is written in (OpenType script tag).
    pub fn script(mut self, script: Tag) -> Self {
        self.script = script;
        self
    }

    /// Language system within the script.
    pub fn language(mut self, language: Tag) -> Self {
        self.language = Some(language);
        self
    }

    /// Enable a feature for the whole run.
    pub fn feature(mut self, tag: Tag) -> Self {
        self.features.push(tag);
        self
    }

    /// Enable several features for the whole run.
    pub fn features(mut self, tags: &[Tag]) -> Self {
        self.features.extend_from_slice(tags);
        self
    }

    /// Populate a stream with the initial one-to-one mapping. The slot
    /// offset is the codepoint index; codepoints the font cannot map carry
    /// `.notdef`. Tabs borrow the space glyph, matching how they render.
    pub fn map(&self, text: &str) -> GlyphStream {
        let mut stream = GlyphStream::new();
        for (i, ch) in text.chars().enumerate() {
            let glyph = self
                .face
                .glyph_index(ch)
                .or_else(|| (ch == '\t').then(|| self.face.glyph_index(' ')).flatten())
                .unwrap_or(GlyphId::NOTDEF);
            stream.add(glyph, ch, i as u32);
        }
        stream
    }

    /// Run the face's GSUB rules over an already populated stream.
    /// Returns whether any slot changed.
    pub fn substitute(&self, stream: &mut GlyphStream) -> Result<bool> {
        let Some(gsub) = self.face.gsub() else {
            return Ok(false);
        };
        run_gsub(
            stream,
            gsub,
            self.face.glyph_classes(),
            self.script,
            self.language,
            &self.features,
        )
    }

    /// Map and substitute in one step.
    pub fn shape(&self, text: &str) -> Result<GlyphStream> {
        let mut stream = self.map(text);
        self.substitute(&mut stream)?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::testfont::{build_sfnt, cmap_table, metrics_tables};
    use crate::shaping::gsub::fixtures;

    /// A face mapping 'f'..='i' to glyphs 1..=4, with a `liga` lookup that
    /// turns f+i into glyph 9 and a `ccmp` lookup expanding glyph 4.
    fn liga_face() -> FontFace {
        let f = b'f' as u16;
        let mut tables = metrics_tables(&[
            (0, 0),
            (520, 20),
            (510, 15),
            (505, 15),
            (260, 10),
            (0, 0),
            (0, 0),
            (0, 0),
            (0, 0),
            (900, 20),
        ]);
        tables.push((*b"cmap", cmap_table(&[(f, f + 3, 1 - f as i16)])));
        tables.push((
            *b"GSUB",
            fixtures::gsub(
                &[(*b"liga", &[0]), (*b"ccmp", &[1])],
                &[
                    fixtures::lookup(4, 0, &[fixtures::ligature_subst(&[(&[1, 4], 9)])]),
                    fixtures::lookup(2, 0, &[fixtures::multiple_subst(&[4], &[&[2, 3]])]),
                ],
            ),
        ));
        FontFace::parse(build_sfnt(&tables)).unwrap()
    }

    #[test]
    fn map_assigns_codepoint_offsets() {
        let face = liga_face();
        let stream = Shaper::new(&face).map("fgz");
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.cp_and_glyphs(0), ('f', 0, &[GlyphId(1)][..]));
        assert_eq!(stream.cp_and_glyphs(1), ('g', 1, &[GlyphId(2)][..]));
        // Unmapped codepoints carry .notdef.
        assert_eq!(stream.cp_and_glyphs(2), ('z', 2, &[GlyphId::NOTDEF][..]));
    }

    #[test]
    fn shape_applies_enabled_ligatures() {
        let face = liga_face();
        let shaper = Shaper::new(&face).feature(Tag(*b"liga"));
        let stream = shaper.shape("fix").unwrap();
        // f+i fused; the survivor keeps f's offset and the x slot remains.
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.glyphs(0), &[GlyphId(9)]);
        assert_eq!(stream.cp_and_glyphs(0).1, 0);
        assert_eq!(stream.at_offset(1), None);
    }

    #[test]
    fn shape_without_features_is_identity() {
        let face = liga_face();
        let stream = Shaper::new(&face).shape("fi").unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.glyphs(0), &[GlyphId(1)]);
        assert_eq!(stream.glyphs(1), &[GlyphId(4)]);
    }

    #[test]
    fn features_compose_in_font_order() {
        // liga runs before ccmp (font feature order), so "fi" fuses first
        // and ccmp's expansion of glyph 4 no longer finds a target.
        let face = liga_face();
        let shaper = Shaper::new(&face).features(&[Tag(*b"liga"), Tag(*b"ccmp")]);
        let stream = shaper.shape("fi").unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.glyphs(0), &[GlyphId(9)]);

        // ccmp alone expands the 'i' slot in place.
        let shaper = Shaper::new(&face).feature(Tag(*b"ccmp"));
        let stream = shaper.shape("fi").unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.glyphs(1), &[GlyphId(2), GlyphId(3)]);
    }
}
