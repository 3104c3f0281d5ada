//! Parsed font face

use std::sync::Arc;

use crate::shaping::{GlyphClasses, GsubTable};
use crate::{Result, TextError};

use super::reader::{FontReader, ReadError};
use super::{cmap, glyf, GlyphId, GlyphMetrics, MetricsProvider, OutlineBuilder, Tag};

const TTC_MAGIC: u32 = 0x7474_6366; // 'ttcf'
const SFNT_TRUETYPE: u32 = 0x0001_0000;
const SFNT_CFF: u32 = 0x4f54_544f; // 'OTTO'

fn truncated(table: &'static str) -> impl Fn(ReadError) -> TextError {
    move |e| TextError::MalformedFont {
        table,
        offset: e.offset,
        reason: "unexpected end of data",
    }
}

#[derive(Debug, Clone, Copy)]
struct TableRecord {
    tag: Tag,
    offset: u32,
    length: u32,
}

/// A parsed font. Owns its bytes; metrics tables are parsed up front, the
/// larger lookup tables (`GSUB`, `GDEF`) are parsed into owned structures at
/// construction so every malformed-font condition is fatal before shaping
/// starts. Faces are immutable afterwards and safe to share across threads.
#[derive(Debug)]
pub struct FontFace {
    data: Arc<[u8]>,
    tables: Vec<TableRecord>,
    units_per_em: u16,
    num_glyphs: u16,
    loca_long: bool,
    ascender: i16,
    descender: i16,
    line_gap: i16,
    num_h_metrics: u16,
    gsub: Option<GsubTable>,
    glyph_classes: Option<GlyphClasses>,
}

impl FontFace {
    /// Parse the first (or only) font in `data`.
    pub fn parse(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::parse_collection_entry(data, 0)
    }

    /// Parse font number `index` out of a TrueType collection.
    pub fn parse_collection_entry(data: impl Into<Arc<[u8]>>, index: u32) -> Result<Self> {
        let data: Arc<[u8]> = data.into();
        let err = truncated("sfnt");

        let mut r = FontReader::new(&data);
        let mut magic = r.read_u32().map_err(&err)?;
        if magic == TTC_MAGIC {
            let _version = r.read_u32().map_err(&err)?;
            let num_fonts = r.read_u32().map_err(&err)?;
            if index >= num_fonts {
                return Err(TextError::MalformedFont {
                    table: "sfnt",
                    offset: 8,
                    reason: "collection index out of range",
                });
            }
            r.skip(index as usize * 4).map_err(&err)?;
            let offset = r.read_u32().map_err(&err)?;
            r.seek(offset as usize);
            magic = r.read_u32().map_err(&err)?;
        }

        if magic != SFNT_TRUETYPE && magic != SFNT_CFF {
            return Err(TextError::MalformedFont {
                table: "sfnt",
                offset: r.pos() - 4,
                reason: "unrecognized sfnt version",
            });
        }

        let num_tables = r.read_u16().map_err(&err)?;
        r.skip(6).map_err(&err)?; // searchRange, entrySelector, rangeShift

        let mut tables = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let tag = r.read_tag().map_err(&err)?;
            let _checksum = r.read_u32().map_err(&err)?;
            let offset = r.read_u32().map_err(&err)?;
            let length = r.read_u32().map_err(&err)?;
            if offset as usize + length as usize > data.len() {
                return Err(TextError::MalformedFont {
                    table: "sfnt",
                    offset: r.pos() - 8,
                    reason: "table record past end of file",
                });
            }
            tables.push(TableRecord { tag, offset, length });
        }

        // head: units per em and the loca index format
        let head =
            find_table(&data, &tables, b"head").ok_or(TextError::TableNotFound("head"))?;
        let mut r = FontReader::new(head);
        r.seek(18);
        let units_per_em = r.read_u16().map_err(truncated("head"))?;
        if units_per_em == 0 {
            return Err(TextError::MalformedFont {
                table: "head",
                offset: 18,
                reason: "unitsPerEm is zero",
            });
        }
        r.seek(50);
        let loca_long = r.read_i16().map_err(truncated("head"))? != 0;

        // hhea: vertical extents and the hmtx entry count
        let hhea =
            find_table(&data, &tables, b"hhea").ok_or(TextError::TableNotFound("hhea"))?;
        let mut r = FontReader::new(hhea);
        r.seek(4);
        let ascender = r.read_i16().map_err(truncated("hhea"))?;
        let descender = r.read_i16().map_err(truncated("hhea"))?;
        let line_gap = r.read_i16().map_err(truncated("hhea"))?;
        r.seek(34);
        let num_h_metrics = r.read_u16().map_err(truncated("hhea"))?;

        // maxp: glyph count
        let maxp =
            find_table(&data, &tables, b"maxp").ok_or(TextError::TableNotFound("maxp"))?;
        let mut r = FontReader::new(maxp);
        r.seek(4);
        let num_glyphs = r.read_u16().map_err(truncated("maxp"))?;

        let gsub = find_table(&data, &tables, b"GSUB")
            .map(GsubTable::parse)
            .transpose()?;
        let glyph_classes = find_table(&data, &tables, b"GDEF")
            .map(GlyphClasses::parse)
            .transpose()?;

        Ok(Self {
            data,
            tables,
            units_per_em,
            num_glyphs,
            loca_long,
            ascender,
            descender,
            line_gap,
            num_h_metrics,
            gsub,
            glyph_classes,
        })
    }

    fn table_data(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        find_table(&self.data, &self.tables, tag)
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub fn number_of_glyphs(&self) -> u16 {
        self.num_glyphs
    }

    pub fn hor_ascender(&self) -> i16 {
        self.ascender
    }

    pub fn hor_descender(&self) -> i16 {
        self.descender
    }

    pub fn hor_line_gap(&self) -> i16 {
        self.line_gap
    }

    /// The font's GSUB rules, when it carries any.
    pub fn gsub(&self) -> Option<&GsubTable> {
        self.gsub.as_ref()
    }

    /// GDEF glyph classification, used for lookup-flag skipping.
    pub fn glyph_classes(&self) -> Option<&GlyphClasses> {
        self.glyph_classes.as_ref()
    }

    /// Advance width and left side bearing from hmtx, in design units.
    pub fn hor_metrics(&self, glyph: GlyphId) -> Option<(u16, i16)> {
        if glyph.0 >= self.num_glyphs || self.num_h_metrics == 0 {
            return None;
        }
        let hmtx = self.table_data(b"hmtx")?;
        let mut r = FontReader::new(hmtx);
        if glyph.0 < self.num_h_metrics {
            r.seek(glyph.0 as usize * 4);
            let advance = r.read_u16().ok()?;
            let lsb = r.read_i16().ok()?;
            Some((advance, lsb))
        } else {
            // Monospaced tail: the last full record's advance applies, the
            // bearing comes from the trailing array.
            r.seek((self.num_h_metrics as usize - 1) * 4);
            let advance = r.read_u16().ok()?;
            r.seek(
                self.num_h_metrics as usize * 4
                    + (glyph.0 - self.num_h_metrics) as usize * 2,
            );
            let lsb = r.read_i16().ok()?;
            Some((advance, lsb))
        }
    }

    /// Walk a glyph's outline into `builder`, in design units.
    /// Returns `None` for glyphs without outline data.
    pub fn outline_glyph<B: OutlineBuilder>(&self, glyph: GlyphId, builder: &mut B) -> Option<()> {
        let glyf = self.table_data(b"glyf")?;
        let loca = self.table_data(b"loca")?;
        glyf::outline_glyph(glyf, loca, glyph.0, self.loca_long, builder)
    }
}

impl MetricsProvider for FontFace {
    fn glyph_index(&self, codepoint: char) -> Option<GlyphId> {
        let cmap = self.table_data(b"cmap")?;
        cmap::glyph_index(cmap, codepoint as u32)
    }

    fn glyph_metrics(&self, glyph: GlyphId) -> Option<GlyphMetrics> {
        let (advance, lsb) = self.hor_metrics(glyph)?;
        Some(GlyphMetrics {
            advance_width: advance as f32,
            advance_height: self.line_height(),
            left_bearing: lsb as f32,
            ascender: self.ascender as f32,
            descender: self.descender as f32,
            line_height: self.line_height(),
            scale_factor: self.units_per_em as f32,
            font_key: self.metrics_key(),
        })
    }

    fn scale_factor(&self) -> f32 {
        self.units_per_em as f32
    }

    fn line_height(&self) -> f32 {
        (self.ascender as i32 - self.descender as i32 + self.line_gap as i32) as f32
    }

    fn ascender(&self) -> f32 {
        self.ascender as f32
    }

    fn descender(&self) -> f32 {
        self.descender as f32
    }

    fn metrics_key(&self) -> usize {
        Arc::as_ptr(&self.data) as *const u8 as usize
    }
}

fn find_table<'a>(data: &'a [u8], tables: &[TableRecord], tag: &[u8; 4]) -> Option<&'a [u8]> {
    let record = tables.iter().find(|t| t.tag.0 == *tag)?;
    data.get(record.offset as usize..(record.offset + record.length) as usize)
}
