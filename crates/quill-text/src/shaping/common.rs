//! Shared binary structures of the OpenType layout tables
//!
//! Coverage and class-definition tables appear throughout GSUB and GDEF;
//! both exist in two on-disk formats and both are queried on every match
//! attempt, so lookups binary-search their sorted payloads.

use crate::font::reader::ReadError;
use crate::font::GlyphId;
use crate::TextError;

/// Parse-time failure inside a layout table, positioned relative to the
/// start of the table being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParseIssue {
    pub offset: usize,
    pub reason: &'static str,
}

impl ParseIssue {
    pub(crate) fn at(offset: usize, reason: &'static str) -> Self {
        Self { offset, reason }
    }

    pub(crate) fn into_error(self, table: &'static str) -> TextError {
        TextError::MalformedFont {
            table,
            offset: self.offset,
            reason: self.reason,
        }
    }
}

impl From<ReadError> for ParseIssue {
    fn from(e: ReadError) -> Self {
        Self {
            offset: e.offset,
            reason: "unexpected end of data",
        }
    }
}

pub(crate) type PResult<T> = std::result::Result<T, ParseIssue>;

/// Set of glyphs with a stable rank (the coverage index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coverage {
    /// Format 1: sorted glyph list; the rank is the list position.
    Glyphs(Vec<GlyphId>),
    /// Format 2: sorted ranges carrying the rank of their first glyph.
    Ranges(Vec<CoverageRange>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageRange {
    pub start: GlyphId,
    pub end: GlyphId,
    pub start_index: u16,
}

impl Coverage {
    pub(crate) fn parse(data: &[u8], base: usize) -> PResult<Coverage> {
        let mut r = crate::font::FontReader::new(data);
        r.seek(base);
        match r.read_u16()? {
            1 => {
                let count = r.read_u16()? as usize;
                let mut glyphs = Vec::with_capacity(count);
                for _ in 0..count {
                    glyphs.push(GlyphId(r.read_u16()?));
                }
                Ok(Coverage::Glyphs(glyphs))
            }
            2 => {
                let count = r.read_u16()? as usize;
                let mut ranges = Vec::with_capacity(count);
                for _ in 0..count {
                    ranges.push(CoverageRange {
                        start: GlyphId(r.read_u16()?),
                        end: GlyphId(r.read_u16()?),
                        start_index: r.read_u16()?,
                    });
                }
                Ok(Coverage::Ranges(ranges))
            }
            _ => Err(ParseIssue::at(base, "invalid coverage format")),
        }
    }

    /// Rank of `glyph` within the set, `None` when not covered.
    pub fn index_of(&self, glyph: GlyphId) -> Option<u16> {
        match self {
            Coverage::Glyphs(glyphs) => {
                glyphs.binary_search(&glyph).ok().map(|i| i as u16)
            }
            Coverage::Ranges(ranges) => {
                let i = ranges
                    .binary_search_by(|range| {
                        if glyph < range.start {
                            std::cmp::Ordering::Greater
                        } else if glyph > range.end {
                            std::cmp::Ordering::Less
                        } else {
                            std::cmp::Ordering::Equal
                        }
                    })
                    .ok()?;
                let range = &ranges[i];
                Some(range.start_index + (glyph.0 - range.start.0))
            }
        }
    }

    pub fn contains(&self, glyph: GlyphId) -> bool {
        self.index_of(glyph).is_some()
    }
}

/// Partition of glyph ids into small integer classes. Unlisted glyphs
/// belong to class 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassDef {
    /// Format 1: contiguous class array starting at `first`.
    Array { first: GlyphId, classes: Vec<u16> },
    /// Format 2: sorted ranges sharing one class each.
    Ranges(Vec<ClassRange>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassRange {
    pub start: GlyphId,
    pub end: GlyphId,
    pub class: u16,
}

impl ClassDef {
    pub(crate) fn parse(data: &[u8], base: usize) -> PResult<ClassDef> {
        let mut r = crate::font::FontReader::new(data);
        r.seek(base);
        match r.read_u16()? {
            1 => {
                let first = GlyphId(r.read_u16()?);
                let count = r.read_u16()? as usize;
                let mut classes = Vec::with_capacity(count);
                for _ in 0..count {
                    classes.push(r.read_u16()?);
                }
                Ok(ClassDef::Array { first, classes })
            }
            2 => {
                let count = r.read_u16()? as usize;
                let mut ranges = Vec::with_capacity(count);
                for _ in 0..count {
                    ranges.push(ClassRange {
                        start: GlyphId(r.read_u16()?),
                        end: GlyphId(r.read_u16()?),
                        class: r.read_u16()?,
                    });
                }
                Ok(ClassDef::Ranges(ranges))
            }
            _ => Err(ParseIssue::at(base, "invalid class definition format")),
        }
    }

    pub fn class_of(&self, glyph: GlyphId) -> u16 {
        match self {
            ClassDef::Array { first, classes } => glyph
                .0
                .checked_sub(first.0)
                .and_then(|i| classes.get(i as usize).copied())
                .unwrap_or(0),
            ClassDef::Ranges(ranges) => ranges
                .binary_search_by(|range| {
                    if glyph < range.start {
                        std::cmp::Ordering::Greater
                    } else if glyph > range.end {
                        std::cmp::Ordering::Less
                    } else {
                        std::cmp::Ordering::Equal
                    }
                })
                .map(|i| ranges[i].class)
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_glyph_list() {
        let data = [
            0x00, 0x01, // format 1
            0x00, 0x03, // count
            0x00, 0x0a, 0x00, 0x14, 0x00, 0x1e, // glyphs 10, 20, 30
        ];
        let cov = Coverage::parse(&data, 0).unwrap();
        assert_eq!(cov.index_of(GlyphId(10)), Some(0));
        assert_eq!(cov.index_of(GlyphId(20)), Some(1));
        assert_eq!(cov.index_of(GlyphId(30)), Some(2));
        assert_eq!(cov.index_of(GlyphId(15)), None);
    }

    #[test]
    fn coverage_ranges() {
        let data = [
            0x00, 0x02, // format 2
            0x00, 0x02, // count
            0x00, 0x05, 0x00, 0x08, 0x00, 0x00, // 5..=8 -> 0..
            0x00, 0x14, 0x00, 0x15, 0x00, 0x04, // 20..=21 -> 4..
        ];
        let cov = Coverage::parse(&data, 0).unwrap();
        assert_eq!(cov.index_of(GlyphId(5)), Some(0));
        assert_eq!(cov.index_of(GlyphId(8)), Some(3));
        assert_eq!(cov.index_of(GlyphId(21)), Some(5));
        assert_eq!(cov.index_of(GlyphId(9)), None);
        assert!(!cov.contains(GlyphId(4)));
    }

    #[test]
    fn coverage_rejects_unknown_format() {
        let data = [0x00, 0x03, 0x00, 0x00];
        let err = Coverage::parse(&data, 0).unwrap_err();
        assert_eq!(err.reason, "invalid coverage format");
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn class_def_array() {
        let data = [
            0x00, 0x01, // format 1
            0x00, 0x0a, // first glyph 10
            0x00, 0x03, // count
            0x00, 0x01, 0x00, 0x00, 0x00, 0x02, // classes 1, 0, 2
        ];
        let classes = ClassDef::parse(&data, 0).unwrap();
        assert_eq!(classes.class_of(GlyphId(10)), 1);
        assert_eq!(classes.class_of(GlyphId(11)), 0);
        assert_eq!(classes.class_of(GlyphId(12)), 2);
        assert_eq!(classes.class_of(GlyphId(9)), 0);
        assert_eq!(classes.class_of(GlyphId(13)), 0);
    }

    #[test]
    fn class_def_ranges() {
        let data = [
            0x00, 0x02, // format 2
            0x00, 0x01, // count
            0x00, 0x64, 0x00, 0xc8, 0x00, 0x03, // 100..=200 -> class 3
        ];
        let classes = ClassDef::parse(&data, 0).unwrap();
        assert_eq!(classes.class_of(GlyphId(100)), 3);
        assert_eq!(classes.class_of(GlyphId(200)), 3);
        assert_eq!(classes.class_of(GlyphId(99)), 0);
        assert_eq!(classes.class_of(GlyphId(201)), 0);
    }
}
