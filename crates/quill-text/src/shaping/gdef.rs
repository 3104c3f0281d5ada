//! Glyph definitions (GDEF table)
//!
//! Supplies the glyph classifications lookup flags filter on: the base /
//! ligature / mark / component partition, mark attachment classes, and mark
//! glyph sets.

use crate::font::reader::FontReader;
use crate::font::GlyphId;
use crate::Result;

use super::common::{ClassDef, Coverage, PResult, ParseIssue};

/// GDEF glyph category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphClass {
    Base,
    Ligature,
    Mark,
    Component,
}

impl GlyphClass {
    fn from_class(class: u16) -> Option<Self> {
        match class {
            1 => Some(GlyphClass::Base),
            2 => Some(GlyphClass::Ligature),
            3 => Some(GlyphClass::Mark),
            4 => Some(GlyphClass::Component),
            _ => None,
        }
    }
}

/// Parsed glyph classification data.
#[derive(Debug, Clone, Default)]
pub struct GlyphClasses {
    glyph_classes: Option<ClassDef>,
    mark_attach_classes: Option<ClassDef>,
    mark_sets: Vec<Coverage>,
}

impl GlyphClasses {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_impl(data).map_err(|e| e.into_error("GDEF"))
    }

    fn parse_impl(data: &[u8]) -> PResult<Self> {
        let mut r = FontReader::new(data);
        let major = r.read_u16()?;
        let minor = r.read_u16()?;
        if major != 1 {
            return Err(ParseIssue::at(0, "unsupported GDEF version"));
        }

        let glyph_class_offset = r.read_offset16()?;
        let _attach_list = r.read_offset16()?;
        let _lig_caret_list = r.read_offset16()?;
        let mark_attach_offset = r.read_offset16()?;
        // Mark glyph sets arrived with version 1.2.
        let mark_sets_offset = if minor >= 2 {
            r.read_offset16()?.non_null()
        } else {
            None
        };

        let glyph_classes = glyph_class_offset
            .non_null()
            .map(|off| ClassDef::parse(data, off))
            .transpose()?;
        let mark_attach_classes = mark_attach_offset
            .non_null()
            .map(|off| ClassDef::parse(data, off))
            .transpose()?;

        let mut mark_sets = Vec::new();
        if let Some(base) = mark_sets_offset {
            let mut r = FontReader::new(data);
            r.seek(base);
            let format = r.read_u16()?;
            if format != 1 {
                return Err(ParseIssue::at(base, "invalid mark glyph sets format"));
            }
            let count = r.read_u16()? as usize;
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                // Offset32, relative to the mark glyph sets table itself.
                offsets.push(r.read_offset32()?);
            }
            for offset in offsets {
                let Some(off) = offset.non_null() else {
                    return Err(ParseIssue::at(base, "null mark set coverage offset"));
                };
                mark_sets.push(Coverage::parse(data, base + off)?);
            }
        }

        Ok(Self {
            glyph_classes,
            mark_attach_classes,
            mark_sets,
        })
    }

    /// GDEF category of a glyph, `None` when the font does not classify it.
    pub fn glyph_class(&self, glyph: GlyphId) -> Option<GlyphClass> {
        GlyphClass::from_class(self.glyph_classes.as_ref()?.class_of(glyph))
    }

    /// Mark attachment class, 0 when unassigned.
    pub fn mark_attachment_class(&self, glyph: GlyphId) -> u16 {
        self.mark_attach_classes
            .as_ref()
            .map_or(0, |c| c.class_of(glyph))
    }

    /// Whether mark set `set` covers `glyph`. Out-of-range sets cover
    /// nothing.
    pub fn mark_set_covers(&self, set: u16, glyph: GlyphId) -> bool {
        self.mark_sets
            .get(set as usize)
            .is_some_and(|cov| cov.contains(glyph))
    }
}
