//! Codepoint to glyph mapping (cmap table)

use super::reader::FontReader;
use super::GlyphId;

/// Resolve a codepoint through the best Unicode subtable the font offers.
///
/// Missing mappings are not errors; the caller substitutes `.notdef`.
pub(crate) fn glyph_index(cmap: &[u8], codepoint: u32) -> Option<GlyphId> {
    let subtable = best_unicode_subtable(cmap)?;
    let mut r = FontReader::new(subtable);
    match r.read_u16().ok()? {
        4 => format4(subtable, codepoint),
        12 => format12(subtable, codepoint),
        _ => None,
    }
}

/// Pick the encoding record with the widest Unicode repertoire.
fn best_unicode_subtable(cmap: &[u8]) -> Option<&[u8]> {
    let mut r = FontReader::new(cmap);
    let _version = r.read_u16().ok()?;
    let num_tables = r.read_u16().ok()?;

    let mut best: Option<(u8, usize)> = None;
    for _ in 0..num_tables {
        let platform_id = r.read_u16().ok()?;
        let encoding_id = r.read_u16().ok()?;
        let offset = r.read_u32().ok()? as usize;

        let rank = match (platform_id, encoding_id) {
            (0, 4) | (0, 6) => 5, // Unicode full repertoire
            (3, 10) => 4,         // Windows, UCS-4
            (0, 3) => 3,          // Unicode BMP
            (3, 1) => 2,          // Windows, BMP
            (0, _) => 1,
            _ => 0,
        };
        if rank > 0 && best.is_none_or(|(r, _)| rank > r) {
            best = Some((rank, offset));
        }
    }

    let (_, offset) = best?;
    cmap.get(offset..)
}

/// Format 4: segment mapping to delta values, BMP only.
fn format4(data: &[u8], codepoint: u32) -> Option<GlyphId> {
    let code = u16::try_from(codepoint).ok()?;
    let mut r = FontReader::new(data);
    r.skip(6).ok()?; // format, length, language
    let seg_count = (r.read_u16().ok()? / 2) as usize;
    r.skip(6).ok()?; // searchRange, entrySelector, rangeShift

    let end_codes = r.pos();
    let start_codes = end_codes + seg_count * 2 + 2; // +2 reservedPad
    let deltas = start_codes + seg_count * 2;
    let range_offsets = deltas + seg_count * 2;

    let read_at = |base: usize, index: usize| -> Option<u16> {
        let mut r = FontReader::new(data);
        r.seek(base + index * 2);
        r.read_u16().ok()
    };

    // First segment whose end code is >= the target.
    let mut lo = 0usize;
    let mut hi = seg_count;
    while lo < hi {
        let mid = (lo + hi) / 2;
        if read_at(end_codes, mid)? < code {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo == seg_count {
        return None;
    }

    let start = read_at(start_codes, lo)?;
    if code < start {
        return None;
    }

    let delta = read_at(deltas, lo)? as i16;
    let range_offset = read_at(range_offsets, lo)?;

    let glyph = if range_offset == 0 {
        (code as i32 + delta as i32) as u16
    } else {
        // The offset is relative to its own position in the idRangeOffset
        // array, per the quirkiest corner of the format.
        let index_pos =
            range_offsets + lo * 2 + range_offset as usize + (code - start) as usize * 2;
        let glyph = read_at(index_pos, 0)?;
        if glyph == 0 {
            return None;
        }
        (glyph as i32 + delta as i32) as u16
    };

    (glyph != 0).then_some(GlyphId(glyph))
}

/// Format 12: segmented coverage over the full Unicode range.
fn format12(data: &[u8], codepoint: u32) -> Option<GlyphId> {
    let mut r = FontReader::new(data);
    r.skip(12).ok()?; // format, reserved, length, language
    let num_groups = r.read_u32().ok()? as usize;
    let groups = r.pos();

    let mut lo = 0usize;
    let mut hi = num_groups;
    while lo < hi {
        let mid = (lo + hi) / 2;
        let mut g = FontReader::new(data);
        g.seek(groups + mid * 12);
        let start = g.read_u32().ok()?;
        let end = g.read_u32().ok()?;
        if codepoint < start {
            hi = mid;
        } else if codepoint > end {
            lo = mid + 1;
        } else {
            let start_glyph = g.read_u32().ok()?;
            return u16::try_from(start_glyph + (codepoint - start))
                .ok()
                .map(GlyphId);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// cmap with a single format 4 subtable mapping 'a'..='c' to glyphs 1..=3
    /// and 'f'..'i' to 10..13.
    fn sample_cmap() -> Vec<u8> {
        let mut cmap = vec![
            0x00, 0x00, // version
            0x00, 0x01, // numTables
            0x00, 0x03, 0x00, 0x01, // windows, BMP
            0x00, 0x00, 0x00, 0x0c, // offset 12
        ];
        let segments: &[(u16, u16, i16)] = &[
            (b'a' as u16, b'c' as u16, 1 - b'a' as i16),
            (b'f' as u16, b'i' as u16, 10 - b'f' as i16),
            (0xffff, 0xffff, 1),
        ];
        let seg_count = segments.len() as u16;
        let mut sub = Vec::new();
        sub.extend_from_slice(&4u16.to_be_bytes());
        sub.extend_from_slice(&0u16.to_be_bytes()); // length, unchecked
        sub.extend_from_slice(&0u16.to_be_bytes()); // language
        sub.extend_from_slice(&(seg_count * 2).to_be_bytes());
        sub.extend_from_slice(&[0; 6]); // search helpers, unchecked
        for &(_, end, _) in segments {
            sub.extend_from_slice(&end.to_be_bytes());
        }
        sub.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
        for &(start, _, _) in segments {
            sub.extend_from_slice(&start.to_be_bytes());
        }
        for &(_, _, delta) in segments {
            sub.extend_from_slice(&delta.to_be_bytes());
        }
        for _ in segments {
            sub.extend_from_slice(&0u16.to_be_bytes()); // idRangeOffset
        }
        cmap.extend_from_slice(&sub);
        cmap
    }

    #[test]
    fn format4_lookup() {
        let cmap = sample_cmap();
        assert_eq!(glyph_index(&cmap, 'a' as u32), Some(GlyphId(1)));
        assert_eq!(glyph_index(&cmap, 'c' as u32), Some(GlyphId(3)));
        assert_eq!(glyph_index(&cmap, 'f' as u32), Some(GlyphId(10)));
        assert_eq!(glyph_index(&cmap, 'i' as u32), Some(GlyphId(13)));
    }

    #[test]
    fn format4_missing_codepoints() {
        let cmap = sample_cmap();
        assert_eq!(glyph_index(&cmap, 'd' as u32), None);
        assert_eq!(glyph_index(&cmap, 'z' as u32), None);
        assert_eq!(glyph_index(&cmap, 0x1F600), None); // outside the BMP
    }
}
