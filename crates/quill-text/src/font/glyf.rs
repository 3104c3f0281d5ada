//! Glyph outline extraction (glyf/loca tables)

use super::outline::OutlineBuilder;
use super::reader::FontReader;

const ON_CURVE: u8 = 0x01;
const X_SHORT: u8 = 0x02;
const Y_SHORT: u8 = 0x04;
const REPEAT: u8 = 0x08;
const X_SAME_OR_POSITIVE: u8 = 0x10;
const Y_SAME_OR_POSITIVE: u8 = 0x20;

/// Byte range of one glyph in the glyf table, from loca.
pub(crate) fn glyph_range(loca: &[u8], glyph: u16, long_format: bool) -> Option<(usize, usize)> {
    let mut r = FontReader::new(loca);
    let (start, end) = if long_format {
        r.seek(glyph as usize * 4);
        (r.read_u32().ok()? as usize, r.read_u32().ok()? as usize)
    } else {
        r.seek(glyph as usize * 2);
        (
            r.read_u16().ok()? as usize * 2,
            r.read_u16().ok()? as usize * 2,
        )
    };
    (start <= end).then_some((start, end))
}

/// Walk one glyph's contours into `builder`. Empty glyphs succeed with no
/// output. Composite components recurse with their translation applied.
pub(crate) fn outline_glyph<B: OutlineBuilder>(
    glyf: &[u8],
    loca: &[u8],
    glyph: u16,
    long_format: bool,
    builder: &mut B,
) -> Option<()> {
    outline_at(glyf, loca, glyph, long_format, 0.0, 0.0, 0, builder)
}

fn outline_at<B: OutlineBuilder>(
    glyf: &[u8],
    loca: &[u8],
    glyph: u16,
    long_format: bool,
    dx: f32,
    dy: f32,
    depth: u8,
    builder: &mut B,
) -> Option<()> {
    // Composite cycles in broken fonts must not recurse forever.
    if depth > 8 {
        return None;
    }

    let (start, end) = glyph_range(loca, glyph, long_format)?;
    if start == end {
        return Some(()); // no outline (space and friends)
    }
    let data = glyf.get(start..end)?;

    let mut r = FontReader::new(data);
    let num_contours = r.read_i16().ok()?;
    r.skip(8).ok()?; // bounding box

    if num_contours >= 0 {
        simple_outline(data, num_contours as usize, dx, dy, builder)
    } else {
        composite_outline(glyf, loca, data, long_format, dx, dy, depth, builder)
    }
}

fn simple_outline<B: OutlineBuilder>(
    data: &[u8],
    num_contours: usize,
    dx: f32,
    dy: f32,
    builder: &mut B,
) -> Option<()> {
    if num_contours == 0 {
        return Some(());
    }

    let mut r = FontReader::new(data);
    r.seek(10);

    let mut contour_ends = Vec::with_capacity(num_contours);
    for _ in 0..num_contours {
        contour_ends.push(r.read_u16().ok()? as usize);
    }
    let num_points = contour_ends.last()? + 1;

    let instruction_len = r.read_u16().ok()? as usize;
    r.skip(instruction_len).ok()?;

    let mut flags = Vec::with_capacity(num_points);
    while flags.len() < num_points {
        let flag = r.read_u8().ok()?;
        flags.push(flag);
        if flag & REPEAT != 0 {
            let count = r.read_u8().ok()? as usize;
            for _ in 0..count {
                flags.push(flag);
            }
        }
    }

    let read_axis = |r: &mut FontReader, flag: u8, short: u8, same: u8, prev: i32| -> Option<i32> {
        if flag & short != 0 {
            let d = r.read_u8().ok()? as i32;
            Some(prev + if flag & same != 0 { d } else { -d })
        } else if flag & same != 0 {
            Some(prev)
        } else {
            Some(prev + r.read_i16().ok()? as i32)
        }
    };

    let mut xs = Vec::with_capacity(num_points);
    let mut v = 0i32;
    for &flag in &flags[..num_points] {
        v = read_axis(&mut r, flag, X_SHORT, X_SAME_OR_POSITIVE, v)?;
        xs.push(v as f32 + dx);
    }
    let mut ys = Vec::with_capacity(num_points);
    v = 0;
    for &flag in &flags[..num_points] {
        v = read_axis(&mut r, flag, Y_SHORT, Y_SAME_OR_POSITIVE, v)?;
        ys.push(v as f32 + dy);
    }

    let mut first = 0usize;
    for &last in &contour_ends {
        emit_contour(&flags[first..=last], &xs[first..=last], &ys[first..=last], builder);
        first = last + 1;
    }
    Some(())
}

/// One closed contour of quadratic segments. Consecutive off-curve points
/// imply an on-curve midpoint between them.
fn emit_contour<B: OutlineBuilder>(flags: &[u8], xs: &[f32], ys: &[f32], builder: &mut B) {
    let len = flags.len();
    if len < 2 {
        return;
    }

    let start = flags
        .iter()
        .position(|f| f & ON_CURVE != 0)
        .unwrap_or(0);
    let mut pending: Option<(f32, f32)> = None;
    let (x0, y0) = if flags[start] & ON_CURVE != 0 {
        (xs[start], ys[start])
    } else {
        // All-off-curve contour: start from the midpoint of the seam and
        // keep the first point as a control.
        let next = (start + 1) % len;
        pending = Some((xs[start], ys[start]));
        ((xs[start] + xs[next]) / 2.0, (ys[start] + ys[next]) / 2.0)
    };
    builder.move_to(x0, y0);

    for step in 1..len {
        let i = (start + step) % len;
        let (x, y) = (xs[i], ys[i]);
        if flags[i] & ON_CURVE != 0 {
            match pending.take() {
                Some((cx, cy)) => builder.quad_to(cx, cy, x, y),
                None => builder.line_to(x, y),
            }
        } else {
            if let Some((cx, cy)) = pending {
                builder.quad_to(cx, cy, (cx + x) / 2.0, (cy + y) / 2.0);
            }
            pending = Some((x, y));
        }
    }
    if let Some((cx, cy)) = pending {
        builder.quad_to(cx, cy, x0, y0);
    }
    builder.close();
}

fn composite_outline<B: OutlineBuilder>(
    glyf: &[u8],
    loca: &[u8],
    data: &[u8],
    long_format: bool,
    dx: f32,
    dy: f32,
    depth: u8,
    builder: &mut B,
) -> Option<()> {
    const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
    const ARGS_ARE_XY_VALUES: u16 = 0x0002;
    const WE_HAVE_A_SCALE: u16 = 0x0008;
    const MORE_COMPONENTS: u16 = 0x0020;
    const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
    const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

    let mut r = FontReader::new(data);
    r.seek(10);

    loop {
        let flags = r.read_u16().ok()?;
        let component = r.read_u16().ok()?;

        let (cx, cy) = if flags & ARG_1_AND_2_ARE_WORDS != 0 {
            (r.read_i16().ok()? as f32, r.read_i16().ok()? as f32)
        } else {
            (r.read_u8().ok()? as i8 as f32, r.read_u8().ok()? as i8 as f32)
        };
        // Point-matching placement (no ARGS_ARE_XY_VALUES) is not supported;
        // such components land untranslated.
        let (cx, cy) = if flags & ARGS_ARE_XY_VALUES != 0 {
            (cx, cy)
        } else {
            (0.0, 0.0)
        };

        // Scaling transforms are skipped over; translation is what text
        // composites (accents over bases) actually use.
        if flags & WE_HAVE_A_SCALE != 0 {
            r.skip(2).ok()?;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            r.skip(4).ok()?;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            r.skip(8).ok()?;
        }

        outline_at(
            glyf,
            loca,
            component,
            long_format,
            dx + cx,
            dy + cy,
            depth + 1,
            builder,
        )?;

        if flags & MORE_COMPONENTS == 0 {
            return Some(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::outline::{GlyphOutline, OutlineCommand};

    /// Short-format loca plus a one-contour triangle glyph.
    fn triangle_font() -> (Vec<u8>, Vec<u8>) {
        let mut glyf = vec![
            0x00, 0x01, // numberOfContours = 1
            0x00, 0x00, 0x00, 0x00, 0x02, 0x58, 0x02, 0x58, // bbox
            0x00, 0x02, // endPtsOfContours = [2]
            0x00, 0x00, // instructionLength = 0
            0x01, 0x01, 0x01, // flags: three on-curve points, long deltas
            0x00, 0x00, 0x01, 0x2c, 0xff, 0x9c, // x deltas: 0, 300, -100
            0x00, 0x00, 0x00, 0x00, 0x01, 0x2c, // y deltas: 0, 0, 300
        ];
        if glyf.len() % 2 != 0 {
            glyf.push(0); // short loca addresses in two-byte units
        }
        let loca = vec![0x00, 0x00, 0x00, (glyf.len() / 2) as u8];
        (glyf, loca)
    }

    #[test]
    fn simple_glyph_outline() {
        let (glyf, loca) = triangle_font();
        let mut outline = GlyphOutline::default();
        outline_glyph(&glyf, &loca, 0, false, &mut outline).unwrap();
        assert_eq!(
            outline.commands,
            vec![
                OutlineCommand::MoveTo(0.0, 0.0),
                OutlineCommand::LineTo(300.0, 0.0),
                OutlineCommand::LineTo(200.0, 300.0),
                OutlineCommand::Close,
            ]
        );
    }

    #[test]
    fn empty_glyph_has_no_outline() {
        let loca = vec![0x00, 0x00, 0x00, 0x00];
        let mut outline = GlyphOutline::default();
        outline_glyph(&[], &loca, 0, false, &mut outline).unwrap();
        assert!(outline.commands.is_empty());
    }
}
