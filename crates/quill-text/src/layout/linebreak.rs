//! Line break opportunities and codepoint classes
//!
//! Wraps the UAX 14 segmenter into a lazy event sequence addressed by
//! codepoint index, which is how the layout walk counts positions. The
//! iterator owns no layout state; restarting a paragraph just builds a new
//! one.

use unicode_linebreak::{linebreaks, BreakOpportunity};

/// One break opportunity. `position` is the codepoint index a new line
/// would start at; `required` marks mandatory breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakEvent {
    pub position: usize,
    pub required: bool,
}

/// Lazy UAX 14 break events over a paragraph, in codepoint positions.
pub struct LineBreaks<'a> {
    text: &'a str,
    inner: Box<dyn Iterator<Item = (usize, BreakOpportunity)> + 'a>,
    chars_seen: usize,
    byte_cursor: usize,
}

impl<'a> LineBreaks<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            inner: Box::new(linebreaks(text)),
            chars_seen: 0,
            byte_cursor: 0,
        }
    }
}

impl Iterator for LineBreaks<'_> {
    type Item = BreakEvent;

    fn next(&mut self) -> Option<BreakEvent> {
        let (byte, opportunity) = self.inner.next()?;
        // Opportunities arrive in byte order; count codepoints incrementally.
        self.chars_seen += self.text[self.byte_cursor..byte].chars().count();
        self.byte_cursor = byte;
        Some(BreakEvent {
            position: self.chars_seen,
            required: opportunity == BreakOpportunity::Mandatory,
        })
    }
}

/// Line-terminating codepoints other than carriage return: LF, VT, FF,
/// NEL, LINE SEPARATOR and PARAGRAPH SEPARATOR. CR has its own dispatch in
/// the layout walk so CRLF collapses onto the LF.
pub fn is_newline(c: char) -> bool {
    matches!(
        c,
        '\n' | '\u{000b}' | '\u{000c}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

/// CJK codepoints that keep-all word breaking refuses to wrap inside.
pub fn is_cjk(c: char) -> bool {
    matches!(u32::from(c),
        0x3400..=0x4dbf        // CJK extension A
        | 0x4e00..=0x9fff      // CJK unified ideographs
        | 0x3040..=0x309f      // hiragana
        | 0x30a0..=0x30ff      // katakana
        | 0xac00..=0xd7af      // hangul syllables
        | 0xf900..=0xfaff      // compatibility ideographs
    )
}
