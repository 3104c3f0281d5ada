//! Big-endian binary reader for font data

use super::fixed::{F2Dot14, Fixed16};
use super::Tag;

/// A read past the end of the data. Carries the position at which the read
/// was attempted so table parsers can report where a font broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadError {
    pub offset: usize,
}

/// 16-bit offset relative to some parent table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset16(pub u16);

impl Offset16 {
    /// A zero offset means "no table" everywhere OpenType uses Offset16.
    pub fn non_null(self) -> Option<usize> {
        (self.0 != 0).then_some(self.0 as usize)
    }
}

/// 32-bit offset relative to some parent table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset32(pub u32);

impl Offset32 {
    pub fn non_null(self) -> Option<usize> {
        (self.0 != 0).then_some(self.0 as usize)
    }
}

/// Bounds-checked reader over a font table.
pub struct FontReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FontReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor. Seeking past the end is allowed; the next
    /// read reports the failure.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReadError> {
        self.take(n)?;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        let end = self.pos.checked_add(n).ok_or(ReadError { offset: self.pos })?;
        if end > self.data.len() {
            return Err(ReadError { offset: self.pos });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadError> {
        Ok(self.read_u32()? as i32)
    }

    /// 16.16 signed fixed-point value.
    pub fn read_fixed(&mut self) -> Result<Fixed16, ReadError> {
        Ok(Fixed16::from_bits(self.read_i32()?))
    }

    /// 2.14 signed fixed-point value.
    pub fn read_f2dot14(&mut self) -> Result<F2Dot14, ReadError> {
        Ok(F2Dot14::from_bits(self.read_i16()?))
    }

    pub fn read_tag(&mut self) -> Result<Tag, ReadError> {
        let b = self.take(4)?;
        Ok(Tag([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_offset16(&mut self) -> Result<Offset16, ReadError> {
        Ok(Offset16(self.read_u16()?))
    }

    pub fn read_offset32(&mut self) -> Result<Offset32, ReadError> {
        Ok(Offset32(self.read_u32()?))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        self.take(n)
    }

    /// Length-prefixed UTF-16BE string: a u16 byte length followed by the
    /// encoded code units. Unpaired surrogates decode to U+FFFD.
    pub fn read_utf16_string(&mut self) -> Result<String, ReadError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len & !1)?;
        let units = bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]));
        Ok(char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }
}
