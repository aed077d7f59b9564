use crate::error::ReaderError;

type Result<T> = std::result::Result<T, ReaderError>;

/// Positioned reader over a byte range with byte and MSB-first bit access.
///
/// Byte-level reads always start on a byte boundary; a partially consumed
/// byte left over from bit reads is skipped first.
#[derive(Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    bit: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
            bit: 0,
        }
    }

    /// Reader restricted to `start..end` of `data`. Offsets stay absolute.
    pub fn with_range(data: &'a [u8], start: usize, end: usize) -> Self {
        let end = end.min(data.len());
        Self {
            data,
            pos: start.min(end),
            end,
            bit: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.end);
        self.bit = 0;
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.align();
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Discard the rest of a partially read byte.
    pub fn align(&mut self) {
        if self.bit != 0 {
            self.pos += 1;
            self.bit = 0;
        }
    }

    /// A reader over `start..end`, which must lie inside this reader's range.
    pub fn substream(&self, start: usize, end: usize) -> Result<BitReader<'a>> {
        if start > end || end > self.end {
            return Err(ReaderError::UnexpectedEndOfData {
                offset: start,
                need: end.saturating_sub(start),
                have: self.end.saturating_sub(start),
            });
        }
        Ok(Self::with_range(self.data, start, end))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.align();
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Everything up to the end of the range.
    pub fn read_rest(&mut self) -> &'a [u8] {
        self.align();
        let start = self.pos.min(self.end);
        self.pos = self.end;
        &self.data[start..self.end]
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.read_bytes(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.read_bytes(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Variable-length unsigned integer: 7 bits per byte, high bit set on
    /// every byte but the last, at most 5 bytes.
    pub fn read_encoded_u32(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(value)
    }

    /// 8.8 fixed point.
    pub fn read_fixed8(&mut self) -> Result<f32> {
        Ok(self.read_i16()? as f32 / 256.0)
    }

    /// 16.16 fixed point.
    pub fn read_fixed(&mut self) -> Result<f32> {
        Ok(self.read_i32()? as f32 / 65536.0)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_ub(1)? == 1)
    }

    /// Unsigned bit field of `bits` width (at most 32).
    pub fn read_ub(&mut self, bits: u32) -> Result<u32> {
        if bits == 0 {
            return Ok(0);
        }
        if bits > 32 {
            return Err(ReaderError::InvalidValue {
                what: "bit field width",
                value: bits,
                offset: self.pos,
            });
        }
        let needed_bits = self.bit as usize + bits as usize;
        let needed_bytes = needed_bits.div_ceil(8);
        self.ensure(needed_bytes)?;

        let mut acc: u64 = 0;
        for byte in &self.data[self.pos..self.pos + needed_bytes] {
            acc = (acc << 8) | u64::from(*byte);
        }
        let shift = needed_bytes * 8 - needed_bits;
        let value = (acc >> shift) & ((1u64 << bits) - 1);

        self.pos += needed_bits / 8;
        self.bit = (needed_bits % 8) as u8;
        Ok(value as u32)
    }

    /// Signed (two's complement) bit field of `bits` width.
    pub fn read_sb(&mut self, bits: u32) -> Result<i32> {
        if bits == 0 {
            return Ok(0);
        }
        let raw = self.read_ub(bits)?;
        let shift = 32 - bits;
        Ok(((raw << shift) as i32) >> shift)
    }

    /// Signed 16.16 fixed-point bit field.
    pub fn read_fb(&mut self, bits: u32) -> Result<f32> {
        Ok(self.read_sb(bits)? as f32 / 65536.0)
    }

    /// Read a string of `length` bytes, or up to a NUL terminator when
    /// `length` is `None`. A missing terminator ends the string at the range
    /// end. Trailing NULs inside a sized string are dropped.
    pub fn read_string(&mut self, length: Option<usize>) -> Result<String> {
        let bytes = match length {
            Some(n) => {
                let raw = self.read_bytes(n)?;
                let trimmed = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                &raw[..trimmed]
            }
            None => {
                self.align();
                let rest = &self.data[self.pos.min(self.end)..self.end];
                match rest.iter().position(|&b| b == 0) {
                    Some(nul) => {
                        self.pos += nul + 1;
                        &rest[..nul]
                    }
                    None => {
                        self.pos = self.end;
                        rest
                    }
                }
            }
        };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos + n > self.end {
            return Err(ReaderError::UnexpectedEndOfData {
                offset: self.pos,
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0xFF, 0xFF];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16().unwrap(), 0x0302);
        assert_eq!(reader.read_u32().unwrap(), 0x07060504);
        assert_eq!(reader.read_i16().unwrap(), -1);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_bit_fields() {
        // 1011_0011 0100_0000
        let data = [0b1011_0011, 0b0100_0000];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_ub(1).unwrap(), 1);
        assert_eq!(reader.read_ub(3).unwrap(), 0b011);
        // 0011 01 -> sign bit clear
        assert_eq!(reader.read_sb(6).unwrap(), 0b001101);
        // 000000 as a 6-bit signed field with the sign bit clear
        assert_eq!(reader.read_sb(6).unwrap(), 0);
    }

    #[test]
    fn test_signed_bits_sign_extend() {
        let data = [0b1110_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_sb(3).unwrap(), -1);
    }

    #[test]
    fn test_align_before_bytes() {
        let data = [0b1000_0000, 0x2A];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_u8().unwrap(), 0x2A);
    }

    #[test]
    fn test_strings() {
        let data = b"ball\0rest";
        let mut reader = BitReader::new(data);
        assert_eq!(reader.read_string(None).unwrap(), "ball");
        assert_eq!(reader.read_string(Some(4)).unwrap(), "rest");
    }

    #[test]
    fn test_encoded_u32() {
        let data = [0x05, 0xAC, 0x02];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_encoded_u32().unwrap(), 5);
        assert_eq!(reader.read_encoded_u32().unwrap(), 300);
    }

    #[test]
    fn test_unexpected_end() {
        let data = [0x01, 0x02];
        let mut reader = BitReader::with_range(&data, 1, 2);
        assert_eq!(
            reader.read_u16(),
            Err(ReaderError::UnexpectedEndOfData {
                offset: 1,
                need: 2,
                have: 1
            })
        );
    }

    #[test]
    fn test_substream_bounds() {
        let data = [0u8; 8];
        let reader = BitReader::with_range(&data, 2, 6);
        assert!(reader.substream(3, 5).is_ok());
        assert!(reader.substream(3, 7).is_err());
    }
}
