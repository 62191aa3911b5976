//! Sequential MSB-first bit cursor over an in-memory byte slice.
//!
//! Every read checks the remaining bit budget *before* touching the
//! underlying stream, so a failed read never moves the cursor.  That is what
//! lets the record decoder tell a clean end of file (nothing left at a record
//! boundary) apart from a record cut short in the middle.

use std::io::{self, Cursor};

use bitstream_io::{BigEndian, BitRead};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BitReadError {
    #[error("End of stream at bit {bit_offset}: requested {requested} bits, {remaining} remaining")]
    EndOfStream { requested: u64, remaining: u64, bit_offset: u64 },
    #[error("Unsupported field width: {bits} bits")]
    InvalidWidth { bits: u32 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BitReadError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, BitReadError::EndOfStream { .. })
    }
}

pub struct BitReader<'a> {
    inner:    bitstream_io::BitReader<Cursor<&'a [u8]>, BigEndian>,
    position: u64,
    len_bits: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner:    bitstream_io::BitReader::endian(Cursor::new(data), BigEndian),
            position: 0,
            len_bits: data.len() as u64 * 8,
        }
    }

    /// Cursor position in bits from the start of the input.
    #[inline]
    pub fn position(&self) -> u64 { self.position }

    /// Byte containing the cursor (rounded down).
    #[inline]
    pub fn byte_offset(&self) -> u64 { self.position / 8 }

    #[inline]
    pub fn remaining(&self) -> u64 { self.len_bits - self.position }

    #[inline]
    pub fn is_at_end(&self) -> bool { self.remaining() == 0 }

    fn ensure(&self, bits: u64) -> Result<(), BitReadError> {
        if bits > self.remaining() {
            return Err(BitReadError::EndOfStream {
                requested:  bits,
                remaining:  self.remaining(),
                bit_offset: self.position,
            });
        }
        Ok(())
    }

    /// Read `bits` (0–64) bits as an unsigned integer.
    pub fn read_uint(&mut self, bits: u32) -> Result<u64, BitReadError> {
        if bits > 64 {
            return Err(BitReadError::InvalidWidth { bits });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure(bits as u64)?;
        let value = self.inner.read::<u64>(bits)?;
        self.position += bits as u64;
        Ok(value)
    }

    /// Read `bits` (1–64) bits as a two's-complement signed integer.
    pub fn read_int(&mut self, bits: u32) -> Result<i64, BitReadError> {
        if bits == 0 || bits > 64 {
            return Err(BitReadError::InvalidWidth { bits });
        }
        let raw   = self.read_uint(bits)?;
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Advance the cursor over `bits` bits of padding.
    pub fn skip(&mut self, bits: u32) -> Result<(), BitReadError> {
        self.ensure(bits as u64)?;
        self.inner.skip(bits)?;
        self.position += bits as u64;
        Ok(())
    }

    /// Read `count` samples of `bit_depth` (1–8) bits each, one sample per
    /// output byte, right-aligned.
    pub fn read_bytes_bitpacked(&mut self, count: usize, bit_depth: u32) -> Result<Vec<u8>, BitReadError> {
        if bit_depth == 0 || bit_depth > 8 {
            return Err(BitReadError::InvalidWidth { bits: bit_depth });
        }
        self.ensure(count as u64 * bit_depth as u64)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.inner.read::<u8>(bit_depth)?);
        }
        self.position += count as u64 * bit_depth as u64;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::{BitWrite, BitWriter};
    use proptest::prelude::*;

    #[test]
    fn reads_across_byte_boundaries() {
        // 101 | 11000 | 0110 0111 ...
        let data = [0b1011_1000, 0b0110_0111];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_uint(3).unwrap(), 0b101);
        assert_eq!(r.read_uint(5).unwrap(), 0b11000);
        assert_eq!(r.read_uint(4).unwrap(), 0b0110);
        assert_eq!(r.position(), 12);
        assert_eq!(r.remaining(), 4);
    }

    #[test]
    fn signed_36_bit_values() {
        // 36 bits of ones followed by 4 zero bits.
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xF0];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_int(36).unwrap(), -1);

        let data = [0x00, 0x00, 0x00, 0x00, 0x70];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_int(36).unwrap(), 7);
    }

    #[test]
    fn end_of_stream_leaves_cursor_untouched() {
        let data = [0xAB];
        let mut r = BitReader::new(&data);
        r.skip(4).unwrap();
        let err = r.read_uint(6).unwrap_err();
        assert!(err.is_end_of_stream());
        assert_eq!(r.position(), 4);
        assert_eq!(r.read_uint(4).unwrap(), 0xB);
        assert!(r.is_at_end());
        assert!(r.skip(1).unwrap_err().is_end_of_stream());
    }

    #[test]
    fn six_bit_samples() {
        // 000001 000010 111111 000000
        let data = [0b0000_0100, 0b0010_1111, 0b1100_0000];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bytes_bitpacked(4, 6).unwrap(), vec![1, 2, 63, 0]);
        assert!(r.is_at_end());
    }

    #[test]
    fn rejects_bad_widths() {
        let data = [0u8; 16];
        let mut r = BitReader::new(&data);
        assert!(matches!(r.read_uint(65), Err(BitReadError::InvalidWidth { bits: 65 })));
        assert!(matches!(r.read_int(0), Err(BitReadError::InvalidWidth { bits: 0 })));
        assert!(matches!(r.read_bytes_bitpacked(1, 9), Err(BitReadError::InvalidWidth { bits: 9 })));
        assert_eq!(r.position(), 0);
    }

    proptest! {
        #[test]
        fn packed_samples_match_writer(depth in 1u32..=8, raw in proptest::collection::vec(any::<u8>(), 0..200)) {
            let samples: Vec<u8> = raw.iter().map(|v| v & ((1u16 << depth) - 1) as u8).collect();
            let mut buf = Vec::new();
            {
                let mut w = BitWriter::endian(&mut buf, BigEndian);
                for s in &samples {
                    w.write(depth, *s).unwrap();
                }
                w.byte_align().unwrap();
            }
            let mut r = BitReader::new(&buf);
            prop_assert_eq!(r.read_bytes_bitpacked(samples.len(), depth).unwrap(), samples);
            prop_assert!(r.remaining() < 8);
        }
    }
}
