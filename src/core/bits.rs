//! # Bit Codec
//!
//! Byte-stream wrapper that packs booleans into single bits while keeping every
//! other value on a byte boundary.
//!
//! The codec is split into two capability traits:
//! - [`BitWrite`]: `write_bit` plus `write_aligned(bytes)`
//! - [`BitRead`]: `read_bit` plus `read_aligned(n)`
//!
//! Every typed helper (integers, floats, strings, packed varints) is a provided
//! method composed from those two primitives. Aligned operations always close the
//! pending partial byte first, so a run of fewer than eight booleans costs exactly
//! one byte once anything else is written.
//!
//! ## Wire Format
//! ```text
//! bools:    bit 0 of the byte is the first boolean written
//! integers: little-endian, fixed width
//! bytes:    [u16 length][bytes]
//! string:   [u16 length][UTF-8 bytes]
//! packed:   1..9 bytes, see `write_packed_u64`
//! ```
//!
//! ## Usage
//! ```rust
//! use game_netcore::core::bits::{BitRead, BitReader, BitWrite, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bool(true);
//! writer.write_bool(false);
//! writer.write_bool(true);
//! writer.write_u32(7);
//! let bytes = writer.into_bytes();
//! assert_eq!(bytes.len(), 5);
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bool().unwrap());
//! assert!(!reader.read_bool().unwrap());
//! assert!(reader.read_bool().unwrap());
//! assert_eq!(reader.read_u32().unwrap(), 7);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{NetError, Result};

/// Bit index value meaning "no partial byte".
const NO_PENDING_BITS: u8 = 8;

/// Default writer capacity, enough for a typical datagram.
const DEFAULT_CAPACITY: usize = 1500;

/// Write-side capability set.
pub trait BitWrite {
    /// Append one bit to the pending byte, emitting it once eight bits are collected.
    fn write_bit(&mut self, bit: bool);

    /// Close any pending partial byte (zero padded), then append `bytes` unchanged.
    fn write_aligned(&mut self, bytes: &[u8]);

    fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    fn write_u8(&mut self, value: u8) {
        self.write_aligned(&[value]);
    }

    fn write_i8(&mut self, value: i8) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_u16(&mut self, value: u16) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_i16(&mut self, value: i16) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_i32(&mut self, value: i32) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_i64(&mut self, value: i64) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_f32(&mut self, value: f32) {
        self.write_aligned(&value.to_le_bytes());
    }

    fn write_f64(&mut self, value: f64) {
        self.write_aligned(&value.to_le_bytes());
    }

    /// Raw bytes with no length prefix.
    fn write_bytes_full(&mut self, bytes: &[u8]) {
        self.write_aligned(bytes);
    }

    /// Bytes with a u16 length prefix.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u16::try_from(bytes.len()).map_err(|_| NetError::FieldTooLong(bytes.len()))?;
        self.write_u16(len);
        self.write_aligned(bytes);
        Ok(())
    }

    /// UTF-8 string with a u16 byte-length prefix.
    fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    fn write_packed_u32(&mut self, value: u32) {
        self.write_packed_u64(u64::from(value));
    }

    /// Variable-length unsigned integer.
    ///
    /// | range            | bytes | layout                                   |
    /// |------------------|-------|------------------------------------------|
    /// | 0..=240          | 1     | `[v]`                                    |
    /// | 241..=2287       | 2     | `[241 + (v-240)/256, (v-240)%256]`       |
    /// | 2288..=67823     | 3     | `[249, (v-2288)/256, (v-2288)%256]`      |
    /// | up to 2^24-1..   | 4..9  | `[250..=255, v as 3..=8 LE bytes]`       |
    fn write_packed_u64(&mut self, value: u64) {
        if value <= 240 {
            self.write_u8(value as u8);
        } else if value <= 2287 {
            let v = value - 240;
            self.write_aligned(&[(v / 256 + 241) as u8, (v % 256) as u8]);
        } else if value <= 67823 {
            let v = value - 2288;
            self.write_aligned(&[249, (v / 256) as u8, (v % 256) as u8]);
        } else {
            let width = packed_width(value);
            let mut out = [0u8; 9];
            out[0] = 247 + width as u8;
            out[1..=width].copy_from_slice(&value.to_le_bytes()[..width]);
            self.write_aligned(&out[..=width]);
        }
    }
}

/// Smallest little-endian width (3..=8) that holds `value`.
fn packed_width(value: u64) -> usize {
    let significant = 8 - (value.leading_zeros() as usize / 8);
    significant.max(3)
}

/// Read-side capability set.
pub trait BitRead<'a> {
    /// Next bit, pulling a fresh byte when the current one is exhausted.
    fn read_bit(&mut self) -> Result<bool>;

    /// Discard any partially consumed byte, then take `n` whole bytes.
    fn read_aligned(&mut self, n: usize) -> Result<&'a [u8]>;

    fn read_bool(&mut self) -> Result<bool> {
        self.read_bit()
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_aligned(1)?[0])
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(read_array(self)?))
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(read_array(self)?))
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(read_array(self)?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(read_array(self)?))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(read_array(self)?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(read_array(self)?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(read_array(self)?))
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(read_array(self)?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(read_array(self)?))
    }

    /// Raw bytes with no length prefix.
    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.read_aligned(count)
    }

    /// Bytes written by [`BitWrite::write_bytes`].
    fn read_bytes_and_size(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u16()? as usize;
        self.read_aligned(len)
    }

    fn read_string(&mut self) -> Result<&'a str> {
        let bytes = self.read_bytes_and_size()?;
        Ok(std::str::from_utf8(bytes)?)
    }

    fn read_packed_u32(&mut self) -> Result<u32> {
        let value = self.read_packed_u64()?;
        u32::try_from(value)
            .map_err(|_| NetError::MalformedFrame(format!("packed value {value} overflows u32")))
    }

    fn read_packed_u64(&mut self) -> Result<u64> {
        let a0 = self.read_u8()?;
        if a0 < 241 {
            return Ok(u64::from(a0));
        }
        if a0 <= 248 {
            let a1 = self.read_u8()?;
            return Ok(240 + 256 * u64::from(a0 - 241) + u64::from(a1));
        }
        if a0 == 249 {
            let tail = self.read_aligned(2)?;
            return Ok(2288 + 256 * u64::from(tail[0]) + u64::from(tail[1]));
        }
        let width = usize::from(a0 - 247);
        let tail = self.read_aligned(width)?;
        let mut le = [0u8; 8];
        le[..width].copy_from_slice(tail);
        Ok(u64::from_le_bytes(le))
    }
}

fn read_array<'a, R, const N: usize>(reader: &mut R) -> Result<[u8; N]>
where
    R: BitRead<'a> + ?Sized,
{
    let bytes = reader.read_aligned(N)?;
    bytes
        .try_into()
        .map_err(|_| NetError::MalformedFrame(format!("expected {N} bytes")))
}

/// Growable writer that packs booleans into bits.
#[derive(Debug, Clone)]
pub struct BitWriter {
    buf: BytesMut,
    pending: u8,
    bit_index: u8,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            pending: 0,
            bit_index: NO_PENDING_BITS,
        }
    }

    /// Emit the pending partial byte, if any. Unused high bits are zero.
    pub fn align(&mut self) {
        if self.bit_index != NO_PENDING_BITS {
            self.buf.put_u8(self.pending);
            self.pending = 0;
            self.bit_index = NO_PENDING_BITS;
        }
    }

    /// Bytes produced so far, counting a pending partial byte as one.
    pub fn len(&self) -> usize {
        self.buf.len() + usize::from(self.bit_index != NO_PENDING_BITS)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aligned view of everything written so far.
    pub fn as_slice(&mut self) -> &[u8] {
        self.align();
        &self.buf
    }

    /// Reset to empty, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pending = 0;
        self.bit_index = NO_PENDING_BITS;
    }

    pub fn into_bytes(mut self) -> Bytes {
        self.align();
        self.buf.freeze()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.into_bytes().to_vec()
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        if self.bit_index == NO_PENDING_BITS {
            self.pending = 0;
            self.bit_index = 0;
        }
        if bit {
            self.pending |= 1 << self.bit_index;
        }
        self.bit_index += 1;
        if self.bit_index == NO_PENDING_BITS {
            self.buf.put_u8(self.pending);
            self.pending = 0;
        }
    }

    fn write_aligned(&mut self, bytes: &[u8]) {
        self.align();
        self.buf.put_slice(bytes);
    }
}

/// Borrowing reader over a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    total: usize,
    current: u8,
    bit_index: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
            current: 0,
            bit_index: NO_PENDING_BITS,
        }
    }

    /// Whole bytes consumed so far (a partially read byte counts as consumed).
    pub fn position(&self) -> usize {
        self.total - self.buf.len()
    }

    /// Whole bytes not yet touched.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Everything not yet consumed, realigning first.
    pub fn read_to_end(&mut self) -> &'a [u8] {
        self.bit_index = NO_PENDING_BITS;
        let rest = self.buf;
        self.buf = &[];
        rest
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(NetError::EndOfStream {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }
}

impl<'a> BitRead<'a> for BitReader<'a> {
    fn read_bit(&mut self) -> Result<bool> {
        if self.bit_index == NO_PENDING_BITS {
            self.ensure(1)?;
            self.current = self.buf.get_u8();
            self.bit_index = 0;
        }
        let bit = (self.current >> self.bit_index) & 1 == 1;
        self.bit_index += 1;
        Ok(bit)
    }

    fn read_aligned(&mut self, n: usize) -> Result<&'a [u8]> {
        self.bit_index = NO_PENDING_BITS;
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_eight_bools_fill_one_byte() {
        let mut writer = BitWriter::new();
        for i in 0..8 {
            writer.write_bool(i % 2 == 0);
        }
        writer.write_u8(0xAB);
        let bytes = writer.into_vec();
        assert_eq!(bytes, vec![0b0101_0101, 0xAB]);
    }

    #[test]
    fn test_partial_byte_is_zero_padded() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_bool(true);
        writer.write_bool(true);
        writer.write_u32(0x0102_0304);
        assert_eq!(writer.into_vec(), vec![0b0000_0111, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_len_counts_pending_byte() {
        let mut writer = BitWriter::new();
        assert!(writer.is_empty());
        writer.write_bool(false);
        assert_eq!(writer.len(), 1);
        writer.write_u16(5);
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn test_reader_discards_partial_byte_before_aligned_read() {
        let bytes = [0b0000_0101, 0x2A];
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u8().unwrap(), 0x2A);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_ninth_bool_reads_next_byte() {
        let bytes = [0xFF, 0x00];
        let mut reader = BitReader::new(&bytes);
        for _ in 0..8 {
            assert!(reader.read_bool().unwrap());
        }
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_end_of_stream() {
        let mut reader = BitReader::new(&[1, 2, 3]);
        match reader.read_u32() {
            Err(NetError::EndOfStream { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
        let mut empty = BitReader::new(&[]);
        assert!(empty.read_bool().is_err());
    }

    #[test]
    fn test_string_and_bytes() {
        let mut writer = BitWriter::new();
        writer.write_string("héllo").unwrap();
        writer.write_bytes(&[9, 8, 7]).unwrap();
        let bytes = writer.into_vec();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "héllo");
        assert_eq!(reader.read_bytes_and_size().unwrap(), &[9, 8, 7]);
    }

    #[test]
    fn test_string_too_long() {
        let mut writer = BitWriter::new();
        let long = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            writer.write_string(&long),
            Err(NetError::FieldTooLong(_))
        ));
    }

    #[test]
    fn test_packed_sizes() {
        let cases: [(u64, usize); 10] = [
            (0, 1),
            (240, 1),
            (241, 2),
            (2287, 2),
            (2288, 3),
            (67823, 3),
            (67824, 4),
            (16_777_215, 4),
            (16_777_216, 5),
            (u64::MAX, 9),
        ];
        for (value, expected) in cases {
            let mut writer = BitWriter::new();
            writer.write_packed_u64(value);
            let bytes = writer.into_vec();
            assert_eq!(bytes.len(), expected, "value {value}");
            let mut reader = BitReader::new(&bytes);
            assert_eq!(reader.read_packed_u64().unwrap(), value);
        }
    }

    #[test]
    fn test_packed_u32_overflow_rejected() {
        let mut writer = BitWriter::new();
        writer.write_packed_u64(u64::from(u32::MAX) + 1);
        let bytes = writer.into_vec();
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_packed_u32().is_err());
    }
}
