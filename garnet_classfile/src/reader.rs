//! Bounds-checked big-endian cursor over class-file bytes

use byteorder::{BigEndian, ByteOrder};
use garnet_common::{GarnetError, GarnetResult};

/// An advancing cursor over a byte buffer. All multi-byte reads are
/// big-endian; every read is bounds-checked and fails with
/// `UnexpectedEndOfFile` instead of panicking.
pub struct ClassReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current byte offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left before the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    fn take(&mut self, count: usize) -> GarnetResult<&'a [u8]> {
        if self.remaining() < count {
            return Err(GarnetError::eof(format!(
                "needed {} bytes at offset {}, only {} remain",
                count,
                self.position,
                self.remaining()
            )));
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> GarnetResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> GarnetResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> GarnetResult<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> GarnetResult<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> GarnetResult<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> GarnetResult<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_i64(&mut self) -> GarnetResult<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> GarnetResult<f32> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> GarnetResult<f64> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }

    /// Read a fixed-size byte slice
    pub fn read_bytes(&mut self, count: usize) -> GarnetResult<&'a [u8]> {
        self.take(count)
    }

    /// Skip `count` bytes
    pub fn skip(&mut self, count: usize) -> GarnetResult<()> {
        self.take(count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_reads_are_big_endian() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let mut reader = ClassReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16().unwrap(), 0x0203);
        assert_eq!(reader.read_u8().unwrap(), 0x04);
        assert_eq!(reader.read_u16().unwrap(), 0x0506);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_signed_reads() {
        let data = [0xFF, 0xFF, 0xFF, 0xFE, 0x80];
        let mut reader = ClassReader::new(&data);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert_eq!(reader.read_i8().unwrap(), -128);
    }

    #[test]
    fn test_read_past_end_fails() {
        let data = [0x01, 0x02];
        let mut reader = ClassReader::new(&data);
        assert!(reader.read_u32().is_err());
        // A failed read must not advance the cursor
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
    }

    #[test]
    fn test_read_bytes_and_position() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00];
        let mut reader = ClassReader::new(&data);
        assert_eq!(reader.read_bytes(4).unwrap(), &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_floats() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1.5f32.to_be_bytes());
        buf.extend_from_slice(&(-2.25f64).to_be_bytes());
        let mut reader = ClassReader::new(&buf);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_f64().unwrap(), -2.25);
    }
}
