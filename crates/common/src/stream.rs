//! Little-endian byte buffers used by the object record format.

use crate::error::CoreError;

/// Append-only byte buffer.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Forward-only cursor over a borrowed byte slice.
///
/// Every read either consumes exactly the requested bytes or fails with
/// [`CoreError::Truncated`] without moving the cursor.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    head: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, head: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.head
    }

    fn peek_bytes(&self, count: usize) -> Result<&'a [u8], CoreError> {
        if count > self.remaining() {
            return Err(CoreError::Truncated {
                needed: count,
                remaining: self.remaining(),
            });
        }
        Ok(&self.data[self.head..self.head + count])
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CoreError> {
        let bytes = self.peek_bytes(count)?;
        self.head += count;
        Ok(bytes)
    }

    fn read_array(&mut self) -> Result<[u8; 4], CoreError> {
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn read_i32(&mut self) -> Result<i32, CoreError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CoreError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Look at the next `i32` without consuming it.
    pub fn peek_i32(&self) -> Result<i32, CoreError> {
        let bytes = self.peek_bytes(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut out = ByteWriter::new();
        out.write_i32(-1);
        out.write_u32(0x0102_0304);
        assert_eq!(
            out.as_bytes(),
            &[0xff, 0xff, 0xff, 0xff, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let mut out = ByteWriter::new();
        out.write_i32(1002);
        let bytes = out.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.peek_i32().unwrap(), 1002);
        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.read_i32().unwrap(), 1002);
        assert!(reader.is_empty());
    }

    #[test]
    fn truncated_read_fails_without_moving() {
        let bytes = [1u8, 2, 3];
        let mut reader = ByteReader::new(&bytes);
        let err = reader.read_u32().unwrap_err();
        assert_eq!(
            err,
            CoreError::Truncated {
                needed: 4,
                remaining: 3
            }
        );
        assert_eq!(reader.position(), 0);
    }
}
