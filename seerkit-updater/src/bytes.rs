use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, UpdateError};

/// Little-endian reader over a manifest byte buffer. Strings carry a u16
/// length prefix, the convention the YooAsset serializer uses.
pub struct BufferReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(UpdateError::Truncated {
                offset: self.position,
                needed: count,
            });
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    /// u16 length prefix followed by UTF-8 bytes
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_u16()? as usize;
        let bytes = self.take(length)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    #[test]
    fn test_scalar_reads() {
        let mut data = Vec::new();
        data.push(7);
        data.push(1);
        data.write_u16::<LittleEndian>(300).unwrap();
        data.write_i32::<LittleEndian>(-5).unwrap();
        data.write_u32::<LittleEndian>(0xDEAD_BEEF).unwrap();
        data.write_i64::<LittleEndian>(1 << 40).unwrap();

        let mut reader = BufferReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 300);
        assert_eq!(reader.read_i32().unwrap(), -5);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_i64().unwrap(), 1 << 40);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_length_prefixed_string() {
        let mut data = Vec::new();
        data.write_u16::<LittleEndian>(5).unwrap();
        data.extend_from_slice(b"1.2.3");

        let mut reader = BufferReader::new(&data);
        assert_eq!(reader.read_string().unwrap(), "1.2.3");
    }

    #[test]
    fn test_truncated_read_carries_span() {
        let data = [1u8, 2];
        let mut reader = BufferReader::new(&data);
        reader.read_u8().unwrap();
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Truncated {
                offset: 1,
                needed: 4
            }
        ));
    }

    #[test]
    fn test_truncated_string_body() {
        let mut data = Vec::new();
        data.write_u16::<LittleEndian>(10).unwrap();
        data.extend_from_slice(b"abc");

        let mut reader = BufferReader::new(&data);
        assert!(reader.read_string().is_err());
    }
}
