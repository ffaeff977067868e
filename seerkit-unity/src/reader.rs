use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

use crate::error::{Result, UnityError};

/// Cursor over raw file data with a runtime-selected byte order.
///
/// Bundle headers are always big-endian, while serialized file metadata and
/// object data follow the endianness declared in the file header, so the
/// same reader is used in both modes.
pub struct EndianReader<'a> {
    cursor: Cursor<&'a [u8]>,
    big_endian: bool,
}

impl<'a> EndianReader<'a> {
    pub fn new(data: &'a [u8], big_endian: bool) -> Self {
        Self {
            cursor: Cursor::new(data),
            big_endian,
        }
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn set_position(&mut self, pos: u64) {
        self.cursor.set_position(pos);
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position() as usize)
    }

    /// Advance to the next multiple of `alignment` relative to the start of
    /// the underlying buffer.
    pub fn align(&mut self, alignment: u64) -> Result<()> {
        let pos = self.cursor.position();
        let rem = pos % alignment;
        if rem != 0 {
            self.cursor.seek(SeekFrom::Current((alignment - rem) as i64))?;
        }
        Ok(())
    }

    pub fn skip(&mut self, count: i64) -> Result<()> {
        self.cursor.seek(SeekFrom::Current(count))?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.cursor.read_u8()?)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.cursor.read_i8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(if self.big_endian {
            self.cursor.read_u16::<BigEndian>()?
        } else {
            self.cursor.read_u16::<LittleEndian>()?
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(if self.big_endian {
            self.cursor.read_i16::<BigEndian>()?
        } else {
            self.cursor.read_i16::<LittleEndian>()?
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(if self.big_endian {
            self.cursor.read_u32::<BigEndian>()?
        } else {
            self.cursor.read_u32::<LittleEndian>()?
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(if self.big_endian {
            self.cursor.read_i32::<BigEndian>()?
        } else {
            self.cursor.read_i32::<LittleEndian>()?
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(if self.big_endian {
            self.cursor.read_u64::<BigEndian>()?
        } else {
            self.cursor.read_u64::<LittleEndian>()?
        })
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(if self.big_endian {
            self.cursor.read_i64::<BigEndian>()?
        } else {
            self.cursor.read_i64::<LittleEndian>()?
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(if self.big_endian {
            self.cursor.read_f32::<BigEndian>()?
        } else {
            self.cursor.read_f32::<LittleEndian>()?
        })
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(if self.big_endian {
            self.cursor.read_f64::<BigEndian>()?
        } else {
            self.cursor.read_f64::<LittleEndian>()?
        })
    }

    /// Borrow `count` bytes from the underlying buffer and advance past them.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let pos = self.cursor.position() as usize;
        let data = *self.cursor.get_ref();
        if pos + count > data.len() {
            return Err(UnityError::UnexpectedEof {
                offset: pos as u64,
                needed: count,
            });
        }
        self.cursor.set_position((pos + count) as u64);
        Ok(&data[pos..pos + count])
    }

    pub fn read_guid(&mut self) -> Result<[u8; 16]> {
        let bytes = self.read_bytes(16)?;
        let mut guid = [0u8; 16];
        guid.copy_from_slice(bytes);
        Ok(guid)
    }

    /// Read a null-terminated string.
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_u8().map_err(|_| UnityError::UnexpectedEof {
                offset: self.position(),
                needed: 1,
            })?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a length-prefixed string padded to a 4-byte boundary.
    pub fn read_aligned_string(&mut self) -> Result<String> {
        let length = self.read_i32()?;
        if length < 0 {
            return Err(UnityError::InvalidFormat(format!(
                "negative string length: {}",
                length
            )));
        }
        let bytes = self.read_bytes(length as usize)?;
        let value = String::from_utf8_lossy(bytes).into_owned();
        self.align(4)?;
        Ok(value)
    }
}
