//! Bounds-checked sequential reader and writer over byte buffers
//!
//! Every read or write that would run past the end of the buffer fails with
//! [`SpvError::OutOfBounds`] carrying the offset at which it was attempted.
//! A failed reader should be dropped; its offset is not rewound.

use crate::error::{Result, SpvError};
use crate::hash::hash256;
use crate::types::Hash256;
use crate::varint;

macro_rules! read_uint {
    ($le:ident, $be:ident, $ty:ty, $width:expr) => {
        pub fn $le(&mut self) -> Result<$ty> {
            Ok(self.read_uint_le($width)? as $ty)
        }

        pub fn $be(&mut self) -> Result<$ty> {
            Ok(self.read_uint_be($width)? as $ty)
        }
    };
}

macro_rules! write_uint {
    ($le:ident, $be:ident, $ty:ty, $width:expr) => {
        pub fn $le(&mut self, value: $ty) -> Result<&mut Self> {
            self.write_uint_le(value as u64, $width)
        }

        pub fn $be(&mut self, value: $ty) -> Result<&mut Self> {
            self.write_uint_be(value as u64, $width)
        }
    };
}

/// Sequential reader with a stack of marks.
///
/// `start()` pushes the current offset, `end()` pops it and returns the number
/// of bytes consumed since, and `end_data()` pops it and returns an owned copy
/// of exactly those bytes.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
    stack: Vec<usize>,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader {
            data,
            offset: 0,
            stack: Vec::new(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total size of the underlying buffer
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn left(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_at_end(&self) -> bool {
        self.offset == self.data.len()
    }

    fn check(&self, size: usize) -> Result<()> {
        match self.offset.checked_add(size) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(SpvError::OutOfBounds { offset: self.offset }),
        }
    }

    /// Move the offset by `off` bytes in either direction
    pub fn seek(&mut self, off: isize) -> Result<()> {
        let target = self
            .offset
            .checked_add_signed(off)
            .filter(|&t| t <= self.data.len())
            .ok_or(SpvError::OutOfBounds { offset: self.offset })?;
        self.offset = target;
        Ok(())
    }

    /// Look at the next `n` bytes without consuming them
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        Ok(&self.data[self.offset..self.offset + n])
    }

    pub fn start(&mut self) -> usize {
        self.stack.push(self.offset);
        self.offset
    }

    pub fn end(&mut self) -> Result<usize> {
        let start = self.stack.pop().ok_or(SpvError::EmptyMarkStack)?;
        self.offset.checked_sub(start).ok_or(SpvError::OutOfBounds { offset: self.offset })
    }

    pub fn end_data(&mut self) -> Result<Vec<u8>> {
        let start = self.stack.pop().ok_or(SpvError::EmptyMarkStack)?;
        self.data
            .get(start..self.offset)
            .map(<[u8]>::to_vec)
            .ok_or(SpvError::OutOfBounds { offset: self.offset })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.check(1)?;
        let value = self.data[self.offset];
        self.offset += 1;
        Ok(value)
    }

    fn read_uint_le(&mut self, width: usize) -> Result<u64> {
        let bytes = self.read_bytes(width)?;
        Ok(bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    fn read_uint_be(&mut self, width: usize) -> Result<u64> {
        let bytes = self.read_bytes(width)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    read_uint!(read_u16_le, read_u16_be, u16, 2);
    read_uint!(read_u24_le, read_u24_be, u32, 3);
    read_uint!(read_u32_le, read_u32_be, u32, 4);
    read_uint!(read_u40_le, read_u40_be, u64, 5);
    read_uint!(read_u48_le, read_u48_be, u64, 6);
    read_uint!(read_u56_le, read_u56_be, u64, 7);
    read_uint!(read_u64_le, read_u64_be, u64, 8);

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        Ok(self.read_u64_le()? as i64)
    }

    /// Borrow the next `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, size) = varint::decode(self.data, self.offset)?;
        self.offset += size;
        Ok(value)
    }

    /// Read a varint length and return that many bytes as an owned vector
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>> {
        let at = self.offset;
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| SpvError::OutOfBounds { offset: at })?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Read a 32-byte hash in internal byte order
    pub fn read_hash(&mut self) -> Result<Hash256> {
        Ok(Hash256::from_le_bytes(self.read_array()?))
    }

    /// First four bytes of hash256 over everything since the innermost mark
    /// (or the start of the buffer)
    pub fn create_checksum(&self) -> u32 {
        let start = self.stack.last().copied().unwrap_or(0);
        let digest = hash256(&self.data[start..self.offset]);
        let bytes = digest.as_bytes();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn verify_checksum(&mut self) -> Result<u32> {
        let checksum = self.create_checksum();
        let expected = self.read_u32_le()?;
        if checksum != expected {
            return Err(SpvError::ChecksumMismatch { offset: self.offset });
        }
        Ok(checksum)
    }

    /// Fail unless the whole buffer was consumed
    pub fn finish(&self) -> Result<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(SpvError::TrailingData(self.left()))
        }
    }
}

/// Sequential writer.
///
/// A writer built with [`Writer::with_size`] is statically pre-sized: it
/// refuses to write past the declared size, and [`Writer::finish`] fails
/// unless exactly that many bytes were written.
#[derive(Debug, Default)]
pub struct Writer {
    data: Vec<u8>,
    size: Option<usize>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn with_size(size: usize) -> Self {
        Writer {
            data: Vec::with_capacity(size),
            size: Some(size),
        }
    }

    pub fn offset(&self) -> usize {
        self.data.len()
    }

    fn check(&self, size: usize) -> Result<()> {
        match self.size {
            Some(limit) if self.data.len() + size > limit => Err(SpvError::OutOfBounds {
                offset: self.data.len(),
            }),
            _ => Ok(()),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.check(1)?;
        self.data.push(value);
        Ok(self)
    }

    fn write_uint_le(&mut self, value: u64, width: usize) -> Result<&mut Self> {
        self.write_bytes(&value.to_le_bytes()[..width])
    }

    fn write_uint_be(&mut self, value: u64, width: usize) -> Result<&mut Self> {
        self.write_bytes(&value.to_be_bytes()[8 - width..])
    }

    write_uint!(write_u16_le, write_u16_be, u16, 2);
    write_uint!(write_u24_le, write_u24_be, u32, 3);
    write_uint!(write_u32_le, write_u32_be, u32, 4);
    write_uint!(write_u40_le, write_u40_be, u64, 5);
    write_uint!(write_u48_le, write_u48_be, u64, 6);
    write_uint!(write_u56_le, write_u56_be, u64, 7);
    write_uint!(write_u64_le, write_u64_be, u64, 8);

    pub fn write_i32_le(&mut self, value: i32) -> Result<&mut Self> {
        self.write_u32_le(value as u32)
    }

    pub fn write_i64_le(&mut self, value: i64) -> Result<&mut Self> {
        self.write_u64_le(value as u64)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.check(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn write_varint(&mut self, value: u64) -> Result<&mut Self> {
        self.check(varint::size(value))?;
        varint::encode_into(value, &mut self.data);
        Ok(self)
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.write_varint(bytes.len() as u64)?;
        self.write_bytes(bytes)
    }

    pub fn write_hash(&mut self, hash: &Hash256) -> Result<&mut Self> {
        self.write_bytes(hash.as_ref())
    }

    pub fn fill(&mut self, value: u8, size: usize) -> Result<&mut Self> {
        self.check(size)?;
        self.data.resize(self.data.len() + size, value);
        Ok(self)
    }

    /// Append the first four bytes of hash256 over everything written so far
    pub fn write_checksum(&mut self) -> Result<&mut Self> {
        let digest = hash256(&self.data);
        let checksum = digest.as_bytes()[..4].to_vec();
        self.write_bytes(&checksum)
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        match self.size {
            Some(limit) if self.data.len() != limit => Err(SpvError::OutOfBounds {
                offset: self.data.len(),
            }),
            _ => Ok(self.data),
        }
    }
}
