//! Scoped binary reader.
//!
//! The reader is IO-free: it operates on an in-memory byte slice. Pointers in
//! the data are absolute offsets into that slice; [`Reader::read_at`] follows
//! one without losing the caller's place.

use crate::{AddressSpace, Error, Matrix4};
use byteorder::{ByteOrder, LittleEndian};

#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
    address_space: AddressSpace,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8], address_space: AddressSpace) -> Self {
        Self {
            bytes,
            cursor: 0,
            address_space,
        }
    }

    pub fn address_space(&self) -> AddressSpace {
        self.address_space
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, wanted: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < wanted {
            return Err(Error::UnexpectedEnd {
                offset: self.cursor,
                wanted,
            });
        }
        let slice = &self.bytes[self.cursor..self.cursor + wanted];
        self.cursor += wanted;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Reads a pointer-sized value for the active address space.
    pub fn read_pointer(&mut self) -> Result<u64, Error> {
        match self.address_space {
            AddressSpace::Bits32 => Ok(u64::from(self.read_u32()?)),
            AddressSpace::Bits64 => Ok(LittleEndian::read_u64(self.take(8)?)),
        }
    }

    pub fn read_matrix4(&mut self) -> Result<Matrix4, Error> {
        let mut m = [[0.0f32; 4]; 4];
        for row in &mut m {
            for v in row.iter_mut() {
                *v = self.read_f32()?;
            }
        }
        Ok(m)
    }

    /// Runs `body` with the cursor moved to `offset`, then restores the
    /// caller's position regardless of whether `body` succeeded. Nests.
    pub fn read_at<T>(
        &mut self,
        offset: u64,
        body: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let saved = self.cursor;
        self.cursor = offset as usize;
        let result = body(self);
        self.cursor = saved;
        result
    }

    /// Reads a null-terminated UTF-8 string at the current position.
    pub fn read_cstring(&mut self) -> Result<String, Error> {
        let start = self.cursor;
        let len = self.bytes[self.cursor.min(self.bytes.len())..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::UnexpectedEnd {
                offset: self.bytes.len(),
                wanted: 1,
            })?;
        let bytes = self.take(len)?;
        self.cursor += 1; // terminator
        let s = std::str::from_utf8(bytes).map_err(|e| Error::InvalidString {
            offset: start,
            message: e.to_string(),
        })?;
        Ok(s.to_string())
    }

    /// Reads a pointer and, when it is non-zero, the string it points at.
    /// A zero pointer is the format's "absent" convention.
    pub fn read_string_at_offset(&mut self) -> Result<Option<String>, Error> {
        let offset = self.read_pointer()?;
        if offset == 0 {
            return Ok(None);
        }
        self.read_at(offset, |r| r.read_cstring()).map(Some)
    }

    /// Consumes `count` bytes that the format requires to be zero.
    pub fn skip_reserved(&mut self, count: usize) -> Result<(), Error> {
        let offset = self.cursor;
        let bytes = self.take(count)?;
        if let Some(i) = bytes.iter().position(|&b| b != 0) {
            return Err(Error::ReservedFieldViolation { offset: offset + i });
        }
        Ok(())
    }
}
