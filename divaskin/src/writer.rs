//! Deferred binary writer.
//!
//! Pointer fields are written as zero-filled placeholders and bound later:
//! [`Writer::schedule`] reserves a placeholder and enqueues a body, and
//! [`Writer::finish`] drains the queue in FIFO order, aligning each body,
//! patching its placeholder with the final offset and letting the body
//! enqueue further work behind the current frontier. Siblings at one nesting
//! depth therefore land together before any of their children, which fixes
//! the physical section order of the output.

use crate::{AddressSpace, Error, Matrix4, StringSet};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::VecDeque;

/// Padding policy for a scheduled section.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlignmentMode {
    /// Zero-pad up to the alignment, then emit the content.
    Left,
    /// Zero-pad up to the alignment on both sides of the content.
    Center,
}

/// Location of a reserved pointer-sized slot, to be patched later.
#[derive(Copy, Clone, Debug)]
pub struct Placeholder {
    at: usize,
}

type WriteFn<'a> = Box<dyn FnOnce(&mut Writer<'a>, &mut StringSet) -> Result<(), Error> + 'a>;

struct Pending<'a> {
    placeholder: Placeholder,
    alignment: usize,
    mode: AlignmentMode,
    body: WriteFn<'a>,
}

pub struct Writer<'a> {
    address_space: AddressSpace,
    buf: Vec<u8>,
    pending: VecDeque<Pending<'a>>,
}

impl<'a> Writer<'a> {
    pub fn new(address_space: AddressSpace) -> Self {
        Self {
            address_space,
            buf: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn address_space(&self) -> AddressSpace {
        self.address_space
    }

    pub fn alignment(&self) -> usize {
        self.address_space.alignment()
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_i32(&mut self, value: i32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_i32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_f32(&mut self, value: f32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_f32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_matrix4(&mut self, value: &Matrix4) {
        for row in value {
            for &v in row {
                self.write_f32(v);
            }
        }
    }

    /// Writes a string's bytes plus the null terminator at the current
    /// position.
    pub fn write_cstring(&mut self, value: &str) {
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
    }

    /// Writes a pointer-sized value for the active address space.
    pub fn write_pointer(&mut self, value: u64) -> Result<(), Error> {
        match self.address_space {
            AddressSpace::Bits32 => {
                let narrow =
                    u32::try_from(value).map_err(|_| Error::PointerOverflow { offset: value })?;
                self.write_u32(narrow);
            }
            AddressSpace::Bits64 => {
                let mut bytes = [0u8; 8];
                LittleEndian::write_u64(&mut bytes, value);
                self.buf.extend_from_slice(&bytes);
            }
        }
        Ok(())
    }

    /// Zero-pads until the position is a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        if alignment > 1 {
            while self.buf.len() % alignment != 0 {
                self.buf.push(0);
            }
        }
    }

    /// Writes a zero-filled pointer-sized slot and hands back its location.
    pub fn reserve_pointer(&mut self) -> Placeholder {
        let at = self.buf.len();
        self.buf
            .extend(std::iter::repeat_n(0u8, self.address_space.pointer_size()));
        Placeholder { at }
    }

    /// Overwrites a reserved slot with `value`, address-space encoded.
    pub fn patch_pointer(&mut self, placeholder: Placeholder, value: u64) -> Result<(), Error> {
        match self.address_space {
            AddressSpace::Bits32 => {
                let narrow =
                    u32::try_from(value).map_err(|_| Error::PointerOverflow { offset: value })?;
                LittleEndian::write_u32(&mut self.buf[placeholder.at..placeholder.at + 4], narrow);
            }
            AddressSpace::Bits64 => {
                LittleEndian::write_u64(&mut self.buf[placeholder.at..placeholder.at + 8], value);
            }
        }
        Ok(())
    }

    /// Reserves a placeholder at the current position and enqueues `body`;
    /// the body runs during [`Writer::finish`] and the placeholder is patched
    /// with the offset the body's content ends up at.
    pub fn schedule<F>(&mut self, alignment: usize, mode: AlignmentMode, body: F)
    where
        F: FnOnce(&mut Writer<'a>, &mut StringSet) -> Result<(), Error> + 'a,
    {
        let placeholder = self.reserve_pointer();
        self.pending.push_back(Pending {
            placeholder,
            alignment,
            mode,
            body: Box::new(body),
        });
    }

    /// Like [`Writer::schedule`], but a false `condition` writes the format's
    /// "absent" convention (an immediate zero pointer) and never enqueues.
    pub fn schedule_if<F>(
        &mut self,
        condition: bool,
        alignment: usize,
        mode: AlignmentMode,
        body: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Writer<'a>, &mut StringSet) -> Result<(), Error> + 'a,
    {
        if condition {
            self.schedule(alignment, mode, body);
            Ok(())
        } else {
            self.write_pointer(0)
        }
    }

    /// Schedules a null-terminated string behind the current frontier. This
    /// is the flat string table: every call emits its own copy, duplicates
    /// included, matching the legacy layout.
    pub fn schedule_string(&mut self, value: String) {
        self.schedule(1, AlignmentMode::Left, move |w, _| {
            w.write_cstring(&value);
            Ok(())
        });
    }

    /// Drains the deferred queue and returns the finished bytes. Consuming
    /// the writer makes "schedule after finalize" unrepresentable.
    pub fn finish(mut self, strings: &mut StringSet) -> Result<Vec<u8>, Error> {
        while let Some(pending) = self.pending.pop_front() {
            self.align(pending.alignment);
            let start = self.buf.len() as u64;
            self.patch_pointer(pending.placeholder, start)?;
            (pending.body)(&mut self, strings)?;
            if pending.mode == AlignmentMode::Center {
                self.align(pending.alignment);
            }
        }
        Ok(self.buf)
    }
}
