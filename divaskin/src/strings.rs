//! Deduplicated string set for the ex-data region.
//!
//! Strings are stored once, in first-seen order. Content references them two
//! ways: compact numeric indices (ex-bone ids carry `0x8000 | index`) and
//! direct offset pairs (the sibling table and block payloads). The flat,
//! non-deduplicated bone-name table is a separate scheme and lives on
//! [`Writer::schedule_string`](crate::Writer::schedule_string).

use crate::{Error, Placeholder, Reader, Writer};
use std::collections::HashMap;

#[derive(Default)]
pub struct StringSet {
    strings: Vec<String>,
    indices: HashMap<String, usize>,
    // Write-side state: final offset per string once the region has been
    // emitted, and placeholders registered by references that ran earlier.
    offsets: Vec<Option<u64>>,
    pending_refs: Vec<(usize, Placeholder)>,
}

impl StringSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.indices.get(value).copied()
    }

    /// Returns the index of `value`, inserting it at the back when unseen.
    pub fn get_or_add(&mut self, value: &str) -> usize {
        if let Some(&index) = self.indices.get(value) {
            return index;
        }
        let index = self.strings.len();
        self.strings.push(value.to_string());
        self.indices.insert(value.to_string(), index);
        self.offsets.push(None);
        index
    }

    /// Looks an index up, failing the parse on out-of-range ids.
    pub fn resolve(&self, index: usize) -> Result<&str, Error> {
        self.get(index).ok_or(Error::InvalidStringIndex {
            index,
            len: self.strings.len(),
        })
    }

    /// Reads a string referenced by a direct offset pair; a zero offset is
    /// the end-of-list sentinel.
    pub fn read_string(&self, reader: &mut Reader<'_>) -> Result<Option<String>, Error> {
        reader.read_string_at_offset()
    }

    /// Writes a reference to `value` as a direct offset. Before the strings
    /// region has been emitted the offset is unknown, so a placeholder is
    /// reserved and patched when [`StringSet::write_region`] runs; afterwards
    /// the known offset is written immediately. `None` writes the zero
    /// sentinel.
    pub fn write_string(
        &mut self,
        writer: &mut Writer<'_>,
        value: Option<&str>,
    ) -> Result<(), Error> {
        let Some(value) = value else {
            return writer.write_pointer(0);
        };
        let index = self.get_or_add(value);
        match self.offsets[index] {
            Some(offset) => writer.write_pointer(offset),
            None => {
                let placeholder = writer.reserve_pointer();
                self.pending_refs.push((index, placeholder));
                Ok(())
            }
        }
    }

    /// Emits the strings region: a table of one pointer per string followed
    /// by the string bytes, then patches every reference reserved so far.
    pub fn write_region(&mut self, writer: &mut Writer<'_>) -> Result<(), Error> {
        let mut table = Vec::with_capacity(self.strings.len());
        for _ in &self.strings {
            table.push(writer.reserve_pointer());
        }
        for (index, entry) in table.into_iter().enumerate() {
            let offset = writer.position() as u64;
            self.offsets[index] = Some(offset);
            writer.write_cstring(&self.strings[index]);
            writer.patch_pointer(entry, offset)?;
        }
        for (index, placeholder) in std::mem::take(&mut self.pending_refs) {
            let offset = self.offsets[index].unwrap_or(0);
            writer.patch_pointer(placeholder, offset)?;
        }
        Ok(())
    }
}
