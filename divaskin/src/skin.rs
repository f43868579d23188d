//! Skin document assembly.
//!
//! The top-level record is a fixed field layout of pointers into separate
//! regions. Reading follows each pointer with the scoped reader; writing
//! mirrors the same nesting with the deferred scheduler so the two sides stay
//! symmetric. Counts and offsets are always re-derived from the in-memory
//! document, never cached from read time, so a document mutated between read
//! and write still serializes coherently.

use crate::blocks::constructor_for;
use crate::{
    AlignmentMode, BinaryFormat, Block, BoneInfo, EX_BONE_ID_FLAG, EX_BONE_INDEX_MASK, Error,
    NO_PARENT_ID, OsageBone, Reader, StringSet, Writer,
};
use tracing::warn;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skin {
    pub bones: Vec<BoneInfo>,
    pub blocks: Vec<Block>,
}

impl Skin {
    /// Parses a skin from a fully buffered byte slice.
    pub fn from_bytes(bytes: &[u8], format: BinaryFormat) -> Result<Self, Error> {
        let mut reader = Reader::new(bytes, format.address_space());
        Self::read(&mut reader)
    }

    /// Serializes the document. Layout is deterministic: serializing the
    /// result of a read back out reproduces the bytes the first write made.
    pub fn to_bytes(&self, format: BinaryFormat) -> Result<Vec<u8>, Error> {
        let mut strings = StringSet::new();
        self.collect_strings(&mut strings);
        let pool = self.flatten_osage_pool();
        let mut writer = Writer::new(format.address_space());
        self.write(&mut writer, &pool)?;
        writer.finish(&mut strings)
    }

    pub fn read(reader: &mut Reader<'_>) -> Result<Self, Error> {
        let bone_ids_offset = reader.read_pointer()?;
        let bone_matrices_offset = reader.read_pointer()?;
        let bone_names_offset = reader.read_pointer()?;
        let ex_data_offset = reader.read_pointer()?;
        let bone_count = reader.read_u32()? as usize;
        let bone_parent_ids_offset = reader.read_pointer()?;
        reader.skip_reserved(8)?;

        let mut bones = vec![BoneInfo::new(0, String::new()); bone_count];
        if bone_ids_offset != 0 {
            reader.read_at(bone_ids_offset, |r| {
                for bone in &mut bones {
                    bone.id = r.read_u32()?;
                }
                Ok(())
            })?;
        }
        if bone_matrices_offset != 0 {
            reader.read_at(bone_matrices_offset, |r| {
                for bone in &mut bones {
                    bone.inverse_bind_pose_matrix = r.read_matrix4()?;
                }
                Ok(())
            })?;
        }
        if bone_names_offset != 0 {
            reader.read_at(bone_names_offset, |r| {
                for bone in &mut bones {
                    bone.name = r.read_string_at_offset()?.unwrap_or_default();
                }
                Ok(())
            })?;
        }

        let mut blocks = Vec::new();
        if ex_data_offset != 0 {
            reader.read_at(ex_data_offset, |r| {
                read_ex_data(r, &mut bones, &mut blocks)
            })?;
        }

        // Parent links resolve last: matching needs the full bone list.
        if bone_parent_ids_offset != 0 {
            let mut parent_ids = Vec::with_capacity(bone_count);
            reader.read_at(bone_parent_ids_offset, |r| {
                for _ in 0..bone_count {
                    parent_ids.push(r.read_u32()?);
                }
                Ok(())
            })?;
            for (index, &parent_id) in parent_ids.iter().enumerate() {
                bones[index].parent = if parent_id == NO_PARENT_ID {
                    None
                } else {
                    // First match wins; duplicate ids are not detected.
                    bones.iter().position(|b| b.id == parent_id)
                };
            }
        }

        Ok(Self { bones, blocks })
    }

    fn collect_strings(&self, strings: &mut StringSet) {
        for bone in &self.bones {
            if bone.is_ex() {
                strings.get_or_add(&bone.name);
            }
        }
        for block in &self.blocks {
            block.collect_strings(strings);
        }
    }

    /// Rebuilds the shared pool from the osage blocks' bone lists, in
    /// document order. This, not any read-time range, is the source of truth
    /// on write.
    fn flatten_osage_pool(&self) -> Vec<OsageBone> {
        let mut pool = Vec::new();
        for block in &self.blocks {
            if let Block::Osage(osage) = block {
                pool.extend(osage.bones.iter().cloned());
            }
        }
        pool
    }

    pub fn write<'a>(
        &'a self,
        writer: &mut Writer<'a>,
        pool: &'a [OsageBone],
    ) -> Result<(), Error> {
        let alignment = writer.alignment();
        let has_ex = !self.blocks.is_empty() || self.bones.iter().any(BoneInfo::is_ex);
        let has_parents = self.bones.iter().any(|b| b.parent.is_some());

        writer.schedule(alignment, AlignmentMode::Center, move |w, s| {
            for bone in &self.bones {
                w.write_u32(bone_wire_id(bone, s));
            }
            Ok(())
        });
        writer.schedule(alignment, AlignmentMode::Center, move |w, _| {
            for bone in &self.bones {
                w.write_matrix4(&bone.inverse_bind_pose_matrix);
            }
            Ok(())
        });
        writer.schedule(alignment, AlignmentMode::Center, move |w, _| {
            for bone in &self.bones {
                w.schedule_string(bone.name.clone());
            }
            Ok(())
        });
        writer.schedule_if(has_ex, alignment, AlignmentMode::Center, move |w, s| {
            self.write_ex_data(w, s, pool)
        })?;
        writer.write_u32(self.bones.len() as u32);
        writer.schedule_if(has_parents, alignment, AlignmentMode::Center, move |w, s| {
            for bone in &self.bones {
                let parent_id = bone
                    .parent
                    .and_then(|p| self.bones.get(p))
                    .map_or(NO_PARENT_ID, |parent| bone_wire_id(parent, s));
                w.write_u32(parent_id);
            }
            Ok(())
        })?;
        writer.write_u32(0);
        writer.write_u32(0);
        Ok(())
    }

    fn write_ex_data<'a>(
        &'a self,
        writer: &mut Writer<'a>,
        strings: &mut StringSet,
        pool: &'a [OsageBone],
    ) -> Result<(), Error> {
        let alignment = writer.alignment();
        let osage_count = self
            .blocks
            .iter()
            .filter(|b| matches!(b, Block::Osage(_)))
            .count();
        let cloth_count = self
            .blocks
            .iter()
            .filter(|b| matches!(b, Block::Cloth(_)))
            .count();
        let has_siblings = pool.iter().any(|b| b.sibling_name.is_some());

        writer.write_i32(osage_count as i32);
        writer.write_i32(pool.len() as i32);
        writer.write_u32(0);
        writer.schedule_if(
            !pool.is_empty(),
            alignment,
            AlignmentMode::Left,
            move |w, s| {
                for bone in pool {
                    w.write_u32(ex_string_id(&bone.name, s));
                }
                Ok(())
            },
        )?;
        writer.schedule_if(
            osage_count > 0,
            alignment,
            AlignmentMode::Left,
            move |w, s| {
                for block in &self.blocks {
                    if let Block::Osage(osage) = block {
                        s.write_string(w, Some(&osage.name))?;
                    }
                }
                Ok(())
            },
        )?;
        writer.schedule_if(
            !self.blocks.is_empty(),
            alignment,
            AlignmentMode::Left,
            move |w, s| self.write_blocks(w, s),
        )?;
        writer.write_i32(strings.len() as i32);
        writer.schedule_if(
            !strings.is_empty(),
            alignment,
            AlignmentMode::Left,
            |w, s| s.write_region(w),
        )?;
        writer.schedule_if(
            has_siblings,
            alignment,
            AlignmentMode::Left,
            move |w, s| {
                for bone in pool {
                    if let Some(sibling) = &bone.sibling_name {
                        s.write_string(w, Some(&bone.name))?;
                        s.write_string(w, Some(sibling))?;
                        w.write_f32(bone.sibling_distance);
                    }
                }
                // Absent-name sentinel ends the list.
                s.write_string(w, None)
            },
        )?;
        writer.write_i32(cloth_count as i32);
        for _ in 0..7 {
            writer.write_pointer(0)?;
        }
        Ok(())
    }

    fn write_blocks<'a>(
        &'a self,
        writer: &mut Writer<'a>,
        _strings: &mut StringSet,
    ) -> Result<(), Error> {
        let alignment = writer.alignment();
        let mut start_index = 0usize;
        for block in &self.blocks {
            writer.schedule_string(block.signature().to_string());
            match block {
                Block::Osage(osage) => {
                    let start = start_index;
                    start_index += osage.bones.len();
                    writer.schedule(alignment, AlignmentMode::Left, move |w, s| {
                        osage.write_payload(w, s, start)
                    });
                }
                Block::Expression(b) => {
                    writer.schedule(alignment, AlignmentMode::Left, move |w, s| {
                        b.write_payload(w, s)
                    });
                }
                Block::Motion(b) => {
                    writer.schedule(alignment, AlignmentMode::Left, move |w, s| {
                        b.write_payload(w, s)
                    });
                }
                Block::Constraint(b) => {
                    writer.schedule(alignment, AlignmentMode::Left, move |w, s| {
                        b.write_payload(w, s)
                    });
                }
                Block::Cloth(b) => {
                    writer.schedule(alignment, AlignmentMode::Left, move |w, s| {
                        b.write_payload(w, s)
                    });
                }
            }
        }
        // Zero payload pointer terminates the list; the signature slot of the
        // terminator pair is the absent string.
        writer.write_pointer(0)?;
        writer.write_pointer(0)?;
        Ok(())
    }
}

fn bone_wire_id(bone: &BoneInfo, strings: &mut StringSet) -> u32 {
    if bone.is_ex() {
        ex_string_id(&bone.name, strings)
    } else {
        bone.id
    }
}

fn ex_string_id(name: &str, strings: &mut StringSet) -> u32 {
    EX_BONE_ID_FLAG | (strings.get_or_add(name) as u32 & EX_BONE_INDEX_MASK)
}

fn read_ex_data(
    reader: &mut Reader<'_>,
    bones: &mut [BoneInfo],
    blocks: &mut Vec<Block>,
) -> Result<(), Error> {
    let pointer_size = reader.address_space().pointer_size();
    let osage_name_count = reader.read_i32()?.max(0) as usize;
    let osage_bone_count = reader.read_i32()?.max(0) as usize;
    reader.skip_reserved(4)?;
    let osage_bones_offset = reader.read_pointer()?;
    let osage_names_offset = reader.read_pointer()?;
    let blocks_offset = reader.read_pointer()?;
    let string_count = reader.read_i32()?.max(0) as usize;
    let strings_offset = reader.read_pointer()?;
    let sibling_infos_offset = reader.read_pointer()?;
    let _cloth_count = reader.read_i32()?;
    reader.skip_reserved(7 * pointer_size)?;

    // String set first: everything else in the region resolves through it.
    let mut strings = StringSet::new();
    if strings_offset != 0 {
        reader.read_at(strings_offset, |r| {
            for _ in 0..string_count {
                let value = r.read_string_at_offset()?.unwrap_or_default();
                strings.get_or_add(&value);
            }
            Ok(())
        })?;
    }

    // The shared osage pool; bone identity is a string-set index.
    let mut pool = Vec::with_capacity(osage_bone_count);
    if osage_bones_offset != 0 {
        reader.read_at(osage_bones_offset, |r| {
            for _ in 0..osage_bone_count {
                let id = r.read_u32()?;
                let name = strings.resolve((id & EX_BONE_INDEX_MASK) as usize)?;
                pool.push(OsageBone::new(name));
            }
            Ok(())
        })?;
    }

    // Osage names are re-derived from blocks on write; parse and discard.
    if osage_names_offset != 0 {
        reader.read_at(osage_names_offset, |r| {
            for _ in 0..osage_name_count {
                r.read_string_at_offset()?;
            }
            Ok(())
        })?;
    }

    if blocks_offset != 0 {
        reader.read_at(blocks_offset, |r| {
            loop {
                let signature = r.read_string_at_offset()?;
                let payload_offset = r.read_pointer()?;
                if payload_offset == 0 {
                    break;
                }
                let Some(signature) = signature else {
                    warn!("block entry with absent signature; skipping");
                    continue;
                };
                match constructor_for(&signature) {
                    Some(constructor) => {
                        let mut block = constructor();
                        r.read_at(payload_offset, |r| block.read_payload(r, &strings))?;
                        blocks.push(block);
                    }
                    None => warn!(signature = %signature, "unknown block signature; skipping"),
                }
            }
            Ok(())
        })?;
    }

    // Sibling relations apply to the pool before blocks slice it, so the
    // materialized lists carry them.
    if sibling_infos_offset != 0 {
        reader.read_at(sibling_infos_offset, |r| {
            loop {
                let Some(name) = strings.read_string(r)? else {
                    break;
                };
                let sibling_name = strings.read_string(r)?;
                let distance = r.read_f32()?;
                match pool.iter_mut().find(|b| b.name == name) {
                    Some(bone) => {
                        bone.sibling_name = sibling_name;
                        bone.sibling_distance = distance;
                    }
                    None => {
                        warn!(bone = %name, "sibling entry names a bone outside the osage pool; dropping");
                    }
                }
            }
            Ok(())
        })?;
    }

    for block in blocks.iter_mut() {
        if let Block::Osage(osage) = block {
            let start = osage.start_index;
            let end = start
                .checked_add(osage.count)
                .filter(|&end| end <= pool.len())
                .ok_or(Error::InvalidOsageRange {
                    start,
                    end: start.saturating_add(osage.count),
                    len: pool.len(),
                })?;
            osage.bones = pool[start..end].to_vec();
        }
    }

    // Ex bones carry their identity as a string-set index, not the flat name
    // table entry.
    for bone in bones.iter_mut() {
        if bone.is_ex() {
            bone.name = strings
                .resolve((bone.id & EX_BONE_INDEX_MASK) as usize)?
                .to_string();
        }
    }
    Ok(())
}
