//! Auxiliary block variants and the signature registry.
//!
//! Blocks are an open set keyed by a 3-letter signature. Reading resolves the
//! signature through [`constructor_for`]; an unknown signature is skipped,
//! not an error, so documents written by newer tooling still parse.

use crate::{
    AlignmentMode, ClothBlock, ConstraintBlock, Error, ExpressionBlock, MotionBlock, NodeData,
    OsageBlock, Reader, StringSet, Writer,
};

pub const SIGNATURE_OSAGE: &str = "OSG";
pub const SIGNATURE_EXPRESSION: &str = "EXP";
pub const SIGNATURE_MOTION: &str = "MOT";
pub const SIGNATURE_CONSTRAINT: &str = "CNS";
pub const SIGNATURE_CLOTH: &str = "CLS";

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Osage(OsageBlock),
    Expression(ExpressionBlock),
    Motion(MotionBlock),
    Constraint(ConstraintBlock),
    Cloth(ClothBlock),
}

pub(crate) type BlockConstructor = fn() -> Block;

/// The open tag registry: signature to zero-argument constructor. Unknown
/// signatures map to "no match" so callers can skip them.
pub(crate) fn constructor_for(signature: &str) -> Option<BlockConstructor> {
    match signature {
        SIGNATURE_OSAGE => Some(|| Block::Osage(OsageBlock::default())),
        SIGNATURE_EXPRESSION => Some(|| Block::Expression(ExpressionBlock::default())),
        SIGNATURE_MOTION => Some(|| Block::Motion(MotionBlock::default())),
        SIGNATURE_CONSTRAINT => Some(|| Block::Constraint(ConstraintBlock::default())),
        SIGNATURE_CLOTH => Some(|| Block::Cloth(ClothBlock::default())),
        _ => None,
    }
}

impl Block {
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Osage(_) => SIGNATURE_OSAGE,
            Self::Expression(_) => SIGNATURE_EXPRESSION,
            Self::Motion(_) => SIGNATURE_MOTION,
            Self::Constraint(_) => SIGNATURE_CONSTRAINT,
            Self::Cloth(_) => SIGNATURE_CLOTH,
        }
    }

    pub(crate) fn read_payload(
        &mut self,
        reader: &mut Reader<'_>,
        strings: &StringSet,
    ) -> Result<(), Error> {
        match self {
            Self::Osage(b) => b.read_payload(reader),
            Self::Expression(b) => b.read_payload(reader),
            Self::Motion(b) => b.read_payload(reader, strings),
            Self::Constraint(b) => b.read_payload(reader),
            Self::Cloth(b) => b.read_payload(reader),
        }
    }

    /// Registers every string the payload will reference through the indexed
    /// set, so indices and the region count are settled before any bytes are
    /// emitted.
    pub(crate) fn collect_strings(&self, strings: &mut StringSet) {
        match self {
            Self::Osage(b) => {
                b.node.collect_strings(strings);
                strings.get_or_add(&b.name);
                if let Some(external) = &b.external_name {
                    strings.get_or_add(external);
                }
                for bone in &b.bones {
                    strings.get_or_add(&bone.name);
                    if let Some(sibling) = &bone.sibling_name {
                        strings.get_or_add(sibling);
                    }
                }
            }
            Self::Expression(b) => {
                b.node.collect_strings(strings);
                strings.get_or_add(&b.bone_name);
                for expression in &b.expressions {
                    strings.get_or_add(expression);
                }
            }
            Self::Motion(b) => {
                strings.get_or_add(&b.name);
                for name in &b.bone_names {
                    strings.get_or_add(name);
                }
            }
            Self::Constraint(b) => {
                b.node.collect_strings(strings);
                strings.get_or_add(&b.source_bone_name);
            }
            Self::Cloth(b) => {
                strings.get_or_add(&b.name);
            }
        }
    }
}

impl NodeData {
    fn collect_strings(&self, strings: &mut StringSet) {
        if let Some(parent) = &self.parent_name {
            strings.get_or_add(parent);
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, Error> {
        let parent_name = reader.read_string_at_offset()?;
        let mut node = Self {
            parent_name,
            ..Self::default()
        };
        for v in &mut node.position {
            *v = reader.read_f32()?;
        }
        for v in &mut node.rotation {
            *v = reader.read_f32()?;
        }
        for v in &mut node.scale {
            *v = reader.read_f32()?;
        }
        Ok(node)
    }

    fn write(&self, writer: &mut Writer<'_>, strings: &mut StringSet) -> Result<(), Error> {
        strings.write_string(writer, self.parent_name.as_deref())?;
        for &v in &self.position {
            writer.write_f32(v);
        }
        for &v in &self.rotation {
            writer.write_f32(v);
        }
        for &v in &self.scale {
            writer.write_f32(v);
        }
        Ok(())
    }
}

impl OsageBlock {
    fn read_payload(&mut self, reader: &mut Reader<'_>) -> Result<(), Error> {
        self.node = NodeData::read(reader)?;
        self.start_index = reader.read_u32()? as usize;
        self.count = reader.read_u32()? as usize;
        self.name = reader.read_string_at_offset()?.unwrap_or_default();
        self.external_name = reader.read_string_at_offset()?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        writer: &mut Writer<'_>,
        strings: &mut StringSet,
        start_index: usize,
    ) -> Result<(), Error> {
        self.node.write(writer, strings)?;
        writer.write_u32(start_index as u32);
        writer.write_u32(self.bones.len() as u32);
        strings.write_string(writer, Some(&self.name))?;
        strings.write_string(writer, self.external_name.as_deref())?;
        Ok(())
    }
}

impl ExpressionBlock {
    fn read_payload(&mut self, reader: &mut Reader<'_>) -> Result<(), Error> {
        self.node = NodeData::read(reader)?;
        self.bone_name = reader.read_string_at_offset()?.unwrap_or_default();
        let count = reader.read_u32()? as usize;
        self.expressions = Vec::with_capacity(count);
        for _ in 0..count {
            self.expressions
                .push(reader.read_string_at_offset()?.unwrap_or_default());
        }
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        writer: &mut Writer<'_>,
        strings: &mut StringSet,
    ) -> Result<(), Error> {
        self.node.write(writer, strings)?;
        strings.write_string(writer, Some(&self.bone_name))?;
        writer.write_u32(self.expressions.len() as u32);
        for expression in &self.expressions {
            strings.write_string(writer, Some(expression))?;
        }
        Ok(())
    }
}

impl MotionBlock {
    fn read_payload(&mut self, reader: &mut Reader<'_>, strings: &StringSet) -> Result<(), Error> {
        self.name = reader.read_string_at_offset()?.unwrap_or_default();
        let count = reader.read_u32()? as usize;
        let names_offset = reader.read_pointer()?;
        let matrices_offset = reader.read_pointer()?;

        self.bone_names = Vec::with_capacity(count);
        if names_offset != 0 {
            reader.read_at(names_offset, |r| {
                for _ in 0..count {
                    let id = r.read_u32()? as usize;
                    self.bone_names.push(strings.resolve(id)?.to_string());
                }
                Ok(())
            })?;
        }

        self.bone_matrices = Vec::with_capacity(count);
        if matrices_offset != 0 {
            reader.read_at(matrices_offset, |r| {
                for _ in 0..count {
                    self.bone_matrices.push(r.read_matrix4()?);
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    pub(crate) fn write_payload<'a>(
        &'a self,
        writer: &mut Writer<'a>,
        strings: &mut StringSet,
    ) -> Result<(), Error> {
        let alignment = writer.alignment();
        strings.write_string(writer, Some(&self.name))?;
        writer.write_u32(self.bone_names.len() as u32);
        writer.schedule_if(
            !self.bone_names.is_empty(),
            alignment,
            AlignmentMode::Left,
            |w, s| {
                for name in &self.bone_names {
                    w.write_u32(s.get_or_add(name) as u32);
                }
                Ok(())
            },
        )?;
        writer.schedule_if(
            !self.bone_matrices.is_empty(),
            alignment,
            AlignmentMode::Left,
            |w, _| {
                for matrix in &self.bone_matrices {
                    w.write_matrix4(matrix);
                }
                Ok(())
            },
        )?;
        Ok(())
    }
}

impl ConstraintBlock {
    fn read_payload(&mut self, reader: &mut Reader<'_>) -> Result<(), Error> {
        self.node = NodeData::read(reader)?;
        self.coupling = reader.read_i32()?;
        self.source_bone_name = reader.read_string_at_offset()?.unwrap_or_default();
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        writer: &mut Writer<'_>,
        strings: &mut StringSet,
    ) -> Result<(), Error> {
        self.node.write(writer, strings)?;
        writer.write_i32(self.coupling);
        strings.write_string(writer, Some(&self.source_bone_name))?;
        Ok(())
    }
}

impl ClothBlock {
    fn read_payload(&mut self, reader: &mut Reader<'_>) -> Result<(), Error> {
        self.name = reader.read_string_at_offset()?.unwrap_or_default();
        self.force = reader.read_f32()?;
        self.force_gain = reader.read_f32()?;
        Ok(())
    }

    pub(crate) fn write_payload(
        &self,
        writer: &mut Writer<'_>,
        strings: &mut StringSet,
    ) -> Result<(), Error> {
        strings.write_string(writer, Some(&self.name))?;
        writer.write_f32(self.force);
        writer.write_f32(self.force_gain);
        Ok(())
    }
}
