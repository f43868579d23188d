//! In-memory document model.

/// Row-major 4x4 matrix.
pub type Matrix4 = [[f32; 4]; 4];

pub const MATRIX4_IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// High bit of a bone id: the bone is identified by name, not numeric id,
/// and the low bits index the ex-data string set.
pub const EX_BONE_ID_FLAG: u32 = 0x8000;
pub const EX_BONE_INDEX_MASK: u32 = 0x7FFF;

/// Parent-id sentinel meaning "no parent".
pub const NO_PARENT_ID: u32 = 0xFFFF_FFFF;

#[derive(Clone, Debug, PartialEq)]
pub struct BoneInfo {
    pub id: u32,
    pub name: String,
    pub inverse_bind_pose_matrix: Matrix4,
    /// Index into [`Skin::bones`](crate::Skin::bones). Stored as an index
    /// rather than a reference so the list can be reordered or rebuilt
    /// between read and write.
    pub parent: Option<usize>,
}

impl BoneInfo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inverse_bind_pose_matrix: MATRIX4_IDENTITY,
            parent: None,
        }
    }

    /// Whether the bone's real identity is its name (id carries the
    /// string-set index instead of a stable numeric id).
    pub fn is_ex(&self) -> bool {
        self.id & EX_BONE_ID_FLAG != 0
    }
}

/// A node of a secondary-motion physics chain. Lives in the document-wide
/// pool; osage blocks reference contiguous runs of it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OsageBone {
    pub name: String,
    pub sibling_name: Option<String>,
    pub sibling_distance: f32,
}

impl OsageBone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sibling_name: None,
            sibling_distance: 0.0,
        }
    }
}

/// Placement fields shared by the node-attached block payloads.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeData {
    pub parent_name: Option<String>,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for NodeData {
    fn default() -> Self {
        Self {
            parent_name: None,
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OsageBlock {
    pub node: NodeData,
    pub name: String,
    pub external_name: Option<String>,
    /// The bones this chain owns. Authoritative on write: the shared pool
    /// and every start index are recomputed from these lists, never from
    /// read-time values.
    pub bones: Vec<OsageBone>,
    /// Range into the shared pool, as read. Rebuilt on every write.
    pub(crate) start_index: usize,
    pub(crate) count: usize,
}

// The range fields are read-time scratch; equality is over content.
impl PartialEq for OsageBlock {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
            && self.name == other.name
            && self.external_name == other.external_name
            && self.bones == other.bones
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionBlock {
    pub node: NodeData,
    pub bone_name: String,
    pub expressions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionBlock {
    pub name: String,
    pub bone_names: Vec<String>,
    pub bone_matrices: Vec<Matrix4>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintBlock {
    pub node: NodeData,
    pub coupling: i32,
    pub source_bone_name: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClothBlock {
    pub name: String,
    pub force: f32,
    pub force_gain: f32,
}

#[cfg(feature = "glam")]
pub fn matrix4_to_glam(m: &Matrix4) -> glam::Mat4 {
    glam::Mat4::from_cols_array_2d(m).transpose()
}

#[cfg(feature = "glam")]
pub fn matrix4_from_glam(m: &glam::Mat4) -> Matrix4 {
    m.transpose().to_cols_array_2d()
}
