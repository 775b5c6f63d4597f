use super::{UniformDecl, UniformKind, UniformValue};

/// Byte placement of one uniform inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: usize,
    pub kind: UniformKind,
}

/// Host-side mirror of a WGSL uniform struct.
///
/// Offsets follow the WGSL uniform address space rules for the member types the
/// generators emit (`u32`, `f32`, `vec3<f32>`, `mat4x4<f32>`), so writing a value
/// at `slot.offset` lands exactly where the shader reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    slots: Vec<UniformSlot>,
    size: usize,
}

impl UniformLayout {
    pub fn new(uniforms: &[UniformDecl]) -> Self {
        let mut cursor = 0;
        let slots = uniforms
            .iter()
            .map(|uniform| {
                let (align, size) = align_and_size(uniform.kind);
                let offset = round_up(cursor, align);
                cursor = offset + size;
                UniformSlot {
                    offset,
                    kind: uniform.kind,
                }
            })
            .collect();

        // Uniform structs are 16-byte aligned; an empty block still binds 16 bytes.
        let size = round_up(cursor, 16).max(16);
        Self { slots, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn slot(&self, index: usize) -> Option<UniformSlot> {
        self.slots.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Writes `value` into `block`. Returns `false` if the slot is missing or the
    /// value has the wrong type.
    pub fn write(&self, block: &mut [u8], index: usize, value: &UniformValue) -> bool {
        let Some(slot) = self.slot(index) else {
            return false;
        };
        if slot.kind != value.kind() {
            return false;
        }

        match value {
            UniformValue::Flag(flag) => {
                let word = u32::from(*flag);
                copy_into(block, slot.offset, bytemuck::bytes_of(&word))
            }
            UniformValue::Float(scalar) => copy_into(block, slot.offset, bytemuck::bytes_of(scalar)),
            UniformValue::Vec3(vector) => copy_into(block, slot.offset, bytemuck::cast_slice(vector)),
            UniformValue::Mat4(matrix) => copy_into(block, slot.offset, bytemuck::cast_slice(matrix)),
        }
    }
}

fn copy_into(block: &mut [u8], offset: usize, bytes: &[u8]) -> bool {
    match block.get_mut(offset..offset + bytes.len()) {
        Some(target) => {
            target.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

fn align_and_size(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Flag | UniformKind::Float => (4, 4),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Mat4 => (16, 64),
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// WGSL member type for a uniform kind.
pub(crate) fn wgsl_type(kind: UniformKind) -> &'static str {
    match kind {
        UniformKind::Flag => "u32",
        UniformKind::Float => "f32",
        UniformKind::Vec3 => "vec3<f32>",
        UniformKind::Mat4 => "mat4x4<f32>",
    }
}
