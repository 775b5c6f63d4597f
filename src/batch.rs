//! GPU-resident batches of instances that share one geometry.

use std::ops::Range;

use glam::{DVec3, Mat4};
use smallvec::SmallVec;

use crate::color::Color;
use crate::error::BatchError;
use crate::gpu::{BufferKind, GraphicsContext};
use crate::id::{BufferId, ClipVolumeId};
use crate::quantize::QuantizedPositions;
use crate::shader;

/// Per-instance state bits, packed into the `flags` and `flags2` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceFlags {
    pub visible: bool,
    pub culled: bool,
    pub casts_shadow: bool,
    pub pickable: bool,
    /// Whether clip volumes discard this instance's fragments.
    pub clippable: bool,
}

impl InstanceFlags {
    pub const DEFAULT: Self = Self {
        visible: true,
        culled: false,
        casts_shadow: true,
        pickable: true,
        clippable: true,
    };

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_clippable(mut self, clippable: bool) -> Self {
        self.clippable = clippable;
        self
    }

    /// Bytes of the `flags` attribute: visible, culled, casts-shadow, pickable.
    pub fn flags_bytes(&self) -> [u8; 4] {
        [
            u8::from(self.visible),
            u8::from(self.culled),
            u8::from(self.casts_shadow),
            u8::from(self.pickable),
        ]
    }

    /// Bytes of the `flags2` attribute; only the first is used.
    pub fn flags2_bytes(&self) -> [u8; 4] {
        [u8::from(self.clippable), 0, 0, 0]
    }
}

impl Default for InstanceFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The upper three rows of an instance's affine model matrix.
///
/// Uploaded as three `Float32x4` attributes; the shader computes
/// `world.x = dot(vec4(local, 1), rows[0])` and so on.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceTransform {
    pub rows: [[f32; 4]; 3],
}

impl InstanceTransform {
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    pub fn from_mat4(matrix: Mat4) -> Self {
        Self {
            rows: [
                matrix.row(0).to_array(),
                matrix.row(1).to_array(),
                matrix.row(2).to_array(),
            ],
        }
    }

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self::from_mat4(Mat4::from_translation(translation.into()))
    }
}

/// CPU-side description of a batch, as produced by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceBatchData {
    pub geometry: QuantizedPositions,
    pub indices: Vec<u32>,
    pub topology: wgpu::PrimitiveTopology,
    pub transforms: Vec<InstanceTransform>,
    pub colors: Vec<Color>,
    pub flags: Vec<InstanceFlags>,
    /// Per-instance World offsets; all zeros when `None`.
    pub offsets: Option<Vec<[f32; 3]>>,
    /// Anchor the geometry and transforms are relative to.
    pub rtc_center: Option<DVec3>,
}

/// GPU handles owned by an uploaded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBuffers {
    pub positions: BufferId,
    pub indices: BufferId,
    pub model_matrix_cols: [BufferId; 3],
    pub colors: BufferId,
    pub flags: BufferId,
    pub flags2: BufferId,
    pub offsets: BufferId,
}

impl BatchBuffers {
    /// The buffer feeding the shader attribute called `name`.
    pub fn for_attribute(&self, name: &str) -> Option<BufferId> {
        let [col0, col1, col2] = self.model_matrix_cols;
        let buffer = match name {
            shader::ATTR_POSITION => self.positions,
            shader::ATTR_OFFSET => self.offsets,
            shader::ATTR_COLOR => self.colors,
            shader::ATTR_FLAGS => self.flags,
            shader::ATTR_FLAGS2 => self.flags2,
            "model_matrix_col0" => col0,
            "model_matrix_col1" => col1,
            "model_matrix_col2" => col2,
            _ => return None,
        };
        Some(buffer)
    }

    fn all(&self) -> [BufferId; 9] {
        let [col0, col1, col2] = self.model_matrix_cols;
        [
            self.positions,
            self.indices,
            col0,
            col1,
            col2,
            self.colors,
            self.flags,
            self.flags2,
            self.offsets,
        ]
    }
}

/// Instances of one shared geometry, drawn with a single instanced call.
///
/// The CPU copy of every attribute is retained so the batch can be re-uploaded
/// after the device is lost.
#[derive(Debug)]
pub struct InstanceBatch {
    data: InstanceBatchData,
    buffers: Option<BatchBuffers>,
    /// Clip volumes switched off for this batch only.
    disabled_clips: SmallVec<[ClipVolumeId; 4]>,
}

impl InstanceBatch {
    /// Validates `data` and uploads it.
    pub fn new(ctx: &mut dyn GraphicsContext, data: InstanceBatchData) -> Result<Self, BatchError> {
        validate(&data)?;
        let buffers = upload(ctx, &data);
        tracing::debug!(
            instances = data.transforms.len(),
            indices = data.indices.len(),
            rtc = data.rtc_center.is_some(),
            "instance batch uploaded"
        );
        Ok(Self {
            data,
            buffers: Some(buffers),
            disabled_clips: SmallVec::new(),
        })
    }

    pub fn num_instances(&self) -> usize {
        self.data.transforms.len()
    }

    pub fn index_count(&self) -> usize {
        self.data.indices.len()
    }

    pub fn topology(&self) -> wgpu::PrimitiveTopology {
        self.data.topology
    }

    pub fn rtc_center(&self) -> Option<DVec3> {
        self.data.rtc_center
    }

    pub fn positions_decode_matrix(&self) -> Mat4 {
        self.data.geometry.decode_matrix
    }

    /// `None` while the batch is destroyed or its context was lost.
    pub fn buffers(&self) -> Option<&BatchBuffers> {
        self.buffers.as_ref()
    }

    pub fn flags(&self) -> &[InstanceFlags] {
        &self.data.flags
    }

    pub fn colors(&self) -> &[Color] {
        &self.data.colors
    }

    pub fn data(&self) -> &InstanceBatchData {
        &self.data
    }

    pub fn set_flags(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        range: Range<usize>,
        flags: InstanceFlags,
    ) -> Result<(), BatchError> {
        self.check_range(&range)?;
        self.data.flags[range.clone()].fill(flags);
        self.write_flags(ctx, range, true);
        Ok(())
    }

    pub fn set_color(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        range: Range<usize>,
        color: Color,
    ) -> Result<(), BatchError> {
        self.check_range(&range)?;
        self.data.colors[range.clone()].fill(color);
        if let Some(buffers) = self.buffers {
            ctx.write_buffer(
                buffers.colors,
                row_offset::<Color>(range.start),
                bytemuck::cast_slice(&self.data.colors[range]),
            );
        }
        Ok(())
    }

    /// Shows or hides instances without touching their other flags.
    pub fn set_visible(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        range: Range<usize>,
        visible: bool,
    ) -> Result<(), BatchError> {
        self.check_range(&range)?;
        for flags in &mut self.data.flags[range.clone()] {
            flags.visible = visible;
        }
        self.write_flags(ctx, range, false);
        Ok(())
    }

    /// Enables or disables one clip volume for this batch alone.
    ///
    /// A volume clips the batch only while it is active in its set and not
    /// disabled here. Every volume starts enabled; ids of volumes that are not
    /// in the set are harmless.
    pub fn set_clip_volume_enabled(&mut self, id: ClipVolumeId, enabled: bool) {
        let position = self.disabled_clips.iter().position(|disabled| *disabled == id);
        match (enabled, position) {
            (true, Some(index)) => {
                self.disabled_clips.swap_remove(index);
            }
            (false, None) => self.disabled_clips.push(id),
            _ => {}
        }
    }

    pub fn is_clip_volume_enabled(&self, id: ClipVolumeId) -> bool {
        !self.disabled_clips.contains(&id)
    }

    pub fn destroy(&mut self, ctx: &mut dyn GraphicsContext) {
        if let Some(buffers) = self.buffers.take() {
            for buffer in buffers.all() {
                ctx.destroy_buffer(buffer);
            }
        }
    }

    /// Forgets the buffers of a lost device without releasing them.
    pub fn on_context_lost(&mut self) {
        self.buffers = None;
    }

    /// Re-uploads the retained data if the batch has no live buffers.
    pub fn restore(&mut self, ctx: &mut dyn GraphicsContext) {
        if self.buffers.is_none() {
            self.buffers = Some(upload(ctx, &self.data));
        }
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), BatchError> {
        let num_instances = self.num_instances();
        if range.start > range.end || range.end > num_instances {
            return Err(BatchError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                num_instances,
            });
        }
        Ok(())
    }

    fn write_flags(&self, ctx: &mut dyn GraphicsContext, range: Range<usize>, with_flags2: bool) {
        let Some(buffers) = self.buffers else {
            return;
        };
        let rows = &self.data.flags[range.clone()];
        let offset = row_offset::<[u8; 4]>(range.start);

        let flags: Vec<[u8; 4]> = rows.iter().map(InstanceFlags::flags_bytes).collect();
        ctx.write_buffer(buffers.flags, offset, bytemuck::cast_slice(&flags));

        if with_flags2 {
            let flags2: Vec<[u8; 4]> = rows.iter().map(InstanceFlags::flags2_bytes).collect();
            ctx.write_buffer(buffers.flags2, offset, bytemuck::cast_slice(&flags2));
        }
    }
}

fn row_offset<T>(row: usize) -> u64 {
    (row * std::mem::size_of::<T>()) as u64
}

fn validate(data: &InstanceBatchData) -> Result<(), BatchError> {
    let num_vertices = data.geometry.positions.len();
    let num_instances = data.transforms.len();
    if num_vertices == 0 || data.indices.is_empty() || num_instances == 0 {
        return Err(BatchError::EmptyGeometry);
    }

    if let Some(index) = data
        .indices
        .iter()
        .copied()
        .find(|index| *index as usize >= num_vertices)
    {
        return Err(BatchError::IndexOutOfBounds {
            index,
            num_vertices,
        });
    }

    let mut rows = vec![("color", data.colors.len()), ("flags", data.flags.len())];
    if let Some(offsets) = &data.offsets {
        rows.push(("offset", offsets.len()));
    }
    for (attribute, actual) in rows {
        if actual != num_instances {
            return Err(BatchError::InstanceCountMismatch {
                attribute,
                expected: num_instances,
                actual,
            });
        }
    }

    Ok(())
}

fn upload(ctx: &mut dyn GraphicsContext, data: &InstanceBatchData) -> BatchBuffers {
    let padded_positions: Vec<[u16; 4]> = data
        .geometry
        .positions
        .iter()
        .map(|[x, y, z]| [*x, *y, *z, 0])
        .collect();
    let positions = ctx.create_buffer(
        "instaclip_positions",
        BufferKind::Vertex,
        bytemuck::cast_slice(&padded_positions),
    );
    let indices = ctx.create_buffer(
        "instaclip_indices",
        BufferKind::Index,
        bytemuck::cast_slice(&data.indices),
    );

    let model_matrix_cols = [0, 1, 2].map(|row| {
        let column: Vec<[f32; 4]> = data
            .transforms
            .iter()
            .map(|transform| transform.rows[row])
            .collect();
        ctx.create_buffer(
            "instaclip_model_matrix",
            BufferKind::Vertex,
            bytemuck::cast_slice(&column),
        )
    });

    let colors = ctx.create_buffer(
        "instaclip_colors",
        BufferKind::Vertex,
        bytemuck::cast_slice(&data.colors),
    );

    let flags: Vec<[u8; 4]> = data.flags.iter().map(InstanceFlags::flags_bytes).collect();
    let flags = ctx.create_buffer(
        "instaclip_flags",
        BufferKind::Vertex,
        bytemuck::cast_slice(&flags),
    );
    let flags2: Vec<[u8; 4]> = data.flags.iter().map(InstanceFlags::flags2_bytes).collect();
    let flags2 = ctx.create_buffer(
        "instaclip_flags2",
        BufferKind::Vertex,
        bytemuck::cast_slice(&flags2),
    );

    let offsets = match &data.offsets {
        Some(offsets) => ctx.create_buffer(
            "instaclip_offsets",
            BufferKind::Vertex,
            bytemuck::cast_slice(offsets),
        ),
        None => {
            let zeros = vec![[0.0f32; 3]; data.transforms.len()];
            ctx.create_buffer(
                "instaclip_offsets",
                BufferKind::Vertex,
                bytemuck::cast_slice(&zeros),
            )
        }
    };

    BatchBuffers {
        positions,
        indices,
        model_matrix_cols,
        colors,
        flags,
        flags2,
        offsets,
    }
}
