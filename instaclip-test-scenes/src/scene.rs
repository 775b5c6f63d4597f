use instaclip::glam::{DVec3, Mat4, Vec3};
use instaclip::quantize::quantize_positions;
use instaclip::rtc::{world_to_rtc_positions, DEFAULT_RTC_CELL_SIZE};
use instaclip::wgpu;
use instaclip::{
    BatchError, ClipVolume, ClipVolumeConfig, ClipVolumeId, ClipVolumeSet, Color, GraphicsContext,
    InstanceBatch, InstanceBatchData, InstanceFlags, InstanceTransform,
};

/// Anchor of the far-from-origin grid, roughly where georeferenced BIM models sit.
pub const FAR_ORIGIN: DVec3 = DVec3::new(4.2e6, -1.8e6, 120.0);

const GRID_SPACING: f64 = 3.0;

// ── Geometry ─────────────────────────────────────────────────────────────────

/// Unit cube centred on the origin: 8 corners, 12 triangles.
pub fn unit_cube() -> (Vec<[f32; 3]>, Vec<u32>) {
    let positions = vec![
        [-0.5, -0.5, -0.5],
        [0.5, -0.5, -0.5],
        [0.5, 0.5, -0.5],
        [-0.5, 0.5, -0.5],
        [-0.5, -0.5, 0.5],
        [0.5, -0.5, 0.5],
        [0.5, 0.5, 0.5],
        [-0.5, 0.5, 0.5],
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // back
        4, 5, 6, 4, 6, 7, // front
        0, 1, 5, 0, 5, 4, // bottom
        3, 7, 6, 3, 6, 2, // top
        0, 4, 7, 0, 7, 3, // left
        1, 2, 6, 1, 6, 5, // right
    ];
    (positions, indices)
}

fn cube_batch_data(transforms: Vec<InstanceTransform>, rtc_center: Option<DVec3>) -> InstanceBatchData {
    let (positions, indices) = unit_cube();
    let count = transforms.len();
    InstanceBatchData {
        geometry: quantize_positions(&positions),
        indices,
        topology: wgpu::PrimitiveTopology::TriangleList,
        transforms,
        colors: (0..count)
            .map(|i| Color::rgb(40 + (i * 13 % 200) as u8, 120, 200))
            .collect(),
        flags: vec![InstanceFlags::DEFAULT; count],
        offsets: None,
        rtc_center,
    }
}

/// `columns × rows` cubes around the World origin, no RTC anchor.
pub fn origin_grid(columns: usize, rows: usize) -> InstanceBatchData {
    let transforms = grid_points(DVec3::ZERO, columns, rows)
        .into_iter()
        .map(|p| InstanceTransform::from_translation(p.as_vec3().to_array()))
        .collect();
    cube_batch_data(transforms, None)
}

/// `columns × rows` cubes around [`FAR_ORIGIN`], stored relative to a snapped RTC center.
pub fn far_grid(columns: usize, rows: usize) -> InstanceBatchData {
    let points = grid_points(FAR_ORIGIN, columns, rows);
    let (center, relative) = world_to_rtc_positions(&points, DEFAULT_RTC_CELL_SIZE);
    let transforms = relative
        .into_iter()
        .map(|offset| InstanceTransform::from_mat4(Mat4::from_translation(Vec3::from_array(offset))))
        .collect();
    cube_batch_data(transforms, Some(center))
}

fn grid_points(origin: DVec3, columns: usize, rows: usize) -> Vec<DVec3> {
    (0..rows)
        .flat_map(|row| {
            (0..columns).map(move |column| {
                origin + DVec3::new(column as f64 * GRID_SPACING, row as f64 * GRID_SPACING, 0.0)
            })
        })
        .collect()
}

// ── Clip volumes ─────────────────────────────────────────────────────────────

/// Plane through `position` discarding everything towards the World origin's
/// negative diagonal.
pub fn diagonal_clip(position: DVec3) -> ClipVolume {
    ClipVolume::new(ClipVolumeConfig {
        position,
        direction: Some(DVec3::new(-1.0, -1.0, -1.0)),
        active: true,
    })
}

/// Horizontal cut at height `z` discarding everything above it.
pub fn horizontal_clip(z: f64) -> ClipVolume {
    ClipVolume::new(ClipVolumeConfig {
        position: DVec3::new(0.0, 0.0, z),
        direction: Some(DVec3::Z),
        active: true,
    })
}

// ── Scene ────────────────────────────────────────────────────────────────────

/// A near batch, a far RTC batch and two clip volumes.
pub struct ClipScene {
    pub clips: ClipVolumeSet,
    pub diagonal: ClipVolumeId,
    pub horizontal: ClipVolumeId,
    pub near: InstanceBatch,
    pub far: InstanceBatch,
}

/// Uploads the shared scene through `ctx`.
pub fn build_clip_scene(ctx: &mut dyn GraphicsContext) -> Result<ClipScene, BatchError> {
    let mut clips = ClipVolumeSet::new();
    let diagonal = clips.add(diagonal_clip(FAR_ORIGIN + DVec3::new(1.0, 1.0, 1.0)));
    let horizontal = clips.add(horizontal_clip(0.25));

    let near = InstanceBatch::new(ctx, origin_grid(4, 4))?;
    let far = InstanceBatch::new(ctx, far_grid(8, 8))?;

    Ok(ClipScene {
        clips,
        diagonal,
        horizontal,
        near,
        far,
    })
}
