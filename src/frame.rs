//! Per-frame state shared by every instanced renderer.

use glam::{DMat4, DVec3};

use crate::id::ProgramId;

pub const DEFAULT_PICK_Z_NEAR: f32 = 0.01;
pub const DEFAULT_PICK_Z_FAR: f32 = 5000.0;

/// Per-frame counters for diagnosing GPU state-change overhead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// `bind_program` calls issued.
    pub program_binds: u32,
    pub draws: u32,
    pub instances: u64,
    /// Batches skipped because their renderer had no usable program.
    pub skipped_batches: u32,
    /// View matrix uploads, including RTC re-anchoring.
    pub view_uploads: u32,
}

impl FrameStats {
    /// Merge another frame's counts into this accumulator.
    pub fn accumulate(&mut self, other: &Self) {
        self.program_binds += other.program_binds;
        self.draws += other.draws;
        self.instances += other.instances;
        self.skipped_batches += other.skipped_batches;
        self.view_uploads += other.view_uploads;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PassMatrices {
    view: DMat4,
    projection: DMat4,
}

impl PassMatrices {
    const IDENTITY: Self = Self {
        view: DMat4::IDENTITY,
        projection: DMat4::IDENTITY,
    };
}

/// Which view matrix is currently uploaded to the bound program.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ViewAnchor {
    Unknown,
    World,
    Rtc(DVec3),
}

impl From<Option<DVec3>> for ViewAnchor {
    fn from(center: Option<DVec3>) -> Self {
        match center {
            Some(center) => ViewAnchor::Rtc(center),
            None => ViewAnchor::World,
        }
    }
}

/// Frame-scoped rendering state, passed explicitly to every draw.
///
/// Holds the matrices each pass reads and remembers which program was bound
/// last, so consecutive batches drawn by the same renderer skip redundant binds.
/// Call [`begin_frame`](Self::begin_frame) before the first draw of a frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    camera: PassMatrices,
    shadow: PassMatrices,
    pick: Option<PassMatrices>,
    pick_z_near: f32,
    pick_z_far: f32,
    last_program: Option<ProgramId>,
    view_anchor: ViewAnchor,
    stats: FrameStats,
}

impl FrameContext {
    pub fn new() -> Self {
        Self {
            camera: PassMatrices::IDENTITY,
            shadow: PassMatrices::IDENTITY,
            pick: None,
            pick_z_near: DEFAULT_PICK_Z_NEAR,
            pick_z_far: DEFAULT_PICK_Z_FAR,
            last_program: None,
            view_anchor: ViewAnchor::Unknown,
            stats: FrameStats::default(),
        }
    }

    /// Forgets the bound program and starts a fresh set of counters.
    pub fn begin_frame(&mut self) {
        self.last_program = None;
        self.view_anchor = ViewAnchor::Unknown;
        self.stats = FrameStats::default();
    }

    pub fn set_camera(&mut self, view: DMat4, projection: DMat4) {
        self.camera = PassMatrices { view, projection };
    }

    pub fn set_shadow(&mut self, view: DMat4, projection: DMat4) {
        self.shadow = PassMatrices { view, projection };
    }

    /// Overrides the camera for the pick pass; `None` picks through the camera.
    pub fn set_pick(&mut self, matrices: Option<(DMat4, DMat4)>) {
        self.pick = matrices.map(|(view, projection)| PassMatrices { view, projection });
    }

    pub fn set_pick_depth_range(&mut self, z_near: f32, z_far: f32) {
        self.pick_z_near = z_near;
        self.pick_z_far = z_far;
    }

    pub fn camera_view(&self) -> DMat4 {
        self.camera.view
    }

    pub fn camera_projection(&self) -> DMat4 {
        self.camera.projection
    }

    pub fn shadow_view(&self) -> DMat4 {
        self.shadow.view
    }

    pub fn shadow_projection(&self) -> DMat4 {
        self.shadow.projection
    }

    pub fn pick_view(&self) -> DMat4 {
        self.pick.unwrap_or(self.camera).view
    }

    pub fn pick_projection(&self) -> DMat4 {
        self.pick.unwrap_or(self.camera).projection
    }

    pub fn pick_z_near(&self) -> f32 {
        self.pick_z_near
    }

    pub fn pick_z_far(&self) -> f32 {
        self.pick_z_far
    }

    pub fn last_program(&self) -> Option<ProgramId> {
        self.last_program
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub(crate) fn record_program_bind(&mut self, program: ProgramId) {
        self.last_program = Some(program);
        self.view_anchor = ViewAnchor::Unknown;
        self.stats.program_binds += 1;
    }

    pub(crate) fn needs_view_upload(&self, rtc_center: Option<DVec3>) -> bool {
        self.view_anchor != ViewAnchor::from(rtc_center)
    }

    pub(crate) fn record_view_upload(&mut self, rtc_center: Option<DVec3>) {
        self.view_anchor = ViewAnchor::from(rtc_center);
        self.stats.view_uploads += 1;
    }

    pub(crate) fn record_draw(&mut self, instances: usize) {
        self.stats.draws += 1;
        self.stats.instances += instances as u64;
    }

    pub(crate) fn record_skip(&mut self) {
        self.stats.skipped_batches += 1;
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new()
    }
}
