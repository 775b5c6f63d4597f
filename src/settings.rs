use std::num::NonZeroUsize;

pub const DEFAULT_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;
pub const DEFAULT_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const DEFAULT_PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Distinct clip-volume counts kept compiled per renderer.
pub const DEFAULT_PROGRAM_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(8) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Slope-scaled bias that keeps lit surfaces from shadowing themselves.
pub const DEFAULT_SHADOW_DEPTH_BIAS: wgpu::DepthBiasState = wgpu::DepthBiasState {
    constant: 2,
    slope_scale: 2.0,
    clamp: 0.0,
};

/// Render target and program-cache configuration shared by the instanced renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    /// Target of the pick-depth pass; depth is packed into its four channels.
    pub pick_format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub shadow_depth_bias: wgpu::DepthBiasState,
    /// Compile the per-instance offset attribute into the shadow pass.
    pub entity_offsets: bool,
    pub program_cache_capacity: NonZeroUsize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            color_format: DEFAULT_COLOR_FORMAT,
            depth_format: DEFAULT_DEPTH_FORMAT,
            pick_format: DEFAULT_PICK_FORMAT,
            sample_count: 1,
            shadow_depth_bias: DEFAULT_SHADOW_DEPTH_BIAS,
            entity_offsets: false,
            program_cache_capacity: DEFAULT_PROGRAM_CACHE_CAPACITY,
        }
    }
}

impl RenderSettings {
    pub fn with_color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    pub fn with_depth_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth_format = format;
        self
    }

    pub fn with_pick_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.pick_format = format;
        self
    }

    /// Values below 1 are treated as 1.
    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count.max(1);
        self
    }

    pub fn with_shadow_depth_bias(mut self, bias: wgpu::DepthBiasState) -> Self {
        self.shadow_depth_bias = bias;
        self
    }

    pub fn with_entity_offsets(mut self, enabled: bool) -> Self {
        self.entity_offsets = enabled;
        self
    }

    pub fn with_program_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.program_cache_capacity = capacity;
        self
    }
}
