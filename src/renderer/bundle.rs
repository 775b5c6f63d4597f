use super::InstancedRenderer;
use crate::clip::ClipVolumeSet;
use crate::gpu::GraphicsContext;
use crate::settings::RenderSettings;
use crate::shader::{ColorPass, PickDepthPass, ShadowPass};

/// The instanced renderers a scene needs, one per pass.
pub struct InstancingRenderers {
    pub color: InstancedRenderer<ColorPass>,
    pub shadow: InstancedRenderer<ShadowPass>,
    pub pick_depth: InstancedRenderer<PickDepthPass>,
}

impl InstancingRenderers {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            color: InstancedRenderer::new(ColorPass, settings.clone()),
            shadow: InstancedRenderer::new(ShadowPass, settings.clone()),
            pick_depth: InstancedRenderer::new(PickDepthPass, settings),
        }
    }

    /// True only if every pass has a program built for the current clip volumes.
    pub fn is_valid(&self, clips: &ClipVolumeSet) -> bool {
        self.color.is_valid(clips) && self.shadow.is_valid(clips) && self.pick_depth.is_valid(clips)
    }

    pub fn reset(&mut self) {
        self.color.reset();
        self.shadow.reset();
        self.pick_depth.reset();
    }

    pub fn on_context_lost(&mut self) {
        self.color.on_context_lost();
        self.shadow.on_context_lost();
        self.pick_depth.on_context_lost();
    }

    pub fn destroy(&mut self, ctx: &mut dyn GraphicsContext) {
        self.color.destroy(ctx);
        self.shadow.destroy(ctx);
        self.pick_depth.destroy(ctx);
    }
}

impl Default for InstancingRenderers {
    fn default() -> Self {
        Self::new(RenderSettings::default())
    }
}
