use super::InstancedRenderer;
use crate::clip::ClipVolumeSet;
use crate::error::ProgramError;
use crate::gpu::GraphicsContext;
use crate::program::{ProgramState, ShaderProgramCache};
use crate::settings::RenderSettings;
use crate::shader::PassShader;

impl<P: PassShader> InstancedRenderer<P> {
    /// Creates a renderer with nothing compiled; the first draw builds its program.
    pub fn new(pass: P, settings: RenderSettings) -> Self {
        let programs = ShaderProgramCache::new(settings.program_cache_capacity);
        Self {
            pass,
            settings,
            programs,
        }
    }

    pub fn pass(&self) -> &P {
        &self.pass
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn program_state(&self) -> &ProgramState {
        self.programs.state()
    }

    /// Whether the compiled program matches the current clip-volume membership.
    pub fn is_valid(&self, clips: &ClipVolumeSet) -> bool {
        self.programs.is_valid(clips)
    }

    /// The build error that is currently keeping this renderer from drawing.
    pub fn errors(&self) -> Option<&ProgramError> {
        self.programs.errors()
    }

    /// Clears an errored state so the next draw tries to build again.
    pub fn reset(&mut self) {
        self.programs.reset();
    }

    pub fn on_context_lost(&mut self) {
        self.programs.on_context_lost();
    }

    /// Releases every compiled program variant.
    pub fn destroy(&mut self, ctx: &mut dyn GraphicsContext) {
        self.programs.destroy(ctx);
    }
}
