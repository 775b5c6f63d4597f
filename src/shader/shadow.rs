use glam::DMat4;

use super::{compose, instance_attributes, pass_uniforms, program_label, AttributeSet, PassShader, ShaderParts};
use crate::frame::FrameContext;
use crate::gpu::{PassTargets, ProgramSource};
use crate::settings::RenderSettings;

/// Depth-only pass into a shadow map, seen from the light.
///
/// Draws instances that are visible, not culled and flagged as shadow casters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowPass;

impl PassShader for ShadowPass {
    fn label(&self) -> &'static str {
        "instancing_shadow"
    }

    fn program_source(&self, clip_count: usize, settings: &RenderSettings) -> ProgramSource {
        let attributes = instance_attributes(AttributeSet {
            color: false,
            offset: settings.entity_offsets,
            flags2: clip_count > 0,
        });
        let uniforms = pass_uniforms(clip_count);
        let wgsl = compose(
            &ShaderParts {
                clip_count,
                visibility: "attrs.flags.x != 0u && attrs.flags.y == 0u && attrs.flags.z != 0u",
                varyings: &[],
                vertex_body: "",
                helpers: "",
                fragment_output: "",
                fragment_prelude: "",
                fragment_body: "",
            },
            &attributes,
            &uniforms,
        );

        ProgramSource {
            label: program_label(self.label(), clip_count),
            wgsl,
            attributes,
            uniforms,
            targets: PassTargets {
                color: None,
                blend: None,
                depth: settings.depth_format,
                depth_bias: settings.shadow_depth_bias,
                sample_count: 1,
            },
        }
    }

    fn view_matrix(&self, frame: &FrameContext) -> DMat4 {
        frame.shadow_view()
    }

    fn projection_matrix(&self, frame: &FrameContext) -> DMat4 {
        frame.shadow_projection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclipped_variant_has_no_clip_state() {
        let source = ShadowPass.program_source(0, &RenderSettings::default());
        assert!(source.attribute("flags2").is_none());
        assert!(source.attribute("offset").is_none());
        assert!(!source.wgsl.contains("section_plane"));
        assert!(!source.wgsl.contains("discard"));
        assert_eq!(source.label, "instancing_shadow_0");
        assert_eq!(source.targets.color, None);
    }

    #[test]
    fn offsets_follow_the_settings() {
        let settings = RenderSettings::default().with_entity_offsets(true);
        let source = ShadowPass.program_source(2, &settings);
        assert!(source.attribute("offset").is_some());
        assert!(source.attribute("flags2").is_some());
        assert!(source.wgsl.contains("attrs.offset"));
        assert_eq!(source.wgsl.matches("discard;").count(), 2);
    }
}
