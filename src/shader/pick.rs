use glam::DMat4;

use super::{
    compose, instance_attributes, pass_uniforms, program_label, AttributeSet, PassShader,
    ShaderParts, Varying,
};
use crate::frame::FrameContext;
use crate::gpu::{PassTargets, ProgramSource, UniformDecl, UniformKind, UniformValue};
use crate::settings::RenderSettings;

pub const PICK_Z_NEAR: &str = "pick_z_near";
pub const PICK_Z_FAR: &str = "pick_z_far";

// Visible, not culled, pickable.
const PICK_VISIBILITY: &str = "attrs.flags.x != 0u && attrs.flags.y == 0u && attrs.flags.w != 0u";

const VARYINGS: &[Varying] = &[Varying {
    name: "view_depth",
    ty: "f32",
    flat: false,
}];

const HELPERS: &str = "fn pack_depth(depth: f32) -> vec4<f32> {
    let bit_shift = vec4<f32>(256.0 * 256.0 * 256.0, 256.0 * 256.0, 256.0, 1.0);
    let bit_mask = vec4<f32>(0.0, 1.0 / 256.0, 1.0 / 256.0, 1.0 / 256.0);
    var bits = fract(depth * bit_shift);
    bits = bits - bits.xxyz * bit_mask;
    return bits;
}

";

const FRAGMENT_BODY: &str = "    let depth = clamp((-varyings.view_depth - u.pick_z_near) / (u.pick_z_far - u.pick_z_near), 0.0, 1.0);
    return pack_depth(depth);
";

/// Writes normalised view depth of visible pickable instances, packed into RGBA8.
#[derive(Debug, Clone, Copy, Default)]
pub struct PickDepthPass;

impl PassShader for PickDepthPass {
    fn label(&self) -> &'static str {
        "instancing_pick_depth"
    }

    fn program_source(&self, clip_count: usize, settings: &RenderSettings) -> ProgramSource {
        let attributes = instance_attributes(AttributeSet {
            color: false,
            offset: settings.entity_offsets,
            flags2: clip_count > 0,
        });
        let mut uniforms = pass_uniforms(clip_count);
        uniforms.push(UniformDecl::new(PICK_Z_NEAR, UniformKind::Float));
        uniforms.push(UniformDecl::new(PICK_Z_FAR, UniformKind::Float));

        let wgsl = compose(
            &ShaderParts {
                clip_count,
                visibility: PICK_VISIBILITY,
                varyings: VARYINGS,
                vertex_body: "    out.view_depth = view_position.z;\n",
                helpers: HELPERS,
                fragment_output: "@location(0) vec4<f32>",
                fragment_prelude: "",
                fragment_body: FRAGMENT_BODY,
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
                color: Some(settings.pick_format),
                blend: None,
                depth: settings.depth_format,
                depth_bias: wgpu::DepthBiasState::default(),
                sample_count: 1,
            },
        }
    }

    fn view_matrix(&self, frame: &FrameContext) -> DMat4 {
        frame.pick_view()
    }

    fn projection_matrix(&self, frame: &FrameContext) -> DMat4 {
        frame.pick_projection()
    }

    fn extra_uniforms(&self, frame: &FrameContext) -> Vec<(&'static str, UniformValue)> {
        vec![
            (PICK_Z_NEAR, UniformValue::Float(frame.pick_z_near())),
            (PICK_Z_FAR, UniformValue::Float(frame.pick_z_far())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_range_uniforms_follow_the_clip_triples() {
        let source = PickDepthPass.program_source(1, &RenderSettings::default());
        let names: Vec<_> = source.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(&names[3..], &[
            "section_plane_active0",
            "section_plane_pos0",
            "section_plane_dir0",
            "pick_z_near",
            "pick_z_far",
        ]);
        assert_eq!(source.targets.blend, None);
    }

    #[test]
    fn hidden_and_culled_instances_are_not_pickable() {
        for clip_count in [0, 2] {
            let source = PickDepthPass.program_source(clip_count, &RenderSettings::default());
            assert!(
                source.wgsl.contains(
                    "if (!(attrs.flags.x != 0u && attrs.flags.y == 0u && attrs.flags.w != 0u))"
                ),
                "{}",
                source.wgsl
            );
        }
    }

    #[test]
    fn extra_uniforms_read_the_frame_depth_range() {
        let mut frame = FrameContext::new();
        frame.set_pick_depth_range(0.5, 250.0);
        assert_eq!(
            PickDepthPass.extra_uniforms(&frame),
            vec![
                (PICK_Z_NEAR, UniformValue::Float(0.5)),
                (PICK_Z_FAR, UniformValue::Float(250.0)),
            ]
        );
    }
}
