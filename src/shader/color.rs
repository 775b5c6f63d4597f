use glam::DMat4;

use super::{
    compose, instance_attributes, pass_uniforms, program_label, AttributeSet, PassShader,
    ShaderParts, Varying,
};
use crate::frame::FrameContext;
use crate::gpu::{PassTargets, ProgramSource};
use crate::settings::RenderSettings;

const VARYINGS: &[Varying] = &[
    Varying {
        name: "color",
        ty: "vec4<f32>",
        flat: true,
    },
    Varying {
        name: "view_position",
        ty: "vec3<f32>",
        flat: false,
    },
];

const VERTEX_BODY: &str = "    out.color = attrs.color;
    out.view_position = view_position.xyz;
";

// Face normals from screen-space derivatives; taken before any discard.
const FRAGMENT_PRELUDE: &str = "    let normal = normalize(cross(dpdx(varyings.view_position), dpdy(varyings.view_position)));
";

const FRAGMENT_BODY: &str = "    let shade = 0.3 + 0.7 * abs(normal.z);
    return vec4<f32>(varyings.color.rgb * shade, varyings.color.a);
";

/// Flat-shaded color pass from the camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorPass;

impl PassShader for ColorPass {
    fn label(&self) -> &'static str {
        "instancing_color"
    }

    fn program_source(&self, clip_count: usize, settings: &RenderSettings) -> ProgramSource {
        let attributes = instance_attributes(AttributeSet {
            color: true,
            offset: settings.entity_offsets,
            flags2: clip_count > 0,
        });
        let uniforms = pass_uniforms(clip_count);
        let wgsl = compose(
            &ShaderParts {
                clip_count,
                visibility: "attrs.flags.x != 0u && attrs.flags.y == 0u",
                varyings: VARYINGS,
                vertex_body: VERTEX_BODY,
                helpers: "",
                fragment_output: "@location(0) vec4<f32>",
                fragment_prelude: FRAGMENT_PRELUDE,
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
                color: Some(settings.color_format),
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                depth: settings.depth_format,
                depth_bias: wgpu::DepthBiasState::default(),
                sample_count: settings.sample_count,
            },
        }
    }

    fn view_matrix(&self, frame: &FrameContext) -> DMat4 {
        frame.camera_view()
    }

    fn projection_matrix(&self, frame: &FrameContext) -> DMat4 {
        frame.camera_projection()
    }
}
