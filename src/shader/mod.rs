//! WGSL generation for the instanced passes.
//!
//! Every pass shares the same vertex inputs, the same transform chain and the
//! same clip-volume discard block; a [`PassShader`] only supplies what differs:
//! which instances are visible, the varyings it needs, and the fragment output.
//! Sources are generated per clip-volume count, so a program compiled for three
//! volumes declares exactly three `(active, pos, dir)` uniform triples.

mod color;
mod pick;
mod shadow;

pub use color::ColorPass;
pub use pick::PickDepthPass;
pub use shadow::ShadowPass;

use std::fmt::Write as _;

use glam::DMat4;

use crate::frame::FrameContext;
use crate::gpu::wgsl_type;
use crate::gpu::{AttributeDecl, ProgramSource, UniformDecl, UniformKind, UniformValue, VertexRate};
use crate::settings::RenderSettings;

pub const ATTR_POSITION: &str = "position";
pub const ATTR_OFFSET: &str = "offset";
pub const ATTR_COLOR: &str = "color";
pub const ATTR_FLAGS: &str = "flags";
pub const ATTR_FLAGS2: &str = "flags2";
pub const ATTR_MODEL_MATRIX_COLS: [&str; 3] =
    ["model_matrix_col0", "model_matrix_col1", "model_matrix_col2"];

pub const POSITIONS_DECODE_MATRIX: &str = "positions_decode_matrix";
pub const VIEW_MATRIX: &str = "view_matrix";
pub const PROJECTION_MATRIX: &str = "projection_matrix";

pub fn section_plane_active(index: usize) -> String {
    format!("section_plane_active{index}")
}

pub fn section_plane_pos(index: usize) -> String {
    format!("section_plane_pos{index}")
}

pub fn section_plane_dir(index: usize) -> String {
    format!("section_plane_dir{index}")
}

/// Strategy for one instanced pass: its shader source and pass-invariant uniforms.
pub trait PassShader {
    /// Base label; program labels append the clip count.
    fn label(&self) -> &'static str;

    fn program_source(&self, clip_count: usize, settings: &RenderSettings) -> ProgramSource;

    fn view_matrix(&self, frame: &FrameContext) -> DMat4;

    fn projection_matrix(&self, frame: &FrameContext) -> DMat4;

    /// Uniforms beyond view and projection, written once per program bind.
    fn extra_uniforms(&self, _frame: &FrameContext) -> Vec<(&'static str, UniformValue)> {
        Vec::new()
    }
}

/// Which optional per-instance attributes a pass declares.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttributeSet {
    pub color: bool,
    pub offset: bool,
    pub flags2: bool,
}

pub(crate) fn instance_attributes(set: AttributeSet) -> Vec<AttributeDecl> {
    let mut attributes = vec![AttributeDecl {
        name: ATTR_POSITION,
        location: 0,
        format: wgpu::VertexFormat::Uint16x4,
        rate: VertexRate::Vertex,
    }];
    if set.offset {
        attributes.push(instance_attribute(ATTR_OFFSET, 1, wgpu::VertexFormat::Float32x3));
    }
    if set.color {
        attributes.push(instance_attribute(ATTR_COLOR, 2, wgpu::VertexFormat::Unorm8x4));
    }
    attributes.push(instance_attribute(ATTR_FLAGS, 3, wgpu::VertexFormat::Uint8x4));
    if set.flags2 {
        attributes.push(instance_attribute(ATTR_FLAGS2, 4, wgpu::VertexFormat::Uint8x4));
    }
    for (column, name) in ATTR_MODEL_MATRIX_COLS.into_iter().enumerate() {
        attributes.push(instance_attribute(
            name,
            5 + column as u32,
            wgpu::VertexFormat::Float32x4,
        ));
    }
    attributes
}

fn instance_attribute(
    name: &'static str,
    location: u32,
    format: wgpu::VertexFormat,
) -> AttributeDecl {
    AttributeDecl {
        name,
        location,
        format,
        rate: VertexRate::Instance,
    }
}

/// Decode, view and projection matrices followed by one triple per clip volume.
pub(crate) fn pass_uniforms(clip_count: usize) -> Vec<UniformDecl> {
    let mut uniforms = vec![
        UniformDecl::new(POSITIONS_DECODE_MATRIX, UniformKind::Mat4),
        UniformDecl::new(VIEW_MATRIX, UniformKind::Mat4),
        UniformDecl::new(PROJECTION_MATRIX, UniformKind::Mat4),
    ];
    for index in 0..clip_count {
        uniforms.push(UniformDecl::new(section_plane_active(index), UniformKind::Flag));
        uniforms.push(UniformDecl::new(section_plane_pos(index), UniformKind::Vec3));
        uniforms.push(UniformDecl::new(section_plane_dir(index), UniformKind::Vec3));
    }
    uniforms
}

pub(crate) struct Varying {
    pub name: &'static str,
    pub ty: &'static str,
    pub flat: bool,
}

/// The pass-specific pieces spliced into the shared shader skeleton.
pub(crate) struct ShaderParts<'a> {
    pub clip_count: usize,
    /// WGSL `bool` expression over `attrs.flags`.
    pub visibility: &'a str,
    pub varyings: &'a [Varying],
    /// Statements run after `world` and `view_position` are known.
    pub vertex_body: &'a str,
    pub helpers: &'a str,
    /// Fragment return type including its `@location`, empty for depth-only passes.
    pub fragment_output: &'a str,
    /// Statements run before clip discards. Derivatives must be taken here.
    pub fragment_prelude: &'a str,
    pub fragment_body: &'a str,
}

pub(crate) fn compose(
    parts: &ShaderParts<'_>,
    attributes: &[AttributeDecl],
    uniforms: &[UniformDecl],
) -> String {
    let clipping = parts.clip_count > 0;
    let has_offset = attributes.iter().any(|attribute| attribute.name == ATTR_OFFSET);
    let mut wgsl = String::with_capacity(4096);

    wgsl.push_str("struct Uniforms {\n");
    for uniform in uniforms {
        let _ = writeln!(wgsl, "    {}: {},", uniform.name, wgsl_type(uniform.kind));
    }
    wgsl.push_str("}\n\n@group(0) @binding(0) var<uniform> u: Uniforms;\n\n");

    wgsl.push_str("struct VertexInput {\n");
    for attribute in attributes {
        let _ = writeln!(
            wgsl,
            "    @location({}) {}: {},",
            attribute.location,
            attribute.name,
            vertex_format_wgsl(attribute.format)
        );
    }
    wgsl.push_str("}\n\n");

    wgsl.push_str("struct VertexOutput {\n    @builtin(position) clip_position: vec4<f32>,\n");
    let mut next_location = 0;
    let mut varying = |wgsl: &mut String, name: &str, ty: &str, flat: bool| {
        let interpolation = if flat { " @interpolate(flat)" } else { "" };
        let _ = writeln!(wgsl, "    @location({next_location}){interpolation} {name}: {ty},");
        next_location += 1;
    };
    if clipping {
        varying(&mut wgsl, "world_position", "vec3<f32>", false);
        varying(&mut wgsl, "clippable", "u32", true);
    }
    for pass_varying in parts.varyings {
        varying(&mut wgsl, pass_varying.name, pass_varying.ty, pass_varying.flat);
    }
    wgsl.push_str("}\n\n");

    wgsl.push_str(parts.helpers);

    wgsl.push_str("@vertex\nfn vs_main(attrs: VertexInput) -> VertexOutput {\n");
    wgsl.push_str("    var out: VertexOutput;\n");
    wgsl.push_str(
        "    let object_position = u.positions_decode_matrix * vec4<f32>(vec3<f32>(attrs.position.xyz), 1.0);\n",
    );
    wgsl.push_str(
        "    var world = vec4<f32>(dot(object_position, attrs.model_matrix_col0), dot(object_position, attrs.model_matrix_col1), dot(object_position, attrs.model_matrix_col2), 1.0);\n",
    );
    if has_offset {
        wgsl.push_str("    world = vec4<f32>(world.xyz + attrs.offset, 1.0);\n");
    }
    wgsl.push_str("    let view_position = u.view_matrix * world;\n");
    wgsl.push_str("    out.clip_position = u.projection_matrix * view_position;\n");
    if clipping {
        wgsl.push_str("    out.world_position = world.xyz;\n");
        wgsl.push_str("    out.clippable = attrs.flags2.x;\n");
    }
    wgsl.push_str(parts.vertex_body);
    let _ = writeln!(wgsl, "    if (!({})) {{", parts.visibility);
    // Outside the clip volume on every axis, so the primitive is culled.
    wgsl.push_str("        out.clip_position = vec4<f32>(3.0, 3.0, 3.0, 1.0);\n    }\n");
    wgsl.push_str("    return out;\n}\n\n");

    let output = if parts.fragment_output.is_empty() {
        String::new()
    } else {
        format!(" -> {}", parts.fragment_output)
    };
    let _ = writeln!(wgsl, "@fragment\nfn fs_main(varyings: VertexOutput){output} {{");
    wgsl.push_str(parts.fragment_prelude);
    if clipping {
        wgsl.push_str(&clip_discard(parts.clip_count));
    }
    wgsl.push_str(parts.fragment_body);
    wgsl.push_str("}\n");

    wgsl
}

/// Discards fragments of clippable instances that lie in front of any active plane.
fn clip_discard(clip_count: usize) -> String {
    let mut block = String::from("    if (varyings.clippable != 0u) {\n");
    for index in 0..clip_count {
        let _ = writeln!(
            block,
            "        if (u.{active} == 1u && dot(u.{dir}, varyings.world_position - u.{pos}) > 0.0) {{ discard; }}",
            active = section_plane_active(index),
            dir = section_plane_dir(index),
            pos = section_plane_pos(index),
        );
    }
    block.push_str("    }\n");
    block
}

fn vertex_format_wgsl(format: wgpu::VertexFormat) -> &'static str {
    match format {
        wgpu::VertexFormat::Uint16x4 | wgpu::VertexFormat::Uint8x4 => "vec4<u32>",
        wgpu::VertexFormat::Float32x3 => "vec3<f32>",
        wgpu::VertexFormat::Float32x4 | wgpu::VertexFormat::Unorm8x4 => "vec4<f32>",
        wgpu::VertexFormat::Float32x2 => "vec2<f32>",
        _ => "f32",
    }
}

pub(crate) fn program_label(base: &str, clip_count: usize) -> String {
    format!("{base}_{clip_count}")
}
