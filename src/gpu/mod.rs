//! The seam between the renderers and the graphics API.
//!
//! Renderers talk to the GPU through [`GraphicsContext`], a small, stateful
//! binding model: bind a program, write uniforms by location, bind one buffer
//! per vertex attribute, choose each attribute's step rate, then draw. Two
//! implementations ship with the crate: [`WgpuContext`] drives a real device and
//! [`RecordingContext`] keeps a call log for headless tests and benchmarks.

pub mod recording;
mod uniform_layout;
pub mod wgpu_backend;

pub use recording::{GpuCall, RecordingContext};
pub use uniform_layout::{UniformLayout, UniformSlot};
pub(crate) use uniform_layout::wgsl_type;
pub use wgpu_backend::WgpuContext;

use crate::error::ProgramError;
use crate::id::{BufferId, ProgramId};

/// Shader-visible attribute slot. Slots are shared across programs: a slot left at
/// instance rate leaks into the next draw that reuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLocation(pub u32);

/// Index of a uniform inside the currently bound program's uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// How often an attribute advances: once per vertex, or once per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexRate {
    Vertex,
    Instance,
}

impl VertexRate {
    /// The divisor passed to [`GraphicsContext::set_attribute_rate`].
    pub fn divisor(self) -> u32 {
        match self {
            VertexRate::Vertex => 0,
            VertexRate::Instance => 1,
        }
    }

    pub fn step_mode(self) -> wgpu::VertexStepMode {
        match self {
            VertexRate::Vertex => wgpu::VertexStepMode::Vertex,
            VertexRate::Instance => wgpu::VertexStepMode::Instance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: &'static str,
    pub location: u32,
    pub format: wgpu::VertexFormat,
    pub rate: VertexRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Flag,
    Float,
    Vec3,
    Mat4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub fn new(name: impl Into<String>, kind: UniformKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Flag(bool),
    Float(f32),
    Vec3([f32; 3]),
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Flag(_) => UniformKind::Flag,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }
}

/// Render targets a program writes to.
#[derive(Debug, Clone, PartialEq)]
pub struct PassTargets {
    /// `None` for depth-only passes such as shadow maps.
    pub color: Option<wgpu::TextureFormat>,
    /// Blending for the color target; ignored without one.
    pub blend: Option<wgpu::BlendState>,
    pub depth: wgpu::TextureFormat,
    pub depth_bias: wgpu::DepthBiasState,
    pub sample_count: u32,
}

/// Everything a backend needs to build one program variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub label: String,
    pub wgsl: String,
    pub attributes: Vec<AttributeDecl>,
    /// Uniform block members, in declaration order.
    pub uniforms: Vec<UniformDecl>,
    pub targets: PassTargets,
}

impl ProgramSource {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|uniform| uniform.name == name)
    }
}

/// Stateful GPU command interface used by the instanced renderers.
///
/// All calls happen on the thread that owns the device, inside one frame.
/// Uniform writes and attribute binds apply to the currently bound program.
pub trait GraphicsContext {
    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> BufferId;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, ProgramError>;
    fn destroy_program(&mut self, program: ProgramId);

    /// `None` when the program variant does not declare the attribute.
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn bind_program(&mut self, program: ProgramId);
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    fn bind_vertex_attribute(&mut self, location: AttributeLocation, buffer: BufferId);
    /// 0 advances per vertex, 1 per instance.
    fn set_attribute_rate(&mut self, location: AttributeLocation, divisor: u32);
    fn bind_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat);
    fn draw_indexed_instanced(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        index_count: u32,
        instance_count: u32,
    );
}
