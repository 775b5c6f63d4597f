//! Headless [`GraphicsContext`] that records every call.
//!
//! Used by the test suite and the draw-loop benchmark to observe exactly which
//! binds, uniform writes and rate changes the renderers issue, without a GPU.

use ahash::{HashMap, HashMapExt};

use super::{
    AttributeLocation, BufferKind, GraphicsContext, ProgramSource, UniformLocation, UniformValue,
};
use crate::error::ProgramError;
use crate::id::{BufferId, ProgramId};

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateBuffer {
        buffer: BufferId,
        kind: BufferKind,
        len: usize,
    },
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        len: usize,
    },
    DestroyBuffer(BufferId),
    CompileProgram {
        label: String,
        result: Result<ProgramId, String>,
    },
    DestroyProgram(ProgramId),
    BindProgram(ProgramId),
    SetUniform {
        name: String,
        value: UniformValue,
    },
    BindVertexAttribute {
        name: String,
        location: AttributeLocation,
        buffer: BufferId,
    },
    SetAttributeRate {
        location: AttributeLocation,
        divisor: u32,
    },
    BindIndexBuffer {
        buffer: BufferId,
        format: wgpu::IndexFormat,
    },
    DrawIndexedInstanced {
        topology: wgpu::PrimitiveTopology,
        index_count: u32,
        instance_count: u32,
    },
}

#[derive(Debug)]
pub struct RecordingContext {
    calls: Vec<GpuCall>,
    next_handle: u64,
    buffers: HashMap<BufferId, Vec<u8>>,
    programs: HashMap<ProgramId, ProgramSource>,
    bound_program: Option<ProgramId>,
    attribute_rates: HashMap<u32, u32>,
    compile_failure: Option<String>,
    compile_count: usize,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_handle: 1,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            bound_program: None,
            attribute_rates: HashMap::new(),
            compile_failure: None,
            compile_count: 0,
        }
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Every subsequent compile fails with `diagnostics` until [`succeed_compiles`](Self::succeed_compiles).
    pub fn fail_compiles_with(&mut self, diagnostics: impl Into<String>) {
        self.compile_failure = Some(diagnostics.into());
    }

    pub fn succeed_compiles(&mut self) {
        self.compile_failure = None;
    }

    /// Number of compile attempts, successful or not.
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    pub fn attribute_rate(&self, location: AttributeLocation) -> u32 {
        self.attribute_rates.get(&location.0).copied().unwrap_or(0)
    }

    /// Locations currently left at a non-zero rate.
    pub fn instance_rate_locations(&self) -> Vec<AttributeLocation> {
        let mut locations: Vec<_> = self
            .attribute_rates
            .iter()
            .filter(|(_, divisor)| **divisor != 0)
            .map(|(location, _)| AttributeLocation(*location))
            .collect();
        locations.sort_by_key(|location| location.0);
        locations
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn program_source(&self, program: ProgramId) -> Option<&ProgramSource> {
        self.programs.get(&program)
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Simulates a device reset: every handle handed out so far becomes dead.
    pub fn lose_context(&mut self) {
        self.buffers.clear();
        self.programs.clear();
        self.bound_program = None;
        self.attribute_rates.clear();
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn bound_source(&self) -> Option<&ProgramSource> {
        self.bound_program.and_then(|program| self.programs.get(&program))
    }
}

impl Default for RecordingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsContext for RecordingContext {
    fn create_buffer(&mut self, _label: &str, kind: BufferKind, contents: &[u8]) -> BufferId {
        let buffer = BufferId(self.allocate_handle());
        self.buffers.insert(buffer, contents.to_vec());
        self.calls.push(GpuCall::CreateBuffer {
            buffer,
            kind,
            len: contents.len(),
        });
        buffer
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        if let Some(contents) = self.buffers.get_mut(&buffer) {
            let start = offset as usize;
            if let Some(target) = contents.get_mut(start..start + data.len()) {
                target.copy_from_slice(data);
            }
        }
        self.calls.push(GpuCall::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.calls.push(GpuCall::DestroyBuffer(buffer));
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, ProgramError> {
        self.compile_count += 1;

        if let Some(diagnostics) = self.compile_failure.clone() {
            self.calls.push(GpuCall::CompileProgram {
                label: source.label.clone(),
                result: Err(diagnostics.clone()),
            });
            return Err(ProgramError::Compile {
                label: source.label.clone(),
                diagnostics,
            });
        }

        let program = ProgramId(self.allocate_handle());
        self.programs.insert(program, source.clone());
        self.calls.push(GpuCall::CompileProgram {
            label: source.label.clone(),
            result: Ok(program),
        });
        Ok(program)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
        self.calls.push(GpuCall::DestroyProgram(program));
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        self.programs
            .get(&program)?
            .attribute(name)
            .map(|attribute| AttributeLocation(attribute.location))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)?
            .uniform_index(name)
            .map(|index| UniformLocation(index as u32))
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.bound_program = Some(program);
        self.calls.push(GpuCall::BindProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let name = self
            .bound_source()
            .and_then(|source| source.uniforms.get(location.0 as usize))
            .map(|uniform| uniform.name.clone())
            .unwrap_or_else(|| format!("#{}", location.0));
        self.calls.push(GpuCall::SetUniform { name, value });
    }

    fn bind_vertex_attribute(&mut self, location: AttributeLocation, buffer: BufferId) {
        let name = self
            .bound_source()
            .and_then(|source| {
                source
                    .attributes
                    .iter()
                    .find(|attribute| attribute.location == location.0)
            })
            .map(|attribute| attribute.name.to_string())
            .unwrap_or_else(|| format!("@{}", location.0));
        self.calls.push(GpuCall::BindVertexAttribute {
            name,
            location,
            buffer,
        });
    }

    fn set_attribute_rate(&mut self, location: AttributeLocation, divisor: u32) {
        self.attribute_rates.insert(location.0, divisor);
        self.calls.push(GpuCall::SetAttributeRate { location, divisor });
    }

    fn bind_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat) {
        self.calls.push(GpuCall::BindIndexBuffer { buffer, format });
    }

    fn draw_indexed_instanced(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        index_count: u32,
        instance_count: u32,
    ) {
        self.calls.push(GpuCall::DrawIndexedInstanced {
            topology,
            index_count,
            instance_count,
        });
    }
}
