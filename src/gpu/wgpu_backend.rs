//! [`GraphicsContext`] on top of wgpu.
//!
//! wgpu has no bound-program state and bakes vertex step modes into pipelines,
//! so this backend emulates the binding model: uniform writes land in a host
//! copy of the bound program's block, every draw snapshots that block into a
//! dynamic-offset uniform buffer, and the draw is recorded. [`WgpuContext::encode`]
//! then uploads the new snapshots and replays the draws into a render pass.
//!
//! Snapshots keep their offsets until [`WgpuContext::begin_frame`], so several
//! passes encoded into one submit never overwrite each other's uniforms.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use super::{
    AttributeDecl, AttributeLocation, BufferKind, GraphicsContext, PassTargets, ProgramSource,
    UniformLayout, UniformLocation, UniformValue,
};
use crate::error::{ContextError, ProgramError};
use crate::id::{BufferId, ProgramId};

const MIN_UNIFORM_BUFFER_SIZE: u64 = 4096;

struct WgpuProgram {
    label: String,
    attributes: Vec<AttributeDecl>,
    uniform_names: Vec<String>,
    layout: UniformLayout,
    /// Host copy of the uniform block; survives rebinds like GL program state.
    values: Vec<u8>,
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    targets: PassTargets,
    pipelines: HashMap<wgpu::PrimitiveTopology, wgpu::RenderPipeline>,
    /// Bind group against the shared uniform buffer, tagged with the buffer epoch.
    bind_group: Option<(u64, wgpu::BindGroup)>,
}

#[derive(Debug)]
struct RecordedDraw {
    program: ProgramId,
    topology: wgpu::PrimitiveTopology,
    uniform_offset: u32,
    vertex_buffers: SmallVec<[BufferId; 8]>,
    index_buffer: BufferId,
    index_format: wgpu::IndexFormat,
    index_count: u32,
    instance_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferSizingDecision {
    pub(crate) should_reallocate: bool,
}

pub(crate) fn decide_buffer_sizing(
    existing_size: Option<u64>,
    required_size: usize,
) -> BufferSizingDecision {
    let required_size = required_size as u64;
    let should_reallocate = existing_size
        .map(|size| size < required_size)
        .unwrap_or(true);

    BufferSizingDecision { should_reallocate }
}

pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_handle: u64,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    programs: HashMap<ProgramId, WgpuProgram>,
    bound_program: Option<ProgramId>,
    vertex_bindings: HashMap<u32, BufferId>,
    attribute_rates: HashMap<u32, u32>,
    index_binding: Option<(BufferId, wgpu::IndexFormat)>,
    recorded_draws: Vec<RecordedDraw>,
    uniform_staging: Vec<u8>,
    /// Prefix of `uniform_staging` already written to the GPU this frame.
    uniform_uploaded: usize,
    uniform_buffer: Option<wgpu::Buffer>,
    uniform_epoch: u64,
    uniform_alignment: usize,
    device_lost: Arc<AtomicBool>,
}

impl WgpuContext {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = device_lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            lost_flag.store(true, Ordering::SeqCst);
            tracing::warn!(?reason, %message, "GPU device lost");
        });

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Self {
            device,
            queue,
            next_handle: 1,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            bound_program: None,
            vertex_bindings: HashMap::new(),
            attribute_rates: HashMap::new(),
            index_binding: None,
            recorded_draws: Vec::new(),
            uniform_staging: Vec::new(),
            uniform_uploaded: 0,
            uniform_buffer: None,
            uniform_epoch: 0,
            uniform_alignment: uniform_alignment.max(4),
            device_lost,
        }
    }

    /// Opens a device with no surface, for offscreen rendering and tests on machines with a GPU.
    pub async fn new_headless() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("instaclip_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }

    pub fn pending_draws(&self) -> usize {
        self.recorded_draws.len()
    }

    /// Starts a new frame: drops unencoded draws and reclaims the uniform space
    /// of the previous frame.
    ///
    /// Call once per frame, after the previous frame's command buffers were
    /// submitted. Skipping it lets uniform snapshots accumulate.
    pub fn begin_frame(&mut self) {
        self.recorded_draws.clear();
        self.uniform_staging.clear();
        self.uniform_uploaded = 0;
    }

    /// Drops draws recorded since the last [`encode`](Self::encode) together
    /// with their uniform snapshots. Already encoded passes are unaffected.
    pub fn discard_pending(&mut self) {
        self.recorded_draws.clear();
        self.uniform_staging.truncate(self.uniform_uploaded);
    }

    /// Bytes of uniform snapshots held for the current frame.
    pub fn staged_uniform_bytes(&self) -> usize {
        self.uniform_staging.len()
    }

    /// Forgets every handle without touching the (dead) device.
    pub fn on_context_lost(&mut self) {
        self.buffers.clear();
        self.programs.clear();
        self.bound_program = None;
        self.vertex_bindings.clear();
        self.attribute_rates.clear();
        self.index_binding = None;
        self.recorded_draws.clear();
        self.uniform_staging.clear();
        self.uniform_uploaded = 0;
        self.uniform_buffer = None;
    }

    /// Uploads the uniform snapshots recorded since the last call and replays
    /// those draws into `pass`. Returns the number of draws encoded.
    pub fn encode(&mut self, pass: &mut wgpu::RenderPass<'_>) -> usize {
        if self.recorded_draws.is_empty() {
            return 0;
        }

        self.upload_uniform_snapshots();
        self.refresh_bind_groups();

        let mut current_pipeline: Option<(ProgramId, wgpu::PrimitiveTopology)> = None;
        let mut encoded = 0;

        for draw in self.recorded_draws.drain(..) {
            let Some(program) = self.programs.get(&draw.program) else {
                continue;
            };
            let (Some(pipeline), Some((_, bind_group))) = (
                program.pipelines.get(&draw.topology),
                program.bind_group.as_ref(),
            ) else {
                continue;
            };
            let vertex_buffers: Option<SmallVec<[&wgpu::Buffer; 8]>> = draw
                .vertex_buffers
                .iter()
                .map(|buffer| self.buffers.get(buffer))
                .collect();
            let (Some(vertex_buffers), Some(index_buffer)) =
                (vertex_buffers, self.buffers.get(&draw.index_buffer))
            else {
                tracing::warn!(program = %draw.program, "dropping draw that references a destroyed buffer");
                continue;
            };

            if current_pipeline != Some((draw.program, draw.topology)) {
                pass.set_pipeline(pipeline);
                current_pipeline = Some((draw.program, draw.topology));
            }
            pass.set_bind_group(0, bind_group, &[draw.uniform_offset]);
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            pass.set_index_buffer(index_buffer.slice(..), draw.index_format);
            pass.draw_indexed(0..draw.index_count, 0, 0..draw.instance_count);
            encoded += 1;
        }

        encoded
    }

    fn upload_uniform_snapshots(&mut self) {
        let existing_size = self.uniform_buffer.as_ref().map(wgpu::Buffer::size);
        if decide_buffer_sizing(existing_size, self.uniform_staging.len()).should_reallocate {
            let size = (self.uniform_staging.len() as u64)
                .next_power_of_two()
                .max(MIN_UNIFORM_BUFFER_SIZE);
            self.uniform_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("instaclip_uniform_snapshots"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.uniform_epoch += 1;
        }

        // Earlier passes of this frame still read the regions before `uniform_uploaded`.
        // A reallocated buffer only needs the new region; older passes keep the old buffer.
        let start = self.uniform_uploaded;
        if let Some(buffer) = self.uniform_buffer.as_ref() {
            if start < self.uniform_staging.len() {
                self.queue
                    .write_buffer(buffer, start as u64, &self.uniform_staging[start..]);
            }
        }
        self.uniform_uploaded = self.uniform_staging.len();
    }

    fn refresh_bind_groups(&mut self) {
        let Some(uniform_buffer) = self.uniform_buffer.as_ref() else {
            return;
        };

        for draw in &self.recorded_draws {
            let Some(program) = self.programs.get_mut(&draw.program) else {
                continue;
            };
            let stale = program
                .bind_group
                .as_ref()
                .map(|(epoch, _)| *epoch != self.uniform_epoch)
                .unwrap_or(true);
            if !stale {
                continue;
            }

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&program.label),
                layout: &program.bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: uniform_buffer,
                        offset: 0,
                        size: NonZeroU64::new(program.layout.size() as u64),
                    }),
                }],
            });
            program.bind_group = Some((self.uniform_epoch, bind_group));
        }
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl GraphicsContext for WgpuContext {
    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> BufferId {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;

        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        let id = BufferId(self.allocate_handle());
        self.buffers.insert(id, buffer);
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(target) => self.queue.write_buffer(target, offset, data),
            None => tracing::warn!(%buffer, "write to unknown buffer ignored"),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(target) = self.buffers.remove(&buffer) {
            target.destroy();
        }
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, ProgramError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ProgramError::Compile {
                label: source.label.clone(),
                diagnostics: error.to_string(),
            });
        }

        let layout = UniformLayout::new(&source.uniforms);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&source.label),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: NonZeroU64::new(layout.size() as u64),
                        },
                        count: None,
                    }],
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&source.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = create_instanced_pipeline(
            &self.device,
            &source.label,
            &shader,
            &pipeline_layout,
            &source.attributes,
            &source.targets,
            wgpu::PrimitiveTopology::TriangleList,
        );
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ProgramError::Link {
                label: source.label.clone(),
                diagnostics: error.to_string(),
            });
        }

        let mut pipelines = HashMap::new();
        pipelines.insert(wgpu::PrimitiveTopology::TriangleList, pipeline);

        let program = ProgramId(self.allocate_handle());
        self.programs.insert(
            program,
            WgpuProgram {
                label: source.label.clone(),
                attributes: source.attributes.clone(),
                uniform_names: source.uniforms.iter().map(|u| u.name.clone()).collect(),
                values: vec![0; layout.size()],
                layout,
                shader,
                bind_group_layout,
                pipeline_layout,
                targets: source.targets.clone(),
                pipelines,
                bind_group: None,
            },
        );
        Ok(program)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        self.programs
            .get(&program)?
            .attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| AttributeLocation(attribute.location))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)?
            .uniform_names
            .iter()
            .position(|uniform| uniform == name)
            .map(|index| UniformLocation(index as u32))
    }

    fn bind_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program) {
            self.bound_program = Some(program);
        } else {
            tracing::warn!(%program, "bind of unknown program ignored");
            self.bound_program = None;
        }
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self
            .bound_program
            .and_then(|program| self.programs.get_mut(&program))
        else {
            return;
        };
        if !program
            .layout
            .write(&mut program.values, location.0 as usize, &value)
        {
            tracing::warn!(
                program = %program.label,
                location = location.0,
                kind = ?value.kind(),
                "uniform write does not match the program's block"
            );
        }
    }

    fn bind_vertex_attribute(&mut self, location: AttributeLocation, buffer: BufferId) {
        self.vertex_bindings.insert(location.0, buffer);
    }

    fn set_attribute_rate(&mut self, location: AttributeLocation, divisor: u32) {
        self.attribute_rates.insert(location.0, divisor);
    }

    fn bind_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat) {
        self.index_binding = Some((buffer, format));
    }

    fn draw_indexed_instanced(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        index_count: u32,
        instance_count: u32,
    ) {
        let (Some(program_id), Some((index_buffer, index_format))) =
            (self.bound_program, self.index_binding)
        else {
            tracing::warn!("draw without a bound program or index buffer ignored");
            return;
        };
        let Some(program) = self.programs.get_mut(&program_id) else {
            return;
        };

        let mut vertex_buffers = SmallVec::new();
        for attribute in &program.attributes {
            let divisor = self
                .attribute_rates
                .get(&attribute.location)
                .copied()
                .unwrap_or(0);
            if divisor != attribute.rate.divisor() {
                tracing::warn!(
                    program = %program.label,
                    attribute = attribute.name,
                    divisor,
                    "attribute rate does not match the compiled step mode; draw skipped"
                );
                return;
            }
            let Some(buffer) = self.vertex_bindings.get(&attribute.location) else {
                tracing::warn!(
                    program = %program.label,
                    attribute = attribute.name,
                    "attribute has no buffer bound; draw skipped"
                );
                return;
            };
            vertex_buffers.push(*buffer);
        }

        if !program.pipelines.contains_key(&topology) {
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = create_instanced_pipeline(
                &self.device,
                &program.label,
                &program.shader,
                &program.pipeline_layout,
                &program.attributes,
                &program.targets,
                topology,
            );
            if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
                tracing::warn!(program = %program.label, ?topology, %error, "pipeline variant failed");
                return;
            }
            program.pipelines.insert(topology, pipeline);
        }

        let offset = self
            .uniform_staging
            .len()
            .div_ceil(self.uniform_alignment)
            * self.uniform_alignment;
        self.uniform_staging.resize(offset, 0);
        self.uniform_staging.extend_from_slice(&program.values);

        self.recorded_draws.push(RecordedDraw {
            program: program_id,
            topology,
            uniform_offset: offset as u32,
            vertex_buffers,
            index_buffer,
            index_format,
            index_count,
            instance_count,
        });
    }
}

fn create_instanced_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    pipeline_layout: &wgpu::PipelineLayout,
    attributes: &[AttributeDecl],
    targets: &PassTargets,
    topology: wgpu::PrimitiveTopology,
) -> wgpu::RenderPipeline {
    // One buffer per attribute; buffer slot = declaration index.
    let vertex_attributes: Vec<[wgpu::VertexAttribute; 1]> = attributes
        .iter()
        .map(|attribute| {
            [wgpu::VertexAttribute {
                format: attribute.format,
                offset: 0,
                shader_location: attribute.location,
            }]
        })
        .collect();
    let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
        .iter()
        .zip(&vertex_attributes)
        .map(|(attribute, layout)| wgpu::VertexBufferLayout {
            array_stride: attribute.format.size(),
            step_mode: attribute.rate.step_mode(),
            attributes: layout,
        })
        .collect();

    let color_targets: Vec<Option<wgpu::ColorTargetState>> = targets
        .color
        .iter()
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: targets.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    let strip_index_format = match topology {
        wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip => {
            Some(wgpu::IndexFormat::Uint32)
        }
        _ => None,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &vertex_buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &color_targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: targets.depth,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: targets.depth_bias,
        }),
        multisample: wgpu::MultisampleState {
            count: targets.sample_count,
            ..Default::default()
        },
        multiview: None,
        cache: None,
    })
}
