use glam::{DMat4, DVec3};

use super::{DrawOutcome, InstancedRenderer, SkipReason};
use crate::batch::InstanceBatch;
use crate::clip::ClipVolumeSet;
use crate::frame::FrameContext;
use crate::gpu::{GraphicsContext, UniformValue, VertexRate};
use crate::program::CompiledProgram;
use crate::rtc::{plane_rtc_position, rtc_view_matrix};
use crate::shader::PassShader;

impl<P: PassShader> InstancedRenderer<P> {
    /// Draws every instance of `batch` with one instanced call.
    ///
    /// Rebuilds the program first if the clip-volume membership changed, and
    /// binds it only if `frame` says a different program is bound. A batch is
    /// skipped, never panicked on, when no usable program exists.
    pub fn draw(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        frame: &mut FrameContext,
        clips: &ClipVolumeSet,
        batch: &InstanceBatch,
    ) -> DrawOutcome {
        let Some(buffers) = batch.buffers().copied() else {
            frame.record_skip();
            return DrawOutcome::Skipped(SkipReason::BatchNotUploaded);
        };

        let pass = &self.pass;
        let settings = &self.settings;
        let Some(compiled) = self
            .programs
            .acquire(ctx, clips, |clip_count| pass.program_source(clip_count, settings))
        else {
            frame.record_skip();
            return DrawOutcome::Skipped(SkipReason::ProgramUnavailable);
        };
        let bindings = &compiled.bindings;

        if frame.last_program() != Some(compiled.program) {
            bind_program(ctx, frame, pass, compiled);
        }

        let rtc_center = batch.rtc_center();
        if frame.needs_view_upload(rtc_center) {
            let view = pass.view_matrix(frame);
            let view = match rtc_center {
                Some(center) => rtc_view_matrix(&view, center),
                None => view,
            };
            if let Some(location) = bindings.view_matrix {
                ctx.set_uniform(location, mat4_value(view));
            }
            frame.record_view_upload(rtc_center);
        }

        if let Some(location) = bindings.positions_decode_matrix {
            ctx.set_uniform(
                location,
                UniformValue::Mat4(batch.positions_decode_matrix().to_cols_array()),
            );
        }

        for attribute in &bindings.attributes {
            let Some(buffer) = buffers.for_attribute(attribute.name) else {
                continue;
            };
            ctx.bind_vertex_attribute(attribute.location, buffer);
            ctx.set_attribute_rate(attribute.location, attribute.rate.divisor());
        }

        for (binding, (id, volume)) in bindings.clip_volumes.iter().zip(clips.iter()) {
            let active = volume.is_active() && batch.is_clip_volume_enabled(id);
            if let Some(location) = binding.active {
                ctx.set_uniform(location, UniformValue::Flag(active));
            }
            if !active {
                continue;
            }
            let position = match rtc_center {
                Some(center) => plane_rtc_position(volume.distance(), volume.direction(), center),
                None => volume.position(),
            };
            if let Some(location) = binding.position {
                ctx.set_uniform(location, vec3_value(position));
            }
            if let Some(location) = binding.direction {
                ctx.set_uniform(location, vec3_value(volume.direction()));
            }
        }

        let instances = batch.num_instances();
        ctx.bind_index_buffer(buffers.indices, wgpu::IndexFormat::Uint32);
        ctx.draw_indexed_instanced(batch.topology(), batch.index_count() as u32, instances as u32);
        frame.record_draw(instances);

        // Attribute slots are shared; leaving one at instance rate breaks the next draw.
        for attribute in &bindings.attributes {
            if attribute.rate == VertexRate::Instance {
                ctx.set_attribute_rate(attribute.location, 0);
            }
        }

        DrawOutcome::Drawn { instances }
    }

    /// Draws `batches` in order and returns how many were drawn.
    pub fn draw_all<'a>(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        frame: &mut FrameContext,
        clips: &ClipVolumeSet,
        batches: impl IntoIterator<Item = &'a InstanceBatch>,
    ) -> usize {
        let mut drawn = 0;
        for batch in batches {
            if self.draw(ctx, frame, clips, batch).is_drawn() {
                drawn += 1;
            }
        }
        drawn
    }
}

/// Binds `compiled` and streams the uniforms that stay fixed for the whole pass.
fn bind_program<P: PassShader>(
    ctx: &mut dyn GraphicsContext,
    frame: &mut FrameContext,
    pass: &P,
    compiled: &CompiledProgram,
) {
    ctx.bind_program(compiled.program);
    frame.record_program_bind(compiled.program);
    tracing::trace!(program = %compiled.program, pass = pass.label(), "program bound");

    if let Some(location) = compiled.bindings.projection_matrix {
        ctx.set_uniform(location, mat4_value(pass.projection_matrix(frame)));
    }
    for (name, value) in pass.extra_uniforms(frame) {
        if let Some(location) = ctx.uniform_location(compiled.program, name) {
            ctx.set_uniform(location, value);
        }
    }
}

fn mat4_value(matrix: DMat4) -> UniformValue {
    UniformValue::Mat4(matrix.as_mat4().to_cols_array())
}

fn vec3_value(vector: DVec3) -> UniformValue {
    UniformValue::Vec3(vector.as_vec3().to_array())
}
