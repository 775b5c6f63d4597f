/// End-to-end checks of the wgpu backend.
///
/// These need a GPU adapter; on machines without one they return early.
///
/// Run with:   cargo test --test wgpu_backend
use instaclip::glam::{DMat4, DVec3};
use instaclip::wgpu;
use instaclip::{
    ClipVolumeSet, ColorPass, FrameContext, GraphicsContext, InstanceBatch, InstancedRenderer,
    PassShader, PickDepthPass, RenderSettings, ShadowPass, WgpuContext,
};
use instaclip_test_scenes::build_clip_scene;
use instaclip_test_scenes::scene::origin_grid;

const SHADOW_MAP_SIZE: u32 = 64;
const TARGET_SIZE: u32 = 64;
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn headless() -> Option<WgpuContext> {
    match pollster::block_on(WgpuContext::new_headless()) {
        Ok(ctx) => Some(ctx),
        Err(error) => {
            eprintln!("skipping: {error}");
            None
        }
    }
}

#[test]
fn generated_programs_compile_for_every_pass() {
    let Some(mut ctx) = headless() else {
        return;
    };
    let settings = RenderSettings::default();

    for clip_count in [0, 1, 4] {
        let sources = [
            ShadowPass.program_source(clip_count, &settings),
            ColorPass.program_source(clip_count, &settings),
            PickDepthPass.program_source(clip_count, &settings),
        ];
        for source in sources {
            if let Err(error) = ctx.compile_program(&source) {
                panic!("{}\n{}", error, source.wgsl);
            }
        }
    }
}

#[test]
fn shadow_draws_replay_into_a_render_pass() {
    let Some(mut ctx) = headless() else {
        return;
    };
    let scene = build_clip_scene(&mut ctx).unwrap();
    let mut renderer = InstancedRenderer::new(ShadowPass, RenderSettings::default());
    let mut frame = FrameContext::new();
    frame.begin_frame();

    renderer.draw(&mut ctx, &mut frame, &scene.clips, &scene.near);
    renderer.draw(&mut ctx, &mut frame, &scene.clips, &scene.far);
    assert!(renderer.errors().is_none(), "{:?}", renderer.errors());
    assert_eq!(ctx.pending_draws(), 2);

    let depth = ctx.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("shadow_map"),
        size: wgpu::Extent3d {
            width: SHADOW_MAP_SIZE,
            height: SHADOW_MAP_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RenderSettings::default().depth_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("shadow_encoder"),
        });

    let encoded = {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow_pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        ctx.encode(&mut pass)
    };
    ctx.queue().submit([encoder.finish()]);

    assert_eq!(encoded, 2);
    assert_eq!(ctx.pending_draws(), 0);
    assert!(!ctx.is_device_lost());
}

struct OffscreenTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

fn offscreen_target(device: &wgpu::Device, label: &str) -> OffscreenTarget {
    let size = wgpu::Extent3d {
        width: TARGET_SIZE,
        height: TARGET_SIZE,
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RenderSettings::default().depth_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    OffscreenTarget {
        color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
        depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
        color,
    }
}

fn encode_color_pass(
    ctx: &mut WgpuContext,
    encoder: &mut wgpu::CommandEncoder,
    target: &OffscreenTarget,
) -> usize {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("color_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &target.depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    ctx.encode(&mut pass)
}

/// Number of pixels of `texture` with any non-zero color channel.
fn lit_pixels(ctx: &WgpuContext, texture: &wgpu::Texture) -> usize {
    let bytes_per_row = TARGET_SIZE * 4;
    let readback = ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: (bytes_per_row * TARGET_SIZE) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(TARGET_SIZE),
            },
        },
        wgpu::Extent3d {
            width: TARGET_SIZE,
            height: TARGET_SIZE,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue().submit([encoder.finish()]);

    let slice = readback.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    let _ = ctx.device().poll(wgpu::PollType::Wait);
    receiver.recv().unwrap().unwrap();

    let lit = slice
        .get_mapped_range()
        .chunks_exact(4)
        .filter(|pixel| pixel[..3].iter().any(|channel| *channel != 0))
        .count();
    readback.unmap();
    lit
}

#[test]
fn passes_in_one_submit_keep_their_own_uniforms() {
    let Some(mut ctx) = headless() else {
        return;
    };
    let settings = RenderSettings::default().with_color_format(TARGET_FORMAT);
    let batch = InstanceBatch::new(&mut ctx, origin_grid(4, 4)).unwrap();
    let clips = ClipVolumeSet::new();
    let mut renderer = InstancedRenderer::new(ColorPass, settings);
    let mut frame = FrameContext::new();

    let eye = DVec3::new(4.5, 4.5, 20.0);
    let projection = DMat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
    let facing_grid = DMat4::look_at_rh(eye, DVec3::new(4.5, 4.5, 0.0), DVec3::Y);
    let facing_away = DMat4::look_at_rh(eye, DVec3::new(4.5, 4.5, 40.0), DVec3::Y);

    let target_a = offscreen_target(ctx.device(), "target_a");
    let target_b = offscreen_target(ctx.device(), "target_b");
    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("two_pass_encoder"),
        });

    ctx.begin_frame();
    frame.begin_frame();
    frame.set_camera(facing_grid, projection);
    renderer.draw(&mut ctx, &mut frame, &clips, &batch);
    assert_eq!(encode_color_pass(&mut ctx, &mut encoder, &target_a), 1);

    frame.begin_frame();
    frame.set_camera(facing_away, projection);
    renderer.draw(&mut ctx, &mut frame, &clips, &batch);
    assert_eq!(encode_color_pass(&mut ctx, &mut encoder, &target_b), 1);

    ctx.queue().submit([encoder.finish()]);

    assert!(lit_pixels(&ctx, &target_a.color) > 0);
    assert_eq!(lit_pixels(&ctx, &target_b.color), 0);
}

#[test]
fn begin_frame_and_discard_release_pending_state() {
    let Some(mut ctx) = headless() else {
        return;
    };
    let batch = InstanceBatch::new(&mut ctx, origin_grid(2, 2)).unwrap();
    let clips = ClipVolumeSet::new();
    let mut renderer = InstancedRenderer::new(ShadowPass, RenderSettings::default());
    let mut frame = FrameContext::new();

    ctx.begin_frame();
    frame.begin_frame();
    renderer.draw(&mut ctx, &mut frame, &clips, &batch);
    renderer.draw(&mut ctx, &mut frame, &clips, &batch);
    assert_eq!(ctx.pending_draws(), 2);
    assert!(ctx.staged_uniform_bytes() > 0);

    ctx.discard_pending();
    assert_eq!(ctx.pending_draws(), 0);
    assert_eq!(ctx.staged_uniform_bytes(), 0);

    renderer.draw(&mut ctx, &mut frame, &clips, &batch);
    assert_eq!(ctx.pending_draws(), 1);

    ctx.begin_frame();
    assert_eq!(ctx.pending_draws(), 0);
    assert_eq!(ctx.staged_uniform_bytes(), 0);
}
