//! Instance-batched rendering with dynamic clip volumes.
//!
//! Many copies of one geometry are drawn with a single instanced call per
//! batch, for a color pass, a shadow-map pass and a pick-depth pass. Any number
//! of World-space clip volumes can be added to a [`ClipVolumeSet`]; every
//! renderer recompiles its program when that set's membership changes, and
//! keeps far-from-origin batches precise by moving clip planes and the view
//! into each batch's relative-to-center frame.
//!
//! ```
//! use glam::DVec3;
//! use instaclip::{
//!     ClipVolume, ClipVolumeConfig, ClipVolumeSet, FrameContext, InstancingRenderers,
//!     RecordingContext,
//! };
//!
//! let mut ctx = RecordingContext::new();
//! let mut clips = ClipVolumeSet::new();
//! let mut renderers = InstancingRenderers::default();
//! assert!(!renderers.shadow.is_valid(&clips));
//!
//! clips.add(ClipVolume::new(ClipVolumeConfig {
//!     position: DVec3::new(0.0, 0.0, 5.0),
//!     ..Default::default()
//! }));
//!
//! let mut frame = FrameContext::new();
//! frame.begin_frame();
//! let drawn = renderers
//!     .shadow
//!     .draw_all(&mut ctx, &mut frame, &clips, Vec::<&instaclip::InstanceBatch>::new());
//! assert_eq!(drawn, 0);
//! ```

pub use glam;
pub use wgpu;

mod batch;
mod cache;
pub mod clip;
mod color;
mod error;
mod frame;
pub mod gpu;
mod id;
mod program;
pub mod quantize;
mod renderer;
pub mod rtc;
mod settings;
pub mod shader;

pub use batch::{BatchBuffers, InstanceBatch, InstanceBatchData, InstanceFlags, InstanceTransform};
pub use clip::{ClipVolume, ClipVolumeConfig, ClipVolumeEvent, ClipVolumeSet, StructuralHash};
pub use color::Color;
pub use error::{BatchError, ContextError, ProgramError};
pub use frame::{FrameContext, FrameStats};
pub use gpu::{GraphicsContext, RecordingContext, WgpuContext};
pub use id::{BufferId, ClipVolumeId, ProgramId};
pub use program::{
    AttributeBinding, ClipVolumeBinding, CompiledProgram, ProgramBindings, ProgramState,
    ShaderProgramCache,
};
pub use renderer::{DrawOutcome, InstancedRenderer, InstancingRenderers, SkipReason};
pub use settings::RenderSettings;
pub use shader::{ColorPass, PassShader, PickDepthPass, ShadowPass};
