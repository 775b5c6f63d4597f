//! The instanced draw engine.
//!
//! [`InstancedRenderer`] is generic over a [`PassShader`]: the engine owns the
//! program lifecycle and the per-batch binding protocol, the pass decides what
//! its shader computes and which matrices it reads from the
//! [`FrameContext`](crate::FrameContext).

mod bundle;
mod construction;
mod rendering;
mod types;

pub use bundle::InstancingRenderers;
pub use types::{DrawOutcome, SkipReason};

use crate::program::ShaderProgramCache;
use crate::settings::RenderSettings;
use crate::shader::PassShader;

/// Draws [`InstanceBatch`](crate::InstanceBatch)es for one pass, clipped by the
/// scene's clip volumes.
pub struct InstancedRenderer<P: PassShader> {
    pass: P,
    settings: RenderSettings,
    programs: ShaderProgramCache,
}
