//! Keeps a renderer's compiled program consistent with the scene's clip volumes.

use std::num::NonZeroUsize;

use smallvec::SmallVec;

use crate::cache::ProgramCache;
use crate::clip::{ClipVolumeSet, StructuralHash};
use crate::error::ProgramError;
use crate::gpu::{AttributeLocation, GraphicsContext, ProgramSource, UniformLocation, VertexRate};
use crate::id::ProgramId;
use crate::shader::{
    section_plane_active, section_plane_dir, section_plane_pos, POSITIONS_DECODE_MATRIX,
    PROJECTION_MATRIX, VIEW_MATRIX,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: &'static str,
    pub location: AttributeLocation,
    pub rate: VertexRate,
}

/// Uniform slots of one clip volume. Any of them may be missing if the
/// backend optimised the uniform away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipVolumeBinding {
    pub active: Option<UniformLocation>,
    pub position: Option<UniformLocation>,
    pub direction: Option<UniformLocation>,
}

/// Locations resolved once per compiled program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramBindings {
    /// Only attributes the program actually declares.
    pub attributes: SmallVec<[AttributeBinding; 8]>,
    pub positions_decode_matrix: Option<UniformLocation>,
    pub view_matrix: Option<UniformLocation>,
    pub projection_matrix: Option<UniformLocation>,
    /// One entry per clip volume the program was compiled for, in set order.
    pub clip_volumes: SmallVec<[ClipVolumeBinding; 4]>,
}

impl ProgramBindings {
    pub(crate) fn resolve(
        ctx: &dyn GraphicsContext,
        program: ProgramId,
        source: &ProgramSource,
        clip_count: usize,
    ) -> Self {
        let attributes = source
            .attributes
            .iter()
            .filter_map(|decl| {
                ctx.attribute_location(program, decl.name)
                    .map(|location| AttributeBinding {
                        name: decl.name,
                        location,
                        rate: decl.rate,
                    })
            })
            .collect();

        let clip_volumes = (0..clip_count)
            .map(|index| ClipVolumeBinding {
                active: ctx.uniform_location(program, &section_plane_active(index)),
                position: ctx.uniform_location(program, &section_plane_pos(index)),
                direction: ctx.uniform_location(program, &section_plane_dir(index)),
            })
            .collect();

        Self {
            attributes,
            positions_decode_matrix: ctx.uniform_location(program, POSITIONS_DECODE_MATRIX),
            view_matrix: ctx.uniform_location(program, VIEW_MATRIX),
            projection_matrix: ctx.uniform_location(program, PROJECTION_MATRIX),
            clip_volumes,
        }
    }
}

/// A program variant together with its binding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub program: ProgramId,
    pub clip_count: usize,
    pub bindings: ProgramBindings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramState {
    /// Nothing compiled yet, or the context was lost.
    Uninitialized,
    Valid {
        clip_count: usize,
        hash: StructuralHash,
    },
    /// The last build for `hash` failed. No retry until the hash changes or
    /// [`ShaderProgramCache::reset`] is called.
    Errored {
        hash: StructuralHash,
        error: ProgramError,
    },
}

/// Validity state machine around a count-keyed cache of compiled programs.
pub struct ShaderProgramCache {
    state: ProgramState,
    programs: ProgramCache,
}

impl ShaderProgramCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: ProgramState::Uninitialized,
            programs: ProgramCache::new(capacity),
        }
    }

    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    /// Whether the current program was built for exactly this clip-volume membership.
    pub fn is_valid(&self, clips: &ClipVolumeSet) -> bool {
        matches!(self.state, ProgramState::Valid { hash, .. } if hash == clips.hash())
    }

    pub fn errors(&self) -> Option<&ProgramError> {
        match &self.state {
            ProgramState::Errored { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn compiled_variants(&self) -> usize {
        self.programs.len()
    }

    /// Returns a program valid for `clips`, building it with `build` if needed.
    ///
    /// `None` means the renderer is errored for the current membership and the
    /// batch must be skipped.
    pub fn acquire(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        clips: &ClipVolumeSet,
        build: impl FnOnce(usize) -> ProgramSource,
    ) -> Option<&CompiledProgram> {
        let hash = clips.hash();
        let clip_count = clips.len();

        match &self.state {
            ProgramState::Valid {
                hash: compiled_hash,
                clip_count: compiled_count,
            } if *compiled_hash == hash && self.programs.contains(*compiled_count) => {
                return self.programs.get(*compiled_count);
            }
            ProgramState::Errored {
                hash: failed_hash, ..
            } if *failed_hash == hash => return None,
            _ => {}
        }

        if self.programs.contains(clip_count) {
            tracing::debug!(clip_count, "reusing compiled program variant");
        } else {
            let source = build(clip_count);
            match ctx.compile_program(&source) {
                Ok(program) => {
                    let bindings = ProgramBindings::resolve(&*ctx, program, &source, clip_count);
                    tracing::debug!(label = %source.label, %program, "compiled program variant");
                    self.programs.insert(
                        ctx,
                        CompiledProgram {
                            program,
                            clip_count,
                            bindings,
                        },
                    );
                }
                Err(error) => {
                    tracing::warn!(%error, "program build failed; batches will be skipped");
                    self.state = ProgramState::Errored { hash, error };
                    return None;
                }
            }
        }

        self.state = ProgramState::Valid { clip_count, hash };
        self.programs.get(clip_count)
    }

    /// Leaves the errored state so the next draw rebuilds.
    pub fn reset(&mut self) {
        self.state = ProgramState::Uninitialized;
    }

    /// Discards every handle without destroying it; the device that owned them is gone.
    pub fn on_context_lost(&mut self) {
        self.programs.forget_all();
        self.state = ProgramState::Uninitialized;
    }

    pub fn destroy(&mut self, ctx: &mut dyn GraphicsContext) {
        self.programs.destroy_all(ctx);
        self.state = ProgramState::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipVolume;
    use crate::gpu::RecordingContext;
    use crate::settings::RenderSettings;
    use crate::shader::{PassShader, ShadowPass};

    fn capacity() -> NonZeroUsize {
        NonZeroUsize::new(4).unwrap()
    }

    fn build(clip_count: usize) -> ProgramSource {
        ShadowPass.program_source(clip_count, &RenderSettings::default())
    }

    #[test]
    fn bindings_match_the_compiled_clip_count() {
        let mut ctx = RecordingContext::new();
        let mut clips = ClipVolumeSet::new();
        clips.add(ClipVolume::default());
        clips.add(ClipVolume::default());

        let mut cache = ShaderProgramCache::new(capacity());
        let compiled = cache.acquire(&mut ctx, &clips, build).unwrap().clone();

        assert_eq!(compiled.clip_count, 2);
        assert_eq!(compiled.bindings.clip_volumes.len(), 2);
        assert!(compiled
            .bindings
            .clip_volumes
            .iter()
            .all(|clip| clip.active.is_some() && clip.position.is_some() && clip.direction.is_some()));
        assert!(compiled.bindings.attributes.iter().any(|a| a.name == "flags2"));
        assert!(cache.is_valid(&clips));
    }

    #[test]
    fn errored_state_waits_for_a_membership_change() {
        let mut ctx = RecordingContext::new();
        let mut clips = ClipVolumeSet::new();
        let mut cache = ShaderProgramCache::new(capacity());

        ctx.fail_compiles_with("boom");
        assert!(cache.acquire(&mut ctx, &clips, build).is_none());
        assert!(cache.acquire(&mut ctx, &clips, build).is_none());
        assert_eq!(ctx.compile_count(), 1);
        assert_eq!(cache.errors().map(ProgramError::diagnostics), Some("boom"));

        ctx.succeed_compiles();
        clips.add(ClipVolume::default());
        assert!(cache.acquire(&mut ctx, &clips, build).is_some());
        assert_eq!(ctx.compile_count(), 2);
        assert!(cache.errors().is_none());
    }

    #[test]
    fn reset_allows_an_explicit_retry() {
        let mut ctx = RecordingContext::new();
        let clips = ClipVolumeSet::new();
        let mut cache = ShaderProgramCache::new(capacity());

        ctx.fail_compiles_with("boom");
        assert!(cache.acquire(&mut ctx, &clips, build).is_none());
        ctx.succeed_compiles();
        cache.reset();

        assert!(cache.acquire(&mut ctx, &clips, build).is_some());
        assert_eq!(cache.state(), &ProgramState::Valid {
            clip_count: 0,
            hash: clips.hash(),
        });
    }

    #[test]
    fn returning_to_a_seen_count_reuses_the_variant() {
        let mut ctx = RecordingContext::new();
        let mut clips = ClipVolumeSet::new();
        let mut cache = ShaderProgramCache::new(capacity());

        let first = cache.acquire(&mut ctx, &clips, build).map(|c| c.program);
        let id = clips.add(ClipVolume::default());
        cache.acquire(&mut ctx, &clips, build);
        clips.remove(id);
        let again = cache.acquire(&mut ctx, &clips, build).map(|c| c.program);

        assert_eq!(first, again);
        assert_eq!(ctx.compile_count(), 2);
        assert_eq!(cache.compiled_variants(), 2);
    }

    #[test]
    fn context_loss_forgets_without_destroying() {
        let mut ctx = RecordingContext::new();
        let clips = ClipVolumeSet::new();
        let mut cache = ShaderProgramCache::new(capacity());
        cache.acquire(&mut ctx, &clips, build);
        ctx.clear_calls();

        cache.on_context_lost();
        assert!(!cache.is_valid(&clips));
        assert_eq!(cache.compiled_variants(), 0);
        assert!(ctx.calls().is_empty());
    }
}
