use std::num::NonZeroUsize;

use lru::LruCache;

use crate::gpu::GraphicsContext;
use crate::program::CompiledProgram;

/// Compiled program variants of one renderer, keyed by clip-volume count.
///
/// Evicted variants are destroyed through the context that built them.
pub(crate) struct ProgramCache {
    programs: LruCache<usize, CompiledProgram>,
}

impl ProgramCache {
    pub(crate) fn new(size: NonZeroUsize) -> Self {
        Self {
            programs: LruCache::new(size),
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub(crate) fn contains(&self, clip_count: usize) -> bool {
        self.programs.contains(&clip_count)
    }

    pub(crate) fn get(&mut self, clip_count: usize) -> Option<&CompiledProgram> {
        self.programs.get(&clip_count)
    }

    pub(crate) fn insert(&mut self, ctx: &mut dyn GraphicsContext, compiled: CompiledProgram) {
        let program = compiled.program;
        if let Some((clip_count, evicted)) = self.programs.push(compiled.clip_count, compiled) {
            if evicted.program != program {
                tracing::debug!(clip_count, program = %evicted.program, "evicting compiled program");
                ctx.destroy_program(evicted.program);
            }
        }
    }

    pub(crate) fn destroy_all(&mut self, ctx: &mut dyn GraphicsContext) {
        while let Some((_, compiled)) = self.programs.pop_lru() {
            ctx.destroy_program(compiled.program);
        }
    }

    /// Drops every entry without releasing it; the handles died with the device.
    pub(crate) fn forget_all(&mut self) {
        self.programs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, RecordingContext};
    use crate::id::ProgramId;
    use crate::program::ProgramBindings;

    fn compiled(clip_count: usize, program: u64) -> CompiledProgram {
        CompiledProgram {
            program: ProgramId(program),
            clip_count,
            bindings: ProgramBindings::default(),
        }
    }

    #[test]
    fn eviction_destroys_the_least_recent_variant() {
        let mut ctx = RecordingContext::new();
        let mut cache = ProgramCache::new(NonZeroUsize::new(2).unwrap());

        cache.insert(&mut ctx, compiled(0, 10));
        cache.insert(&mut ctx, compiled(1, 11));
        assert!(cache.get(0).is_some());
        cache.insert(&mut ctx, compiled(2, 12));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert_eq!(ctx.calls(), &[GpuCall::DestroyProgram(ProgramId(11))]);
    }

    #[test]
    fn forget_all_issues_no_calls() {
        let mut ctx = RecordingContext::new();
        let mut cache = ProgramCache::new(NonZeroUsize::new(4).unwrap());
        cache.insert(&mut ctx, compiled(0, 1));
        cache.insert(&mut ctx, compiled(3, 2));

        cache.forget_all();
        assert_eq!(cache.len(), 0);
        assert!(ctx.calls().is_empty());
    }

    #[test]
    fn destroy_all_releases_every_variant() {
        let mut ctx = RecordingContext::new();
        let mut cache = ProgramCache::new(NonZeroUsize::new(4).unwrap());
        cache.insert(&mut ctx, compiled(0, 1));
        cache.insert(&mut ctx, compiled(3, 2));

        cache.destroy_all(&mut ctx);
        assert_eq!(cache.len(), 0);
        assert_eq!(ctx.calls().len(), 2);
    }
}
