/// Why a batch was not drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The renderer's program failed to build for the current clip volumes.
    ProgramUnavailable,
    /// The batch was destroyed or lost with its context.
    BatchNotUploaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn { instances: usize },
    Skipped(SkipReason),
}

impl DrawOutcome {
    pub fn is_drawn(&self) -> bool {
        matches!(self, DrawOutcome::Drawn { .. })
    }
}
