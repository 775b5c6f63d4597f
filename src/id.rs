use std::fmt;

/// Handle to a GPU buffer owned by a [`GraphicsContext`](crate::GraphicsContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Handle to a compiled and linked shader program.
///
/// Handles are never reused by a context, so two programs compare equal only if
/// they are the same program. [`FrameContext`](crate::FrameContext) relies on this
/// to detect redundant binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Identity of a clip volume inside a [`ClipVolumeSet`](crate::ClipVolumeSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipVolumeId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

impl fmt::Display for ClipVolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}
