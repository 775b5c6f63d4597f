use thiserror::Error;

/// Failure to turn generated WGSL into a usable program.
///
/// Renderers keep this around instead of propagating it: a batch whose program
/// failed to build is skipped and every other batch keeps drawing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// The shader module was rejected by the backend's validator.
    #[error("shader `{label}` failed to compile: {diagnostics}")]
    Compile { label: String, diagnostics: String },
    /// The module compiled but the pipeline could not be assembled from it.
    #[error("shader `{label}` failed to link: {diagnostics}")]
    Link { label: String, diagnostics: String },
}

impl ProgramError {
    pub fn diagnostics(&self) -> &str {
        match self {
            ProgramError::Compile { diagnostics, .. } | ProgramError::Link { diagnostics, .. } => {
                diagnostics
            }
        }
    }
}

/// Contract violations in batch data supplied by a loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("per-instance attribute `{attribute}` has {actual} rows, expected {expected}")]
    InstanceCountMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("instance range {start}..{end} is outside 0..{num_instances}")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        num_instances: usize,
    },
    #[error("batch has no geometry or no instances")]
    EmptyGeometry,
    #[error("index {index} references a vertex past the end ({num_vertices} vertices)")]
    IndexOutOfBounds { index: u32, num_vertices: usize },
}

/// Failure to open a device for the wgpu backend.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_error_keeps_backend_diagnostics() {
        let error = ProgramError::Compile {
            label: "instancing_shadow_2".into(),
            diagnostics: "unknown identifier `section_plane_pos2`".into(),
        };
        assert_eq!(error.diagnostics(), "unknown identifier `section_plane_pos2`");
        assert!(error.to_string().contains("instancing_shadow_2"));
    }

    #[test]
    fn range_error_reads_like_a_range() {
        let error = BatchError::RangeOutOfBounds {
            start: 4,
            end: 9,
            num_instances: 6,
        };
        assert_eq!(error.to_string(), "instance range 4..9 is outside 0..6");
    }
}
