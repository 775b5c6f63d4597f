use instaclip::gpu::{GpuCall, UniformValue};

/// A single expectation about the GPU calls a draw issued.
pub enum CallExpectation {
    /// `name` was written exactly these values, in order.
    UniformWrites {
        name: String,
        values: Vec<UniformValue>,
    },
    /// `name` was never written.
    NoUniformWrites { name: String },
    ProgramBinds(usize),
    Draws(usize),
    /// Every rate raised to 1 was lowered back to 0 before the next draw.
    RatesReset,
}

impl CallExpectation {
    pub fn uniform_writes(name: impl Into<String>, values: Vec<UniformValue>) -> Self {
        Self::UniformWrites {
            name: name.into(),
            values,
        }
    }

    pub fn no_uniform_writes(name: impl Into<String>) -> Self {
        Self::NoUniformWrites { name: name.into() }
    }
}

/// Values written to uniform `name`, in call order.
pub fn uniform_writes(calls: &[GpuCall], name: &str) -> Vec<UniformValue> {
    calls
        .iter()
        .filter_map(|call| match call {
            GpuCall::SetUniform {
                name: written,
                value,
            } if written == name => Some(*value),
            _ => None,
        })
        .collect()
}

pub fn program_binds(calls: &[GpuCall]) -> usize {
    calls
        .iter()
        .filter(|call| matches!(call, GpuCall::BindProgram(_)))
        .count()
}

pub fn draws(calls: &[GpuCall]) -> usize {
    calls
        .iter()
        .filter(|call| matches!(call, GpuCall::DrawIndexedInstanced { .. }))
        .count()
}

/// Labels of every program compiled, successfully or not.
pub fn compiled_labels(calls: &[GpuCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            GpuCall::CompileProgram { label, .. } => Some(label.clone()),
            _ => None,
        })
        .collect()
}

/// Fails if a draw is issued while an attribute raised for an earlier draw is
/// still at instance rate, or if the log ends that way.
fn rates_reset(calls: &[GpuCall]) -> Result<(), String> {
    let mut raised: Vec<u32> = Vec::new();
    let mut awaiting_reset: Option<usize> = None;
    let mut draw_index = 0;

    for call in calls {
        match call {
            GpuCall::SetAttributeRate { location, divisor } => {
                raised.retain(|raised_location| *raised_location != location.0);
                if *divisor != 0 {
                    raised.push(location.0);
                }
                if raised.is_empty() {
                    awaiting_reset = None;
                }
            }
            GpuCall::DrawIndexedInstanced { .. } => {
                if let Some(previous) = awaiting_reset {
                    return Err(format!(
                        "locations {raised:?} raised for draw {previous} were still at instance rate at draw {}",
                        draw_index + 1
                    ));
                }
                draw_index += 1;
                if !raised.is_empty() {
                    awaiting_reset = Some(draw_index);
                }
            }
            _ => {}
        }
    }

    match awaiting_reset {
        Some(previous) => Err(format!(
            "locations {raised:?} left at instance rate after draw {previous}"
        )),
        None => Ok(()),
    }
}

/// Validates expectations against a recorded call log.
///
/// Returns a list of human-readable failure descriptions. An empty list means
/// all expectations passed.
pub fn check_calls(calls: &[GpuCall], expectations: &[CallExpectation]) -> Vec<String> {
    let mut failures = Vec::new();

    for expectation in expectations {
        match expectation {
            CallExpectation::UniformWrites { name, values } => {
                let actual = uniform_writes(calls, name);
                if &actual != values {
                    failures.push(format!(
                        "[{name}] expected writes {values:?} but got {actual:?}"
                    ));
                }
            }
            CallExpectation::NoUniformWrites { name } => {
                let actual = uniform_writes(calls, name);
                if !actual.is_empty() {
                    failures.push(format!("[{name}] expected no writes but got {actual:?}"));
                }
            }
            CallExpectation::ProgramBinds(expected) => {
                let actual = program_binds(calls);
                if actual != *expected {
                    failures.push(format!(
                        "[bind_program] expected {expected} call(s) but got {actual}"
                    ));
                }
            }
            CallExpectation::Draws(expected) => {
                let actual = draws(calls);
                if actual != *expected {
                    failures.push(format!("[draw] expected {expected} call(s) but got {actual}"));
                }
            }
            CallExpectation::RatesReset => {
                if let Err(failure) = rates_reset(calls) {
                    failures.push(format!("[attribute rates] {failure}"));
                }
            }
        }
    }

    failures
}
