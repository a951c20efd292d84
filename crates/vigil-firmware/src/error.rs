//! Error types for the firmware layer.

use vigil_edge::{AllocError, FormatError, InvokeError, ResolverError, TensorError};

/// Fatal: the Initializer could not produce a ready interpreter.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("model schema version {found} is not compatible (runtime expects {expected})")]
    SchemaVersion { found: u32, expected: u32 },
    #[error("model blob is malformed: {0}")]
    Format(#[source] FormatError),
    #[error("resolver setup failed: {0}")]
    Resolver(#[from] ResolverError),
    #[error("tensor allocation failed: {0}")]
    Allocation(#[from] AllocError),
    #[error("tensor handle unavailable: {0}")]
    Tensor(#[from] TensorError),
    #[error("{role} tensor holds {found} elements, expected {expected}")]
    Shape {
        role: &'static str,
        expected: usize,
        found: usize,
    },
}

impl From<FormatError> for InitError {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::SchemaVersion { found, expected } => InitError::SchemaVersion { found, expected },
            other => InitError::Format(other),
        }
    }
}

/// Recoverable: one cycle produced no output.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("sensor input unavailable: {0}")]
    Input(#[from] InputError),
    #[error("input write rejected: {0}")]
    Write(#[from] TensorError),
    #[error("invocation failed: {0}")]
    Invoke(#[from] InvokeError),
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input stream exhausted")]
    Exhausted,
    #[error("line {line}: expected 3 values, found {found}")]
    Arity { line: usize, found: usize },
    #[error("line {line}: '{value}' is not a number")]
    Parse { line: usize, value: String },
    #[error("line {line}: value {value} is not finite")]
    NonFinite { line: usize, value: f32 },
    #[error("input read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Misuse of the firmware state machine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FirmwareError {
    #[error("setup already ran")]
    AlreadyInitialized,
    #[error("firmware is not ready; setup has not succeeded")]
    NotReady,
    #[error("setup failed; the firmware is faulted")]
    SetupFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config load failed: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
