//! Error types shared by the interpreter and its allocator.

use crate::format::{DType, FormatError};
use crate::ops::KernelError;
use crate::resolver::{OpKind, ResolverError};

/// Failures while preparing the graph and laying out the arena.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("arena too small: plan needs {required} bytes, arena has {capacity}")]
    ArenaTooSmall { required: usize, capacity: usize },

    #[error("op {op} uses '{kind}', which is not registered with the resolver")]
    UnregisteredOp { op: usize, kind: OpKind },

    #[error("tensor '{tensor}' has dtype {dtype}; only f32 is executable")]
    UnsupportedDType { tensor: String, dtype: DType },

    #[error("op {op} ('{kind}') failed to prepare: {source}")]
    Prepare {
        op: usize,
        kind: OpKind,
        #[source]
        source: KernelError,
    },

    #[error("op {op} must produce exactly one output, found {found}")]
    OutputArity { op: usize, found: usize },

    #[error("arena slot at {input_offset} overlaps output slot at {output_offset}")]
    Overlap { input_offset: usize, output_offset: usize },
}

/// Failures reading or writing tensors through handles.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("tensors have not been allocated")]
    NotAllocated,

    #[error("graph has {count} {role} tensor(s), index {index} is out of range")]
    OutOfRange {
        role: &'static str,
        index: usize,
        count: usize,
    },

    #[error("tensor expects {expected} values, got {found}")]
    LengthMismatch { expected: usize, found: usize },
}

/// Failures during a forward pass. None of them poison the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("invoke called before tensors were allocated")]
    NotAllocated,

    #[error("op {op} ('{kind}') failed: {source}")]
    Kernel {
        op: usize,
        kind: OpKind,
        #[source]
        source: KernelError,
    },

    #[error("op {op} produced a non-finite value in tensor '{tensor}'")]
    NonFinite { op: usize, tensor: String },

    #[error(transparent)]
    Memory(#[from] AllocError),
}

/// Umbrella error for callers that drive the whole runtime.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}
