//! Operation resolver: a fixed-capacity table from op kind to kernel.
//!
//! The set of op kinds is closed (`OpKind`), and each resolver holds at
//! most `N` registrations, with `N` picked at compile time for the target
//! model. A model that uses a kind the resolver lacks fails when tensors
//! are allocated, not when the resolver is built.

use serde::{Deserialize, Serialize};

use crate::ops::{activation, elementwise, fully_connected, KernelError, OpParams, PrepareContext};

/// Every operation the runtime can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    FullyConnected,
    Relu,
    Relu6,
    Logistic,
    Tanh,
    Softmax,
    Add,
    Mul,
}

impl OpKind {
    pub const COUNT: usize = 8;

    pub const ALL: [OpKind; OpKind::COUNT] = [
        OpKind::FullyConnected,
        OpKind::Relu,
        OpKind::Relu6,
        OpKind::Logistic,
        OpKind::Tanh,
        OpKind::Softmax,
        OpKind::Add,
        OpKind::Mul,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::FullyConnected => "fully_connected",
            OpKind::Relu => "relu",
            OpKind::Relu6 => "relu6",
            OpKind::Logistic => "logistic",
            OpKind::Tanh => "tanh",
            OpKind::Softmax => "softmax",
            OpKind::Add => "add",
            OpKind::Mul => "mul",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PrepareFn = fn(&PrepareContext<'_>) -> Result<OpParams, KernelError>;
pub type EvalFn = fn(&[&[f32]], &mut [f32], &OpParams) -> Result<(), KernelError>;

/// A kernel bound to its op kind.
#[derive(Clone, Copy)]
pub struct Registration {
    pub kind: OpKind,
    pub prepare: PrepareFn,
    pub eval: EvalFn,
}

impl Registration {
    /// The built-in kernel for `kind`.
    pub fn builtin(kind: OpKind) -> Self {
        let (prepare, eval): (PrepareFn, EvalFn) = match kind {
            OpKind::FullyConnected => (fully_connected::prepare, fully_connected::eval),
            OpKind::Relu => (activation::prepare_unary, activation::eval_relu),
            OpKind::Relu6 => (activation::prepare_unary, activation::eval_relu6),
            OpKind::Logistic => (activation::prepare_unary, activation::eval_logistic),
            OpKind::Tanh => (activation::prepare_unary, activation::eval_tanh),
            OpKind::Softmax => (activation::prepare_softmax, activation::eval_softmax),
            OpKind::Add => (elementwise::prepare, elementwise::eval_add),
            OpKind::Mul => (elementwise::prepare, elementwise::eval_mul),
        };
        Registration { kind, prepare, eval }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("kind", &self.kind).finish()
    }
}

/// Anything the interpreter can ask for a kernel.
pub trait OpLookup {
    fn find(&self, kind: OpKind) -> Option<&Registration>;
}

/// Fixed-capacity resolver holding up to `N` kernels.
pub struct OpResolver<const N: usize> {
    slots: [Option<Registration>; N],
    len: usize,
}

/// Resolver sized for every built-in op.
pub type AllOpsResolver = OpResolver<{ OpKind::COUNT }>;

impl<const N: usize> OpResolver<N> {
    pub fn new() -> Self {
        Self {
            slots: [None; N],
            len: 0,
        }
    }

    /// Register the built-in kernel for `kind`.
    pub fn add(&mut self, kind: OpKind) -> Result<&mut Self, ResolverError> {
        if self.find(kind).is_some() {
            return Err(ResolverError::Duplicate(kind));
        }
        if self.len == N {
            return Err(ResolverError::Full { capacity: N, kind });
        }
        self.slots[self.len] = Some(Registration::builtin(kind));
        self.len += 1;
        Ok(self)
    }

    pub fn add_fully_connected(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::FullyConnected)
    }

    pub fn add_relu(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::Relu)
    }

    pub fn add_relu6(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::Relu6)
    }

    pub fn add_logistic(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::Logistic)
    }

    pub fn add_tanh(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::Tanh)
    }

    pub fn add_softmax(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::Softmax)
    }

    pub fn add_add(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::Add)
    }

    pub fn add_mul(&mut self) -> Result<&mut Self, ResolverError> {
        self.add(OpKind::Mul)
    }

    /// Number of registered kernels.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = OpKind> + '_ {
        self.slots[..self.len].iter().flatten().map(|r| r.kind)
    }
}

impl<const N: usize> Default for OpResolver<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> OpLookup for OpResolver<N> {
    fn find(&self, kind: OpKind) -> Option<&Registration> {
        self.slots[..self.len]
            .iter()
            .flatten()
            .find(|r| r.kind == kind)
    }
}

/// A resolver with every built-in op registered.
pub fn all_ops_resolver() -> AllOpsResolver {
    let mut resolver = AllOpsResolver::new();
    for (slot, kind) in resolver.slots.iter_mut().zip(OpKind::ALL) {
        *slot = Some(Registration::builtin(kind));
    }
    resolver.len = OpKind::COUNT;
    resolver
}

/// Errors from building a resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("resolver is full ({capacity} slots), cannot add '{kind}'")]
    Full { capacity: usize, kind: OpKind },
    #[error("'{0}' is already registered")]
    Duplicate(OpKind),
}
