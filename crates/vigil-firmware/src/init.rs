//! The Initializer: blob in, ready-to-invoke context out.
//!
//! Runs once. Every failure is fatal for the run and leaves a diagnostic
//! line on the log channel before the error is returned.

use serde::Deserialize;

use vigil_edge::resolver::Registration;
use vigil_edge::{
    all_ops_resolver, AllOpsResolver, AllocationReport, Arena, Interpreter, Model, OpKind,
    OpLookup, OpResolver, ResolverError, TensorHandle, SCHEMA_VERSION,
};

use crate::channel::{self, LogChannel};
use crate::error::InitError;
use crate::input::FRAME_LEN;

pub const DEFAULT_ARENA_BYTES: usize = 2 * 1024;

/// Slots in the minimal resolver. Only two are used by the helmet model.
pub const MINIMAL_RESOLVER_SLOTS: usize = 5;

pub type MinimalResolver = OpResolver<MINIMAL_RESOLVER_SLOTS>;

/// Which kernels the resolver is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverProfile {
    /// Fully-connected and ReLU, exactly what the helmet model needs.
    #[default]
    Minimal,
    All,
}

/// The resolver actually handed to the interpreter.
pub enum ProfileResolver {
    Minimal(MinimalResolver),
    All(AllOpsResolver),
}

impl ProfileResolver {
    pub fn build(profile: ResolverProfile) -> Result<Self, ResolverError> {
        Ok(match profile {
            ResolverProfile::Minimal => {
                let mut resolver = MinimalResolver::new();
                resolver.add_fully_connected()?.add_relu()?;
                ProfileResolver::Minimal(resolver)
            }
            ResolverProfile::All => ProfileResolver::All(all_ops_resolver()),
        })
    }

    pub fn kinds(&self) -> Vec<OpKind> {
        match self {
            ProfileResolver::Minimal(r) => r.kinds().collect(),
            ProfileResolver::All(r) => r.kinds().collect(),
        }
    }
}

impl OpLookup for ProfileResolver {
    fn find(&self, kind: OpKind) -> Option<&Registration> {
        match self {
            ProfileResolver::Minimal(r) => r.find(kind),
            ProfileResolver::All(r) => r.find(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOptions {
    pub arena_bytes: usize,
    pub resolver: ResolverProfile,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            arena_bytes: DEFAULT_ARENA_BYTES,
            resolver: ResolverProfile::Minimal,
        }
    }
}

/// Everything the Inference Loop needs, built once by [`initialize`].
pub struct InferenceContext {
    pub(crate) interpreter: Interpreter<ProfileResolver>,
    pub(crate) input: TensorHandle,
    pub(crate) output: TensorHandle,
    report: AllocationReport,
}

impl InferenceContext {
    pub fn input(&self) -> TensorHandle {
        self.input
    }

    pub fn output(&self) -> TensorHandle {
        self.output
    }

    pub fn report(&self) -> AllocationReport {
        self.report
    }

    pub fn model(&self) -> &Model {
        self.interpreter.model()
    }

    pub fn interpreter(&self) -> &Interpreter<ProfileResolver> {
        &self.interpreter
    }
}

impl std::fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceContext")
            .field("model", &self.model().name())
            .field("input", &self.input)
            .field("output", &self.output)
            .field("report", &self.report)
            .finish()
    }
}

/// Validate the blob, build resolver and interpreter, allocate tensors and
/// cache the frame-sized input and output handles.
pub fn initialize<C: LogChannel + ?Sized>(
    blob: &[u8],
    options: &InitOptions,
    channel: &mut C,
) -> Result<InferenceContext, InitError> {
    let _span = tracing::info_span!("initialize", blob_bytes = blob.len()).entered();

    // Version first: a mismatched blob is never parsed further.
    let version = Model::peek_version(blob).map_err(|e| fail(channel, channel::MODEL_INVALID, e.into()))?;
    if version != SCHEMA_VERSION {
        let err = InitError::SchemaVersion {
            found: version,
            expected: SCHEMA_VERSION,
        };
        return Err(fail(channel, channel::SCHEMA_MISMATCH, err));
    }
    let model = Model::from_bytes(blob).map_err(|e| fail(channel, channel::MODEL_INVALID, e.into()))?;

    let resolver = ProfileResolver::build(options.resolver)
        .map_err(|e| fail(channel, channel::RESOLVER_FAILED, e.into()))?;
    tracing::debug!(model = %model.name(), kernels = ?resolver.kinds(), "resolver ready");

    let mut interpreter = Interpreter::new(model, resolver, Arena::new(options.arena_bytes));
    let report = interpreter
        .allocate_tensors()
        .map_err(|e| fail(channel, channel::ALLOCATION_FAILED, e.into()))?;

    let input = interpreter
        .input(0)
        .map_err(|e| fail(channel, channel::SHAPE_UNSUPPORTED, e.into()))?;
    let output = interpreter
        .output(0)
        .map_err(|e| fail(channel, channel::SHAPE_UNSUPPORTED, e.into()))?;
    for (role, handle) in [("input", input), ("output", output)] {
        if handle.len() != FRAME_LEN {
            let err = InitError::Shape {
                role,
                expected: FRAME_LEN,
                found: handle.len(),
            };
            return Err(fail(channel, channel::SHAPE_UNSUPPORTED, err));
        }
    }

    tracing::info!(
        model = %interpreter.model().name(),
        required = report.required_bytes,
        arena = report.arena_bytes,
        "model ready"
    );
    Ok(InferenceContext {
        interpreter,
        input,
        output,
        report,
    })
}

fn fail<C: LogChannel + ?Sized>(channel: &mut C, line: &str, err: InitError) -> InitError {
    channel.write_line(line);
    tracing::error!(error = %err, "initialization failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::demo;

    #[test]
    fn test_default_model_initializes() {
        let blob = demo::default_model_bytes().unwrap();
        let mut channel = MemoryChannel::new();
        let ctx = initialize(&blob, &InitOptions::default(), &mut channel).unwrap();
        assert_eq!(ctx.input().len(), FRAME_LEN);
        assert_eq!(ctx.output().len(), FRAME_LEN);
        assert!(ctx.report().required_bytes <= DEFAULT_ARENA_BYTES);
        assert!(channel.lines().is_empty());
    }

    #[test]
    fn test_schema_mismatch_reported() {
        let mut blob = demo::default_model_bytes().unwrap();
        blob[4..8].copy_from_slice(&(SCHEMA_VERSION + 1).to_le_bytes());
        let mut channel = MemoryChannel::new();
        match initialize(&blob, &InitOptions::default(), &mut channel) {
            Err(InitError::SchemaVersion { found, expected }) => {
                assert_eq!(found, SCHEMA_VERSION + 1);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("expected SchemaVersion, got {:?}", other),
        }
        assert_eq!(channel.lines(), &[channel::SCHEMA_MISMATCH.to_string()]);
    }

    #[test]
    fn test_garbage_blob() {
        let mut channel = MemoryChannel::new();
        let result = initialize(b"not a model", &InitOptions::default(), &mut channel);
        assert!(matches!(result, Err(InitError::Format(_))));
        assert!(channel.contains(channel::MODEL_INVALID));
    }

    #[test]
    fn test_minimal_profile_rejects_extra_ops() {
        let mut b = vigil_edge::ModelBuilder::new("squash");
        let x = b.add_tensor("x", &[3]);
        let y = b.add_tensor("y", &[3]);
        b.add_op(OpKind::Tanh, &[x], &[y]);
        b.inputs(&[x]).outputs(&[y]);
        let blob = b.build().unwrap().to_bytes().unwrap();

        let mut channel = MemoryChannel::new();
        let result = initialize(&blob, &InitOptions::default(), &mut channel);
        assert!(matches!(result, Err(InitError::Allocation(_))));
        assert!(channel.contains(channel::ALLOCATION_FAILED));

        let all = InitOptions {
            resolver: ResolverProfile::All,
            ..InitOptions::default()
        };
        assert!(initialize(&blob, &all, &mut MemoryChannel::new()).is_ok());
    }

    #[test]
    fn test_wrong_frame_length() {
        let mut b = vigil_edge::ModelBuilder::new("wide");
        let x = b.add_tensor("x", &[4]);
        let y = b.add_tensor("y", &[4]);
        b.add_op(OpKind::Relu, &[x], &[y]);
        b.inputs(&[x]).outputs(&[y]);
        let blob = b.build().unwrap().to_bytes().unwrap();

        let mut channel = MemoryChannel::new();
        match initialize(&blob, &InitOptions::default(), &mut channel) {
            Err(InitError::Shape { role, expected, found }) => {
                assert_eq!(role, "input");
                assert_eq!(expected, 3);
                assert_eq!(found, 4);
            }
            other => panic!("expected Shape, got {:?}", other),
        }
        assert!(channel.contains(channel::SHAPE_UNSUPPORTED));
    }
}
