//! Portable operator library.
//!
//! Every kernel comes as a pair of plain functions: `prepare` validates
//! shapes once at allocation time and turns string params into typed
//! [`OpParams`]; `eval` runs on raw `&[f32]` slices every invocation.

pub mod activation;
pub mod elementwise;
pub mod fully_connected;

use std::collections::BTreeMap;

use crate::format::TensorEntry;

/// Upper bound on inputs for any op the interpreter runs.
pub const MAX_OP_INPUTS: usize = 3;

/// Activation fused into the tail of an op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    None,
    Relu,
    Relu6,
}

impl Activation {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Activation::None),
            "relu" => Some(Activation::Relu),
            "relu6" => Some(Activation::Relu6),
            _ => None,
        }
    }

    pub(crate) fn apply(&self, data: &mut [f32]) {
        match self {
            Activation::None => {}
            Activation::Relu => activation::relu(data),
            Activation::Relu6 => activation::relu6(data),
        }
    }
}

/// Typed op parameters, produced by `prepare`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpParams {
    None,
    FullyConnected {
        units: usize,
        in_features: usize,
        activation: Activation,
    },
    Elementwise { activation: Activation },
    Softmax { beta: f32, depth: usize },
}

/// What a kernel sees while preparing.
pub struct PrepareContext<'a> {
    pub params: &'a BTreeMap<String, String>,
    pub inputs: Vec<&'a TensorEntry>,
    pub outputs: Vec<&'a TensorEntry>,
}

impl<'a> PrepareContext<'a> {
    pub(crate) fn expect_inputs(&self, min: usize, max: usize) -> Result<(), KernelError> {
        let found = self.inputs.len();
        if found < min || found > max {
            return Err(KernelError::InputCount { min, max, found });
        }
        Ok(())
    }

    pub(crate) fn output(&self) -> &'a TensorEntry {
        self.outputs[0]
    }

    pub(crate) fn activation(&self) -> Result<Activation, KernelError> {
        match self.params.get("activation") {
            None => Ok(Activation::None),
            Some(value) => Activation::parse(value).ok_or_else(|| KernelError::BadParam {
                name: "activation".into(),
                value: value.clone(),
            }),
        }
    }
}

/// Kernel-level failures.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("expected between {min} and {max} inputs, found {found}")]
    InputCount { min: usize, max: usize, found: usize },

    #[error("tensor '{tensor}' has shape {found:?}, expected {expected:?}")]
    Shape {
        tensor: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid value '{value}' for param '{name}'")]
    BadParam { name: String, value: String },

    #[error("buffer length {found} does not match expected {expected}")]
    Length { expected: usize, found: usize },
}

/// Output must hold exactly as many elements as `tensor`.
pub(crate) fn check_same_numel(
    tensor: &TensorEntry,
    output: &TensorEntry,
) -> Result<(), KernelError> {
    if tensor.numel() != output.numel() {
        return Err(KernelError::Shape {
            tensor: output.name.clone(),
            expected: tensor.shape.clone(),
            found: output.shape.clone(),
        });
    }
    Ok(())
}
