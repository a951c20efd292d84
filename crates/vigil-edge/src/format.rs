//! `.vglm` model blob: single-file, versioned network description.
//!
//! Layout:
//! ```text
//! ┌──────────────────────────────────┐
//! │ Magic: "VGLM" (4 bytes)          │
//! │ Schema version: u32 LE           │
//! │ Header size: u32 LE              │
//! ├──────────────────────────────────┤
//! │ Header JSON (tensors, ops, io)   │
//! ├──────────────────────────────────┤
//! │ Padding to 64-byte alignment     │
//! ├──────────────────────────────────┤
//! │ Weight blob (constant tensors)   │
//! └──────────────────────────────────┘
//! ```
//!
//! The schema version is checked before the header is touched, so a blob
//! written for another runtime revision is rejected without parsing it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resolver::OpKind;

/// Magic bytes identifying a .vglm blob.
pub const MAGIC: &[u8; 4] = b"VGLM";

/// Schema version this runtime understands.
pub const SCHEMA_VERSION: u32 = 3;

/// Magic + version + header size.
const PREAMBLE_LEN: usize = 12;

/// Alignment for the weight blob and for each constant inside it.
const BLOB_ALIGNMENT: usize = 64;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F16,
    I8,
    U8,
}

impl DType {
    pub fn size_of(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I8 | DType::U8 => 1,
        }
    }

    /// Bytes needed to store `n` elements, saturating at `usize::MAX`.
    pub fn storage_bytes(&self, n: usize) -> usize {
        n.saturating_mul(self.size_of())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I8 => "i8",
            DType::U8 => "u8",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a constant tensor inside the weight blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRef {
    pub offset: usize,
    pub nbytes: usize,
}

/// One tensor of the graph. Constants carry a `buffer`; everything else
/// lives in the interpreter's arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorEntry {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<BufferRef>,
}

impl TensorEntry {
    /// Total number of elements, saturating at `usize::MAX`. Loaded models
    /// never saturate: `Model::from_bytes` rejects such shapes.
    pub fn numel(&self) -> usize {
        self.checked_numel().unwrap_or(usize::MAX)
    }

    pub fn checked_numel(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Byte size, or `None` if it does not fit in `usize`.
    pub fn checked_nbytes(&self) -> Option<usize> {
        self.checked_numel()?.checked_mul(self.dtype.size_of())
    }

    pub fn is_constant(&self) -> bool {
        self.buffer.is_some()
    }

    /// Bytes this tensor occupies.
    pub fn nbytes(&self) -> usize {
        self.dtype.storage_bytes(self.numel())
    }
}

/// A single operation in the model graph. `inputs` and `outputs` index
/// into [`ModelHeader::tensors`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpNode {
    pub op: OpKind,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// Header metadata for a .vglm model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHeader {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tensors: Vec<TensorEntry>,
    pub ops: Vec<OpNode>,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

/// A loaded model: header, raw weight blob and decoded f32 constants.
#[derive(Debug, Clone)]
pub struct Model {
    pub header: ModelHeader,
    weights: Vec<u8>,
    constants: Vec<Option<Vec<f32>>>,
}

impl Model {
    /// Read the schema version without parsing anything else.
    pub fn peek_version(data: &[u8]) -> Result<u32, FormatError> {
        if data.len() < PREAMBLE_LEN {
            return Err(FormatError::TooSmall);
        }
        if &data[0..4] != MAGIC {
            return Err(FormatError::BadMagic);
        }
        Ok(u32::from_le_bytes([data[4], data[5], data[6], data[7]]))
    }

    /// Load a model from raw blob bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let version = Self::peek_version(data)?;
        if version != SCHEMA_VERSION {
            return Err(FormatError::SchemaVersion {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        let header_size = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
        if data.len() - PREAMBLE_LEN < header_size {
            return Err(FormatError::TooSmall);
        }

        let header_bytes = &data[PREAMBLE_LEN..PREAMBLE_LEN + header_size];
        let header_str = std::str::from_utf8(header_bytes)
            .map_err(|_| FormatError::InvalidHeader("not valid UTF-8".into()))?;
        let header: ModelHeader = serde_json::from_str(header_str)
            .map_err(|e| FormatError::InvalidHeader(e.to_string()))?;

        let blob_start = align_up(PREAMBLE_LEN + header_size, BLOB_ALIGNMENT);
        if data.len() < blob_start {
            return Err(FormatError::TooSmall);
        }

        Self::assemble(header, data[blob_start..].to_vec())
    }

    /// Serialize this model to .vglm bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let header_json = serde_json::to_string(&self.header)
            .map_err(|e| FormatError::InvalidHeader(e.to_string()))?;
        let header_bytes = header_json.as_bytes();
        let header_size = header_bytes.len();

        let blob_start = align_up(PREAMBLE_LEN + header_size, BLOB_ALIGNMENT);
        let padding = blob_start - (PREAMBLE_LEN + header_size);

        let mut buf = Vec::with_capacity(blob_start + self.weights.len());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        buf.extend_from_slice(&(header_size as u32).to_le_bytes());
        buf.extend_from_slice(header_bytes);
        buf.extend(std::iter::repeat(0u8).take(padding));
        buf.extend_from_slice(&self.weights);

        Ok(buf)
    }

    /// Validate the graph against the weight blob and decode f32 constants.
    fn assemble(header: ModelHeader, weights: Vec<u8>) -> Result<Self, FormatError> {
        let n_tensors = header.tensors.len();
        let mut constants = Vec::with_capacity(n_tensors);

        // Every size the planner may add up must fit in usize.
        let mut total = 0usize;
        for entry in &header.tensors {
            total = entry
                .checked_nbytes()
                .and_then(|n| n.checked_add(BLOB_ALIGNMENT - 1))
                .and_then(|n| total.checked_add(n))
                .ok_or_else(|| {
                    FormatError::InvalidHeader(format!("tensor '{}' has an oversized shape {:?}", entry.name, entry.shape))
                })?;
        }

        for (index, entry) in header.tensors.iter().enumerate() {
            let Some(buffer) = entry.buffer else {
                constants.push(None);
                continue;
            };
            let bad = |reason: &'static str| FormatError::BadBuffer {
                tensor: entry.name.clone(),
                reason,
            };
            match buffer.offset.checked_add(buffer.nbytes) {
                Some(end) if end <= weights.len() => {}
                _ => return Err(bad("extends past the weight blob")),
            }
            if buffer.nbytes != entry.nbytes() {
                return Err(bad("size does not match shape and dtype"));
            }
            if entry.dtype != DType::F32 {
                constants.push(None);
                continue;
            }
            if buffer.offset % 4 != 0 {
                return Err(bad("f32 data is not 4-byte aligned"));
            }
            let data = weights[buffer.offset..buffer.offset + buffer.nbytes]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            debug_assert_eq!(constants.len(), index);
            constants.push(Some(data));
        }

        for (op, node) in header.ops.iter().enumerate() {
            for &tensor in node.inputs.iter().chain(node.outputs.iter()) {
                if tensor >= n_tensors {
                    return Err(FormatError::DanglingTensor { op, tensor });
                }
            }
            if let Some(&tensor) = node.outputs.iter().find(|&&t| header.tensors[t].is_constant()) {
                return Err(FormatError::InvalidHeader(format!(
                    "op {} writes to constant tensor '{}'",
                    op, header.tensors[tensor].name
                )));
            }
        }

        for &tensor in header.inputs.iter().chain(header.outputs.iter()) {
            if tensor >= n_tensors {
                return Err(FormatError::InvalidHeader(format!(
                    "graph io references missing tensor {}",
                    tensor
                )));
            }
            if header.tensors[tensor].is_constant() {
                return Err(FormatError::InvalidHeader(format!(
                    "graph io tensor '{}' is a constant",
                    header.tensors[tensor].name
                )));
            }
        }

        Ok(Model {
            header,
            weights,
            constants,
        })
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn tensor(&self, index: usize) -> Option<&TensorEntry> {
        self.header.tensors.get(index)
    }

    /// Decoded data of an f32 constant tensor.
    pub fn constant(&self, index: usize) -> Option<&[f32]> {
        self.constants.get(index)?.as_deref()
    }

    /// Raw bytes of a constant tensor, whatever its dtype.
    pub fn constant_bytes(&self, index: usize) -> Option<&[u8]> {
        let buffer = self.tensor(index)?.buffer?;
        self.weights.get(buffer.offset..buffer.offset + buffer.nbytes)
    }

    /// Size of the weight blob in bytes.
    pub fn weights_len(&self) -> usize {
        self.weights.len()
    }
}

/// Errors from .vglm parsing.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("blob too small for .vglm format")]
    TooSmall,
    #[error("invalid magic bytes (expected VGLM)")]
    BadMagic,
    #[error("schema version {found} is not compatible (runtime expects {expected})")]
    SchemaVersion { found: u32, expected: u32 },
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("constant tensor '{tensor}': {reason}")]
    BadBuffer { tensor: String, reason: &'static str },
    #[error("op {op} references missing tensor {tensor}")]
    DanglingTensor { op: usize, tensor: usize },
}

/// Round `n` up to the next multiple of `align`.
pub(crate) fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Builder for creating .vglm models programmatically.
pub struct ModelBuilder {
    header: ModelHeader,
    weight_buf: Vec<u8>,
}

impl ModelBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            header: ModelHeader {
                name: name.to_string(),
                description: String::new(),
                tensors: Vec::new(),
                ops: Vec::new(),
                inputs: Vec::new(),
                outputs: Vec::new(),
            },
            weight_buf: Vec::new(),
        }
    }

    pub fn description(&mut self, text: &str) -> &mut Self {
        self.header.description = text.to_string();
        self
    }

    /// Add an f32 constant and return its tensor index.
    pub fn add_constant(&mut self, name: &str, shape: &[usize], data: &[f32]) -> usize {
        let padding = align_up(self.weight_buf.len(), BLOB_ALIGNMENT) - self.weight_buf.len();
        self.weight_buf.extend(std::iter::repeat(0u8).take(padding));

        let offset = self.weight_buf.len();
        for v in data {
            self.weight_buf.extend_from_slice(&v.to_le_bytes());
        }

        self.header.tensors.push(TensorEntry {
            name: name.to_string(),
            dtype: DType::F32,
            shape: shape.to_vec(),
            buffer: Some(BufferRef {
                offset,
                nbytes: data.len() * 4,
            }),
        });
        self.header.tensors.len() - 1
    }

    /// Add an arena-backed f32 tensor and return its index.
    pub fn add_tensor(&mut self, name: &str, shape: &[usize]) -> usize {
        self.add_typed_tensor(name, DType::F32, shape)
    }

    /// Add an arena-backed tensor of any dtype.
    pub fn add_typed_tensor(&mut self, name: &str, dtype: DType, shape: &[usize]) -> usize {
        self.header.tensors.push(TensorEntry {
            name: name.to_string(),
            dtype,
            shape: shape.to_vec(),
            buffer: None,
        });
        self.header.tensors.len() - 1
    }

    /// Add an operation to the graph.
    pub fn add_op(&mut self, op: OpKind, inputs: &[usize], outputs: &[usize]) -> &mut OpNode {
        self.header.ops.push(OpNode {
            op,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            params: BTreeMap::new(),
        });
        let last = self.header.ops.len() - 1;
        &mut self.header.ops[last]
    }

    pub fn inputs(&mut self, tensors: &[usize]) -> &mut Self {
        self.header.inputs = tensors.to_vec();
        self
    }

    pub fn outputs(&mut self, tensors: &[usize]) -> &mut Self {
        self.header.outputs = tensors.to_vec();
        self
    }

    /// Validate and build the final model.
    pub fn build(self) -> Result<Model, FormatError> {
        Model::assemble(self.header, self.weight_buf)
    }
}

impl OpNode {
    /// Attach a string parameter, builder style.
    pub fn param(&mut self, key: &str, value: &str) -> &mut Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}
