//! Interpreter: binds a model, a resolver and an arena into a runnable graph.
//!
//! Lifecycle: `new` (infallible) → `allocate_tensors` (resolves kernels,
//! checks shapes, plans the arena) → `input`/`output` handles →
//! `write`/`invoke`/`read` any number of times.

use crate::arena::{Arena, ArenaSlot};
use crate::error::{AllocError, InvokeError, TensorError};
use crate::format::{DType, Model};
use crate::ops::{KernelError, OpParams, PrepareContext, MAX_OP_INPUTS};
use crate::plan::MemoryPlan;
use crate::resolver::{EvalFn, OpKind, OpLookup};

/// Typed view of one graph tensor. Obtained once after allocation and
/// valid for the lifetime of the interpreter that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorHandle {
    index: usize,
    slot: ArenaSlot,
}

impl TensorHandle {
    /// Tensor index inside the model header.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of f32 elements.
    pub fn len(&self) -> usize {
        self.slot.len
    }

    pub fn is_empty(&self) -> bool {
        self.slot.len == 0
    }
}

/// Summary of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationReport {
    pub required_bytes: usize,
    pub arena_bytes: usize,
    pub ops: usize,
    pub tensors: usize,
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Constant(usize),
    Arena(ArenaSlot),
}

struct PreparedNode {
    kind: OpKind,
    eval: EvalFn,
    params: OpParams,
    inputs: Vec<Operand>,
    arena_inputs: Vec<ArenaSlot>,
    output: usize,
    output_slot: ArenaSlot,
}

/// Runs a model inside a fixed arena.
pub struct Interpreter<R: OpLookup> {
    model: Model,
    resolver: R,
    arena: Arena,
    nodes: Vec<PreparedNode>,
    slots: Vec<Option<ArenaSlot>>,
    report: Option<AllocationReport>,
}

impl<R: OpLookup> Interpreter<R> {
    pub fn new(model: Model, resolver: R, arena: Arena) -> Self {
        let n_tensors = model.header.tensors.len();
        Self {
            model,
            resolver,
            arena,
            nodes: Vec::new(),
            slots: vec![None; n_tensors],
            report: None,
        }
    }

    /// Resolve kernels, validate shapes and lay out the arena.
    ///
    /// Calling this again after success returns the same report.
    pub fn allocate_tensors(&mut self) -> Result<AllocationReport, AllocError> {
        if let Some(report) = self.report {
            return Ok(report);
        }

        let header = &self.model.header;

        if let Some(t) = header.tensors.iter().find(|t| t.dtype != DType::F32) {
            return Err(AllocError::UnsupportedDType {
                tensor: t.name.clone(),
                dtype: t.dtype,
            });
        }

        let mut prepared = Vec::with_capacity(header.ops.len());
        for (op, node) in header.ops.iter().enumerate() {
            let registration = self
                .resolver
                .find(node.op)
                .ok_or(AllocError::UnregisteredOp { op, kind: node.op })?;
            if node.outputs.len() != 1 {
                return Err(AllocError::OutputArity {
                    op,
                    found: node.outputs.len(),
                });
            }
            if node.inputs.len() > MAX_OP_INPUTS {
                return Err(AllocError::Prepare {
                    op,
                    kind: node.op,
                    source: KernelError::InputCount {
                        min: 0,
                        max: MAX_OP_INPUTS,
                        found: node.inputs.len(),
                    },
                });
            }

            let ctx = PrepareContext {
                params: &node.params,
                inputs: node.inputs.iter().map(|&t| &header.tensors[t]).collect(),
                outputs: node.outputs.iter().map(|&t| &header.tensors[t]).collect(),
            };
            let params = (registration.prepare)(&ctx).map_err(|source| AllocError::Prepare {
                op,
                kind: node.op,
                source,
            })?;
            prepared.push((node.op, registration.eval, params));
        }

        let plan = MemoryPlan::from_header(header);
        self.arena.commit(plan.required_bytes())?;

        let mut slots = vec![None; header.tensors.len()];
        for buffer in &plan.slots {
            slots[buffer.tensor] = Some(ArenaSlot {
                offset: buffer.offset,
                len: header.tensors[buffer.tensor].numel(),
            });
        }

        let operand = |t: usize| match slots[t] {
            Some(slot) => Operand::Arena(slot),
            None => Operand::Constant(t),
        };
        let mut nodes = Vec::with_capacity(prepared.len());
        for (node, (kind, eval, params)) in header.ops.iter().zip(prepared) {
            let output = node.outputs[0];
            let output_slot = slots[output].unwrap_or(ArenaSlot { offset: 0, len: 0 });
            let inputs: Vec<Operand> = node.inputs.iter().map(|&t| operand(t)).collect();
            let arena_inputs: Vec<ArenaSlot> = inputs
                .iter()
                .filter_map(|o| match o {
                    Operand::Arena(slot) => Some(*slot),
                    Operand::Constant(_) => None,
                })
                .collect();
            if let Some(clash) = arena_inputs.iter().find(|s| s.overlaps(&output_slot)) {
                return Err(AllocError::Overlap {
                    input_offset: clash.offset,
                    output_offset: output_slot.offset,
                });
            }
            nodes.push(PreparedNode {
                kind,
                eval,
                params,
                inputs,
                arena_inputs,
                output,
                output_slot,
            });
        }

        let report = AllocationReport {
            required_bytes: plan.required_bytes(),
            arena_bytes: self.arena.capacity(),
            ops: nodes.len(),
            tensors: header.tensors.len(),
        };
        tracing::debug!(
            model = %header.name,
            required = report.required_bytes,
            arena = report.arena_bytes,
            ops = report.ops,
            "tensors allocated"
        );

        self.nodes = nodes;
        self.slots = slots;
        self.report = Some(report);
        Ok(report)
    }

    pub fn is_allocated(&self) -> bool {
        self.report.is_some()
    }

    pub fn report(&self) -> Option<AllocationReport> {
        self.report
    }

    /// Handle to the `i`-th graph input.
    pub fn input(&self, i: usize) -> Result<TensorHandle, TensorError> {
        self.handle("input", &self.model.header.inputs, i)
    }

    /// Handle to the `i`-th graph output.
    pub fn output(&self, i: usize) -> Result<TensorHandle, TensorError> {
        self.handle("output", &self.model.header.outputs, i)
    }

    pub fn inputs_len(&self) -> usize {
        self.model.header.inputs.len()
    }

    pub fn outputs_len(&self) -> usize {
        self.model.header.outputs.len()
    }

    fn handle(&self, role: &'static str, list: &[usize], i: usize) -> Result<TensorHandle, TensorError> {
        if !self.is_allocated() {
            return Err(TensorError::NotAllocated);
        }
        let index = *list.get(i).ok_or(TensorError::OutOfRange {
            role,
            index: i,
            count: list.len(),
        })?;
        let slot = self.slots[index].ok_or(TensorError::NotAllocated)?;
        Ok(TensorHandle { index, slot })
    }

    /// Declared shape of the tensor behind `handle`.
    pub fn shape(&self, handle: TensorHandle) -> &[usize] {
        &self.model.header.tensors[handle.index].shape
    }

    /// Copy `values` into a tensor. The length must match exactly.
    pub fn write(&mut self, handle: TensorHandle, values: &[f32]) -> Result<(), TensorError> {
        if values.len() != handle.slot.len {
            return Err(TensorError::LengthMismatch {
                expected: handle.slot.len,
                found: values.len(),
            });
        }
        self.arena.slice_mut(handle.slot).copy_from_slice(values);
        Ok(())
    }

    /// Current contents of a tensor.
    pub fn read(&self, handle: TensorHandle) -> &[f32] {
        self.arena.slice(handle.slot)
    }

    /// Run one forward pass over the current input contents.
    pub fn invoke(&mut self) -> Result<(), InvokeError> {
        if !self.is_allocated() {
            return Err(InvokeError::NotAllocated);
        }

        for (op, node) in self.nodes.iter().enumerate() {
            tracing::trace!(op, kind = %node.kind, "eval");

            let empty: &[f32] = &[];
            let mut arena_views = [empty; MAX_OP_INPUTS];
            let output = self
                .arena
                .split_io(&node.arena_inputs, node.output_slot, &mut arena_views)?;

            let mut inputs = [empty; MAX_OP_INPUTS];
            let mut views = arena_views.iter();
            for (input, operand) in inputs.iter_mut().zip(&node.inputs) {
                *input = match operand {
                    Operand::Arena(_) => views.next().copied().unwrap_or(empty),
                    Operand::Constant(t) => self.model.constant(*t).unwrap_or(&[]),
                };
            }
            let inputs = &inputs[..node.inputs.len()];

            (node.eval)(inputs, output, &node.params).map_err(|source| InvokeError::Kernel {
                op,
                kind: node.kind,
                source,
            })?;

            if output.iter().any(|v| !v.is_finite()) {
                let tensor = self.model.header.tensors[node.output].name.clone();
                tracing::warn!(op, tensor = %tensor, "non-finite output");
                return Err(InvokeError::NonFinite { op, tensor });
            }
        }

        Ok(())
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ModelBuilder;
    use crate::resolver::{all_ops_resolver, OpResolver};

    fn doubling_model() -> Model {
        let mut b = ModelBuilder::new("double");
        let x = b.add_tensor("x", &[1, 3]);
        let w = b.add_constant("w", &[3, 3], &[2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0]);
        let y = b.add_tensor("y", &[1, 3]);
        b.add_op(OpKind::FullyConnected, &[x, w], &[y]);
        b.inputs(&[x]).outputs(&[y]);
        b.build().unwrap()
    }

    #[test]
    fn test_invoke_before_allocate() {
        let mut interp = Interpreter::new(doubling_model(), all_ops_resolver(), Arena::new(256));
        assert!(matches!(interp.invoke(), Err(InvokeError::NotAllocated)));
        assert!(matches!(interp.input(0), Err(TensorError::NotAllocated)));
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let mut interp = Interpreter::new(doubling_model(), all_ops_resolver(), Arena::new(256));
        let first = interp.allocate_tensors().unwrap();
        let second = interp.allocate_tensors().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.ops, 1);
    }

    #[test]
    fn test_forward() {
        let mut resolver = OpResolver::<1>::new();
        resolver.add_fully_connected().unwrap();
        let mut interp = Interpreter::new(doubling_model(), resolver, Arena::new(256));
        interp.allocate_tensors().unwrap();
        let input = interp.input(0).unwrap();
        let output = interp.output(0).unwrap();
        interp.write(input, &[1.0, 2.0, 3.0]).unwrap();
        interp.invoke().unwrap();
        assert_eq!(interp.read(output), &[2.0, 4.0, 6.0]);
        assert_eq!(interp.shape(output), &[1, 3]);
    }

    #[test]
    fn test_write_length_checked() {
        let mut interp = Interpreter::new(doubling_model(), all_ops_resolver(), Arena::new(256));
        interp.allocate_tensors().unwrap();
        let input = interp.input(0).unwrap();
        match interp.write(input, &[1.0, 2.0]) {
            Err(TensorError::LengthMismatch { expected, found }) => {
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("expected LengthMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_handle_out_of_range() {
        let mut interp = Interpreter::new(doubling_model(), all_ops_resolver(), Arena::new(256));
        interp.allocate_tensors().unwrap();
        assert!(matches!(
            interp.output(1),
            Err(TensorError::OutOfRange { role: "output", index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_non_f32_rejected() {
        let mut b = ModelBuilder::new("quantized");
        let x = b.add_typed_tensor("x", DType::I8, &[3]);
        let y = b.add_typed_tensor("y", DType::I8, &[3]);
        b.add_op(OpKind::Relu, &[x], &[y]);
        b.inputs(&[x]).outputs(&[y]);
        let mut interp = Interpreter::new(b.build().unwrap(), all_ops_resolver(), Arena::new(256));
        assert!(matches!(
            interp.allocate_tensors(),
            Err(AllocError::UnsupportedDType { dtype: DType::I8, .. })
        ));
    }

    #[test]
    fn test_zero_unit_layer_rejected_at_allocation() {
        let mut b = ModelBuilder::new("empty layer");
        let x = b.add_tensor("x", &[1, 3]);
        let w = b.add_constant("w", &[0, 3], &[]);
        let h = b.add_tensor("h", &[1, 0]);
        let y = b.add_tensor("y", &[1, 3]);
        b.add_op(OpKind::FullyConnected, &[x, w], &[h]);
        b.add_op(OpKind::Relu, &[x], &[y]);
        b.inputs(&[x]).outputs(&[y]);
        let mut interp = Interpreter::new(b.build().unwrap(), all_ops_resolver(), Arena::new(256));
        assert!(matches!(
            interp.allocate_tensors(),
            Err(AllocError::Prepare { op: 0, kind: OpKind::FullyConnected, source: KernelError::Shape { .. } })
        ));
        assert!(!interp.is_allocated());
    }

    #[test]
    fn test_in_place_op_rejected_at_allocation() {
        let mut b = ModelBuilder::new("in place");
        let x = b.add_tensor("x", &[1, 3]);
        b.add_op(OpKind::Relu, &[x], &[x]);
        b.inputs(&[x]).outputs(&[x]);
        let mut interp = Interpreter::new(b.build().unwrap(), all_ops_resolver(), Arena::new(256));
        assert!(matches!(interp.allocate_tensors(), Err(AllocError::Overlap { .. })));
        assert!(matches!(interp.invoke(), Err(InvokeError::NotAllocated)));
    }

    #[test]
    fn test_too_many_inputs_rejected() {
        let mut b = ModelBuilder::new("wide");
        let xs: Vec<usize> = (0..4).map(|i| b.add_tensor(&format!("x{}", i), &[3])).collect();
        let y = b.add_tensor("y", &[3]);
        b.add_op(OpKind::Add, &xs, &[y]);
        b.inputs(&xs).outputs(&[y]);
        let mut interp = Interpreter::new(b.build().unwrap(), all_ops_resolver(), Arena::new(512));
        assert!(matches!(
            interp.allocate_tensors(),
            Err(AllocError::Prepare { source: KernelError::InputCount { found: 4, .. }, .. })
        ));
    }

    #[test]
    fn test_repeated_invoke_is_stable() {
        let mut interp = Interpreter::new(doubling_model(), all_ops_resolver(), Arena::new(256));
        interp.allocate_tensors().unwrap();
        let input = interp.input(0).unwrap();
        let output = interp.output(0).unwrap();
        for step in 0..3 {
            let v = step as f32;
            interp.write(input, &[v, v + 1.0, v + 2.0]).unwrap();
            interp.invoke().unwrap();
            assert_eq!(interp.read(output), &[2.0 * v, 2.0 * v + 2.0, 2.0 * v + 4.0]);
        }
    }
}
