//! Memory planning: places every non-constant tensor in the arena.
//!
//! Each tensor is live from the first op that touches it to the last one.
//! Graph inputs are live from the start, graph outputs until the end.
//! Tensors whose lifetimes never overlap may share bytes.
//!
//! Placement is greedy by size: the largest buffer goes first, each at the
//! lowest aligned offset that does not collide with an already placed
//! buffer that is live at the same time.

use crate::arena::ARENA_ALIGN;
use crate::format::{align_up, ModelHeader};

/// A buffer the planner has to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRequest {
    pub tensor: usize,
    pub size_bytes: usize,
    pub first_use: usize,
    pub last_use: usize,
}

impl BufferRequest {
    fn live_with(&self, other: &BufferRequest) -> bool {
        self.first_use <= other.last_use && other.first_use <= self.last_use
    }
}

/// Placement of one tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSlot {
    pub tensor: usize,
    pub size_bytes: usize,
    pub offset: usize,
}

/// Result of planning: where every arena tensor lives and the high-water mark.
#[derive(Debug, Clone)]
pub struct MemoryPlan {
    pub slots: Vec<BufferSlot>,
    pub required_bytes: usize,
}

impl MemoryPlan {
    /// Plan the arena layout for a model graph.
    pub fn from_header(header: &ModelHeader) -> Self {
        Self::greedy(Self::lifetimes(header))
    }

    /// Collect lifetimes of all non-constant tensors referenced by the graph.
    pub fn lifetimes(header: &ModelHeader) -> Vec<BufferRequest> {
        let n_tensors = header.tensors.len();
        let last_op = header.ops.len().saturating_sub(1);
        let mut spans: Vec<Option<(usize, usize)>> = vec![None; n_tensors];

        let mut touch = |tensor: usize, at: usize| {
            let span = spans[tensor].get_or_insert((at, at));
            span.0 = span.0.min(at);
            span.1 = span.1.max(at);
        };

        for (op, node) in header.ops.iter().enumerate() {
            for &t in node.inputs.iter().chain(node.outputs.iter()) {
                touch(t, op);
            }
        }
        for &t in &header.inputs {
            touch(t, 0);
        }
        for &t in &header.outputs {
            touch(t, last_op);
        }

        spans
            .into_iter()
            .enumerate()
            .filter_map(|(tensor, span)| {
                let entry = &header.tensors[tensor];
                if entry.is_constant() {
                    return None;
                }
                let (first_use, last_use) = span?;
                Some(BufferRequest {
                    tensor,
                    size_bytes: entry.nbytes(),
                    first_use,
                    last_use,
                })
            })
            .collect()
    }

    /// Greedy-by-size placement.
    pub fn greedy(mut requests: Vec<BufferRequest>) -> Self {
        requests.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then(a.tensor.cmp(&b.tensor)));

        let mut placed: Vec<(BufferRequest, usize)> = Vec::with_capacity(requests.len());
        let mut required_bytes = 0usize;

        for req in requests {
            let mut blockers: Vec<(usize, usize)> = placed
                .iter()
                .filter(|(other, _)| other.live_with(&req) && other.size_bytes > 0)
                .map(|(other, offset)| (*offset, *offset + other.size_bytes))
                .collect();
            blockers.sort_unstable();

            // Walk the gaps between live buffers in address order.
            let mut offset = 0usize;
            for &(start, end) in &blockers {
                if offset + req.size_bytes <= start {
                    break;
                }
                offset = offset.max(align_up(end, ARENA_ALIGN));
            }

            if req.size_bytes > 0 {
                required_bytes = required_bytes.max(offset + req.size_bytes);
            }
            placed.push((req, offset));
        }

        let mut slots: Vec<BufferSlot> = placed
            .into_iter()
            .map(|(req, offset)| BufferSlot {
                tensor: req.tensor,
                size_bytes: req.size_bytes,
                offset,
            })
            .collect();
        slots.sort_by_key(|s| s.tensor);

        MemoryPlan {
            slots,
            required_bytes,
        }
    }

    /// Arena offset assigned to a tensor.
    pub fn offset_of(&self, tensor: usize) -> Option<usize> {
        self.slots.iter().find(|s| s.tensor == tensor).map(|s| s.offset)
    }

    /// Peak arena usage in bytes.
    pub fn required_bytes(&self) -> usize {
        self.required_bytes
    }

    /// Sum of all buffer sizes, as if nothing were shared.
    pub fn naive_bytes(&self) -> usize {
        self.slots
            .iter()
            .map(|s| align_up(s.size_bytes, ARENA_ALIGN))
            .sum()
    }
}
