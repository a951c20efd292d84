//! Fixed-size scratch arena backing every non-constant tensor.
//!
//! The arena is sized once by the caller (2 KB on the reference board) and
//! never grows. The memory planner decides where each tensor lives; the
//! arena only checks that the plan fits and hands out views.

use std::ops::Range;

use crate::error::AllocError;

/// Byte alignment of every slot. Keeps f32 data SIMD-friendly.
pub const ARENA_ALIGN: usize = 16;

/// Location of one tensor inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSlot {
    /// Byte offset from the start of the arena. Always `ARENA_ALIGN`-aligned.
    pub offset: usize,
    /// Number of f32 elements.
    pub len: usize,
}

impl ArenaSlot {
    pub fn nbytes(&self) -> usize {
        self.len * 4
    }

    pub fn end(&self) -> usize {
        self.offset + self.nbytes()
    }

    /// True if the two slots share at least one byte.
    pub fn overlaps(&self, other: &ArenaSlot) -> bool {
        self.len > 0 && other.len > 0 && self.offset < other.end() && other.offset < self.end()
    }

    fn words(&self) -> Range<usize> {
        let start = self.offset / 4;
        start..start + self.len
    }
}

/// A fixed-capacity scratch arena.
///
/// Storage is kept as f32 words so tensor views need no reinterpretation.
pub struct Arena {
    buf: Vec<f32>,
    capacity: usize,
    used: usize,
}

impl Arena {
    /// Create an arena with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0f32; capacity / 4],
            capacity,
            used: 0,
        }
    }

    /// Claim `required` bytes for the current memory plan.
    pub fn commit(&mut self, required: usize) -> Result<(), AllocError> {
        if required > self.capacity {
            return Err(AllocError::ArenaTooSmall {
                required,
                capacity: self.capacity,
            });
        }
        self.used = required;
        Ok(())
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes claimed by the committed plan.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes left over.
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    pub fn slice(&self, slot: ArenaSlot) -> &[f32] {
        &self.buf[slot.words()]
    }

    pub fn slice_mut(&mut self, slot: ArenaSlot) -> &mut [f32] {
        &mut self.buf[slot.words()]
    }

    /// Borrow several input slots and one output slot at the same time.
    /// Input views are written into `views` in order.
    ///
    /// The output must not overlap any input; the planner guarantees this
    /// for tensors that are live during the same op.
    pub fn split_io<'a>(
        &'a mut self,
        inputs: &[ArenaSlot],
        output: ArenaSlot,
        views: &mut [&'a [f32]],
    ) -> Result<&'a mut [f32], AllocError> {
        if let Some(clash) = inputs.iter().find(|s| s.overlaps(&output)) {
            return Err(AllocError::Overlap {
                input_offset: clash.offset,
                output_offset: output.offset,
            });
        }

        let out = output.words();
        let (head, rest) = self.buf.split_at_mut(out.start);
        let (out_buf, tail) = rest.split_at_mut(out.len());
        let head: &'a [f32] = head;
        let tail: &'a [f32] = tail;

        for (view, slot) in views.iter_mut().zip(inputs) {
            let w = slot.words();
            *view = if w.end <= out.start {
                &head[w]
            } else {
                &tail[w.start - out.end..w.end - out.end]
            };
        }

        Ok(out_buf)
    }
}
