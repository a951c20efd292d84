//! # vigil-edge
//!
//! Small neural-network interpreter for microcontroller-class targets.
//! A model blob is executed inside one fixed-size scratch arena, with a
//! compile-time sized table of kernels.
//!
//! ## Key Features
//! - `.vglm` model format: versioned single-file blob, JSON graph + aligned weights
//! - Arena with a greedy-by-size memory planner: invoke reuses the buffers laid out at
//!   allocation and makes no heap allocations on success
//! - Fixed-capacity op resolver over a closed set of kernels
//! - Scalar f32 kernels: fully-connected, activations, element-wise
//!
//! ```rust
//! use vigil_edge::{Arena, Interpreter, ModelBuilder, OpKind, OpResolver};
//!
//! let mut b = ModelBuilder::new("relu");
//! let x = b.add_tensor("x", &[3]);
//! let y = b.add_tensor("y", &[3]);
//! b.add_op(OpKind::Relu, &[x], &[y]);
//! b.inputs(&[x]).outputs(&[y]);
//!
//! let mut resolver = OpResolver::<1>::new();
//! resolver.add_relu().unwrap();
//!
//! let mut interp = Interpreter::new(b.build().unwrap(), resolver, Arena::new(2048));
//! interp.allocate_tensors().unwrap();
//! let (input, output) = (interp.input(0).unwrap(), interp.output(0).unwrap());
//! interp.write(input, &[-1.0, 0.5, 2.0]).unwrap();
//! interp.invoke().unwrap();
//! assert_eq!(interp.read(output), &[0.0, 0.5, 2.0]);
//! ```

pub mod arena;
pub mod error;
pub mod format;
pub mod interpreter;
pub mod ops;
pub mod plan;
pub mod resolver;

pub use arena::{Arena, ArenaSlot};
pub use error::{AllocError, EdgeError, InvokeError, TensorError};
pub use format::{DType, FormatError, Model, ModelBuilder, ModelHeader, TensorEntry, SCHEMA_VERSION};
pub use interpreter::{AllocationReport, Interpreter, TensorHandle};
pub use plan::MemoryPlan;
pub use resolver::{all_ops_resolver, AllOpsResolver, OpKind, OpLookup, OpResolver, ResolverError};
