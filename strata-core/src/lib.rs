//! Strata provides strided, arbitrary-rank tensors and the accelerator runtime
//! they run on, for distributed multilinear algebra.
//!
//! - A [`Tensor`] is shape and dimension-type metadata plus one
//!   [`StridedMemory`]. It either owns its buffer or is a view: a window into
//!   another tensor's buffer (or caller memory) that never copies.
//! - Views are taken with [`BaseTensor::view`] / [`Tensor::view_of`] (mutable)
//!   or [`BaseTensor::const_view`] / [`Tensor::const_view_of`] (read-only).
//!   Selecting a single index drops that dimension.
//! - The [`gpu`] module picks one accelerator per process of a multi-process
//!   job from launcher environment variables, and manages queues and
//!   completion markers on it.
//!
//! ## Views
//! ```
//! use strata_core::{BaseTensor, Cpu, DimensionRange, DimensionType, Tensor, ALL};
//!
//! let mut t = Tensor::<f32, Cpu>::new(
//!     [4, 6].into(),
//!     [DimensionType::Sample, DimensionType::Channel].into(),
//! )
//! .unwrap();
//! assert!(t.is_contiguous());
//!
//! let mut row = t.view_of(&[DimensionRange::Index(2), ALL]).unwrap();
//! assert_eq!(row.shape().as_slice(), &[6]);
//! assert_eq!(row.dim_types().as_slice(), &[DimensionType::Channel]);
//!
//! row.set(&[5], 3.0).unwrap();
//! assert_eq!(t.get(&[2, 5]).unwrap(), 3.0);
//! ```
//!
//! ## Accelerators
//! With the `cuda` feature, call [`gpu::init_runtime`] once per process before
//! creating `Gpu` tensors. Logging goes through `tracing`; see
//! [`logging::init_logging`] for a subscriber suited to multi-process jobs.

#[cfg(feature = "cuda")]
mod cuda_backend;
mod device;
mod dtype;
mod error;
pub mod gpu;
pub mod logging;
mod storage;
mod strided_memory;
mod tensor;
mod tuple;

#[cfg(feature = "cuda")]
pub use cuda_backend::{CudaAccelerator, CudaMarker, CudaQueue};
#[cfg(feature = "cuda")]
pub use device::Gpu;
pub use device::{Cpu, Dev, Device};
pub use dtype::DType;
pub use error::{fatal, Error, OrAbort, Result};
pub use storage::RawBuffer;
pub use strided_memory::{Ownership, StridedMemory};
pub use tensor::{AnyTensor, BaseTensor, Tensor, ViewType};
pub use tuple::{
    are_strides_contiguous, contiguous_strides, filter_by_trivial, get_range_shape,
    product, CoordTuple, DimensionRange, DimensionType, DimensionTypeTuple,
    NTuple, ShapeTuple, SingleCoordTuple, StrideTuple, ALL, MAX_TENSOR_DIMS,
};
