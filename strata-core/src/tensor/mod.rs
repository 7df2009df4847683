pub mod concretetensor;

pub use concretetensor::Tensor;

#[cfg(feature = "cuda")]
use crate::device::Gpu;
use crate::{
    device::{Cpu, Device},
    tuple::are_strides_contiguous,
    DType, DimensionTypeTuple, Result, ShapeTuple, StrideTuple,
};

/// Whether a tensor owns its storage, and if not, how it may access it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ViewType {
    /// Not a view; the tensor owns its storage.
    #[default]
    None,
    Mutable,
    Const,
}

/// Operations every tensor backend provides.
pub trait BaseTensor<T: DType> {
    fn shape(&self) -> &ShapeTuple;

    fn dim_types(&self) -> &DimensionTypeTuple;

    fn view_type(&self) -> ViewType;

    fn device(&self) -> Device;

    fn strides(&self) -> &StrideTuple;

    fn stride(&self, i: usize) -> usize {
        self.strides()[i]
    }

    fn is_contiguous(&self) -> bool {
        are_strides_contiguous(self.shape(), self.strides())
    }

    /// Release storage and reset to an empty, non-view tensor.
    ///
    /// For a view this only detaches it; the viewed storage is untouched.
    fn empty(&mut self);

    /// Reallocate with `new_shape`, keeping the leading dimension types.
    /// Contents are not preserved.
    fn resize(&mut self, new_shape: ShapeTuple) -> Result<()>;

    fn resize_with_dim_types(
        &mut self,
        new_shape: ShapeTuple,
        new_dim_types: DimensionTypeTuple,
    ) -> Result<()>;

    /// Mutable pointer to the first element. Fails on a const view.
    fn data(&mut self) -> Result<*mut T>;

    fn const_data(&self) -> *const T;

    fn get(&self, coord: &[usize]) -> Result<T>;

    fn view(&mut self) -> Result<Self>
    where
        Self: Sized;

    fn const_view(&self) -> Result<Self>
    where
        Self: Sized;

    /// A view of this tensor if it is already contiguous.
    ///
    /// Repacking a strided tensor is not supported and fails with
    /// [`crate::Error::NotImplemented`].
    fn contiguous(&mut self) -> Result<Self>
    where
        Self: Sized;

    fn unview(&mut self);
}

/// A tensor on any of the supported backends.
#[derive(Debug)]
pub enum AnyTensor<T: DType> {
    Cpu(Tensor<T, Cpu>),
    #[cfg(feature = "cuda")]
    Gpu(Tensor<T, Gpu>),
}

macro_rules! dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            AnyTensor::Cpu($t) => $body,
            #[cfg(feature = "cuda")]
            AnyTensor::Gpu($t) => $body,
        }
    };
}

macro_rules! dispatch_wrap {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            AnyTensor::Cpu($t) => $body.map(AnyTensor::Cpu),
            #[cfg(feature = "cuda")]
            AnyTensor::Gpu($t) => $body.map(AnyTensor::Gpu),
        }
    };
}

impl<T: DType> BaseTensor<T> for AnyTensor<T> {
    fn shape(&self) -> &ShapeTuple {
        dispatch!(self, t => t.shape())
    }

    fn dim_types(&self) -> &DimensionTypeTuple {
        dispatch!(self, t => t.dim_types())
    }

    fn view_type(&self) -> ViewType {
        dispatch!(self, t => t.view_type())
    }

    fn device(&self) -> Device {
        dispatch!(self, t => t.device())
    }

    fn strides(&self) -> &StrideTuple {
        dispatch!(self, t => t.strides())
    }

    fn empty(&mut self) {
        dispatch!(self, t => t.empty())
    }

    fn resize(&mut self, new_shape: ShapeTuple) -> Result<()> {
        dispatch!(self, t => t.resize(new_shape))
    }

    fn resize_with_dim_types(
        &mut self,
        new_shape: ShapeTuple,
        new_dim_types: DimensionTypeTuple,
    ) -> Result<()> {
        dispatch!(self, t => t.resize_with_dim_types(new_shape, new_dim_types))
    }

    fn data(&mut self) -> Result<*mut T> {
        dispatch!(self, t => t.data())
    }

    fn const_data(&self) -> *const T {
        dispatch!(self, t => t.const_data())
    }

    fn get(&self, coord: &[usize]) -> Result<T> {
        dispatch!(self, t => t.get(coord))
    }

    fn view(&mut self) -> Result<Self> {
        dispatch_wrap!(self, t => t.view())
    }

    fn const_view(&self) -> Result<Self> {
        dispatch_wrap!(self, t => t.const_view())
    }

    fn contiguous(&mut self) -> Result<Self> {
        dispatch_wrap!(self, t => t.contiguous())
    }

    fn unview(&mut self) {
        dispatch!(self, t => t.unview())
    }
}

impl<T: DType> From<Tensor<T, Cpu>> for AnyTensor<T> {
    fn from(t: Tensor<T, Cpu>) -> Self {
        Self::Cpu(t)
    }
}

#[cfg(feature = "cuda")]
impl<T: DType> From<Tensor<T, Gpu>> for AnyTensor<T> {
    fn from(t: Tensor<T, Gpu>) -> Self {
        Self::Gpu(t)
    }
}
