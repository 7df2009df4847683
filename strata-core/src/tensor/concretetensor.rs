use crate::{
    device::{Device, Dev},
    strided_memory::{Ownership, StridedMemory},
    tuple::{filter_by_trivial, get_range_shape, DimensionRange},
    DType, DimensionType, DimensionTypeTuple, Error, Result, ShapeTuple, StrideTuple,
};

use super::{BaseTensor, ViewType};

/// A local tensor whose elements live on device `D`.
///
/// A tensor either owns its storage or is a view aliasing another tensor's
/// storage (or caller memory). Views are independent values: dropping or
/// emptying one never touches its parent.
pub struct Tensor<T: DType, D: Dev> {
    shape: ShapeTuple,
    dim_types: DimensionTypeTuple,
    view_type: ViewType,
    memory: StridedMemory<T, D>,
}

impl<T: DType, D: Dev> Default for Tensor<T, D> {
    fn default() -> Self {
        Self {
            shape: ShapeTuple::new(),
            dim_types: DimensionTypeTuple::new(),
            view_type: ViewType::None,
            memory: StridedMemory::default(),
        }
    }
}

fn check_ranks(shape: &ShapeTuple, dim_types: &DimensionTypeTuple) -> Result<()> {
    if shape.size() != dim_types.size() {
        return Err(Error::RankMismatch {
            expected: shape.size(),
            got: dim_types.size(),
        });
    }
    Ok(())
}

impl<T: DType, D: Dev> Tensor<T, D> {
    /// Allocate a zero-filled, contiguous tensor.
    pub fn new(shape: ShapeTuple, dim_types: DimensionTypeTuple) -> Result<Self> {
        check_ranks(&shape, &dim_types)?;
        let memory = StridedMemory::new(&shape)?;
        Ok(Self {
            shape,
            dim_types,
            view_type: ViewType::None,
            memory,
        })
    }

    /// Wrap caller memory as a mutable view.
    ///
    /// # Safety
    /// `buffer` must stay valid on device `D` for every offset reachable
    /// through `shape` and `strides` while this tensor, or any view of it, is
    /// used.
    pub unsafe fn from_raw_parts(
        buffer: *mut T,
        shape: ShapeTuple,
        dim_types: DimensionTypeTuple,
        strides: StrideTuple,
    ) -> Result<Self> {
        check_ranks(&shape, &dim_types)?;
        let memory = StridedMemory::from_raw_parts(buffer, shape.clone(), strides)?;
        Ok(Self {
            shape,
            dim_types,
            view_type: ViewType::Mutable,
            memory,
        })
    }

    /// Wrap read-only caller memory as a const view.
    ///
    /// # Safety
    /// Same contract as [`Tensor::from_raw_parts`].
    pub unsafe fn from_raw_parts_const(
        buffer: *const T,
        shape: ShapeTuple,
        dim_types: DimensionTypeTuple,
        strides: StrideTuple,
    ) -> Result<Self> {
        check_ranks(&shape, &dim_types)?;
        let memory = StridedMemory::from_raw_parts_const(buffer, shape.clone(), strides)?;
        Ok(Self {
            shape,
            dim_types,
            view_type: ViewType::Const,
            memory,
        })
    }

    fn make_view(&self, view_type: ViewType, coords: &[DimensionRange]) -> Result<Self> {
        let shape = get_range_shape(coords, &self.shape)?;
        let dim_types = filter_by_trivial(coords, &self.dim_types);
        let memory = match view_type {
            ViewType::Const => StridedMemory::from_parent_const(&self.memory, coords)?,
            _ => StridedMemory::from_parent(&self.memory, coords)?,
        };
        Ok(Self {
            shape,
            dim_types,
            view_type,
            memory,
        })
    }

    pub fn shape_at(&self, i: usize) -> usize {
        self.shape[i]
    }

    pub fn dim_type(&self, i: usize) -> DimensionType {
        self.dim_types[i]
    }

    pub fn ndim(&self) -> usize {
        self.shape.size()
    }

    pub fn numel(&self) -> usize {
        self.memory.numel()
    }

    /// Whether the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    pub fn is_view(&self) -> bool {
        self.view_type != ViewType::None
    }

    pub fn is_const_view(&self) -> bool {
        self.view_type == ViewType::Const
    }

    pub fn ownership(&self) -> Ownership {
        self.memory.ownership()
    }

    /// A mutable view of the region selected by `coords`.
    ///
    /// Coordinates past the given ones select whole dimensions; single indices
    /// drop their dimension from the view.
    pub fn view_of(&mut self, coords: &[DimensionRange]) -> Result<Self> {
        if self.is_const_view() {
            return Err(Error::invalid_access(
                "cannot take a mutable view of a const view",
            ));
        }
        self.make_view(ViewType::Mutable, coords)
    }

    /// A const view of the region selected by `coords`.
    pub fn const_view_of(&self, coords: &[DimensionRange]) -> Result<Self> {
        self.make_view(ViewType::Const, coords)
    }

    /// Write one element.
    pub fn set(&mut self, coord: &[usize], value: T) -> Result<()> {
        if self.is_const_view() {
            return Err(Error::invalid_access("cannot write through a const view"));
        }
        self.memory.set(coord, value)
    }
}

impl<T: DType, D: Dev> BaseTensor<T> for Tensor<T, D> {
    fn shape(&self) -> &ShapeTuple {
        &self.shape
    }

    fn dim_types(&self) -> &DimensionTypeTuple {
        &self.dim_types
    }

    fn view_type(&self) -> ViewType {
        self.view_type
    }

    fn device(&self) -> Device {
        D::DEVICE
    }

    fn strides(&self) -> &StrideTuple {
        self.memory.strides()
    }

    fn empty(&mut self) {
        self.memory = StridedMemory::default();
        self.shape = ShapeTuple::new();
        self.dim_types = DimensionTypeTuple::new();
        if self.is_view() {
            self.view_type = ViewType::None;
        }
    }

    fn resize(&mut self, new_shape: ShapeTuple) -> Result<()> {
        if self.is_view() {
            return Err(Error::invalid_op("cannot resize a view"));
        }
        if new_shape.size() > self.shape.size() {
            return Err(Error::invalid_op(
                "must provide dimension types to resize larger",
            ));
        }
        self.memory = StridedMemory::new(&new_shape)?;
        self.dim_types.truncate(new_shape.size());
        self.shape = new_shape;
        Ok(())
    }

    fn resize_with_dim_types(
        &mut self,
        new_shape: ShapeTuple,
        new_dim_types: DimensionTypeTuple,
    ) -> Result<()> {
        if self.is_view() {
            return Err(Error::invalid_op("cannot resize a view"));
        }
        check_ranks(&new_shape, &new_dim_types)?;
        self.memory = StridedMemory::new(&new_shape)?;
        self.shape = new_shape;
        self.dim_types = new_dim_types;
        Ok(())
    }

    fn data(&mut self) -> Result<*mut T> {
        if self.is_const_view() {
            return Err(Error::invalid_access(
                "cannot access non-const buffer of const view",
            ));
        }
        self.memory.data()
    }

    fn const_data(&self) -> *const T {
        self.memory.const_data()
    }

    fn get(&self, coord: &[usize]) -> Result<T> {
        self.memory.get(coord)
    }

    fn view(&mut self) -> Result<Self> {
        self.view_of(&[])
    }

    fn const_view(&self) -> Result<Self> {
        self.const_view_of(&[])
    }

    fn contiguous(&mut self) -> Result<Self> {
        if !self.is_contiguous() {
            return Err(Error::NotImplemented(
                "contiguous() of a non-contiguous tensor".to_string(),
            ));
        }
        if self.is_const_view() {
            self.const_view()
        } else {
            self.view()
        }
    }

    fn unview(&mut self) {
        debug_assert!(self.is_view(), "must be a view to unview");
        // Emptying a view is equivalent to unviewing.
        self.empty();
    }
}

impl<T: DType, D: Dev> std::fmt::Debug for Tensor<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("device", &D::DEVICE)
            .field("dtype", &T::NAME)
            .field("shape", &self.shape)
            .field("dim_types", &self.dim_types)
            .field("strides", self.memory.strides())
            .field("view_type", &self.view_type)
            .field("ownership", &self.memory.ownership())
            .finish()
    }
}
