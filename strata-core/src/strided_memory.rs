//! Strided views over linear buffers.

use std::{marker::PhantomData, ptr::NonNull, sync::Arc};

use crate::{
    device::Dev,
    storage::RawBuffer,
    tuple::{contiguous_strides, normalize_coords, product, DimensionRange},
    DType, Error, Result, ShapeTuple, StrideTuple,
};

/// Who is responsible for the buffer behind a [`StridedMemory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// No buffer at all.
    Empty,
    /// Exclusively owned, freed when the memory is dropped.
    Owned,
    /// Caller-supplied pointer; the caller keeps it alive.
    Borrowed,
    /// Shares a buffer owned by another memory object.
    Aliased,
}

enum Buffer<T: DType> {
    Empty,
    Owned(Arc<RawBuffer<T>>),
    Borrowed(NonNull<T>),
    Aliased(Arc<RawBuffer<T>>),
}

impl<T: DType> Buffer<T> {
    fn base(&self) -> *mut T {
        match self {
            Self::Empty => std::ptr::null_mut(),
            Self::Owned(buf) | Self::Aliased(buf) => buf.as_ptr(),
            Self::Borrowed(ptr) => ptr.as_ptr(),
        }
    }

    fn alias(&self) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Owned(buf) | Self::Aliased(buf) => Self::Aliased(buf.clone()),
            Self::Borrowed(ptr) => Self::Borrowed(*ptr),
        }
    }
}

/// Maps an N-dimensional index to a position in a linear buffer through
/// per-dimension strides (in elements).
///
/// An aliasing memory keeps the owner's allocation alive through a shared
/// reference count, so releasing the owner never invalidates its aliases.
/// Borrowed memory carries no such guarantee.
pub struct StridedMemory<T: DType, D: Dev> {
    buffer: Buffer<T>,
    offset: usize,
    shape: ShapeTuple,
    strides: StrideTuple,
    numel: usize,
    read_only: bool,
    _device: PhantomData<D>,
}

/// Logical element count. A rank-0 region over a live buffer is one scalar.
fn element_count<T: DType>(shape: &[usize], buffer: &Buffer<T>) -> Result<usize> {
    match (shape.is_empty(), buffer) {
        (true, Buffer::Empty) => Ok(0),
        (true, _) => Ok(1),
        (false, _) => product(shape),
    }
}

impl<T: DType, D: Dev> Default for StridedMemory<T, D> {
    fn default() -> Self {
        Self {
            buffer: Buffer::Empty,
            offset: 0,
            shape: ShapeTuple::new(),
            strides: StrideTuple::new(),
            numel: 0,
            read_only: false,
            _device: PhantomData,
        }
    }
}

impl<T: DType, D: Dev> StridedMemory<T, D> {
    /// Allocate a contiguous buffer for `shape`.
    ///
    /// Shapes whose element count or strides overflow `usize` are refused with
    /// [`Error::ShapeOverflow`].
    pub fn new(shape: &ShapeTuple) -> Result<Self> {
        let len = product(shape)?;
        let strides = contiguous_strides(shape)?;
        let buffer = if len == 0 {
            Buffer::Empty
        } else {
            Buffer::Owned(Arc::new(RawBuffer::allocate::<D>(len)?))
        };
        Ok(Self {
            buffer,
            offset: 0,
            shape: shape.clone(),
            strides,
            numel: len,
            read_only: false,
            _device: PhantomData,
        })
    }

    /// Wrap memory owned by the caller.
    ///
    /// # Safety
    /// `ptr` must be valid for every offset reachable through `shape` and
    /// `strides`, on device `D`, for as long as this memory or anything derived
    /// from it is used.
    pub unsafe fn from_raw_parts(
        ptr: *mut T,
        shape: ShapeTuple,
        strides: StrideTuple,
    ) -> Result<Self> {
        Self::wrap(ptr, shape, strides, false)
    }

    /// Wrap read-only memory owned by the caller. Mutable access is refused.
    ///
    /// # Safety
    /// Same contract as [`StridedMemory::from_raw_parts`].
    pub unsafe fn from_raw_parts_const(
        ptr: *const T,
        shape: ShapeTuple,
        strides: StrideTuple,
    ) -> Result<Self> {
        Self::wrap(ptr.cast_mut(), shape, strides, true)
    }

    unsafe fn wrap(
        ptr: *mut T,
        shape: ShapeTuple,
        strides: StrideTuple,
        read_only: bool,
    ) -> Result<Self> {
        if shape.size() != strides.size() {
            return Err(Error::RankMismatch {
                expected: shape.size(),
                got: strides.size(),
            });
        }
        let buffer = match NonNull::new(ptr) {
            Some(ptr) => Buffer::Borrowed(ptr),
            None => Buffer::Empty,
        };
        let numel = element_count(&shape, &buffer)?;
        Ok(Self {
            buffer,
            offset: 0,
            shape,
            strides,
            numel,
            read_only,
            _device: PhantomData,
        })
    }

    /// Alias the region of `parent` selected by `coords`.
    ///
    /// Ranges keep their dimension with the parent's stride, single indices
    /// drop it and only advance the offset.
    pub fn from_parent(parent: &Self, coords: &[DimensionRange]) -> Result<Self> {
        let coords = normalize_coords(coords, &parent.shape)?;
        let mut shape = ShapeTuple::new();
        let mut strides = StrideTuple::new();
        let mut offset = parent.offset;
        for ((c, &dim), &stride) in coords.iter().zip(parent.shape.iter()).zip(parent.strides.iter()) {
            offset = c
                .start()
                .checked_mul(stride)
                .and_then(|step| offset.checked_add(step))
                .ok_or_else(|| Error::ShapeOverflow {
                    shape: parent.shape.to_vec(),
                })?;
            if !c.is_trivial() {
                shape.push(c.len_in(dim));
                strides.push(stride);
            }
        }
        let buffer = parent.buffer.alias();
        let numel = element_count(&shape, &buffer)?;
        Ok(Self {
            buffer,
            offset,
            shape,
            strides,
            numel,
            read_only: parent.read_only,
            _device: PhantomData,
        })
    }

    /// Like [`StridedMemory::from_parent`], but the alias refuses mutable access.
    pub fn from_parent_const(parent: &Self, coords: &[DimensionRange]) -> Result<Self> {
        let mut mem = Self::from_parent(parent, coords)?;
        mem.read_only = true;
        Ok(mem)
    }

    pub fn ownership(&self) -> Ownership {
        match self.buffer {
            Buffer::Empty => Ownership::Empty,
            Buffer::Owned(_) => Ownership::Owned,
            Buffer::Borrowed(_) => Ownership::Borrowed,
            Buffer::Aliased(_) => Ownership::Aliased,
        }
    }

    pub fn shape(&self) -> &ShapeTuple {
        &self.shape
    }

    pub fn strides(&self) -> &StrideTuple {
        &self.strides
    }

    /// Number of addressable elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Offset of element zero from the start of the buffer, in elements.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Pointer to element zero. Null when there is no buffer.
    pub fn data(&self) -> Result<*mut T> {
        if self.read_only {
            return Err(Error::invalid_access(
                "cannot access non-const buffer of const memory",
            ));
        }
        Ok(self.ptr_at(self.offset))
    }

    pub fn const_data(&self) -> *const T {
        self.ptr_at(self.offset)
    }

    fn ptr_at(&self, offset: usize) -> *mut T {
        let base = self.buffer.base();
        if base.is_null() {
            base
        } else {
            // Device pointers are not host allocations, so no in-bounds
            // arithmetic is assumed here.
            base.wrapping_add(offset)
        }
    }

    /// Buffer offset of the element at `coord`.
    ///
    /// Offsets into owned or aliased buffers are also checked against the
    /// allocation length.
    pub fn index_of(&self, coord: &[usize]) -> Result<usize> {
        let out_of_bounds = || Error::OutOfBounds {
            coord: coord.to_vec(),
            shape: self.shape.to_vec(),
        };
        let in_shape = coord.len() == self.shape.size()
            && coord.iter().zip(self.shape.iter()).all(|(c, d)| c < d);
        if !in_shape {
            return Err(out_of_bounds());
        }
        let idx = coord
            .iter()
            .zip(self.strides.iter())
            .try_fold(self.offset, |acc, (c, s)| {
                c.checked_mul(*s).and_then(|step| acc.checked_add(step))
            })
            .ok_or_else(out_of_bounds)?;
        match &self.buffer {
            Buffer::Empty => Err(out_of_bounds()),
            Buffer::Owned(buf) | Buffer::Aliased(buf) if idx >= buf.len() => Err(out_of_bounds()),
            _ => Ok(idx),
        }
    }

    /// Read the element at `coord`.
    pub fn get(&self, coord: &[usize]) -> Result<T> {
        let idx = self.index_of(coord)?;
        // SAFETY: the index is inside the shape and, for owned or aliased
        // buffers, inside the allocation kept alive by the Arc. Borrowed
        // buffers are valid under the caller's contract.
        unsafe { D::read(self.ptr_at(idx)) }
    }

    /// Write the element at `coord`.
    pub fn set(&self, coord: &[usize], value: T) -> Result<()> {
        if self.read_only {
            return Err(Error::invalid_access("cannot write through const memory"));
        }
        let idx = self.index_of(coord)?;
        // SAFETY: see `get`.
        unsafe { D::write(self.ptr_at(idx), value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cpu, ALL};

    #[test]
    fn owning_memory_is_contiguous() {
        let mem = StridedMemory::<f32, Cpu>::new(&ShapeTuple::from([2, 3, 4])).unwrap();
        assert_eq!(mem.ownership(), Ownership::Owned);
        assert_eq!(mem.strides().as_slice(), &[12, 4, 1]);
        assert_eq!(mem.offset(), 0);
        assert!(!mem.const_data().is_null());
    }

    #[test]
    fn zero_sized_memory_has_no_buffer() {
        let mem = StridedMemory::<f32, Cpu>::new(&ShapeTuple::from([3, 0])).unwrap();
        assert_eq!(mem.ownership(), Ownership::Empty);
        assert!(mem.const_data().is_null());
    }

    #[test]
    fn sub_memory_offset_and_rank() {
        let parent = StridedMemory::<i32, Cpu>::new(&ShapeTuple::from([4, 5, 6])).unwrap();
        let child = StridedMemory::from_parent(
            &parent,
            &[DimensionRange::Index(2), DimensionRange::range(1, 4), ALL],
        )
        .unwrap();
        assert_eq!(child.ownership(), Ownership::Aliased);
        assert_eq!(child.shape().as_slice(), &[3, 6]);
        assert_eq!(child.strides().as_slice(), &[6, 1]);
        assert_eq!(child.offset(), 2 * 30 + 6);
        assert_eq!(child.const_data(), parent.const_data().wrapping_add(66));
    }

    #[test]
    fn alias_outlives_owner() {
        let parent = StridedMemory::<u32, Cpu>::new(&ShapeTuple::from([2, 2])).unwrap();
        parent.set(&[1, 1], 7).unwrap();
        let child = StridedMemory::from_parent(&parent, &[DimensionRange::Index(1)]).unwrap();
        drop(parent);
        assert_eq!(child.get(&[1]).unwrap(), 7);
    }

    #[test]
    fn const_alias_refuses_writes() {
        let parent = StridedMemory::<f64, Cpu>::new(&ShapeTuple::from([3])).unwrap();
        let child = StridedMemory::from_parent_const(&parent, &[]).unwrap();
        assert!(matches!(child.data(), Err(Error::InvalidAccess(_))));
        assert!(matches!(child.set(&[0], 1.0), Err(Error::InvalidAccess(_))));
        assert!(!child.const_data().is_null());
    }

    #[test]
    fn borrowed_memory_aliases_caller_buffer() {
        let mut buf = [0i64; 6];
        let mem = unsafe {
            StridedMemory::<i64, Cpu>::from_raw_parts(
                buf.as_mut_ptr(),
                ShapeTuple::from([3]),
                StrideTuple::from([2]),
            )
        }
        .unwrap();
        assert_eq!(mem.ownership(), Ownership::Borrowed);
        mem.set(&[2], 9).unwrap();
        let view = StridedMemory::from_parent(&mem, &[DimensionRange::range(1, 3)]).unwrap();
        assert_eq!(view.ownership(), Ownership::Borrowed);
        assert_eq!(view.get(&[1]).unwrap(), 9);
        drop((mem, view));
        assert_eq!(buf, [0, 0, 0, 0, 9, 0]);
    }

    #[test]
    fn index_bounds() {
        let mem = StridedMemory::<u8, Cpu>::new(&ShapeTuple::from([2, 2])).unwrap();
        assert!(matches!(mem.get(&[2, 0]), Err(Error::OutOfBounds { .. })));
        assert!(matches!(mem.get(&[0]), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn oversized_shape_is_refused() {
        assert!(matches!(
            StridedMemory::<u8, Cpu>::new(&ShapeTuple::from([usize::MAX, 2])),
            Err(Error::ShapeOverflow { .. })
        ));
        assert!(matches!(
            StridedMemory::<u8, Cpu>::new(&ShapeTuple::from([usize::MAX / 2 + 2, 2])),
            Err(Error::ShapeOverflow { .. })
        ));
    }

    #[test]
    fn reads_stay_inside_the_allocation() {
        let mut mem = StridedMemory::<u8, Cpu>::new(&ShapeTuple::from([1, 2])).unwrap();
        mem.set(&[0, 1], 3).unwrap();
        // Metadata claiming more rows than were allocated.
        mem.shape = ShapeTuple::from([2000, 2]);
        assert_eq!(mem.get(&[0, 1]).unwrap(), 3);
        assert!(matches!(mem.get(&[1000, 0]), Err(Error::OutOfBounds { .. })));
        assert!(matches!(mem.set(&[1, 0], 1), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn scalar_alias_counts_one_element() {
        let parent = StridedMemory::<f32, Cpu>::new(&ShapeTuple::from([2, 3])).unwrap();
        assert_eq!(parent.numel(), 6);
        parent.set(&[1, 2], 5.0).unwrap();
        let scalar = StridedMemory::from_parent(
            &parent,
            &[DimensionRange::Index(1), DimensionRange::Index(2)],
        )
        .unwrap();
        assert!(scalar.shape().is_empty());
        assert_eq!(scalar.numel(), 1);
        assert_eq!(scalar.get(&[]).unwrap(), 5.0);
        assert_eq!(StridedMemory::<f32, Cpu>::default().numel(), 0);
    }
}
