use std::{fmt, ptr::NonNull};

use crate::{device::Dev, DType};

/// An exclusively owned allocation of `len` elements on some device.
///
/// The buffer is released through the function pointer supplied by the device
/// that allocated it, so host and accelerator allocations share one type.
pub struct RawBuffer<T: DType> {
    ptr: NonNull<T>,
    len: usize,
    release: unsafe fn(NonNull<T>, usize),
}

impl<T: DType> RawBuffer<T> {
    /// # Safety
    /// `ptr` must point to an allocation of `len` elements that `release`
    /// can free exactly once.
    pub(crate) unsafe fn from_raw(
        ptr: NonNull<T>,
        len: usize,
        release: unsafe fn(NonNull<T>, usize),
    ) -> Self {
        Self { ptr, len, release }
    }

    pub(crate) fn allocate<D: Dev>(len: usize) -> crate::Result<Self> {
        D::allocate(len)
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Number of elements in the allocation.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl<T: DType> Drop for RawBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: the constructor contract guarantees `release` matches the
        // allocation, and drop runs once.
        unsafe { (self.release)(self.ptr, self.len) }
    }
}

impl<T: DType> fmt::Debug for RawBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
