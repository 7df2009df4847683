use std::{fmt::Debug, ptr::NonNull};

use crate::{storage::RawBuffer, DType, Error, Result};

/// Backend tag carried by every tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    #[cfg(feature = "cuda")]
    Gpu,
}

/// Marker trait for devices.
///
/// A device knows how to allocate element buffers and how to move a single
/// element between its memory and the host.
pub trait Dev: Clone + Copy + Debug + Default + 'static {
    const DEVICE: Device;

    /// Allocate `len` zero-initialized elements.
    fn allocate<T: DType>(len: usize) -> Result<RawBuffer<T>>;

    /// # Safety
    /// `ptr` must address a live element in this device's memory.
    unsafe fn read<T: DType>(ptr: *const T) -> Result<T>;

    /// # Safety
    /// `ptr` must address a live, writable element in this device's memory.
    unsafe fn write<T: DType>(ptr: *mut T, value: T) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Cpu;

unsafe fn release_host<T: DType>(ptr: NonNull<T>, len: usize) {
    let slice = std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len);
    drop(Box::from_raw(slice));
}

impl Dev for Cpu {
    const DEVICE: Device = Device::Cpu;

    fn allocate<T: DType>(len: usize) -> Result<RawBuffer<T>> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| Error::msg(format!("cannot allocate {len} x {}: {e}", T::NAME)))?;
        data.resize(len, T::ZERO);
        let data = data.into_boxed_slice();
        let ptr = NonNull::from(Box::leak(data)).cast::<T>();
        // SAFETY: the pointer came from a boxed slice of exactly `len` elements.
        Ok(unsafe { RawBuffer::from_raw(ptr, len, release_host::<T>) })
    }

    unsafe fn read<T: DType>(ptr: *const T) -> Result<T> {
        Ok(ptr.read())
    }

    unsafe fn write<T: DType>(ptr: *mut T, value: T) -> Result<()> {
        ptr.write(value);
        Ok(())
    }
}

#[cfg(feature = "cuda")]
#[derive(Clone, Copy, Debug, Default)]
pub struct Gpu;

#[cfg(feature = "cuda")]
impl Dev for Gpu {
    const DEVICE: Device = Device::Gpu;

    fn allocate<T: DType>(len: usize) -> Result<RawBuffer<T>> {
        crate::cuda_backend::allocate(len)
    }

    unsafe fn read<T: DType>(ptr: *const T) -> Result<T> {
        crate::cuda_backend::read(ptr)
    }

    unsafe fn write<T: DType>(ptr: *mut T, value: T) -> Result<()> {
        crate::cuda_backend::write(ptr, value)
    }
}
