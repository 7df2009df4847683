use std::{
    ffi::c_void,
    mem::size_of,
    ptr::NonNull,
    sync::{Arc, Mutex, PoisonError},
};

use cudarc::driver::{
    result::{self, stream::StreamKind},
    sys::{self, CUdevice_attribute, CUevent_flags},
    CudaContext,
};
use error::{CudaError, WrapErr};

use crate::{
    gpu::{self, Accelerator, DeviceProperties, MarkerKind, QueueKind, RawHandle},
    storage::RawBuffer,
    DType, Error, OrAbort, Result,
};

pub(crate) mod error;

/// An asynchronous CUDA stream.
#[derive(Debug)]
pub struct CudaQueue(sys::CUstream);

impl CudaQueue {
    pub fn as_stream(&self) -> sys::CUstream {
        self.0
    }
}

impl RawHandle for CudaQueue {
    fn as_raw(&self) -> *const c_void {
        self.0 as *const c_void
    }
}

/// A CUDA event.
#[derive(Debug)]
pub struct CudaMarker(sys::CUevent);

impl CudaMarker {
    pub fn as_event(&self) -> sys::CUevent {
        self.0
    }
}

impl RawHandle for CudaMarker {
    fn as_raw(&self) -> *const c_void {
        self.0 as *const c_void
    }
}

/// The CUDA driver, bound to at most one device (through its primary
/// context) at a time.
#[derive(Default)]
pub struct CudaAccelerator {
    context: Mutex<Option<Arc<CudaContext>>>,
}

impl CudaAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound context, made current on the calling thread.
    pub fn bind(&self) -> Result<Arc<CudaContext>> {
        let ctx = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CudaError::NoDeviceBound)?;
        ctx.bind_to_thread().w()?;
        Ok(ctx)
    }
}

fn device_handle(id: usize) -> Result<sys::CUdevice> {
    let ordinal = i32::try_from(id).map_err(|_| CudaError::BadOrdinal { id })?;
    result::device::get(ordinal).w()
}

impl Accelerator for CudaAccelerator {
    type Queue = CudaQueue;
    type Marker = CudaMarker;

    fn init(&self) -> Result<()> {
        result::init().w()
    }

    fn device_count(&self) -> Result<usize> {
        let count = result::device::get_count().w()?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn current_device(&self) -> Result<usize> {
        Ok(self.bind()?.ordinal())
    }

    fn set_device(&self, id: usize) -> Result<()> {
        let ctx = CudaContext::new(id).w()?;
        ctx.bind_to_thread().w()?;
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = Some(ctx);
        Ok(())
    }

    fn device_properties(&self, id: usize) -> Result<DeviceProperties> {
        let dev = device_handle(id)?;
        let name = result::device::get_name(dev).w()?;
        let pci_bus_id = unsafe {
            result::device::get_attribute(dev, CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_BUS_ID)
        }
        .w()?;
        Ok(DeviceProperties {
            name,
            pci_bus_id: pci_bus_id as u32,
        })
    }

    fn create_queue(&self, kind: QueueKind) -> Result<CudaQueue> {
        self.bind()?;
        let kind = match kind {
            QueueKind::Blocking => StreamKind::Default,
            QueueKind::NonBlocking => StreamKind::NonBlocking,
        };
        Ok(CudaQueue(result::stream::create(kind).w()?))
    }

    fn destroy_queue(&self, queue: CudaQueue) -> Result<()> {
        self.bind()?;
        unsafe { result::stream::destroy(queue.0) }.w()
    }

    fn synchronize_queue(&self, queue: &CudaQueue) -> Result<()> {
        self.bind()?;
        unsafe { result::stream::synchronize(queue.0) }.w()
    }

    fn create_marker(&self, kind: MarkerKind) -> Result<CudaMarker> {
        self.bind()?;
        let flags = match kind {
            MarkerKind::Timing => CUevent_flags::CU_EVENT_DEFAULT,
            MarkerKind::NoTiming => CUevent_flags::CU_EVENT_DISABLE_TIMING,
        };
        Ok(CudaMarker(result::event::create(flags).w()?))
    }

    fn destroy_marker(&self, marker: CudaMarker) -> Result<()> {
        self.bind()?;
        unsafe { result::event::destroy(marker.0) }.w()
    }

    fn record_marker(&self, marker: &CudaMarker, queue: &CudaQueue) -> Result<()> {
        self.bind()?;
        unsafe { result::event::record(marker.0, queue.0) }.w()
    }

    fn synchronize_marker(&self, marker: &CudaMarker) -> Result<()> {
        self.bind()?;
        unsafe { result::event::synchronize(marker.0) }.w()
    }

    fn synchronize(&self) -> Result<()> {
        self.bind()?.synchronize().w()
    }
}

fn bound_runtime() -> Result<&'static CudaAccelerator> {
    if !gpu::runtime_is_initialized() {
        return Err(Error::invalid_op(
            "the gpu runtime must be initialized before using device memory",
        ));
    }
    let accel = gpu::runtime().accelerator();
    accel.bind()?;
    Ok(accel)
}

unsafe fn release_device<T: DType>(ptr: NonNull<T>, _len: usize) {
    gpu::runtime()
        .accelerator()
        .bind()
        .and_then(|_| unsafe { result::free_sync(ptr.as_ptr() as sys::CUdeviceptr) }.w())
        .or_abort();
}

pub(crate) fn allocate<T: DType>(len: usize) -> Result<RawBuffer<T>> {
    bound_runtime()?;
    let bytes = len
        .checked_mul(size_of::<T>())
        .ok_or_else(|| Error::ShapeOverflow { shape: vec![len] })?;
    let dptr = unsafe { result::malloc_sync(bytes) }.w()?;
    unsafe { result::memset_d8_sync(dptr, 0, bytes) }.w()?;
    let ptr = NonNull::new(dptr as usize as *mut T)
        .ok_or_else(|| Error::msg("device allocation returned a null pointer"))?;
    // SAFETY: `ptr` is a fresh device allocation of `len` elements, freed
    // once by `release_device`.
    Ok(unsafe { RawBuffer::from_raw(ptr, len, release_device::<T>) })
}

/// # Safety
/// `ptr` must address a live device element.
pub(crate) unsafe fn read<T: DType>(ptr: *const T) -> Result<T> {
    bound_runtime()?;
    let mut out = [T::ZERO];
    result::memcpy_dtoh_sync(&mut out, ptr as sys::CUdeviceptr).w()?;
    Ok(out[0])
}

/// # Safety
/// `ptr` must address a live, writable device element.
pub(crate) unsafe fn write<T: DType>(ptr: *mut T, value: T) -> Result<()> {
    bound_runtime()?;
    result::memcpy_htod_sync(ptr as sys::CUdeviceptr, &[value]).w()
}
