//! Accelerator runtime: device selection, lifecycle, and asynchronous
//! execution resources (queues and completion markers).
//!
//! Every driver failure at this layer is fatal. It is logged at error level
//! and the process aborts; see [`crate::OrAbort`].

use std::{
    ffi::c_void,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::info;

use crate::{OrAbort, Result};

pub mod launch;

pub use launch::{select_device, LaunchEnv};

/// Target used for every record emitted by the runtime.
pub const LOG_TARGET: &str = "strata::gpu";

/// How a new queue orders itself against the device's default queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    /// Implicitly synchronizes with the default queue.
    Blocking,
    /// Runs concurrently with the default queue.
    NonBlocking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerKind {
    /// Captures timestamps so elapsed time can be measured.
    Timing,
    /// Skips timestamp capture for lower overhead.
    NoTiming,
}

/// Identifying properties of a device, logged when the runtime binds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceProperties {
    pub name: String,
    pub pci_bus_id: u32,
}

/// A driver handle that can be identified by address in log records.
pub trait RawHandle: fmt::Debug {
    fn as_raw(&self) -> *const c_void;
}

/// The driver operations the runtime is built on.
pub trait Accelerator {
    type Queue: RawHandle;
    type Marker: RawHandle;

    fn init(&self) -> Result<()>;
    fn device_count(&self) -> Result<usize>;
    fn current_device(&self) -> Result<usize>;
    fn set_device(&self, id: usize) -> Result<()>;
    fn device_properties(&self, id: usize) -> Result<DeviceProperties>;

    fn create_queue(&self, kind: QueueKind) -> Result<Self::Queue>;
    fn destroy_queue(&self, queue: Self::Queue) -> Result<()>;
    fn synchronize_queue(&self, queue: &Self::Queue) -> Result<()>;

    fn create_marker(&self, kind: MarkerKind) -> Result<Self::Marker>;
    fn destroy_marker(&self, marker: Self::Marker) -> Result<()>;
    fn record_marker(&self, marker: &Self::Marker, queue: &Self::Queue) -> Result<()>;
    fn synchronize_marker(&self, marker: &Self::Marker) -> Result<()>;

    /// Block until all outstanding work on the current device completes.
    fn synchronize(&self) -> Result<()>;
}

/// Process-wide accelerator state.
///
/// The initialization flag is guarded by a mutex, so concurrent
/// [`GpuRuntime::init_runtime`] calls select and bind a device only once.
pub struct GpuRuntime<A: Accelerator> {
    accel: A,
    env: LaunchEnv,
    initialized: Mutex<bool>,
}

impl<A: Accelerator> GpuRuntime<A> {
    pub fn new(accel: A, env: LaunchEnv) -> Self {
        Self {
            accel,
            env,
            initialized: Mutex::new(false),
        }
    }

    pub fn accelerator(&self) -> &A {
        &self.accel
    }

    pub fn launch_env(&self) -> &LaunchEnv {
        &self.env
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize the driver and bind this process to a device.
    ///
    /// Later calls only log the current binding.
    pub fn init_runtime(&self) {
        let mut initialized = self.state();
        if !*initialized {
            info!(target: LOG_TARGET, "initializing gpu runtime");
            self.accel.init().or_abort();
            info!(target: LOG_TARGET, "found {} devices", self.num_gpus());
            self.set_gpu(self.get_reasonable_default_gpu_id());
            *initialized = true;
        } else {
            info!(
                target: LOG_TARGET,
                "gpu runtime already initialized; current gpu={}",
                self.current_gpu()
            );
        }
        self.log_gpu_info(self.current_gpu());
    }

    /// Mark the runtime uninitialized. Driver resources are left to process
    /// exit.
    pub fn finalize_runtime(&self) {
        let mut initialized = self.state();
        if !*initialized {
            return;
        }
        info!(target: LOG_TARGET, "finalizing gpu runtime");
        *initialized = false;
    }

    pub fn runtime_is_initialized(&self) -> bool {
        *self.state()
    }

    pub fn runtime_is_finalized(&self) -> bool {
        !self.runtime_is_initialized()
    }

    pub fn num_gpus(&self) -> usize {
        self.accel.device_count().or_abort()
    }

    pub fn current_gpu(&self) -> usize {
        self.accel.current_device().or_abort()
    }

    pub fn set_gpu(&self, id: usize) {
        info!(target: LOG_TARGET, id, "setting device to id={id}");
        self.accel.set_device(id).or_abort();
    }

    /// The device this process should use, per [`select_device`].
    /// Oversubscription aborts the process.
    pub fn get_reasonable_default_gpu_id(&self) -> usize {
        select_device(&self.env, self.num_gpus()).or_abort()
    }

    fn log_gpu_info(&self, id: usize) {
        let props = self.accel.device_properties(id).or_abort();
        info!(
            target: LOG_TARGET,
            id,
            name = %props.name,
            pci = props.pci_bus_id,
            "GPU ID {id}: name=\"{}\", pci={:#x}",
            props.name,
            props.pci_bus_id
        );
    }

    pub fn make_queue(&self) -> A::Queue {
        let queue = self.accel.create_queue(QueueKind::Blocking).or_abort();
        info!(target: LOG_TARGET, "created stream {:p}", queue.as_raw());
        queue
    }

    pub fn make_queue_nonblocking(&self) -> A::Queue {
        let queue = self.accel.create_queue(QueueKind::NonBlocking).or_abort();
        info!(target: LOG_TARGET, "created non-blocking stream {:p}", queue.as_raw());
        queue
    }

    pub fn destroy_queue(&self, queue: A::Queue) {
        info!(target: LOG_TARGET, "destroy stream {:p}", queue.as_raw());
        self.accel.destroy_queue(queue).or_abort();
    }

    pub fn make_marker(&self) -> A::Marker {
        let marker = self.accel.create_marker(MarkerKind::Timing).or_abort();
        info!(target: LOG_TARGET, "created event {:p}", marker.as_raw());
        marker
    }

    pub fn make_marker_no_timing(&self) -> A::Marker {
        let marker = self.accel.create_marker(MarkerKind::NoTiming).or_abort();
        info!(target: LOG_TARGET, "created non-timing event {:p}", marker.as_raw());
        marker
    }

    pub fn destroy_marker(&self, marker: A::Marker) {
        info!(target: LOG_TARGET, "destroy event {:p}", marker.as_raw());
        self.accel.destroy_marker(marker).or_abort();
    }

    /// Record `marker` at the current tail of `queue`.
    pub fn record_marker(&self, marker: &A::Marker, queue: &A::Queue) {
        info!(
            target: LOG_TARGET,
            "recording event {:p} on stream {:p}",
            marker.as_raw(),
            queue.as_raw()
        );
        self.accel.record_marker(marker, queue).or_abort();
    }

    /// Block until all work on the bound device completes.
    pub fn sync(&self) {
        info!(target: LOG_TARGET, "synchronizing gpu");
        self.accel.synchronize().or_abort();
    }

    pub fn sync_marker(&self, marker: &A::Marker) {
        info!(target: LOG_TARGET, "synchronizing event {:p}", marker.as_raw());
        self.accel.synchronize_marker(marker).or_abort();
    }

    pub fn sync_queue(&self, queue: &A::Queue) {
        info!(target: LOG_TARGET, "synchronizing stream {:p}", queue.as_raw());
        self.accel.synchronize_queue(queue).or_abort();
    }
}

#[cfg(feature = "cuda")]
mod process {
    use std::sync::OnceLock;

    use super::{GpuRuntime, LaunchEnv};
    use crate::cuda_backend::{CudaAccelerator, CudaMarker, CudaQueue};

    static RUNTIME: OnceLock<GpuRuntime<CudaAccelerator>> = OnceLock::new();

    /// The process-wide CUDA runtime, reading the process environment.
    pub fn runtime() -> &'static GpuRuntime<CudaAccelerator> {
        RUNTIME.get_or_init(|| GpuRuntime::new(CudaAccelerator::new(), LaunchEnv::from_process()))
    }

    pub fn init_runtime() {
        runtime().init_runtime()
    }

    pub fn finalize_runtime() {
        if let Some(rt) = RUNTIME.get() {
            rt.finalize_runtime()
        }
    }

    pub fn runtime_is_initialized() -> bool {
        RUNTIME.get().is_some_and(|rt| rt.runtime_is_initialized())
    }

    pub fn runtime_is_finalized() -> bool {
        !runtime_is_initialized()
    }

    pub fn num_gpus() -> usize {
        runtime().num_gpus()
    }

    pub fn current_gpu() -> usize {
        runtime().current_gpu()
    }

    pub fn set_gpu(id: usize) {
        runtime().set_gpu(id)
    }

    pub fn make_queue() -> CudaQueue {
        runtime().make_queue()
    }

    pub fn make_queue_nonblocking() -> CudaQueue {
        runtime().make_queue_nonblocking()
    }

    pub fn destroy_queue(queue: CudaQueue) {
        runtime().destroy_queue(queue)
    }

    pub fn make_marker() -> CudaMarker {
        runtime().make_marker()
    }

    pub fn make_marker_no_timing() -> CudaMarker {
        runtime().make_marker_no_timing()
    }

    pub fn destroy_marker(marker: CudaMarker) {
        runtime().destroy_marker(marker)
    }

    pub fn record_marker(marker: &CudaMarker, queue: &CudaQueue) {
        runtime().record_marker(marker, queue)
    }

    pub fn sync() {
        runtime().sync()
    }

    pub fn sync_marker(marker: &CudaMarker) {
        runtime().sync_marker(marker)
    }

    pub fn sync_queue(queue: &CudaQueue) {
        runtime().sync_queue(queue)
    }
}

#[cfg(feature = "cuda")]
pub use process::*;
