use std::fmt::Display;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Structural misuse, e.g. resizing a view.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Mutable access through a const view, or access to released storage.
    #[error("invalid access: {0}")]
    InvalidAccess(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("coordinate {coord:?} is out of bounds for shape {shape:?}")]
    OutOfBounds {
        coord: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("rank mismatch: expected {expected} dimensions, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Element count or strides of `shape` do not fit in `usize`.
    #[error("shape {shape:?} is too large to address")]
    ShapeOverflow { shape: Vec<usize> },

    #[error("rank {rank} exceeds the maximum of {max} dimensions", max = crate::MAX_TENSOR_DIMS)]
    MaxRankExceeded { rank: usize },

    /// More local ranks than visible accelerators.
    #[error("more local ranks ({local_size}) than visible GPUs ({num_devices})")]
    Oversubscribed {
        local_size: usize,
        num_devices: usize,
    },

    #[error(transparent)]
    Cuda(Box<dyn std::error::Error + Send + Sync>),

    #[error("Message: {0}")]
    Msg(String),

    #[error("{inner}\n{backtrace}")]
    WithBacktrace {
        inner: Box<Self>,
        backtrace: Box<std::backtrace::Backtrace>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new error based on a printable error message.
    pub fn msg<M: Display>(msg: M) -> Self {
        Self::Msg(msg.to_string()).bt()
    }

    pub(crate) fn invalid_op<M: Display>(msg: M) -> Self {
        Self::InvalidOperation(msg.to_string())
    }

    pub(crate) fn invalid_access<M: Display>(msg: M) -> Self {
        Self::InvalidAccess(msg.to_string())
    }

    pub fn bt(self) -> Self {
        let backtrace = std::backtrace::Backtrace::capture();
        match backtrace.status() {
            std::backtrace::BacktraceStatus::Disabled
            | std::backtrace::BacktraceStatus::Unsupported => self,
            _ => Self::WithBacktrace {
                inner: Box::new(self),
                backtrace: Box::new(backtrace),
            },
        }
    }

    /// The error with any backtrace wrapper removed.
    pub fn inner(&self) -> &Self {
        match self {
            Self::WithBacktrace { inner, .. } => inner.inner(),
            other => other,
        }
    }
}

/// Unwrap an accelerator result, or log it and abort the process.
///
/// A broken device binding cannot be recovered from in the middle of a
/// distributed job, so runtime calls never hand these errors back to callers.
pub trait OrAbort<T> {
    #[track_caller]
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T> {
    #[track_caller]
    fn or_abort(self) -> T {
        match self {
            Ok(v) => v,
            Err(err) => fatal(&err),
        }
    }
}

/// Log `err` at error level and terminate the process.
#[track_caller]
pub fn fatal(err: &dyn Display) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(
        target: crate::gpu::LOG_TARGET,
        %location,
        "fatal runtime error: {err}"
    );
    std::process::abort()
}
