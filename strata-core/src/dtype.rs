use std::fmt::Debug;

#[cfg(feature = "bfloat")]
use half::bf16;
#[cfg(feature = "half")]
use half::f16;

#[cfg(feature = "cuda")]
use cudarc::driver::DeviceRepr;

#[cfg(feature = "cuda")]
pub trait DeviceReprLike: DeviceRepr {}

#[cfg(not(feature = "cuda"))]
pub trait DeviceReprLike {}

/// Marker trait for tensor datatypes.
///
/// Elements are plain `Copy` values; a buffer of `T` may live on the host or on
/// an accelerator and is moved around bytewise.
pub trait DType: Debug + Copy + Default + PartialEq + Send + Sync + DeviceReprLike + 'static {
    const NAME: &'static str;
    const ZERO: Self;
}

macro_rules! dtype {
    ($rt:ident, $zero:expr) => {
        impl DeviceReprLike for $rt {}
        impl DType for $rt {
            const NAME: &'static str = stringify!($rt);
            const ZERO: $rt = $zero;
        }
    };
}

dtype!(u8, 0u8);
dtype!(u32, 0u32);
dtype!(i32, 0i32);
dtype!(i64, 0i64);
dtype!(f32, 0f32);
dtype!(f64, 0f64);

#[cfg(feature = "half")]
dtype!(f16, f16::from_f64_const(0.0));
#[cfg(feature = "bfloat")]
dtype!(bf16, bf16::from_f64_const(0.0));
