//! ROCm/HIP runtime for AMD GPUs
//!
//! Compiled only with the `rocm` feature, which also links `amdhip64`.

pub mod ffi;
mod runtime;
mod stream;

pub use runtime::HipRuntime;
pub use stream::HipStream;
