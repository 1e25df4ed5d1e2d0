//! Backend abstraction - compile-time backend selection
//!
//! NdArray (CPU) is the default. CUDA and WGPU are opt-in through cargo
//! features; when several are enabled the GPU backends take precedence.

use burn::backend::Autodiff;

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA > WGPU > NdArray
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "wgpu"))]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(all(not(feature = "cuda"), not(feature = "wgpu"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "wgpu"), not(feature = "ndarray")))]
compile_error!("At least one backend (ndarray, cuda or wgpu) must be enabled!");

/// The autodiff backend used by the training loop
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device handle of the selected backend
pub type DefaultDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Get the default device
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "wgpu"))]
    {
        "WGPU (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), not(feature = "wgpu"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}
