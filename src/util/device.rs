// External crates
use burn::tensor::backend::Backend;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_tch::{LibTorch, LibTorchDevice};
use log::info;

/// Picks the device a backend should run on
///
/// Implemented per backend so the forecaster can ask for accelerated
/// execution without knowing which backend it was instantiated with.
pub trait AcceleratorProbe: Backend {
    fn select_device() -> Self::Device;
}

impl AcceleratorProbe for LibTorch<f32> {
    fn select_device() -> Self::Device {
        if tch::Cuda::is_available() {
            info!("GPU training is available.");
            LibTorchDevice::Cuda(0)
        } else {
            info!("GPU training not available.");
            LibTorchDevice::Cpu
        }
    }
}

impl AcceleratorProbe for NdArray<f32> {
    fn select_device() -> Self::Device {
        info!("GPU training not available.");
        NdArrayDevice::Cpu
    }
}

impl<B: AcceleratorProbe> AcceleratorProbe for Autodiff<B> {
    fn select_device() -> Self::Device {
        B::select_device()
    }
}
