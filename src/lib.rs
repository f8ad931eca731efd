pub mod constants;
pub mod error;
pub mod forecaster;
pub mod rnn;
#[cfg(test)]
pub mod test;
pub mod util {
    pub mod device;
    pub mod file_utils;
    pub mod scaler;
}

/// Build information generated by `build.rs`
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Backend used by the binary
pub type DefaultBackend = burn_autodiff::Autodiff<burn_tch::LibTorch<f32>>;
