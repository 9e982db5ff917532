//! # RTorch Convolution Library
//!
//! This crate provides a 2D convolution layer for RTorch together with the
//! pieces it is built from: an owned n-dimensional tensor, pluggable parameter
//! initializers, a functional convolution kernel and batch-parallel helpers.

pub mod nn;
pub mod tensor;
pub mod utils;

pub mod prelude {
    pub use crate::nn::{
        ConstantInitializer, Conv2d, Conv2dConfig, GaussianKernelInitializer, Initializer,
        InitializerKind, Module, NormalInitializer,
    };
    pub use crate::tensor::{Element, Tensor, TensorError};
    pub use crate::utils::ParallelPolicy;
}
