//! # Neural Network Layer Modules
//!
//! Contains implementations of neural network layers (modules).

pub mod conv;
pub use conv::{Conv2d, Conv2dConfig};
