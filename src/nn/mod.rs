//! # Neural Network Module (`nn`)
//!
//! Provides building blocks for creating neural networks, similar to `torch.nn`.
//! Includes modules (layers), parameter initializers, and the functional interface.

use crate::tensor::{Element, Tensor, TensorError};
use std::collections::BTreeMap;
use std::fmt::Debug;

// --- Submodules ---
pub mod functional;
pub mod init;
pub mod modules;

// Re-export common items
pub use init::{
    ConstantInitializer, GaussianKernelInitializer, Initializer, InitializerKind, NormalInitializer,
};
pub use modules::*;

// --- Core Trait: Module ---

/// Base trait for all neural network modules (layers).
/// Defines the essential `forward` method and parameter access.
pub trait Module<T: Element>: Debug + Send + Sync {
    /// Performs the forward pass of the module.
    ///
    /// # Arguments
    /// * `input`: The input tensor to the module.
    ///
    /// # Returns
    /// * `Result<Tensor<T>, TensorError>`: A newly allocated output tensor.
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>, TensorError>;

    /// Returns the module's parameters keyed by name (e.g., "weight", "bias").
    /// Uses BTreeMap for deterministic order.
    fn parameters(&self) -> BTreeMap<String, &Tensor<T>>;

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().values().map(|t| t.size()).sum()
    }
}
