//! # Tensor Module
//!
//! This module defines the core `Tensor` struct used for layer parameters and
//! activations, its element trait, storage, and the small set of array
//! operations the convolution kernels are built from.

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn, LinalgScalar, ScalarOperand};
use num_traits::{Float, NumAssign};
use std::fmt::{Debug, Display};

// --- Submodules ---
pub mod ops;
pub mod storage;

// --- Re-exports ---
pub use storage::CpuStorage;

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum TensorError {
    #[error("Shape mismatch for {name}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Invalid rank for {name}: expected {expected} dimensions, got {got}")]
    InvalidRank {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
    #[error("Incompatible shapes for operation {op}: {shape1:?} and {shape2:?}")]
    IncompatibleShapes {
        op: String,
        shape1: Vec<usize>,
        shape2: Vec<usize>,
    },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("ndarray error: {0}")]
    NdarrayError(#[from] ndarray::ShapeError),
}

impl TensorError {
    /// Builds an `InvalidRank` error for a named buffer.
    pub(crate) fn rank(name: &str, expected: usize, got: usize) -> Self {
        TensorError::InvalidRank {
            name: name.to_string(),
            expected,
            got,
        }
    }

    /// Builds a `ShapeMismatch` error for a named buffer.
    pub(crate) fn mismatch(name: &str, expected: &[usize], got: &[usize]) -> Self {
        TensorError::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

// --- Element Type ---

/// Numeric element type a `Tensor` can hold.
///
/// Implemented for `f32` and `f64`. The bounds cover what the convolution
/// kernels need: ndarray's matrix product (`LinalgScalar`), scalar broadcasting
/// (`ScalarOperand`), in-place arithmetic, and casting from `f64` for
/// initializer parameters.
pub trait Element:
    Float
    + NumAssign
    + LinalgScalar
    + ScalarOperand
    + Default
    + Debug
    + Display
    + Send
    + Sync
    + 'static
{
}

impl Element for f32 {}
impl Element for f64 {}

/// Default element type used throughout the library.
pub type TensorData = f32;

/// Converts an `f64` hyperparameter into the tensor element type.
pub(crate) fn cast_scalar<T: Element>(value: f64) -> Result<T, TensorError> {
    num_traits::cast::<f64, T>(value).ok_or_else(|| {
        TensorError::InvalidParameter(format!("value {} is not representable", value))
    })
}

/// # Tensor
///
/// A shape-tagged n-dimensional array. The tensor is the sole owner of its
/// storage: moving a tensor moves the buffer, cloning copies it.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T: Element = TensorData> {
    storage: CpuStorage<T>,
}

impl<T: Element> Tensor<T> {
    /// Creates a new Tensor from an ndarray::ArrayD.
    pub fn new(data: ArrayD<T>) -> Self {
        Tensor {
            storage: CpuStorage::new(data),
        }
    }

    /// Creates a tensor of the given shape filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Tensor {
            storage: CpuStorage::zeros(shape),
        }
    }

    /// Creates a tensor of the given shape with every element set to `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// Creates a tensor from a flat, row-major vector of values.
    pub fn from_shape_vec(shape: &[usize], values: Vec<T>) -> Result<Self, TensorError> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(data))
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        self.storage.shape()
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.storage.ndim()
    }

    /// Returns the total number of elements.
    pub fn size(&self) -> usize {
        self.storage.size()
    }

    /// Read-only view of the underlying data.
    pub fn data(&self) -> ArrayViewD<'_, T> {
        self.storage.read()
    }

    /// Mutable view of the underlying data.
    ///
    /// Values can be changed through the view, the shape cannot.
    pub fn data_mut(&mut self) -> ArrayViewMutD<'_, T> {
        self.storage.write()
    }

    /// Consumes the tensor and returns the owned array.
    pub fn into_data(self) -> ArrayD<T> {
        self.storage.into_inner()
    }

    /// Address of the first element. Stable for the tensor's lifetime,
    /// including across moves, so it identifies the buffer.
    pub fn as_ptr(&self) -> *const T {
        self.storage.as_ptr()
    }

    /// Fails with `InvalidRank` unless the tensor has exactly `expected` dimensions.
    pub fn expect_rank(&self, name: &str, expected: usize) -> Result<(), TensorError> {
        if self.ndim() != expected {
            return Err(TensorError::rank(name, expected, self.ndim()));
        }
        Ok(())
    }
}

impl<T: Element> From<ArrayD<T>> for Tensor<T> {
    fn from(data: ArrayD<T>) -> Self {
        Tensor::new(data)
    }
}

// --- Helper functions ---

/// Helper to create a tensor filled with zeros.
pub fn zeros<T: Element>(shape: &[usize]) -> Tensor<T> {
    Tensor::zeros(shape)
}

/// Helper to create a tensor filled with ones.
pub fn ones<T: Element>(shape: &[usize]) -> Tensor<T> {
    Tensor::full(shape, T::one())
}
