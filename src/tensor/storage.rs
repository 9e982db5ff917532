//! # Tensor Storage
//!
//! Defines the underlying memory storage for Tensors.
//! Currently, this uses `ndarray::ArrayD` for CPU storage.

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};

use super::Element;

// --- Concrete CPU Storage ---

/// Represents the CPU memory backing a Tensor.
///
/// The storage has exactly one owner. There is no shared handle and no lock:
/// whoever holds the `CpuStorage` (through its `Tensor`) owns the buffer, and
/// the buffer is freed when that owner is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuStorage<T: Element> {
    data: ArrayD<T>,
}

impl<T: Element> CpuStorage<T> {
    /// Creates a new `CpuStorage` instance from an existing `ndarray::ArrayD`.
    pub fn new(array_data: ArrayD<T>) -> Self {
        CpuStorage { data: array_data }
    }

    /// Creates a new `CpuStorage` instance initialized with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    /// Read access to the stored array.
    pub fn read(&self) -> ArrayViewD<'_, T> {
        self.data.view()
    }

    /// Write access to the stored values. The view cannot reshape the storage.
    pub fn write(&mut self) -> ArrayViewMutD<'_, T> {
        self.data.view_mut()
    }

    /// Returns the shape of the stored data.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Returns the number of dimensions (rank) of the stored data.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Returns the total number of elements in the storage.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    pub fn into_inner(self) -> ArrayD<T> {
        self.data
    }
}
