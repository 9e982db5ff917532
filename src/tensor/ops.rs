//! # Tensor Operations
//!
//! Array-level building blocks used by the convolution kernels. These work on
//! ndarray views so callers can apply them to slices of a batch without copying.

use super::{Element, Tensor, TensorError};
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2, Axis};

// --- Linear Algebra ---

/// Matrix product of two 2D views: `(m, k) @ (k, n) -> (m, n)`.
pub fn matmul<T: Element>(
    a: ArrayView2<'_, T>,
    b: ArrayView2<'_, T>,
) -> Result<Array2<T>, TensorError> {
    if a.len_of(Axis(1)) != b.len_of(Axis(0)) {
        return Err(TensorError::IncompatibleShapes {
            op: "matmul".to_string(),
            shape1: a.shape().to_vec(),
            shape2: b.shape().to_vec(),
        });
    }
    Ok(a.dot(&b))
}

// --- Broadcasting ---

/// Adds `row` to every row of `matrix` in place.
pub fn add_row_broadcast<T: Element>(
    mut matrix: ArrayViewMut2<'_, T>,
    row: ArrayView1<'_, T>,
) -> Result<(), TensorError> {
    if matrix.len_of(Axis(1)) != row.len() {
        return Err(TensorError::IncompatibleShapes {
            op: "add_row_broadcast".to_string(),
            shape1: matrix.shape().to_vec(),
            shape2: row.shape().to_vec(),
        });
    }
    matrix += &row; // ndarray broadcasts the 1D row across axis 0
    Ok(())
}

// --- In-place Fill ---

/// Sets every element of the tensor to `value`.
pub fn fill<T: Element>(tensor: &mut Tensor<T>, value: T) {
    tensor.data_mut().fill(value);
}
