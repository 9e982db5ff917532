//! # Neural Network Functional Interface (`nn::functional`)
//!
//! Stateless convolution functions, mirroring `torch.nn.functional.conv2d`
//! but in channels-last layout. Layers call into these; they can also be used
//! directly with caller-owned weight and bias tensors.
//!
//! Layouts:
//! * input:  `(batch, height, width, in_channels)`
//! * weight: `(kernel_height, kernel_width, in_channels, out_channels)`
//! * bias:   `(out_channels)`
//! * output: `(batch, out_height, out_width, out_channels)`

use crate::tensor::{ops, Element, Tensor, TensorError};
use crate::utils::parallel::{for_each_sample, ParallelPolicy};
use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut3, Ix1, Ix4};

// --- Shape Arithmetic ---

/// Output length of a valid (unpadded) convolution along one axis:
/// `floor((input - kernel) / stride) + 1`.
pub fn conv2d_output_dim(input: usize, kernel: usize, stride: usize) -> Result<usize, TensorError> {
    if stride == 0 {
        return Err(TensorError::InvalidShape("stride must be positive".to_string()));
    }
    if kernel == 0 {
        return Err(TensorError::InvalidShape("kernel size must be positive".to_string()));
    }
    if kernel > input {
        return Err(TensorError::InvalidShape(format!(
            "kernel size {} exceeds input size {}",
            kernel, input
        )));
    }
    Ok((input - kernel) / stride + 1)
}

/// Expected output shape for an input of shape `input_shape` convolved with a
/// weight of shape `weight_shape`.
pub fn conv2d_output_shape(
    input_shape: &[usize],
    weight_shape: &[usize],
    stride: usize,
) -> Result<Vec<usize>, TensorError> {
    if input_shape.len() != 4 {
        return Err(TensorError::rank("input", 4, input_shape.len()));
    }
    if weight_shape.len() != 4 {
        return Err(TensorError::rank("weight", 4, weight_shape.len()));
    }
    let (kh, kw, cin, cout) = (weight_shape[0], weight_shape[1], weight_shape[2], weight_shape[3]);
    if input_shape[3] != cin {
        let mut expected = input_shape.to_vec();
        expected[3] = cin;
        return Err(TensorError::mismatch("input", &expected, input_shape));
    }
    let out_h = conv2d_output_dim(input_shape[1], kh, stride)?;
    let out_w = conv2d_output_dim(input_shape[2], kw, stride)?;
    Ok(vec![input_shape[0], out_h, out_w, cout])
}

// --- im2col ---

/// Unfolds one `(height, width, channels)` sample into a matrix with one row
/// per output position and `kernel_height * kernel_width * channels` columns.
///
/// Column order is `(ky, kx, c)`, matching a row-major reshape of the weight
/// to `(kernel_height * kernel_width * in_channels, out_channels)`.
pub fn im2col<T: Element>(
    sample: ArrayView3<'_, T>,
    kernel_height: usize,
    kernel_width: usize,
    stride: usize,
) -> Result<Array2<T>, TensorError> {
    let (height, width, channels) = sample.dim();
    let out_h = conv2d_output_dim(height, kernel_height, stride)?;
    let out_w = conv2d_output_dim(width, kernel_width, stride)?;

    let mut cols = Array2::<T>::zeros((out_h * out_w, kernel_height * kernel_width * channels));
    for oy in 0..out_h {
        for ox in 0..out_w {
            let row = oy * out_w + ox;
            let (y0, x0) = (oy * stride, ox * stride);
            for ky in 0..kernel_height {
                for kx in 0..kernel_width {
                    let col = (ky * kernel_width + kx) * channels;
                    cols.slice_mut(s![row, col..col + channels])
                        .assign(&sample.slice(s![y0 + ky, x0 + kx, ..]));
                }
            }
        }
    }
    Ok(cols)
}

fn conv2d_sample<T: Element>(
    sample: ArrayView3<'_, T>,
    mut out: ArrayViewMut3<'_, T>,
    weight: ArrayView2<'_, T>,
    bias: ArrayView1<'_, T>,
    kernel: (usize, usize),
    stride: usize,
) -> Result<(), TensorError> {
    let cols = im2col(sample, kernel.0, kernel.1, stride)?;
    let mut product = ops::matmul(cols.view(), weight)?;
    ops::add_row_broadcast(product.view_mut(), bias)?;
    let (out_h, out_w, out_c) = out.dim();
    out.assign(&product.into_shape((out_h, out_w, out_c))?);
    Ok(())
}

// --- Convolution ---

fn check_bias<T: Element>(bias: &Tensor<T>, out_channels: usize) -> Result<(), TensorError> {
    bias.expect_rank("bias", 1)?;
    if bias.shape()[0] != out_channels {
        return Err(TensorError::mismatch("bias", &[out_channels], bias.shape()));
    }
    Ok(())
}

/// Convolves `input` with `weight`, adds `bias`, and writes the result into
/// `output`, which must already have the shape given by [`conv2d_output_shape`].
pub fn conv2d_into<T: Element>(
    input: &Tensor<T>,
    weight: &Tensor<T>,
    bias: &Tensor<T>,
    stride: usize,
    policy: ParallelPolicy,
    output: &mut Tensor<T>,
) -> Result<(), TensorError> {
    input.expect_rank("input", 4)?;
    output.expect_rank("output", 4)?;
    let expected = conv2d_output_shape(input.shape(), weight.shape(), stride)?;
    if output.shape() != expected.as_slice() {
        return Err(TensorError::mismatch("output", &expected, output.shape()));
    }
    let ws = weight.shape();
    let (kh, kw, cin, cout) = (ws[0], ws[1], ws[2], ws[3]);
    check_bias(bias, cout)?;

    let weight_data = weight.data();
    let weight_std = weight_data.as_standard_layout();
    let weight_matrix = weight_std.view().into_shape((kh * kw * cin, cout))?;
    let bias_data = bias.data();
    let bias_vector = bias_data.view().into_dimensionality::<Ix1>()?;

    let input_view = input.data().into_dimensionality::<Ix4>()?;
    let output_view = output.data_mut().into_dimensionality::<Ix4>()?;

    tracing::trace!(
        input = ?input.shape(),
        output = ?expected,
        stride,
        ?policy,
        "conv2d forward"
    );

    for_each_sample(input_view, output_view, policy, |sample, out| {
        conv2d_sample(sample, out, weight_matrix.view(), bias_vector.view(), (kh, kw), stride)
    })
}

/// Allocating variant of [`conv2d_into`].
pub fn conv2d<T: Element>(
    input: &Tensor<T>,
    weight: &Tensor<T>,
    bias: &Tensor<T>,
    stride: usize,
    policy: ParallelPolicy,
) -> Result<Tensor<T>, TensorError> {
    input.expect_rank("input", 4)?;
    let shape = conv2d_output_shape(input.shape(), weight.shape(), stride)?;
    let mut output = Tensor::zeros(&shape);
    conv2d_into(input, weight, bias, stride, policy, &mut output)?;
    Ok(output)
}
