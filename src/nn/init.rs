//! # Parameter Initializers
//!
//! Strategies that fill a layer's weight and bias tensors in place before
//! training. Layers borrow an initializer only while they are being
//! constructed; they never keep it.

use crate::tensor::{cast_scalar, ops, Element, Tensor, TensorError};
use ndarray::{Array2, ArrayD};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Default spread of the Gaussian kernel used when a layer is built without
/// an explicit initializer.
pub const DEFAULT_GAUSSIAN_SIGMA: f64 = 5.0;

// --- Core Trait: Initializer ---

/// Fills a layer's parameter tensors in place.
pub trait Initializer<T: Element>: Debug {
    /// Populates `weight` and `bias`. Implementations must not change either shape.
    fn initialize(&self, weight: &mut Tensor<T>, bias: &mut Tensor<T>) -> Result<(), TensorError>;
}

fn check_conv_params<T: Element>(weight: &Tensor<T>, bias: &Tensor<T>) -> Result<(), TensorError> {
    weight.expect_rank("weight", 4)?;
    bias.expect_rank("bias", 1)?;
    Ok(())
}

// --- Gaussian Kernel ---

/// Gives every `(in_channel, out_channel)` filter the same normalized 2D
/// Gaussian over its `(kernel_height, kernel_width)` window, centered on the
/// window. Bias is zeroed.
///
/// Weight layout is `(kernel_height, kernel_width, in_channels, out_channels)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernelInitializer {
    pub sigma: f64,
}

impl GaussianKernelInitializer {
    pub fn new(sigma: f64) -> Self {
        GaussianKernelInitializer { sigma }
    }

    /// The normalized `(height, width)` kernel. Entries sum to 1.
    pub fn kernel(&self, height: usize, width: usize) -> Result<Array2<f64>, TensorError> {
        let denom = 2.0 * self.sigma * self.sigma;
        if !self.sigma.is_finite() || self.sigma <= 0.0 || !denom.is_normal() {
            return Err(TensorError::InvalidParameter(format!(
                "gaussian kernel sigma must be finite, positive and not vanishingly small, got {}",
                self.sigma
            )));
        }
        let cy = (height as f64 - 1.0) / 2.0;
        let cx = (width as f64 - 1.0) / 2.0;
        let dist2 = Array2::from_shape_fn((height, width), |(y, x)| {
            let dy = y as f64 - cy;
            let dx = x as f64 - cx;
            dy * dy + dx * dx
        });
        // Shift so the cell nearest the center evaluates to exp(0) = 1.
        let nearest = dist2.iter().copied().fold(f64::INFINITY, f64::min);
        let mut kernel = dist2.mapv(|d2| (-(d2 - nearest) / denom).exp());
        let total = kernel.sum();
        if total > 0.0 {
            kernel /= total;
        }
        Ok(kernel)
    }
}

impl Default for GaussianKernelInitializer {
    fn default() -> Self {
        GaussianKernelInitializer::new(DEFAULT_GAUSSIAN_SIGMA)
    }
}

impl<T: Element> Initializer<T> for GaussianKernelInitializer {
    fn initialize(&self, weight: &mut Tensor<T>, bias: &mut Tensor<T>) -> Result<(), TensorError> {
        check_conv_params(weight, bias)?;
        let (height, width) = (weight.shape()[0], weight.shape()[1]);
        let kernel = self.kernel(height, width)?;

        let mut w = weight.data_mut();
        for (idx, value) in w.indexed_iter_mut() {
            *value = cast_scalar(kernel[[idx[0], idx[1]]])?;
        }
        ops::fill(bias, T::zero());
        Ok(())
    }
}

// --- Constant ---

/// Fills the weight with `weight_value` and the bias with `bias_value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantInitializer {
    pub weight_value: f64,
    pub bias_value: f64,
}

impl ConstantInitializer {
    pub fn new(weight_value: f64, bias_value: f64) -> Self {
        ConstantInitializer {
            weight_value,
            bias_value,
        }
    }
}

impl<T: Element> Initializer<T> for ConstantInitializer {
    fn initialize(&self, weight: &mut Tensor<T>, bias: &mut Tensor<T>) -> Result<(), TensorError> {
        ops::fill(weight, cast_scalar(self.weight_value)?);
        ops::fill(bias, cast_scalar(self.bias_value)?);
        Ok(())
    }
}

// --- Normal ---

/// Draws every weight independently from `N(mean, std)`; zeroes the bias.
///
/// With `seed` set the draw is reproducible, otherwise it is seeded from the OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalInitializer {
    pub mean: f64,
    pub std: f64,
    pub seed: Option<u64>,
}

impl NormalInitializer {
    pub fn new(mean: f64, std: f64) -> Self {
        NormalInitializer { mean, std, seed: None }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl<T: Element> Initializer<T> for NormalInitializer {
    fn initialize(&self, weight: &mut Tensor<T>, bias: &mut Tensor<T>) -> Result<(), TensorError> {
        if !self.std.is_finite() || self.std < 0.0 || !self.mean.is_finite() {
            return Err(TensorError::InvalidParameter(format!(
                "normal initializer needs finite mean and non-negative std, got mean={} std={}",
                self.mean, self.std
            )));
        }
        let dist = Normal::new(self.mean, self.std)
            .map_err(|e| TensorError::InvalidParameter(e.to_string()))?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let samples = ArrayD::<f64>::random_using(weight.shape(), dist, &mut rng);
        let mut w = weight.data_mut();
        for (dst, src) in w.iter_mut().zip(samples.iter()) {
            *dst = cast_scalar(*src)?;
        }
        ops::fill(bias, T::zero());
        Ok(())
    }
}

// --- Configurable Selector ---

/// Serializable choice of initializer, used by layer configuration.
///
/// The default is a Gaussian kernel with sigma [`DEFAULT_GAUSSIAN_SIGMA`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitializerKind {
    GaussianKernel { sigma: f64 },
    Constant { weight_value: f64, bias_value: f64 },
    Normal { mean: f64, std: f64, seed: Option<u64> },
}

impl Default for InitializerKind {
    fn default() -> Self {
        InitializerKind::GaussianKernel {
            sigma: DEFAULT_GAUSSIAN_SIGMA,
        }
    }
}

impl<T: Element> Initializer<T> for InitializerKind {
    fn initialize(&self, weight: &mut Tensor<T>, bias: &mut Tensor<T>) -> Result<(), TensorError> {
        match *self {
            InitializerKind::GaussianKernel { sigma } => {
                GaussianKernelInitializer::new(sigma).initialize(weight, bias)
            }
            InitializerKind::Constant { weight_value, bias_value } => {
                ConstantInitializer::new(weight_value, bias_value).initialize(weight, bias)
            }
            InitializerKind::Normal { mean, std, seed } => {
                NormalInitializer { mean, std, seed }.initialize(weight, bias)
            }
        }
    }
}
