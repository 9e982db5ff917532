//! # Convolutional Layer Modules

use crate::nn::functional;
use crate::nn::init::{Initializer, InitializerKind};
use crate::nn::Module;
use crate::tensor::{Element, Tensor, TensorData, TensorError};
use crate::utils::parallel::ParallelPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- Configuration ---

/// Hyperparameters and construction-time settings for a [`Conv2d`] layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2dConfig {
    pub kernel_height: usize,
    pub kernel_width: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub stride: usize,
    /// Initializer applied when the layer is built from this config.
    #[serde(default)]
    pub init: InitializerKind,
    #[serde(default)]
    pub parallel: ParallelPolicy,
}

impl Conv2dConfig {
    pub fn new(
        kernel_height: usize,
        kernel_width: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Self {
        Conv2dConfig {
            kernel_height,
            kernel_width,
            in_channels,
            out_channels,
            stride,
            init: InitializerKind::default(),
            parallel: ParallelPolicy::default(),
        }
    }

    pub fn with_init(mut self, init: InitializerKind) -> Self {
        self.init = init;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelPolicy) -> Self {
        self.parallel = parallel;
        self
    }

    /// Shape of the weight tensor: `(kernel_height, kernel_width, in_channels, out_channels)`.
    pub fn weight_shape(&self) -> [usize; 4] {
        [self.kernel_height, self.kernel_width, self.in_channels, self.out_channels]
    }

    /// Shape of the bias tensor: `(out_channels)`.
    pub fn bias_shape(&self) -> [usize; 1] {
        [self.out_channels]
    }

    /// Rejects zero-sized hyperparameters and parameter shapes whose element
    /// count cannot be addressed.
    pub fn validate(&self) -> Result<(), TensorError> {
        let named = [
            ("kernel_height", self.kernel_height),
            ("kernel_width", self.kernel_width),
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("stride", self.stride),
        ];
        for (name, value) in named {
            if value == 0 {
                return Err(TensorError::InvalidShape(format!("{} must be positive", name)));
            }
        }
        check_alloc("weight", &self.weight_shape(), 1)?;
        check_alloc("bias", &self.bias_shape(), 1)
    }

    /// [`Conv2dConfig::validate`], plus a check that both parameter tensors
    /// fit in memory as elements of `T`.
    pub fn validate_for<T: Element>(&self) -> Result<(), TensorError> {
        self.validate()?;
        let elem_size = std::mem::size_of::<T>();
        check_alloc("weight", &self.weight_shape(), elem_size)?;
        check_alloc("bias", &self.bias_shape(), elem_size)
    }
}

/// Fails unless `shape` holds at most `isize::MAX` bytes of `elem_size`-byte elements.
fn check_alloc(name: &str, shape: &[usize], elem_size: usize) -> Result<(), TensorError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .and_then(|len| len.checked_mul(elem_size))
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .map(|_| ())
        .ok_or_else(|| {
            TensorError::InvalidShape(format!(
                "{} shape {:?} is too large to allocate",
                name, shape
            ))
        })
}

// --- Conv2d ---

/// Applies a 2D convolution over a channels-last batch.
///
/// Input shape: `(N, H_in, W_in, C_in)`
/// Output shape: `(N, H_out, W_out, C_out)` with
/// `H_out = floor((H_in - kernel_height) / stride) + 1` (same for width).
///
/// The layer owns its weight `(kernel_height, kernel_width, C_in, C_out)` and
/// bias `(C_out)`. Hyperparameters are fixed once the layer exists.
#[derive(Debug)]
pub struct Conv2d<T: Element = TensorData> {
    kernel_height: usize,
    kernel_width: usize,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    weight: Tensor<T>,
    bias: Tensor<T>,
    parallel: ParallelPolicy,
}

impl<T: Element> Conv2d<T> {
    /// Creates a new Conv2d module and initializes its parameters.
    ///
    /// `initializer` is called exactly once on the freshly allocated weight and
    /// bias. With `None`, the default [`InitializerKind`] (a Gaussian kernel
    /// with sigma 5.0) is used.
    pub fn new(
        kernel_height: usize,
        kernel_width: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        initializer: Option<&dyn Initializer<T>>,
    ) -> Result<Self, TensorError> {
        let config =
            Conv2dConfig::new(kernel_height, kernel_width, in_channels, out_channels, stride);
        Self::build(&config, initializer)
    }

    /// Creates a Conv2d module from a configuration, using `config.init`.
    pub fn from_config(config: &Conv2dConfig) -> Result<Self, TensorError> {
        Self::build(config, None)
    }

    fn build(
        config: &Conv2dConfig,
        initializer: Option<&dyn Initializer<T>>,
    ) -> Result<Self, TensorError> {
        config.validate_for::<T>()?;
        let mut weight = Tensor::zeros(&config.weight_shape());
        let mut bias = Tensor::zeros(&config.bias_shape());

        match initializer {
            Some(init) => {
                tracing::debug!(initializer = ?init, "initializing conv2d parameters");
                init.initialize(&mut weight, &mut bias)?;
            }
            None => {
                tracing::debug!(
                    initializer = ?config.init,
                    "initializing conv2d parameters with configured default"
                );
                config.init.initialize(&mut weight, &mut bias)?;
            }
        }
        if weight.data().iter().all(|&v| v == T::zero()) {
            tracing::warn!(
                shape = ?weight.shape(),
                "conv2d weight is all zeros after initialization"
            );
        }

        Ok(Self::assemble(config, weight, bias))
    }

    /// Builds a layer around caller-supplied parameters.
    ///
    /// The tensors are moved into the layer as-is: no copy is made and no
    /// initializer runs. Their shapes must match the hyperparameters.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parameters(
        kernel_height: usize,
        kernel_width: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        weight: Tensor<T>,
        bias: Tensor<T>,
    ) -> Result<Self, TensorError> {
        let config =
            Conv2dConfig::new(kernel_height, kernel_width, in_channels, out_channels, stride);
        config.validate_for::<T>()?;
        if weight.shape() != config.weight_shape() {
            return Err(TensorError::mismatch("weight", &config.weight_shape(), weight.shape()));
        }
        if bias.shape() != config.bias_shape() {
            return Err(TensorError::mismatch("bias", &config.bias_shape(), bias.shape()));
        }
        Ok(Self::assemble(&config, weight, bias))
    }

    fn assemble(config: &Conv2dConfig, weight: Tensor<T>, bias: Tensor<T>) -> Self {
        tracing::debug!(
            kernel_height = config.kernel_height,
            kernel_width = config.kernel_width,
            in_channels = config.in_channels,
            out_channels = config.out_channels,
            stride = config.stride,
            "created conv2d layer"
        );
        Conv2d {
            kernel_height: config.kernel_height,
            kernel_width: config.kernel_width,
            in_channels: config.in_channels,
            out_channels: config.out_channels,
            stride: config.stride,
            weight,
            bias,
            parallel: config.parallel,
        }
    }

    pub fn kernel_height(&self) -> usize {
        self.kernel_height
    }

    pub fn kernel_width(&self) -> usize {
        self.kernel_width
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn weight(&self) -> &Tensor<T> {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor<T> {
        &self.bias
    }

    /// Mutable access to the weight values. The shape cannot be changed.
    pub fn weight_mut(&mut self) -> &mut Tensor<T> {
        &mut self.weight
    }

    /// Mutable access to the bias values. The shape cannot be changed.
    pub fn bias_mut(&mut self) -> &mut Tensor<T> {
        &mut self.bias
    }

    pub fn parallel(&self) -> ParallelPolicy {
        self.parallel
    }

    pub fn set_parallel(&mut self, parallel: ParallelPolicy) {
        self.parallel = parallel;
    }

    /// Output shape for an input of shape `input_shape`.
    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, TensorError> {
        functional::conv2d_output_shape(input_shape, self.weight.shape(), self.stride)
    }

    /// Runs the forward pass into a caller-provided output buffer.
    ///
    /// Both buffers must be rank 4, `(batch, height, width, channels)`, and
    /// `output` must have exactly the shape returned by [`Conv2d::output_shape`].
    pub fn forward_into(
        &self,
        input: &Tensor<T>,
        output: &mut Tensor<T>,
    ) -> Result<(), TensorError> {
        input.expect_rank("input", 4)?;
        output.expect_rank("output", 4)?;
        functional::conv2d_into(input, &self.weight, &self.bias, self.stride, self.parallel, output)
    }

    /// Consumes the layer and hands its parameters back to the caller.
    pub fn into_parameters(self) -> (Tensor<T>, Tensor<T>) {
        (self.weight, self.bias)
    }
}

impl<T: Element> Module<T> for Conv2d<T> {
    fn forward(&self, input: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        input.expect_rank("input", 4)?;
        let mut output = Tensor::zeros(&self.output_shape(input.shape())?);
        self.forward_into(input, &mut output)?;
        Ok(output)
    }

    fn parameters(&self) -> BTreeMap<String, &Tensor<T>> {
        let mut params = BTreeMap::new();
        params.insert("weight".to_string(), &self.weight);
        params.insert("bias".to_string(), &self.bias);
        params
    }
}

impl<T: Element> fmt::Display for Conv2d<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conv2d({}, {}, kernel_size=({}, {}), stride={})",
            self.in_channels, self.out_channels, self.kernel_height, self.kernel_width, self.stride
        )
    }
}
