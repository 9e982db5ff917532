//! # Parallelism Utilities (CPU Threading)
//!
//! Batch-level data parallelism for layer forward passes using `rayon`.
//! The batch is split along axis 0; every worker reads one input sample and
//! writes the matching output sample, so no two workers touch the same memory.

use crate::tensor::{Element, TensorError};
use ndarray::{ArrayView3, ArrayView4, ArrayViewMut3, ArrayViewMut4, Axis};
use rayon::prelude::*; // ndarray implements rayon's traits for its axis iterators
use serde::{Deserialize, Serialize};

/// How a forward pass distributes batch samples across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ParallelPolicy {
    /// Process samples one after another on the calling thread.
    Sequential,
    /// Use the global rayon pool once the batch has at least `min_batch` samples.
    Rayon { min_batch: usize },
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        ParallelPolicy::Rayon { min_batch: 2 }
    }
}

impl ParallelPolicy {
    /// Whether a batch of `batch_size` samples should be spread over threads.
    pub fn should_parallelize(&self, batch_size: usize) -> bool {
        match *self {
            ParallelPolicy::Sequential => false,
            ParallelPolicy::Rayon { min_batch } => batch_size >= min_batch.max(2),
        }
    }
}

/// Runs `f` once per batch sample, pairing `input[n]` with `output[n]`.
///
/// Both views must have the same batch size. The first error returned by `f`
/// is propagated; under the rayon policy other samples may still have been
/// written when that happens.
pub fn for_each_sample<T, F>(
    input: ArrayView4<'_, T>,
    mut output: ArrayViewMut4<'_, T>,
    policy: ParallelPolicy,
    f: F,
) -> Result<(), TensorError>
where
    T: Element,
    F: Fn(ArrayView3<'_, T>, ArrayViewMut3<'_, T>) -> Result<(), TensorError> + Send + Sync,
{
    let batch_size = input.len_of(Axis(0));
    if output.len_of(Axis(0)) != batch_size {
        return Err(TensorError::IncompatibleShapes {
            op: "for_each_sample".to_string(),
            shape1: input.shape().to_vec(),
            shape2: output.shape().to_vec(),
        });
    }

    if policy.should_parallelize(batch_size) {
        input
            .axis_iter(Axis(0))
            .into_par_iter()
            .zip(output.axis_iter_mut(Axis(0)).into_par_iter())
            .try_for_each(|(sample, out)| f(sample, out))
    } else {
        input
            .axis_iter(Axis(0))
            .zip(output.axis_iter_mut(Axis(0)))
            .try_for_each(|(sample, out)| f(sample, out))
    }
}
