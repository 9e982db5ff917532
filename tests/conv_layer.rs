use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtorch_conv::nn::functional;
use rtorch_conv::prelude::*;
use rtorch_conv::utils::try_init_tracing;
use std::cell::Cell;

/// Records how often it was asked to initialize, and writes a recognisable pattern.
#[derive(Debug, Default)]
struct CountingInitializer {
    calls: Cell<usize>,
}

impl Initializer<f32> for CountingInitializer {
    fn initialize(
        &self,
        weight: &mut Tensor<f32>,
        bias: &mut Tensor<f32>,
    ) -> Result<(), TensorError> {
        self.calls.set(self.calls.get() + 1);
        for (i, v) in weight.data_mut().iter_mut().enumerate() {
            *v = i as f32;
        }
        for (i, v) in bias.data_mut().iter_mut().enumerate() {
            *v = -(i as f32);
        }
        Ok(())
    }
}

fn random_tensor(shape: &[usize], seed: u64) -> Tensor<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n: usize = shape.iter().product();
    let values: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_shape_vec(shape, values).unwrap()
}

/// Direct nested-loop convolution used as the reference.
fn reference_conv(
    input: &Tensor<f64>,
    weight: &Tensor<f64>,
    bias: &Tensor<f64>,
    stride: usize,
) -> Vec<f64> {
    let (x, w, b) = (input.data(), weight.data(), bias.data());
    let (n, h, wd, cin) = (x.shape()[0], x.shape()[1], x.shape()[2], x.shape()[3]);
    let (kh, kw, cout) = (w.shape()[0], w.shape()[1], w.shape()[3]);
    let oh = (h - kh) / stride + 1;
    let ow = (wd - kw) / stride + 1;
    let mut out = Vec::with_capacity(n * oh * ow * cout);
    for bn in 0..n {
        for oy in 0..oh {
            for ox in 0..ow {
                for co in 0..cout {
                    let mut acc = b[[co]];
                    for ky in 0..kh {
                        for kx in 0..kw {
                            for ci in 0..cin {
                                let (iy, ix) = (oy * stride + ky, ox * stride + kx);
                                acc += x[[bn, iy, ix, ci]] * w[[ky, kx, ci, co]];
                            }
                        }
                    }
                    out.push(acc);
                }
            }
        }
    }
    out
}

#[test]
fn example_layer_has_expected_parameter_shapes() {
    try_init_tracing("rtorch_conv=debug");
    let conv = Conv2d::<f32>::new(3, 3, 3, 16, 1, None).unwrap();
    assert_eq!(conv.weight().shape(), &[3, 3, 3, 16]);
    assert_eq!(conv.bias().shape(), &[16]);
    assert_eq!(
        (
            conv.kernel_height(),
            conv.kernel_width(),
            conv.in_channels(),
            conv.out_channels(),
            conv.stride()
        ),
        (3, 3, 3, 16, 1)
    );
}

#[test]
fn default_initializer_writes_gaussian_kernels() {
    let conv = Conv2d::<f64>::new(3, 3, 2, 4, 1, None).unwrap();
    let w = conv.weight().data();
    assert!(w.iter().all(|&v| v > 0.0));
    let expected = GaussianKernelInitializer::new(5.0).kernel(3, 3).unwrap();
    for ci in 0..2 {
        for co in 0..4 {
            for y in 0..3 {
                for x in 0..3 {
                    assert_abs_diff_eq!(w[[y, x, ci, co]], expected[[y, x]], epsilon = 1e-12);
                }
            }
        }
    }
    assert!(conv.bias().data().iter().all(|&v| v == 0.0));
}

#[test]
fn supplied_initializer_runs_once_and_output_is_kept() {
    let init = CountingInitializer::default();
    let conv = Conv2d::<f32>::new(2, 2, 1, 3, 1, Some(&init)).unwrap();
    assert_eq!(init.calls.get(), 1);
    let w: Vec<f32> = conv.weight().data().iter().cloned().collect();
    assert_eq!(w, (0..12).map(|i| i as f32).collect::<Vec<_>>());
    let b: Vec<f32> = conv.bias().data().iter().cloned().collect();
    assert_eq!(b, vec![0.0, -1.0, -2.0]);
}

#[test]
fn direct_injection_takes_the_same_buffers() {
    let weight = Tensor::<f32>::full(&[3, 3, 2, 4], 0.5);
    let bias = Tensor::<f32>::zeros(&[4]);
    let (wp, bp) = (weight.as_ptr(), bias.as_ptr());

    let conv = Conv2d::from_parameters(3, 3, 2, 4, 1, weight, bias).unwrap();
    assert_eq!(conv.weight().as_ptr(), wp);
    assert_eq!(conv.bias().as_ptr(), bp);
    assert!(conv.weight().data().iter().all(|&v| v == 0.5));

    let (weight, bias) = conv.into_parameters();
    assert_eq!(weight.as_ptr(), wp);
    assert_eq!(bias.as_ptr(), bp);
}

#[test]
fn direct_injection_validates_shapes() {
    let swapped = Tensor::<f32>::zeros(&[3, 3, 4, 2]);
    let err = Conv2d::from_parameters(3, 3, 2, 4, 1, swapped, Tensor::zeros(&[4])).unwrap_err();
    match err {
        TensorError::ShapeMismatch { name, expected, got } => {
            assert_eq!(name, "weight");
            assert_eq!(expected, vec![3, 3, 2, 4]);
            assert_eq!(got, vec![3, 3, 4, 2]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let weight = Tensor::<f32>::zeros(&[3, 3, 2, 4]);
    let err = Conv2d::from_parameters(3, 3, 2, 4, 1, weight, Tensor::zeros(&[4, 1])).unwrap_err();
    assert!(matches!(err, TensorError::ShapeMismatch { ref name, .. } if name == "bias"));

    let weight = Tensor::<f32>::zeros(&[3, 3, 2, 4]);
    let err = Conv2d::from_parameters(3, 3, 2, 4, 0, weight, Tensor::zeros(&[4])).unwrap_err();
    assert!(matches!(err, TensorError::InvalidShape(_)));
}

#[test]
fn forward_rejects_non_rank_four_buffers() {
    let conv = Conv2d::<f32>::new(3, 3, 1, 2, 1, None).unwrap();
    let good_in = Tensor::zeros(&[1, 5, 5, 1]);
    let mut good_out = Tensor::zeros(&[1, 3, 3, 2]);

    for shape in [vec![5, 5, 1], vec![25], vec![1, 1, 5, 5, 1]] {
        let bad = Tensor::zeros(&shape);
        let err = conv.forward_into(&bad, &mut good_out).unwrap_err();
        assert!(matches!(
            err,
            TensorError::InvalidRank { ref name, expected: 4, got }
                if name == "input" && got == shape.len()
        ));

        let mut bad_out = Tensor::zeros(&shape);
        let err = conv.forward_into(&good_in, &mut bad_out).unwrap_err();
        assert!(matches!(
            err,
            TensorError::InvalidRank { ref name, expected: 4, .. } if name == "output"
        ));

        assert!(matches!(conv.forward(&bad), Err(TensorError::InvalidRank { .. })));
    }
    conv.forward_into(&good_in, &mut good_out).unwrap();
}

#[test]
fn forward_rejects_wrong_output_buffer_and_channels() {
    let conv = Conv2d::<f32>::new(3, 3, 2, 4, 2, None).unwrap();
    let input = Tensor::zeros(&[2, 7, 7, 2]);
    let mut out = Tensor::zeros(&[2, 5, 5, 4]);
    let err = conv.forward_into(&input, &mut out).unwrap_err();
    match err {
        TensorError::ShapeMismatch { name, expected, got } => {
            assert_eq!(name, "output");
            assert_eq!(expected, vec![2, 3, 3, 4]);
            assert_eq!(got, vec![2, 5, 5, 4]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let wrong_channels = Tensor::zeros(&[2, 7, 7, 3]);
    assert!(matches!(conv.forward(&wrong_channels), Err(TensorError::ShapeMismatch { .. })));

    let too_small = Tensor::zeros(&[1, 2, 7, 2]);
    assert!(matches!(conv.forward(&too_small), Err(TensorError::InvalidShape(_))));
}

#[test]
fn forward_matches_reference_convolution() {
    for (stride, kh, kw) in [(1, 3, 3), (2, 3, 3), (3, 2, 4), (1, 1, 1)] {
        let weight = random_tensor(&[kh, kw, 3, 5], 11);
        let bias = random_tensor(&[5], 12);
        let input = random_tensor(&[3, 10, 9, 3], 13);
        let expected = reference_conv(&input, &weight, &bias, stride);

        let conv = Conv2d::from_parameters(kh, kw, 3, 5, stride, weight, bias).unwrap();
        let out = conv.forward(&input).unwrap();
        assert_eq!(out.shape(), &[3, (10 - kh) / stride + 1, (9 - kw) / stride + 1, 5]);
        for (got, want) in out.data().iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-10);
        }
    }
}

#[test]
fn sequential_and_rayon_policies_agree() {
    let config = Conv2dConfig::new(3, 3, 4, 6, 1)
        .with_init(InitializerKind::Normal {
            mean: 0.0,
            std: 0.3,
            seed: Some(3),
        })
        .with_parallel(ParallelPolicy::Sequential);
    let mut conv = Conv2d::<f64>::from_config(&config).unwrap();
    assert_eq!(conv.parallel(), ParallelPolicy::Sequential);
    let input = random_tensor(&[8, 12, 12, 4], 99);

    let sequential = conv.forward(&input).unwrap();
    conv.set_parallel(ParallelPolicy::Rayon { min_batch: 2 });
    let parallel = conv.forward(&input).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn functional_and_layer_forward_agree() {
    let init = NormalInitializer::new(0.0, 1.0).with_seed(5);
    let conv = Conv2d::<f64>::new(2, 3, 2, 3, 2, Some(&init)).unwrap();
    let input = random_tensor(&[2, 6, 7, 2], 1);
    let via_layer = conv.forward(&input).unwrap();
    let via_fn =
        functional::conv2d(&input, conv.weight(), conv.bias(), 2, ParallelPolicy::default())
            .unwrap();
    assert_eq!(via_layer, via_fn);
}

#[test]
fn parameter_values_can_be_edited_in_place() {
    let mut conv = Conv2d::<f32>::new(1, 1, 1, 1, 1, None).unwrap();
    conv.weight_mut().data_mut().fill(2.0);
    conv.bias_mut().data_mut().fill(1.0);
    let input = Tensor::full(&[1, 2, 2, 1], 3.0f32);
    let out = conv.forward(&input).unwrap();
    assert!(out.data().iter().all(|&v| v == 7.0));
    assert_eq!(conv.weight().shape(), &[1, 1, 1, 1]);
}

#[test]
fn layers_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Conv2d<f32>>();
    assert_send_sync::<Conv2d<f64>>();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn initializer_driven_shapes_hold(
        kh in 1usize..6,
        kw in 1usize..6,
        cin in 1usize..5,
        cout in 1usize..9,
        stride in 1usize..4,
    ) {
        let conv = Conv2d::<f32>::new(kh, kw, cin, cout, stride, None).unwrap();
        prop_assert_eq!(conv.weight().shape(), &[kh, kw, cin, cout][..]);
        prop_assert_eq!(conv.bias().shape(), &[cout][..]);
    }

    #[test]
    fn forward_output_follows_valid_convolution_formula(
        kh in 1usize..4,
        kw in 1usize..4,
        stride in 1usize..4,
        extra_h in 0usize..6,
        extra_w in 0usize..6,
        batch in 1usize..3,
    ) {
        let conv = Conv2d::<f32>::new(kh, kw, 2, 3, stride, None).unwrap();
        let (h, w) = (kh + extra_h, kw + extra_w);
        let out = conv.forward(&Tensor::zeros(&[batch, h, w, 2])).unwrap();
        let expected = [batch, (h - kh) / stride + 1, (w - kw) / stride + 1, 3];
        prop_assert_eq!(out.shape(), &expected[..]);
    }
}
