//! Orthogonal weight initialization for dense layers.
//!
//! Hidden layers use gain `sqrt(2)`, the mean head `0.01` and value heads
//! `1.0`. Biases start at zero.

use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::{Distribution, TensorData};

/// Gain for hidden layers.
pub const HIDDEN_GAIN: f32 = std::f32::consts::SQRT_2;
/// Gain for the policy mean head.
pub const POLICY_HEAD_GAIN: f32 = 0.01;
/// Gain for value heads.
pub const VALUE_HEAD_GAIN: f32 = 1.0;

/// `Linear` layer with orthogonal weights scaled by `gain` and zero bias.
pub fn orthogonal_linear<B: Backend>(
    d_input: usize,
    d_output: usize,
    gain: f32,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output).init(device);
    // Linear stores its weight as [d_input, d_output].
    let weight = orthogonal_matrix::<B>(d_input, d_output, gain, device);
    linear.weight = Param::from_tensor(weight);
    if linear.bias.is_some() {
        linear.bias = Some(Param::from_tensor(Tensor::zeros([d_output], device)));
    }
    linear
}

/// `[rows, cols]` matrix with orthonormal columns (tall) or rows (wide),
/// times `gain`.
pub fn orthogonal_matrix<B: Backend>(rows: usize, cols: usize, gain: f32, device: &B::Device) -> Tensor<B, 2> {
    let (n, m) = if rows >= cols { (rows, cols) } else { (cols, rows) };
    let mut basis = draw_normal::<B>(m, n, device);
    orthonormalize(&mut basis, n, || draw_normal::<B>(1, n, device));

    // basis holds m vectors of length n; lay them out as columns of [n, m].
    let mut data = vec![0.0f32; rows * cols];
    for (k, vector) in basis.chunks(n).enumerate() {
        for (i, &value) in vector.iter().enumerate() {
            if rows >= cols {
                data[i * cols + k] = value * gain;
            } else {
                data[k * cols + i] = value * gain;
            }
        }
    }
    Tensor::from_data(TensorData::new(data, [rows, cols]), device)
}

fn draw_normal<B: Backend>(count: usize, len: usize, device: &B::Device) -> Vec<f32> {
    Tensor::<B, 1>::random([count * len], Distribution::Normal(0.0, 1.0), device)
        .into_data()
        .iter::<f32>()
        .collect()
}

/// Modified Gram-Schmidt over consecutive `len`-sized vectors.
fn orthonormalize(vectors: &mut [f32], len: usize, mut redraw: impl FnMut() -> Vec<f32>) {
    let count = vectors.len() / len;
    for k in 0..count {
        loop {
            for j in 0..k {
                let (done, rest) = vectors.split_at_mut(k * len);
                let prev = &done[j * len..(j + 1) * len];
                let current = &mut rest[..len];
                let proj: f32 = prev.iter().zip(current.iter()).map(|(a, b)| a * b).sum();
                current.iter_mut().zip(prev).for_each(|(c, p)| *c -= proj * p);
            }
            let current = &mut vectors[k * len..(k + 1) * len];
            let norm = current.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 1e-6 {
                current.iter_mut().for_each(|v| *v /= norm);
                break;
            }
            current.copy_from_slice(&redraw());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn gram(values: &[f32], rows: usize, cols: usize, by_columns: bool) -> Vec<f32> {
        let (count, len) = if by_columns { (cols, rows) } else { (rows, cols) };
        let at = |k: usize, i: usize| if by_columns { values[i * cols + k] } else { values[k * cols + i] };
        let mut out = vec![0.0; count * count];
        for a in 0..count {
            for b in 0..count {
                out[a * count + b] = (0..len).map(|i| at(a, i) * at(b, i)).sum();
            }
        }
        out
    }

    fn assert_identity(g: &[f32], n: usize, scale: f32) {
        for a in 0..n {
            for b in 0..n {
                let expected = if a == b { scale } else { 0.0 };
                assert!((g[a * n + b] - expected).abs() < 1e-4, "gram[{a},{b}] = {}", g[a * n + b]);
            }
        }
    }

    #[test]
    fn test_tall_matrix_has_orthonormal_columns() {
        let device = Default::default();
        let w = orthogonal_matrix::<B>(8, 3, 1.0, &device);
        let values: Vec<f32> = w.into_data().iter::<f32>().collect();
        assert_identity(&gram(&values, 8, 3, true), 3, 1.0);
    }

    #[test]
    fn test_wide_matrix_has_orthonormal_rows() {
        let device = Default::default();
        let w = orthogonal_matrix::<B>(2, 5, 1.0, &device);
        let values: Vec<f32> = w.into_data().iter::<f32>().collect();
        assert_identity(&gram(&values, 2, 5, false), 2, 1.0);
    }

    #[test]
    fn test_gain_scales_norms() {
        let device = Default::default();
        let w = orthogonal_matrix::<B>(4, 4, 2.0, &device);
        let values: Vec<f32> = w.into_data().iter::<f32>().collect();
        assert_identity(&gram(&values, 4, 4, true), 4, 4.0);
    }

    #[test]
    fn test_linear_bias_is_zero() {
        let device = Default::default();
        let linear = orthogonal_linear::<B>(3, 2, HIDDEN_GAIN, &device);
        assert_eq!(linear.weight.val().dims(), [3, 2]);
        let bias = linear.bias.unwrap().val().into_data();
        assert!(bias.iter::<f32>().all(|v| v == 0.0));
    }

    #[test]
    fn test_linear_params_track_gradients() {
        use burn::backend::Autodiff;

        type AB = Autodiff<NdArray<f32>>;
        let device = Default::default();
        let linear = orthogonal_linear::<AB>(3, 2, POLICY_HEAD_GAIN, &device);
        assert!(linear.weight.val().is_require_grad());
        assert!(linear.bias.as_ref().unwrap().val().is_require_grad());

        let input = Tensor::<AB, 2>::ones([4, 3], &device);
        let grads = linear.forward(input).sum().backward();
        let bias_grad = linear.bias.as_ref().unwrap().grad(&grads).unwrap();
        let values: Vec<f32> = bias_grad.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|&g| (g - 4.0).abs() < 1e-5), "bias grads {values:?}");
    }
}
