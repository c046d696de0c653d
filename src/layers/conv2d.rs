use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{activation::ActivationFunction, layers::layer::ParamGrads, math::tensor::Tensor};

/// 2-D convolution, stride 1, no padding ("valid"), channels-last.
///
/// Input `[h, w, in_channels]` produces `[h - k + 1, w - k + 1, filters]`.
/// `weights` is laid out `[k, k, in_channels, filters]`, so the weight for
/// kernel offset `(ky, kx)`, input channel `ci` and filter `co` lives at
/// `((ky * k + kx) * in_channels + ci) * filters + co`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub filters: usize,
    pub kernel_size: usize,
    pub in_channels: usize,
    pub weights: Tensor,
    pub biases: Tensor,
    pub activator: ActivationFunction,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        filters: usize,
        kernel_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = kernel_size * kernel_size * in_channels;
        Conv2d {
            filters,
            kernel_size,
            in_channels,
            weights: Tensor::he(&[kernel_size, kernel_size, in_channels, filters], fan_in, rng),
            biases: Tensor::zeros(&[filters]),
            activator: activation,
        }
    }

    pub fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        let k = self.kernel_size;
        vec![input_shape[0] + 1 - k, input_shape[1] + 1 - k, self.filters]
    }

    /// Returns `(activations, pre_activations)`, both `[oh, ow, filters]`.
    pub fn forward(&self, input: &Tensor) -> (Tensor, Tensor) {
        let (w, cin, cout, k) = (input.shape[1], self.in_channels, self.filters, self.kernel_size);
        let out_shape = self.output_shape(&input.shape);
        let (oh, ow) = (out_shape[0], out_shape[1]);

        let mut z = Tensor::zeros(&out_shape);
        for oy in 0..oh {
            for ox in 0..ow {
                let out_base = (oy * ow + ox) * cout;
                let out = &mut z.data[out_base..out_base + cout];
                out.copy_from_slice(&self.biases.data);

                for ky in 0..k {
                    for kx in 0..k {
                        let in_base = ((oy + ky) * w + (ox + kx)) * cin;
                        for ci in 0..cin {
                            let x = input.data[in_base + ci];
                            if x == 0.0 {
                                continue;
                            }
                            let w_base = ((ky * k + kx) * cin + ci) * cout;
                            let kernel = &self.weights.data[w_base..w_base + cout];
                            for (o, wv) in out.iter_mut().zip(kernel) {
                                *o += x * wv;
                            }
                        }
                    }
                }
            }
        }

        let act = self.activator;
        (z.map(|v| act.function(v)), z)
    }

    /// Accumulates kernel/bias gradients into `grads`.  Returns ∂L/∂input when
    /// `need_input_grad` is set (skipped for the first layer), otherwise an
    /// empty tensor.
    pub fn backward(
        &self,
        input: &Tensor,
        pre_activation: &Tensor,
        delta: &Tensor,
        grads: &mut ParamGrads,
        need_input_grad: bool,
    ) -> Tensor {
        let (w, cin, cout, k) = (input.shape[1], self.in_channels, self.filters, self.kernel_size);
        let (oh, ow) = (pre_activation.shape[0], pre_activation.shape[1]);

        let layer_delta: Vec<f32> = delta.data.iter().zip(&pre_activation.data)
            .map(|(d, &z)| d * self.activator.derivative(z))
            .collect();

        let mut input_delta = if need_input_grad { Tensor::zeros_like(input) } else { Tensor::default() };

        for oy in 0..oh {
            for ox in 0..ow {
                let out_base = (oy * ow + ox) * cout;
                let d = &layer_delta[out_base..out_base + cout];
                if d.iter().all(|&v| v == 0.0) {
                    continue;
                }
                for (gb, dv) in grads.biases.data.iter_mut().zip(d) {
                    *gb += dv;
                }

                for ky in 0..k {
                    for kx in 0..k {
                        let in_base = ((oy + ky) * w + (ox + kx)) * cin;
                        for ci in 0..cin {
                            let x = input.data[in_base + ci];
                            let w_base = ((ky * k + kx) * cin + ci) * cout;
                            let g = &mut grads.weights.data[w_base..w_base + cout];
                            for (gv, dv) in g.iter_mut().zip(d) {
                                *gv += x * dv;
                            }
                            if need_input_grad {
                                let kernel = &self.weights.data[w_base..w_base + cout];
                                input_delta.data[in_base + ci] +=
                                    kernel.iter().zip(d).map(|(wv, dv)| wv * dv).sum::<f32>();
                            }
                        }
                    }
                }
            }
        }

        input_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn output_shape_is_valid_convolution() {
        let mut rng = StdRng::seed_from_u64(1);
        let conv = Conv2d::new(1, 32, 3, ActivationFunction::ReLU, &mut rng);
        assert_eq!(conv.output_shape(&[28, 28, 1]), vec![26, 26, 32]);
        let (a, z) = conv.forward(&Tensor::zeros(&[28, 28, 1]));
        assert_eq!(a.shape, vec![26, 26, 32]);
        assert_eq!(z.shape, a.shape);
    }

    #[test]
    fn single_kernel_sums_window() {
        let conv = Conv2d {
            filters: 1,
            kernel_size: 2,
            in_channels: 1,
            weights: Tensor::from_vec(&[2, 2, 1, 1], vec![1.0; 4]).unwrap(),
            biases: Tensor::from_vec(&[1], vec![0.5]).unwrap(),
            activator: ActivationFunction::ReLU,
        };
        let input = Tensor::from_vec(&[3, 3, 1], (1..=9).map(|v| v as f32).collect()).unwrap();
        let (a, _) = conv.forward(&input);
        // windows: 1+2+4+5, 2+3+5+6, 4+5+7+8, 5+6+8+9 (+0.5 bias)
        assert_eq!(a.data, vec![12.5, 16.5, 24.5, 28.5]);
    }

    #[test]
    fn backward_matches_numerical_gradient() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut conv = Conv2d::new(2, 3, 3, ActivationFunction::ReLU, &mut rng);
        // Large biases keep every unit on the linear side of ReLU.
        conv.biases = Tensor::from_vec(&[3], vec![5.0; 3]).unwrap();
        let input = Tensor::from_vec(
            &[5, 5, 2],
            (0..50).map(|i| ((i * 37 % 11) as f32 - 5.0) / 10.0).collect(),
        ).unwrap();
        // L = sum(a * weights_out) with fixed pseudo-random output weights.
        let out_w: Vec<f32> = (0..27).map(|i| ((i * 13 % 7) as f32 - 3.0) / 5.0).collect();
        let loss = |c: &Conv2d, x: &Tensor| -> f32 {
            c.forward(x).0.data.iter().zip(&out_w).map(|(a, w)| a * w).sum()
        };

        let (_, z) = conv.forward(&input);
        let delta = Tensor::from_vec(&z.shape, out_w.clone()).unwrap();
        let mut grads = ParamGrads::zeros_for(&conv.weights, &conv.biases);
        let dx = conv.backward(&input, &z, &delta, &mut grads, true);

        let eps = 1e-2;
        for k in (0..conv.weights.len()).step_by(7) {
            let mut plus = conv.clone();
            plus.weights.data[k] += eps;
            let mut minus = conv.clone();
            minus.weights.data[k] -= eps;
            let numeric = (loss(&plus, &input) - loss(&minus, &input)) / (2.0 * eps);
            assert!((numeric - grads.weights.data[k]).abs() < 5e-2, "weight {}: {} vs {}", k, numeric, grads.weights.data[k]);
        }
        for k in (0..input.len()).step_by(5) {
            let mut plus = input.clone();
            plus.data[k] += eps;
            let mut minus = input.clone();
            minus.data[k] -= eps;
            let numeric = (loss(&conv, &plus) - loss(&conv, &minus)) / (2.0 * eps);
            assert!((numeric - dx.data[k]).abs() < 5e-2, "input {}: {} vs {}", k, numeric, dx.data[k]);
        }
    }
}
