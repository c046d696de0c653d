use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{activation::{softmax, ActivationFunction}, layers::layer::ParamGrads, math::tensor::Tensor};

/// Fully connected layer: `a = f(x W + b)`.
///
/// `weights` has shape `[input_size, size]`, so the weight from input `i` to
/// neuron `j` lives at `i * size + j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub size: usize,
    pub input_size: usize,
    pub weights: Tensor,
    pub biases: Tensor,
    pub activator: ActivationFunction,
}

impl Dense {
    /// He init for ReLU layers, Xavier for the Softmax head; biases start at zero.
    pub fn new<R: Rng + ?Sized>(size: usize, input_size: usize, activation: ActivationFunction, rng: &mut R) -> Dense {
        let weights = match activation {
            ActivationFunction::ReLU => Tensor::he(&[input_size, size], input_size, rng),
            ActivationFunction::Softmax => Tensor::xavier(&[input_size, size], input_size, rng),
        };

        Dense {
            size,
            input_size,
            weights,
            biases: Tensor::zeros(&[size]),
            activator: activation,
        }
    }

    /// Returns `(activations, pre_activations)`.
    pub fn forward(&self, input: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut z = self.biases.data.clone();
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let row = &self.weights.data[i * self.size..(i + 1) * self.size];
            for (zj, wij) in z.iter_mut().zip(row) {
                *zj += x * wij;
            }
        }

        let a = match self.activator {
            ActivationFunction::Softmax => softmax(&z),
            act => z.iter().map(|&v| act.function(v)).collect(),
        };
        (a, z)
    }

    /// Accumulates weight/bias gradients into `grads` and returns ∂L/∂input.
    /// `delta` is ∂L/∂a for this layer (error in activation space).
    pub fn backward(&self, input: &[f32], pre_activation: &[f32], delta: &[f32], grads: &mut ParamGrads) -> Vec<f32> {
        // δ = error ⊙ σ'(z)
        let layer_delta: Vec<f32> = delta.iter().zip(pre_activation)
            .map(|(d, &z)| d * self.activator.derivative(z))
            .collect();

        let mut input_delta = vec![0.0; self.input_size];
        for (i, &x) in input.iter().enumerate() {
            let row = i * self.size..(i + 1) * self.size;
            let w_row = &self.weights.data[row.clone()];
            let g_row = &mut grads.weights.data[row];
            let mut acc = 0.0;
            for j in 0..self.size {
                g_row[j] += x * layer_delta[j];
                acc += w_row[j] * layer_delta[j];
            }
            input_delta[i] = acc;
        }
        for (gb, d) in grads.biases.data.iter_mut().zip(&layer_delta) {
            *gb += d;
        }

        input_delta
    }
}
