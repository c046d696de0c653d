use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// Non-overlapping max pooling (`stride == pool`), channels-last.
/// Trailing rows/columns that do not fill a whole window are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub pool: usize,
}

impl MaxPool2d {
    pub fn new(pool: usize) -> MaxPool2d {
        MaxPool2d { pool }
    }

    pub fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        vec![input_shape[0] / self.pool, input_shape[1] / self.pool, input_shape[2]]
    }

    /// Returns the pooled tensor plus, for every output element, the flat
    /// index of the input element that won its window.
    pub fn forward(&self, input: &Tensor) -> (Tensor, Vec<usize>) {
        let (w, c, p) = (input.shape[1], input.shape[2], self.pool);
        let out_shape = self.output_shape(&input.shape);
        let (oh, ow) = (out_shape[0], out_shape[1]);

        let mut out = Tensor::zeros(&out_shape);
        let mut switches = vec![0usize; out.len()];

        for oy in 0..oh {
            for ox in 0..ow {
                for ch in 0..c {
                    let mut best_idx = (oy * p * w + ox * p) * c + ch;
                    for dy in 0..p {
                        for dx in 0..p {
                            let idx = ((oy * p + dy) * w + (ox * p + dx)) * c + ch;
                            if input.data[idx] > input.data[best_idx] {
                                best_idx = idx;
                            }
                        }
                    }
                    let o = (oy * ow + ox) * c + ch;
                    out.data[o] = input.data[best_idx];
                    switches[o] = best_idx;
                }
            }
        }

        (out, switches)
    }

    /// Routes each output gradient back to the input element that produced it.
    pub fn backward(&self, input_shape: &[usize], switches: &[usize], delta: &Tensor) -> Tensor {
        let mut input_delta = Tensor::zeros(input_shape);
        for (&idx, d) in switches.iter().zip(&delta.data) {
            input_delta.data[idx] += d;
        }
        input_delta
    }
}
