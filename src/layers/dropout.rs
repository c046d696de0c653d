use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// Inverted dropout: during training each unit is zeroed with probability
/// `rate` and survivors are scaled by `1 / (1 - rate)`, so inference is the
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Dropout {
        Dropout { rate }
    }

    /// Returns the masked output and the mask (already scaled).
    pub fn forward_train<R: Rng + ?Sized>(&self, input: &Tensor, rng: &mut R) -> (Tensor, Vec<f32>) {
        let keep_scale = 1.0 / (1.0 - self.rate);
        let mask: Vec<f32> = (0..input.len())
            .map(|_| if rng.gen::<f32>() < self.rate { 0.0 } else { keep_scale })
            .collect();
        let data = input.data.iter().zip(&mask).map(|(x, m)| x * m).collect();
        (Tensor { shape: input.shape.clone(), data }, mask)
    }

    pub fn backward(&self, mask: &[f32], delta: &Tensor) -> Tensor {
        Tensor {
            shape: delta.shape.clone(),
            data: delta.data.iter().zip(mask).map(|(d, m)| d * m).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn drops_roughly_rate_and_preserves_expectation() {
        let mut rng = StdRng::seed_from_u64(11);
        let dropout = Dropout::new(0.5);
        let input = Tensor::from_vec(&[10_000], vec![1.0; 10_000]).unwrap();
        let (out, mask) = dropout.forward_train(&input, &mut rng);

        let dropped = mask.iter().filter(|&&m| m == 0.0).count();
        assert!((4_500..5_500).contains(&dropped), "dropped {}", dropped);
        let mean = out.data.iter().sum::<f32>() / out.len() as f32;
        assert!((mean - 1.0).abs() < 0.05, "mean {}", mean);
        assert!(out.data.iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
    }
}
