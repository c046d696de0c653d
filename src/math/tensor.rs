use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f32::consts::PI;
use std::ops::AddAssign;

use crate::error::{Error, Result};

/// Dense row-major `f32` tensor.
///
/// Images are stored channels-last, `(height, width, channels)`, so a single
/// MNIST digit is `[28, 28, 1]` and index `(y, x, c)` lives at
/// `(y * width + x) * channels + c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn zeros_like(other: &Tensor) -> Tensor {
        Tensor::zeros(&other.shape)
    }

    /// Wraps `data` without copying; fails when the element count disagrees
    /// with `shape`.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::ShapeMismatch(format!(
                "shape {:?} needs {} values, got {}",
                shape, expected, data.len()
            )));
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
        // Draw two independent uniform samples in (0, 1] to avoid log(0).
        let u1: f32 = 1.0 - rng.gen::<f32>();
        let u2: f32 = 1.0 - rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn normal<R: Rng + ?Sized>(shape: &[usize], std_dev: f32, rng: &mut R) -> Tensor {
        let mut res = Tensor::zeros(shape);
        for v in res.data.iter_mut() {
            *v = Tensor::sample_standard_normal(rng) * std_dev;
        }
        res
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Recommended before ReLU layers. The variance 2/fan_in accounts for
    /// the fact that ReLU zeroes half of its inputs on average.
    pub fn he<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, rng: &mut R) -> Tensor {
        Tensor::normal(shape, (2.0 / fan_in as f32).sqrt(), rng)
    }

    /// Xavier (Glorot) initialization: samples from N(0, sqrt(1 / fan_in)).
    ///
    /// Used for the Softmax output layer.
    pub fn xavier<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, rng: &mut R) -> Tensor {
        Tensor::normal(shape, (1.0 / fan_in as f32).sqrt(), rng)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Same values, new shape. Element counts must agree.
    pub fn reshape(self, shape: &[usize]) -> Result<Tensor> {
        Tensor::from_vec(shape, self.data)
    }

    pub fn scale(&mut self, factor: f32) {
        self.data.iter_mut().for_each(|x| *x *= factor);
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}

impl AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, rhs: &Tensor) {
        if self.shape != rhs.shape {
            panic!("Tensors are of incorrect sizes: {:?} vs {:?}", self.shape, rhs.shape)
        }
        self.data.iter_mut().zip(&rhs.data).for_each(|(a, b)| *a += b);
    }
}

/// Index of the first maximum element in a slice; 0 for an empty slice.
/// NaN never wins over a real value.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] || values[best].is_nan() {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(Tensor::from_vec(&[2, 2], vec![1.0; 3]).is_err());
        let t = Tensor::from_vec(&[2, 2], vec![1.0; 4]).unwrap();
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn he_init_has_expected_spread() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::he(&[100, 100], 50, &mut rng);
        let mean = t.data.iter().sum::<f32>() / t.len() as f32;
        let var = t.data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / t.len() as f32;
        assert!(mean.abs() < 0.02, "mean {}", mean);
        assert!((var - 2.0 / 50.0).abs() < 0.005, "variance {}", var);
    }

    #[test]
    fn add_assign_accumulates() {
        let mut a = Tensor::from_vec(&[3], vec![1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_vec(&[3], vec![0.5, 0.5, 0.5]).unwrap();
        a += &b;
        assert_eq!(a.data, vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[f32::NAN, 0.2]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
