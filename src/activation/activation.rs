use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    /// Softmax is a vector-valued activation; it is applied at the layer level
    /// (not element-wise) in `Dense::forward()`.  The element-wise `function()`
    /// is therefore not used for this variant.
    Softmax,
}

impl ActivationFunction {
    /// Element-wise activation.  For `Softmax`, call `softmax()` on the whole
    /// pre-activation vector instead; this path should not be reached.
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Softmax => {
                panic!("ActivationFunction::Softmax::function() must not be called directly; \
                        use softmax() on the full vector.")
            }
        }
    }

    /// Element-wise derivative of the activation.
    ///
    /// For `Softmax`, the layer pairs it with cross-entropy and the combined
    /// gradient is `predicted - expected` (already computed by
    /// `SparseCrossEntropyLoss::derivative()`).  Returning `1.0` here passes
    /// that delta through unchanged without double-applying the Jacobian.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Softmax => 1.0,
        }
    }
}

/// Numerically stable softmax: shifts by the maximum before exponentiating.
pub fn softmax(z: &[f32]) -> Vec<f32> {
    let max = z.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = z.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
