/// Sparse categorical cross-entropy for a Softmax output layer.
///
/// "Sparse" because targets are class indices rather than one-hot vectors.
pub struct SparseCrossEntropyLoss;

/// Small epsilon added inside ln() to prevent ln(0) = -inf.
const EPS: f32 = 1e-12;

impl SparseCrossEntropyLoss {
    /// `L = -ln(predicted[label] + eps)`
    pub fn loss(predicted: &[f32], label: usize) -> f32 {
        -(predicted[label] + EPS).ln()
    }

    /// Gradient of the combined Softmax + cross-entropy w.r.t. the logits:
    ///   ∂L/∂z_i = predicted[i] - [i == label]
    ///
    /// The Softmax derivative is the identity, so this delta passes through
    /// the output layer unchanged.
    pub fn derivative(predicted: &[f32], label: usize) -> Vec<f32> {
        predicted.iter().enumerate()
            .map(|(i, &p)| if i == label { p - 1.0 } else { p })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_correct_prediction_has_small_loss() {
        let good = SparseCrossEntropyLoss::loss(&[0.01, 0.98, 0.01], 1);
        let bad = SparseCrossEntropyLoss::loss(&[0.98, 0.01, 0.01], 1);
        assert!(good < 0.05);
        assert!(bad > 4.0);
    }

    #[test]
    fn zero_probability_stays_finite() {
        assert!(SparseCrossEntropyLoss::loss(&[1.0, 0.0], 1).is_finite());
    }

    #[test]
    fn derivative_subtracts_one_hot() {
        let d = SparseCrossEntropyLoss::derivative(&[0.2, 0.5, 0.3], 2);
        assert_eq!(d.len(), 3);
        assert!((d[0] - 0.2).abs() < 1e-6);
        assert!((d[1] - 0.5).abs() < 1e-6);
        assert!((d[2] + 0.7).abs() < 1e-6);
    }
}
