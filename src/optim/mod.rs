pub mod adam;

pub use adam::Adam;

use crate::network::network::{Gradients, Network};

/// Applies averaged batch gradients to a network's parameters.
pub trait Optimizer {
    fn step(&mut self, network: &mut Network, grads: &Gradients);

    fn learning_rate(&self) -> f32;

    /// Used by learning-rate schedulers between epochs.
    fn set_learning_rate(&mut self, learning_rate: f32);
}
