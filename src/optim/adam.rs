use crate::network::network::{Gradients, Network};
use crate::optim::Optimizer;

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone)]
struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Moments {
    fn new(len: usize) -> Moments {
        Moments { m: vec![0.0; len], v: vec![0.0; len] }
    }
}

/// Adam with bias-corrected step size.
///
/// Moment buffers are created on the first `step`, one pair per weight and
/// bias tensor, in layer order.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    beta1_t: f32,
    beta2_t: f32,
    moments: Vec<Moments>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Adam {
        Adam::with_hyperparameters(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_hyperparameters(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Adam {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            beta1_t: 1.0,
            beta2_t: 1.0,
            moments: Vec::new(),
        }
    }

    fn update(&mut self, slot: usize, step_size: f32, params: &mut [f32], grad: &[f32]) {
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let Moments { m, v } = &mut self.moments[slot];

        params.iter_mut()
            .zip(grad)
            .zip(m.iter_mut())
            .zip(v.iter_mut())
            .for_each(|(((p, g), m), v)| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                *p -= step_size * *m / (v.sqrt() + eps);
            });
    }
}

impl Optimizer for Adam {
    fn step(&mut self, network: &mut Network, grads: &Gradients) {
        if self.moments.is_empty() {
            self.moments = network.layers.iter()
                .filter_map(|layer| layer.params())
                .flat_map(|(w, b)| [Moments::new(w.len()), Moments::new(b.len())])
                .collect();
        }

        self.beta1_t *= self.beta1;
        self.beta2_t *= self.beta2;
        let step_size = self.learning_rate * (1.0 - self.beta2_t).sqrt() / (1.0 - self.beta1_t);

        let mut slot = 0;
        for (layer, grad) in network.layers.iter_mut().zip(&grads.layers) {
            if let (Some((weights, biases)), Some(g)) = (layer.params_mut(), grad) {
                self.update(slot, step_size, &mut weights.data, &g.weights.data);
                self.update(slot + 1, step_size, &mut biases.data, &g.biases.data);
                slot += 2;
            }
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}
