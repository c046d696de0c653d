use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::layers::{conv2d::Conv2d, dense::Dense, dropout::Dropout, max_pool::MaxPool2d};
use crate::math::tensor::Tensor;

/// Gradient buffers for one trainable layer, shaped like its parameters.
#[derive(Debug, Clone)]
pub struct ParamGrads {
    pub weights: Tensor,
    pub biases: Tensor,
}

impl ParamGrads {
    pub fn zeros_for(weights: &Tensor, biases: &Tensor) -> ParamGrads {
        ParamGrads {
            weights: Tensor::zeros_like(weights),
            biases: Tensor::zeros_like(biases),
        }
    }

    pub fn add(&mut self, other: &ParamGrads) {
        self.weights += &other.weights;
        self.biases += &other.biases;
    }

    pub fn scale(&mut self, factor: f32) {
        self.weights.scale(factor);
        self.biases.scale(factor);
    }
}

/// One stage of a sequential network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Flatten,
    Dropout(Dropout),
    Dense(Dense),
}

/// What a layer remembers from a training forward pass for its backward pass.
#[derive(Debug)]
pub enum Cache {
    Conv2d { input: Tensor, pre_activation: Tensor },
    MaxPool2d { input_shape: Vec<usize>, switches: Vec<usize> },
    Flatten { input_shape: Vec<usize> },
    Dropout { mask: Vec<f32> },
    Dense { input: Vec<f32>, pre_activation: Vec<f32> },
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Conv2d(_) => "Conv2d",
            Layer::MaxPool2d(_) => "MaxPool2d",
            Layer::Flatten => "Flatten",
            Layer::Dropout(_) => "Dropout",
            Layer::Dense(_) => "Dense",
        }
    }

    pub fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        match self {
            Layer::Conv2d(conv) => conv.output_shape(input_shape),
            Layer::MaxPool2d(pool) => pool.output_shape(input_shape),
            Layer::Flatten => vec![input_shape.iter().product()],
            Layer::Dropout(_) => input_shape.to_vec(),
            Layer::Dense(dense) => vec![dense.size],
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.params().map(|(w, b)| w.len() + b.len()).unwrap_or(0)
    }

    pub fn params(&self) -> Option<(&Tensor, &Tensor)> {
        match self {
            Layer::Conv2d(conv) => Some((&conv.weights, &conv.biases)),
            Layer::Dense(dense) => Some((&dense.weights, &dense.biases)),
            _ => None,
        }
    }

    pub fn params_mut(&mut self) -> Option<(&mut Tensor, &mut Tensor)> {
        match self {
            Layer::Conv2d(conv) => Some((&mut conv.weights, &mut conv.biases)),
            Layer::Dense(dense) => Some((&mut dense.weights, &mut dense.biases)),
            _ => None,
        }
    }

    /// Zeroed gradient buffers, or `None` for layers without parameters.
    pub fn zero_grads(&self) -> Option<ParamGrads> {
        self.params().map(|(w, b)| ParamGrads::zeros_for(w, b))
    }

    /// Inference-mode forward pass: dropout is the identity.
    pub fn infer(&self, input: Tensor) -> Tensor {
        match self {
            Layer::Conv2d(conv) => conv.forward(&input).0,
            Layer::MaxPool2d(pool) => pool.forward(&input).0,
            Layer::Flatten => flatten(input),
            Layer::Dropout(_) => input,
            Layer::Dense(dense) => {
                let (a, _) = dense.forward(&input.data);
                Tensor { shape: vec![a.len()], data: a }
            }
        }
    }

    /// Training-mode forward pass; the returned cache feeds `backward`.
    pub fn forward_train<R: Rng + ?Sized>(&self, input: Tensor, rng: &mut R) -> (Tensor, Cache) {
        match self {
            Layer::Conv2d(conv) => {
                let (a, z) = conv.forward(&input);
                (a, Cache::Conv2d { input, pre_activation: z })
            }
            Layer::MaxPool2d(pool) => {
                let (out, switches) = pool.forward(&input);
                (out, Cache::MaxPool2d { input_shape: input.shape, switches })
            }
            Layer::Flatten => {
                let input_shape = input.shape.clone();
                (flatten(input), Cache::Flatten { input_shape })
            }
            Layer::Dropout(dropout) => {
                let (out, mask) = dropout.forward_train(&input, rng);
                (out, Cache::Dropout { mask })
            }
            Layer::Dense(dense) => {
                let (a, z) = dense.forward(&input.data);
                let out = Tensor { shape: vec![a.len()], data: a };
                (out, Cache::Dense { input: input.data, pre_activation: z })
            }
        }
    }

    /// Backward pass. `delta` is ∂L/∂output; gradients for trainable layers are
    /// accumulated into `grads`. Returns ∂L/∂input (empty when
    /// `need_input_grad` is false and the layer can skip computing it).
    pub fn backward(
        &self,
        cache: &Cache,
        delta: Tensor,
        grads: Option<&mut ParamGrads>,
        need_input_grad: bool,
    ) -> Tensor {
        match (self, cache, grads) {
            (Layer::Conv2d(conv), Cache::Conv2d { input, pre_activation }, Some(g)) => {
                conv.backward(input, pre_activation, &delta, g, need_input_grad)
            }
            (Layer::MaxPool2d(pool), Cache::MaxPool2d { input_shape, switches }, _) => {
                pool.backward(input_shape, switches, &delta)
            }
            (Layer::Flatten, Cache::Flatten { input_shape }, _) => {
                Tensor { shape: input_shape.clone(), data: delta.data }
            }
            (Layer::Dropout(dropout), Cache::Dropout { mask }, _) => dropout.backward(mask, &delta),
            (Layer::Dense(dense), Cache::Dense { input, pre_activation }, Some(g)) => {
                let d = dense.backward(input, pre_activation, &delta.data, g);
                Tensor { shape: vec![d.len()], data: d }
            }
            (layer, _, _) => panic!("{} layer received a cache from a different layer", layer.name()),
        }
    }
}

fn flatten(input: Tensor) -> Tensor {
    Tensor { shape: vec![input.data.len()], data: input.data }
}
