use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::{Cache, Conv2d, Dense, Dropout, Layer, MaxPool2d, ParamGrads};
use crate::math::tensor::Tensor;
use crate::network::metadata::ModelMetadata;
use crate::network::spec::{LayerSpec, NetworkSpec};

/// A sequential network over single samples.
///
/// Inference (`predict`) only borrows the network, so one loaded model can be
/// shared across threads. Training keeps per-sample state in the `Cache`
/// values returned by `forward_train` instead of inside the layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub input_shape: Vec<usize>,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

/// Per-layer gradient buffers, `None` for layers without parameters.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub layers: Vec<Option<ParamGrads>>,
}

impl Gradients {
    pub fn add(&mut self, other: &Gradients) {
        for (mine, theirs) in self.layers.iter_mut().zip(&other.layers) {
            if let (Some(a), Some(b)) = (mine, theirs) {
                a.add(b);
            }
        }
    }

    pub fn scale(&mut self, factor: f32) {
        self.layers.iter_mut().flatten().for_each(|g| g.scale(factor));
    }
}

impl Network {
    /// Builds a freshly initialized network, threading each layer's output
    /// shape into the next layer's input size.
    pub fn from_spec<R: Rng + ?Sized>(spec: &NetworkSpec, rng: &mut R) -> Network {
        let mut shape = spec.input_shape.clone();
        let mut layers = Vec::with_capacity(spec.layers.len());

        for layer_spec in &spec.layers {
            let layer = match *layer_spec {
                LayerSpec::Conv2d { filters, kernel_size, activation } => {
                    Layer::Conv2d(Conv2d::new(shape[2], filters, kernel_size, activation, rng))
                }
                LayerSpec::MaxPool2d { pool } => Layer::MaxPool2d(MaxPool2d::new(pool)),
                LayerSpec::Flatten => Layer::Flatten,
                LayerSpec::Dropout { rate } => Layer::Dropout(Dropout::new(rate)),
                LayerSpec::Dense { size, activation } => {
                    Layer::Dense(Dense::new(size, shape.iter().product(), activation, rng))
                }
            };
            shape = layer.output_shape(&shape);
            layers.push(layer);
        }

        Network {
            name: spec.name.clone(),
            input_shape: spec.input_shape.clone(),
            layers,
            metadata: spec.metadata.clone(),
        }
    }

    pub fn digit_classifier<R: Rng + ?Sized>(rng: &mut R) -> Network {
        Network::from_spec(&NetworkSpec::digit_cnn(), rng)
    }

    pub fn output_shape(&self) -> Vec<usize> {
        self.layers.iter().fold(self.input_shape.clone(), |shape, layer| layer.output_shape(&shape))
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// One line per layer: name, output shape, parameter count.
    pub fn summary(&self) -> Vec<String> {
        let mut shape = self.input_shape.clone();
        let mut lines = vec![format!("{:<12} {:<16} {:>10}", "Layer", "Output shape", "Params")];
        for layer in &self.layers {
            shape = layer.output_shape(&shape);
            lines.push(format!(
                "{:<12} {:<16} {:>10}",
                layer.name(),
                format!("{:?}", shape),
                layer.parameter_count()
            ));
        }
        lines.push(format!("Total params: {}", self.parameter_count()));
        lines
    }

    /// Checks that every layer's parameters agree with the shape flowing into
    /// it. Guards inference against truncated or hand-edited model files.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::ShapeMismatch("network has no layers".into()));
        }

        let mut shape = self.input_shape.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let bad = |why: String| Error::ShapeMismatch(format!("layer {} ({}): {}", i, layer.name(), why));
            match layer {
                Layer::Conv2d(conv) => {
                    let k = conv.kernel_size;
                    if shape.len() != 3 || shape[2] != conv.in_channels || shape[0] < k || shape[1] < k {
                        return Err(bad(format!("input {:?} does not fit a {}x{}x{} kernel", shape, k, k, conv.in_channels)));
                    }
                    if conv.weights.len() != k * k * conv.in_channels * conv.filters || conv.biases.len() != conv.filters {
                        return Err(bad("parameter count does not match kernel geometry".into()));
                    }
                    if conv.activator == ActivationFunction::Softmax {
                        return Err(bad("softmax is only supported on dense layers".into()));
                    }
                }
                Layer::MaxPool2d(pool) => {
                    if shape.len() != 3 || pool.pool == 0 || shape[0] < pool.pool || shape[1] < pool.pool {
                        return Err(bad(format!("cannot pool input {:?}", shape)));
                    }
                }
                Layer::Flatten => {}
                Layer::Dropout(dropout) => {
                    if !(0.0..1.0).contains(&dropout.rate) {
                        return Err(bad(format!("dropout rate {} outside [0, 1)", dropout.rate)));
                    }
                }
                Layer::Dense(dense) => {
                    if shape.len() != 1 || shape[0] != dense.input_size {
                        return Err(bad(format!("expects {} inputs, receives {:?}", dense.input_size, shape)));
                    }
                    if dense.weights.len() != dense.input_size * dense.size || dense.biases.len() != dense.size {
                        return Err(bad("parameter count does not match layer size".into()));
                    }
                }
            }
            shape = layer.output_shape(&shape);
        }
        Ok(())
    }

    /// Inference for one sample shaped like `input_shape`; returns the output
    /// layer's activations (class probabilities for a Softmax head).
    pub fn predict(&self, input: &Tensor) -> Result<Vec<f32>> {
        if input.shape != self.input_shape {
            return Err(Error::ShapeMismatch(format!(
                "model expects input {:?}, got {:?}",
                self.input_shape, input.shape
            )));
        }
        let out = self.layers.iter().fold(input.clone(), |x, layer| layer.infer(x));
        Ok(out.data)
    }

    /// Training-mode forward pass (dropout active). Returns the output and the
    /// per-layer caches needed by `backward`.
    pub fn forward_train<R: Rng + ?Sized>(&self, input: Tensor, rng: &mut R) -> (Vec<f32>, Vec<Cache>) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut current = input;
        for layer in &self.layers {
            let (out, cache) = layer.forward_train(current, rng);
            caches.push(cache);
            current = out;
        }
        (current.data, caches)
    }

    /// Backward pass from ∂L/∂output, accumulating into `grads`.
    pub fn backward(&self, caches: &[Cache], output_delta: Vec<f32>, grads: &mut Gradients) {
        let mut delta = Tensor { shape: vec![output_delta.len()], data: output_delta };
        for i in (0..self.layers.len()).rev() {
            delta = self.layers[i].backward(&caches[i], delta, grads.layers[i].as_mut(), i > 0);
        }
    }

    pub fn zero_grads(&self) -> Gradients {
        Gradients { layers: self.layers.iter().map(Layer::zero_grads).collect() }
    }

    /// Serializes the network weights to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Deserializes and validates a network previously written by `save_json`.
    pub fn load_json(path: &Path) -> Result<Network> {
        let file = File::open(path).map_err(|e| {
            Error::ModelLoad(format!("Model file not found at {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);
        let network: Network = serde_json::from_reader(reader).map_err(|e| {
            Error::ModelLoad(format!("Model file {} is not a valid model: {}", path.display(), e))
        })?;
        network.validate().map_err(|e| {
            Error::ModelLoad(format!("Model file {} is inconsistent: {}", path.display(), e))
        })?;
        Ok(network)
    }
}
