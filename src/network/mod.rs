pub mod metadata;
pub mod network;
pub mod spec;

pub use metadata::{InputType, ModelMetadata};
pub use network::{Gradients, Network};
pub use spec::{LayerSpec, NetworkSpec};
