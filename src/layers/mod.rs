pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod layer;
pub mod max_pool;

pub use conv2d::Conv2d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use layer::{Cache, Layer, ParamGrads};
pub use max_pool::MaxPool2d;
