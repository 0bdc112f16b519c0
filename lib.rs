pub mod config;
pub mod energy;
pub mod error;
pub mod labels;
pub mod models;
pub mod nutrition;
pub mod onnx;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod worker;

pub use error::{Error, ErrorKind, Result};
pub use pipeline::FoodClassifier;
pub use worker::ClassifierWorker;
