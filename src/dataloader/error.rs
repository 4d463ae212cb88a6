use thiserror::Error;

use crate::{model::graph_model::LayerId, tensor::tensor_desc::TensorDesc};

#[derive(Error, Debug)]
pub enum EngineError {
    // IO and System Errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Dataset file not found: {0}")]
    DatasetNotFound(String),

    #[error("Malformed IDX file {path}: {reason}")]
    MalformedIdx { path: String, reason: String },

    #[error("Image count {images} does not match label count {labels}")]
    CountMismatch { images: usize, labels: usize },

    #[error("No examples found in the dataset")]
    EmptyDataset,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Graph construction and execution
    #[error("Invalid model graph: {0}")]
    InvalidGraph(String),

    #[error("Model has not been verified")]
    NotVerified,

    #[error("Layer {0} not found")]
    LayerNotFound(LayerId),

    #[error("No layer named '{0}'")]
    UnknownLayerName(String),

    #[error("Shape mismatch in {layer}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        layer: String,
        expected: String,
        actual: TensorDesc,
    },

    #[error("Batch source ran dry after {0} batches")]
    GeneratorExhausted(usize),
}
