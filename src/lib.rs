pub mod app;
pub mod config;
pub mod dataloader;
pub mod eval;
pub mod layer;
pub mod model;
pub mod tensor;
pub mod training;
pub mod utils;
