pub mod batch;
pub mod config;
pub mod error;
pub mod generator;
pub mod info;
pub mod mnist;
pub mod par_iter;
pub mod synth;
