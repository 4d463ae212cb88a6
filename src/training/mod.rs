pub mod callbacks;
pub mod loss;
pub mod metrics;
pub mod optimizer;
pub mod trainer;
