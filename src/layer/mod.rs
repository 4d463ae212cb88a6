pub mod activations;
pub mod conv2d;
pub mod element_wise;
pub mod factory;
pub mod input_buffer;
pub mod layer;
pub mod linear;
pub mod pool;
pub mod reshape;

#[cfg(test)]
pub(crate) mod test_util;
