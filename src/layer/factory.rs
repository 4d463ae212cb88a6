use super::{
    activations::{ActivationLayer, ActivationType},
    conv2d::Conv2DLayer,
    element_wise::{ElementWiseLayer, ElementWiseOperation},
    input_buffer::InputLayer,
    layer::Layer,
    linear::LinearLayer,
    pool::MaxPool2DLayer,
    reshape::ReshapeLayer,
};

pub struct Layers;

impl Layers {
    pub fn input_image(channels: usize, height: usize, width: usize) -> Box<dyn Layer> {
        Box::new(InputLayer::new(channels, height, width))
    }

    pub fn linear(in_features: usize, out_features: usize) -> Box<dyn Layer> {
        Box::new(LinearLayer::new(in_features, out_features))
    }

    pub fn linear_with(in_features: usize, out_features: usize, bias: bool) -> Box<dyn Layer> {
        Box::new(LinearLayer::new_with(in_features, out_features, bias))
    }

    pub fn conv2d(in_channels: usize, out_channels: usize) -> Box<dyn Layer> {
        Box::new(Conv2DLayer::new(in_channels, out_channels))
    }

    pub fn conv2d_same(in_channels: usize, out_channels: usize) -> Box<dyn Layer> {
        Box::new(Conv2DLayer::same(in_channels, out_channels))
    }

    pub fn maxpool2d(pool_size: usize) -> Box<dyn Layer> {
        Box::new(MaxPool2DLayer::new(pool_size))
    }

    pub fn flatten() -> Box<dyn Layer> {
        Box::new(ReshapeLayer::flatten())
    }

    pub fn add() -> Box<dyn Layer> {
        Box::new(ElementWiseLayer::new(ElementWiseOperation::Add))
    }

    pub fn relu() -> Box<dyn Layer> {
        Box::new(ActivationLayer::new(ActivationType::ReLU))
    }

    pub fn sigmoid() -> Box<dyn Layer> {
        Box::new(ActivationLayer::new(ActivationType::Sigmoid))
    }

    pub fn softmax() -> Box<dyn Layer> {
        Box::new(ActivationLayer::new(ActivationType::Softmax))
    }
}
