use rand::rngs::StdRng;
use tracing::info;

use crate::{
    dataloader::{
        batch::Batch,
        error::EngineError,
        mnist::{IMAGE_COLS, IMAGE_ROWS, NUM_CLASSES},
        synth::CHANNELS,
    },
    layer::factory::Layers,
    tensor::tensor::Tensor,
};

use super::graph_model::{Activations, GraphModel, LayerId};

pub const DIGIT_HEAD: &str = "digit";
pub const COLOR_HEAD: &str = "color";

const FILTERS: usize = 32;
const POOL_SIZE: usize = 4;

/// Head outputs for a batch: digit probabilities `[B, 10]` and color probabilities `[B, 1]`.
pub struct Predictions {
    pub digit: Tensor,
    pub color: Tensor,
}

impl Predictions {
    pub fn digit_class(&self, index: usize) -> u8 {
        let row = self.digit.row(index);
        // First maximum wins on ties
        let mut best = 0;
        for (class, &p) in row.iter().enumerate() {
            if p > row[best] {
                best = class;
            }
        }
        best as u8
    }

    pub fn color_probability(&self, index: usize) -> f32 {
        self.color.data[index]
    }
}

/// A verified graph with a softmax `digit` head and a sigmoid `color` head.
/// `*_logits` are the single layers feeding each head; training seeds its gradients there.
pub struct DualHeadModel {
    pub graph: GraphModel,
    pub digit_head: LayerId,
    pub color_head: LayerId,
    pub digit_logits: LayerId,
    pub color_logits: LayerId,
}

impl DualHeadModel {
    /// The colored-digit classifier: a shared conv stem, a pooled color head
    /// straight off the stem, and a residual conv block feeding the digit head.
    pub fn new(rng: &mut StdRng) -> Result<Self, EngineError> {
        let mut model = Self::from_graph(build_graph())?;
        model.graph.initialize(rng);

        info!(parameters = model.graph.parameter_count(), "model initialized");
        Ok(model)
    }

    /// Wraps any graph exposing layers named `digit` and `color`, verifying it if needed.
    pub fn from_graph(mut graph: GraphModel) -> Result<Self, EngineError> {
        if graph.verified.is_none() {
            graph.verify()?;
        }

        let digit_head = graph.layer_id(DIGIT_HEAD)?;
        let color_head = graph.layer_id(COLOR_HEAD)?;
        let digit_logits = head_input(&graph, digit_head)?;
        let color_logits = head_input(&graph, color_head)?;

        Ok(Self {
            graph,
            digit_head,
            color_head,
            digit_logits,
            color_logits,
        })
    }

    pub fn forward(&self, input: &Tensor) -> Result<(Activations, Predictions), EngineError> {
        let activations = self.graph.forward(&[input])?;
        let predictions = Predictions {
            digit: activations.get(self.digit_head)?.clone(),
            color: activations.get(self.color_head)?.clone(),
        };
        Ok((activations, predictions))
    }

    pub fn predict(&self, batch: &Batch) -> Result<Predictions, EngineError> {
        let (_, predictions) = self.forward(&batch.to_input_tensor())?;
        Ok(predictions)
    }
}

fn head_input(graph: &GraphModel, head: LayerId) -> Result<LayerId, EngineError> {
    let layer = &graph.layers[&head];
    match layer.input_connections.as_slice() {
        [input] => Ok(*input),
        inputs => Err(EngineError::InvalidGraph(format!(
            "Head '{}' must have exactly one input, has {}",
            layer.name,
            inputs.len()
        ))),
    }
}

pub fn build_graph() -> GraphModel {
    let pooled = (IMAGE_ROWS - 2) / POOL_SIZE;
    let flat_features = FILTERS * pooled * pooled;

    let mut model = GraphModel::new();

    model.add_layer("input", Layers::input_image(CHANNELS, IMAGE_ROWS, IMAGE_COLS));
    model.add_layer("conv_1", Layers::conv2d(CHANNELS, FILTERS));
    let act_1 = model.add_layer("act_1", Layers::relu());

    model.add_layer("pool_1", Layers::maxpool2d(POOL_SIZE));
    model.add_layer("flat_1", Layers::flatten());
    model.add_layer("color_dense", Layers::linear(flat_features, 1));
    model.add_layer(COLOR_HEAD, Layers::sigmoid());

    model.add_layer_with("conv_2", Layers::conv2d_same(FILTERS, FILTERS), &[act_1], None);
    model.add_layer("act_2", Layers::relu());
    let conv_3 = model.add_layer("conv_3", Layers::conv2d_same(FILTERS, FILTERS));
    model.add_layer_with("add", Layers::add(), &[act_1, conv_3], None);
    model.add_layer("act_3", Layers::relu());
    model.add_layer("pool_2", Layers::maxpool2d(POOL_SIZE));
    model.add_layer("flat_2", Layers::flatten());
    model.add_layer("digit_dense", Layers::linear(flat_features, NUM_CLASSES as usize));
    model.add_layer(DIGIT_HEAD, Layers::softmax());

    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataloader::{
            mnist::PIXELS_PER_IMAGE,
            synth::{ColorFlag, SyntheticExample},
        },
        model::print_model_stats::model_summary,
        tensor::tensor_desc::TensorDesc,
    };
    use rand::SeedableRng;

    #[test]
    fn topology_matches_the_two_head_design() {
        let model = DualHeadModel::new(&mut StdRng::seed_from_u64(0)).unwrap();
        let verified = model.graph.verified().unwrap();
        let shape = |name: &str| verified.output_shapes[&model.graph.layer_id(name).unwrap()].clone();

        assert_eq!(shape("act_1"), TensorDesc::new_tensor4d(1, 32, 26, 26));
        assert_eq!(shape("conv_3"), TensorDesc::new_tensor4d(1, 32, 26, 26));
        assert_eq!(shape("pool_1"), TensorDesc::new_tensor4d(1, 32, 6, 6));
        assert_eq!(shape("flat_2"), TensorDesc::new_matrix(1, 1152));
        assert_eq!(shape(DIGIT_HEAD), TensorDesc::new_matrix(1, 10));
        assert_eq!(shape(COLOR_HEAD), TensorDesc::new_matrix(1, 1));

        assert_eq!(model.digit_logits, model.graph.layer_id("digit_dense").unwrap());
        assert_eq!(model.color_logits, model.graph.layer_id("color_dense").unwrap());

        let act_1 = model.graph.layer_id("act_1").unwrap();
        let add = model.graph.layer_id("add").unwrap();
        assert_eq!(model.graph.layers[&add].input_connections[0], act_1);
        assert_eq!(verified.exit_points.len(), 2);
    }

    #[test]
    fn parameter_count_matches_reference_summary() {
        // conv_1 896, conv_2 9248, conv_3 9248, color 1153, digit 11530
        let model = DualHeadModel::new(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(model.graph.parameter_count(), 31_975);

        let summary = model_summary(&model.graph).unwrap();
        assert!(summary.contains("Total Parameters: 31975"));
        assert!(summary.contains("act_1, conv_3"));
    }

    #[test]
    fn predictions_are_probabilities() {
        let model = DualHeadModel::new(&mut StdRng::seed_from_u64(1)).unwrap();

        let mut batch = Batch::with_capacity(2);
        for (digit, color) in [(3, ColorFlag::Red), (8, ColorFlag::Green)] {
            let image = (0..PIXELS_PER_IMAGE * CHANNELS).map(|i| (i % 7) as f32 / 7.0).collect();
            batch.push(SyntheticExample { image, digit, color });
        }

        let predictions = model.predict(&batch).unwrap();
        assert_eq!(predictions.digit.desc, TensorDesc::new_matrix(2, 10));
        for i in 0..2 {
            let sum: f32 = predictions.digit.row(i).iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
            assert!(predictions.digit_class(i) < 10);
            assert!((0.0..=1.0).contains(&predictions.color_probability(i)));
        }
    }

    #[test]
    fn graph_without_heads_is_rejected() {
        let mut graph = GraphModel::new();
        graph.add_layer("input", Layers::input_image(1, 2, 2));
        graph.add_layer("out", Layers::relu());
        assert!(matches!(
            DualHeadModel::from_graph(graph),
            Err(EngineError::UnknownLayerName(_))
        ));
    }

    #[test]
    fn digit_class_prefers_first_maximum() {
        let predictions = Predictions {
            digit: Tensor::from_vec(TensorDesc::new_matrix(1, 4), vec![0.1, 0.4, 0.4, 0.1]),
            color: Tensor::from_vec(TensorDesc::new_matrix(1, 1), vec![0.7]),
        };
        assert_eq!(predictions.digit_class(0), 1);
    }
}
