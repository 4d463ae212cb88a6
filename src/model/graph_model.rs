use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use tracing::debug;

use crate::{
    dataloader::error::EngineError,
    layer::layer::Layer,
    tensor::{tensor::Tensor, tensor_desc::TensorDesc},
};

use super::weight_init::WeightInit;

pub type LayerId = usize;

pub struct GraphModel {
    pub weight_init: WeightInit,
    pub layers: HashMap<LayerId, GraphModelLayer>,
    pub verified: Option<GraphVerifiedData>,
}

pub struct GraphModelLayer {
    pub id: LayerId,
    pub name: String,
    pub layer: Box<dyn Layer>,
    pub weight_init: Option<WeightInit>,

    pub input_connections: Vec<LayerId>,
    pub output_connections: Vec<LayerId>,
}

pub struct GraphVerifiedData {
    pub entry_points: Vec<LayerId>,
    pub exit_points: Vec<LayerId>,
    pub execution_order: Vec<LayerId>,
    // Per-layer output shape at batch size 1
    pub output_shapes: HashMap<LayerId, TensorDesc>,
}

/// Every layer's output from one forward pass, kept for the backward pass.
pub struct Activations {
    values: HashMap<LayerId, Tensor>,
}

impl Activations {
    pub fn get(&self, id: LayerId) -> Result<&Tensor, EngineError> {
        self.values.get(&id).ok_or(EngineError::LayerNotFound(id))
    }
}

/// Trainable-parameter gradients keyed by layer, in each layer's `parameters()` order.
pub type ParameterGradients = HashMap<LayerId, Vec<Tensor>>;

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModel {
    pub fn new() -> Self {
        Self::new_with(WeightInit::Xavier)
    }

    pub fn new_with(weight_init: WeightInit) -> Self {
        Self {
            weight_init,
            layers: HashMap::new(),
            verified: None,
        }
    }

    pub fn add_layer(&mut self, name: &str, layer: Box<dyn Layer>) -> LayerId {
        let id = self.next_available_id();

        // Only connect if this isn't an input layer
        let input_connections = if !self.layers.is_empty() && layer.input_requirements().0 > 0 {
            // Find the most recently added layer ID
            let prev_id = (0..id).rev().find(|prev_id| self.layers.contains_key(prev_id));

            match prev_id {
                Some(prev_id) => vec![prev_id],
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        self.add_layer_with(name, layer, &input_connections, None)
    }

    pub fn add_layer_with(
        &mut self,
        name: &str,
        layer: Box<dyn Layer>,
        input_connections: &[LayerId],
        weight_init: Option<WeightInit>,
    ) -> LayerId {
        let id = self.next_available_id();

        // Update connections in the related layers
        for &input_id in input_connections {
            if let Some(input_layer) = self.layers.get_mut(&input_id) {
                if !input_layer.output_connections.contains(&id) {
                    input_layer.output_connections.push(id);
                }
            }
        }

        self.layers.insert(
            id,
            GraphModelLayer {
                id,
                name: name.to_string(),
                layer,
                weight_init,
                input_connections: input_connections.to_vec(),
                output_connections: Vec::new(),
            },
        );
        self.verified = None;
        id
    }

    pub fn next_available_id(&self) -> LayerId {
        let mut id = 0;
        while self.layers.contains_key(&id) {
            id += 1;
        }
        id
    }

    pub fn layer_id(&self, name: &str) -> Result<LayerId, EngineError> {
        self.layers
            .values()
            .find(|layer| layer.name == name)
            .map(|layer| layer.id)
            .ok_or_else(|| EngineError::UnknownLayerName(name.to_string()))
    }

    fn sorted_ids(&self) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = self.layers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn verified(&self) -> Result<&GraphVerifiedData, EngineError> {
        self.verified.as_ref().ok_or(EngineError::NotVerified)
    }

    pub fn verify(&mut self) -> Result<(), EngineError> {
        let ids = self.sorted_ids();

        // Identify input layers (those with input_requirements().0 == 0)
        let input_layer_ids: Vec<LayerId> = ids
            .iter()
            .copied()
            .filter(|id| self.layers[id].layer.input_requirements().0 == 0)
            .collect();

        // There should be at least one input layer
        if input_layer_ids.is_empty() {
            return Err(EngineError::InvalidGraph("Model must have at least one input layer".into()));
        }

        // All input layers should have no inputs
        let invalid_input_layers: Vec<LayerId> = input_layer_ids
            .iter()
            .copied()
            .filter(|id| !self.layers[id].input_connections.is_empty())
            .collect();

        if !invalid_input_layers.is_empty() {
            return Err(EngineError::InvalidGraph(format!(
                "Input layers cannot have inputs themselves: {:?}",
                invalid_input_layers
            )));
        }

        // Layer names double as output names, so they must be unique
        let mut names = HashSet::new();
        for id in &ids {
            let name = &self.layers[id].name;
            if !names.insert(name.as_str()) {
                return Err(EngineError::InvalidGraph(format!("Duplicate layer name '{}'", name)));
            }
        }

        // Find exit points (layers with no outputs)
        let exit_points: Vec<LayerId> = ids
            .iter()
            .copied()
            .filter(|id| self.layers[id].output_connections.is_empty())
            .collect();

        if exit_points.is_empty() {
            return Err(EngineError::InvalidGraph("Model has no exit points".into()));
        }

        // Verify that all referenced layers exist
        for layer in self.layers.values() {
            for input_id in &layer.input_connections {
                if !self.layers.contains_key(input_id) {
                    return Err(EngineError::InvalidGraph(format!(
                        "Layer {} references non-existent input layer {}",
                        layer.id, input_id
                    )));
                }
            }

            for output_id in &layer.output_connections {
                if !self.layers.contains_key(output_id) {
                    return Err(EngineError::InvalidGraph(format!(
                        "Layer {} references non-existent output layer {}",
                        layer.id, output_id
                    )));
                }
            }
        }

        // Verify bidirectional consistency of connections
        for layer in self.layers.values() {
            for output_id in &layer.output_connections {
                if !self.layers[output_id].input_connections.contains(&layer.id) {
                    return Err(EngineError::InvalidGraph(format!(
                        "Connection inconsistency: Layer {} lists {} as output, but {} does not list {} as input",
                        layer.id, output_id, output_id, layer.id
                    )));
                }
            }

            for input_id in &layer.input_connections {
                if !self.layers[input_id].output_connections.contains(&layer.id) {
                    return Err(EngineError::InvalidGraph(format!(
                        "Connection inconsistency: Layer {} lists {} as input, but {} does not list {} as output",
                        layer.id, input_id, input_id, layer.id
                    )));
                }
            }
        }

        // Verify input layer counts match requirements
        for id in &ids {
            let layer = &self.layers[id];
            let (min_inputs, max_inputs) = layer.layer.input_requirements();
            let actual_inputs = layer.input_connections.len();

            if actual_inputs < min_inputs {
                return Err(EngineError::InvalidGraph(format!(
                    "Layer {} ('{}') requires at least {} inputs, but has {}",
                    layer.id, layer.name, min_inputs, actual_inputs
                )));
            }

            if let Some(max) = max_inputs {
                if actual_inputs > max {
                    return Err(EngineError::InvalidGraph(format!(
                        "Layer {} ('{}') requires at most {} inputs, but has {}",
                        layer.id, layer.name, max, actual_inputs
                    )));
                }
            }
        }

        // Detect cycles using a depth-first search
        if self.has_cycle() {
            return Err(EngineError::InvalidGraph("Model contains cycles".into()));
        }

        // Generate execution order (topological sort)
        let execution_order = self.topological_sort()?;

        // Verify that execution order includes all layers
        if execution_order.len() != self.layers.len() {
            return Err(EngineError::InvalidGraph(format!(
                "Execution order has {} layers but model has {} layers",
                execution_order.len(),
                self.layers.len()
            )));
        }

        // Shape inference along the execution order catches mismatched wiring up front
        let mut output_shapes: HashMap<LayerId, TensorDesc> = HashMap::new();
        for id in &execution_order {
            let layer = &self.layers[id];
            let input_shapes: Vec<&TensorDesc> = layer
                .input_connections
                .iter()
                .map(|input_id| &output_shapes[input_id])
                .collect();
            let shape = layer.layer.output_shape(1, &input_shapes)?;
            output_shapes.insert(*id, shape);
        }

        debug!(
            layers = self.layers.len(),
            entry_points = ?input_layer_ids,
            exit_points = ?exit_points,
            "model graph verified"
        );

        self.verified = Some(GraphVerifiedData {
            entry_points: input_layer_ids,
            exit_points,
            execution_order,
            output_shapes,
        });

        Ok(())
    }

    fn topological_sort(&self) -> Result<Vec<LayerId>, EngineError> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut temp = HashSet::new();

        // Visit each node, highest id first so the reversed order favours insertion order
        for id in self.sorted_ids().into_iter().rev() {
            if !visited.contains(&id) && !temp.contains(&id) {
                self.visit_node(id, &mut visited, &mut temp, &mut result)?;
            }
        }

        // Reverse the result to get the correct execution order
        result.reverse();
        Ok(result)
    }

    fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for id in self.sorted_ids() {
            if !visited.contains(&id) && self.is_cyclic_util(id, &mut visited, &mut rec_stack) {
                return true;
            }
        }
        false
    }

    fn is_cyclic_util(&self, id: LayerId, visited: &mut HashSet<LayerId>, rec_stack: &mut HashSet<LayerId>) -> bool {
        visited.insert(id);
        rec_stack.insert(id);

        if let Some(layer) = self.layers.get(&id) {
            for &next_id in &layer.output_connections {
                if !visited.contains(&next_id) {
                    if self.is_cyclic_util(next_id, visited, rec_stack) {
                        return true;
                    }
                } else if rec_stack.contains(&next_id) {
                    return true;
                }
            }
        }

        rec_stack.remove(&id);
        false
    }

    fn visit_node(
        &self,
        id: LayerId,
        visited: &mut HashSet<LayerId>,
        temp: &mut HashSet<LayerId>,
        result: &mut Vec<LayerId>,
    ) -> Result<(), EngineError> {
        if temp.contains(&id) {
            return Err(EngineError::InvalidGraph(format!("Cycle detected involving layer {}", id)));
        }

        if visited.contains(&id) {
            return Ok(());
        }

        temp.insert(id);

        if let Some(layer) = self.layers.get(&id) {
            for &next_id in &layer.output_connections {
                self.visit_node(next_id, visited, temp, result)?;
            }
        }

        temp.remove(&id);
        visited.insert(id);
        result.push(id);

        Ok(())
    }

    /// Draws fresh parameters for every layer, in id order so a seed reproduces the model.
    pub fn initialize(&mut self, rng: &mut StdRng) {
        let default_init = self.weight_init.clone();
        for id in self.sorted_ids() {
            if let Some(layer) = self.layers.get_mut(&id) {
                let init = layer.weight_init.as_ref().unwrap_or(&default_init);
                layer.layer.init_parameters(init, rng);
            }
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.values().map(|layer| layer.layer.parameter_count()).sum()
    }

    /// Runs the graph. `inputs` are matched to the entry points in id order.
    pub fn forward(&self, inputs: &[&Tensor]) -> Result<Activations, EngineError> {
        let verified = self.verified()?;

        if inputs.len() != verified.entry_points.len() {
            return Err(EngineError::InvalidGraph(format!(
                "Model has {} entry points but {} inputs were given",
                verified.entry_points.len(),
                inputs.len()
            )));
        }

        let mut values: HashMap<LayerId, Tensor> = HashMap::with_capacity(self.layers.len());

        for &id in &verified.execution_order {
            let layer = &self.layers[&id];

            let output = match verified.entry_points.iter().position(|&entry| entry == id) {
                Some(slot) => layer.layer.forward(&[inputs[slot]])?,
                None => {
                    let layer_inputs: Vec<&Tensor> = layer
                        .input_connections
                        .iter()
                        .map(|input_id| &values[input_id])
                        .collect();
                    layer.layer.forward(&layer_inputs)?
                }
            };
            values.insert(id, output);
        }

        Ok(Activations { values })
    }

    /// Backpropagates `output_grads` (gradients of the loss w.r.t. some layer outputs)
    /// through the graph. Gradients from several consumers of one layer are summed.
    pub fn backward(
        &self,
        activations: &Activations,
        output_grads: HashMap<LayerId, Tensor>,
    ) -> Result<ParameterGradients, EngineError> {
        let verified = self.verified()?;
        let mut grads = output_grads;
        let mut parameter_grads = ParameterGradients::new();

        for &id in verified.execution_order.iter().rev() {
            let Some(grad_output) = grads.remove(&id) else {
                continue;
            };
            if verified.entry_points.contains(&id) {
                continue;
            }

            let layer = &self.layers[&id];
            let output = activations.get(id)?;
            if grad_output.desc != output.desc || grad_output.len() != output.len() {
                return Err(EngineError::ShapeMismatch {
                    layer: layer.name.clone(),
                    expected: format!("output gradient shaped {:?}", output.desc.to_dims()),
                    actual: grad_output.desc,
                });
            }

            let layer_inputs: Vec<&Tensor> = layer
                .input_connections
                .iter()
                .map(|&input_id| activations.get(input_id))
                .collect::<Result<_, _>>()?;

            let layer_grads = layer.layer.backward(&layer_inputs, output, &grad_output)?;

            if layer_grads.inputs.len() != layer.input_connections.len() {
                return Err(EngineError::InvalidGraph(format!(
                    "Layer {} ('{}') returned {} input gradients for {} inputs",
                    id,
                    layer.name,
                    layer_grads.inputs.len(),
                    layer.input_connections.len()
                )));
            }

            for ((&input_id, input), grad) in layer
                .input_connections
                .iter()
                .zip(&layer_inputs)
                .zip(layer_grads.inputs)
            {
                if grad.desc != input.desc || grad.len() != input.len() {
                    return Err(EngineError::ShapeMismatch {
                        layer: layer.name.clone(),
                        expected: format!("gradient shaped {:?}", input.desc.to_dims()),
                        actual: grad.desc,
                    });
                }
                match grads.get_mut(&input_id) {
                    Some(existing) => existing.add_assign(&grad)?,
                    None => {
                        grads.insert(input_id, grad);
                    }
                }
            }

            if !layer_grads.parameters.is_empty() {
                parameter_grads.insert(id, layer_grads.parameters);
            }
        }

        Ok(parameter_grads)
    }
}
