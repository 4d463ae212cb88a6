use std::fmt::Write;

use crate::dataloader::error::EngineError;

use super::graph_model::GraphModel;

/// Layer table in the style of a Keras `summary()`, one row per layer in execution order.
pub fn model_summary(model: &GraphModel) -> Result<String, EngineError> {
    let verified = model.verified()?;
    let mut out = String::new();
    let mut total_params = 0usize;

    // Writing into a String cannot fail
    let _ = writeln!(out, "\nModel Statistics");
    let _ = writeln!(out, "================");
    let _ = writeln!(out, "{:-<100}", "");
    let _ = writeln!(
        out,
        "{:<4} {:<10} {:<10} {:<16} {:<12} {:<20} {}",
        "ID", "Name", "Type", "Output Shape", "Parameters", "Connected to", "Config"
    );
    let _ = writeln!(out, "{:-<100}", "");

    for &layer_id in &verified.execution_order {
        let layer = &model.layers[&layer_id];
        let params = layer.layer.parameter_count();

        let output_shape = verified
            .output_shapes
            .get(&layer_id)
            .map(|shape| shape.sample_dims_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let connected_to = layer
            .input_connections
            .iter()
            .map(|id| model.layers[id].name.clone())
            .collect::<Vec<_>>()
            .join(", ");

        let _ = writeln!(
            out,
            "{:<4} {:<10} {:<10} {:<16} {:<12} {:<20} {}",
            layer_id,
            layer.name,
            layer.layer.name(),
            output_shape,
            params,
            if connected_to.is_empty() { "-".to_string() } else { connected_to },
            layer.layer.config_string().unwrap_or_default()
        );

        total_params += params;
    }

    let name_list = |ids: &[usize]| ids.iter().map(|id| model.layers[id].name.clone()).collect::<Vec<_>>();

    let _ = writeln!(out, "{:-<100}", "");
    let _ = writeln!(out, "\nGraph Structure:");
    let _ = writeln!(out, "Entry points: {:?}", name_list(&verified.entry_points));
    let _ = writeln!(out, "Exit points: {:?}", name_list(&verified.exit_points));
    let _ = writeln!(out, "\nModel Summary:");
    let _ = writeln!(out, "Total Parameters: {}", total_params);
    let _ = writeln!(
        out,
        "Parameter Memory: {:.2} MB",
        (total_params * std::mem::size_of::<f32>()) as f64 / (1024.0 * 1024.0)
    );

    let activation_bytes: usize = verified.output_shapes.values().map(|shape| shape.size_in_bytes()).sum();
    let _ = writeln!(
        out,
        "Activation Memory (per sample): {:.2} MB",
        activation_bytes as f64 / (1024.0 * 1024.0)
    );

    Ok(out)
}

pub fn print_model_stats(model: &GraphModel) -> Result<(), EngineError> {
    print!("{}", model_summary(model)?);
    Ok(())
}
