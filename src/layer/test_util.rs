use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};

use crate::tensor::{tensor::Tensor, tensor_desc::TensorDesc};

use super::layer::Layer;

const EPS: f32 = 1e-2;
const TOLERANCE: f32 = 2e-2;

pub fn seeded_tensor(desc: TensorDesc, seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::new(-1.0f32, 1.0);
    let data = (0..desc.num_elements()).map(|_| rng.sample(dist)).collect();
    Tensor::from_vec(desc, data)
}

// Scalar probe loss: sum(output * probe), so d(loss)/d(output) == probe
fn probe_loss(output: &Tensor, probe: &Tensor) -> f32 {
    output.data.iter().zip(probe.data.iter()).map(|(o, p)| o * p).sum()
}

fn assert_close(analytic: f32, numeric: f32, what: &str, idx: usize) {
    let scale = 1.0f32.max(analytic.abs()).max(numeric.abs());
    assert!(
        (analytic - numeric).abs() <= TOLERANCE * scale,
        "{} gradient mismatch at {}: analytic {} vs numeric {}",
        what,
        idx,
        analytic,
        numeric
    );
}

// Spread the checked indices over the whole tensor, at most ~24 of them
fn sample_indices(len: usize) -> impl Iterator<Item = usize> {
    let step = (len / 24).max(1);
    (0..len).step_by(step)
}

pub fn check_input_gradient(layer: &dyn Layer, input: &Tensor) {
    let output = layer.forward(&[input]).unwrap();
    let probe = seeded_tensor(output.desc.clone(), 99);
    let grads = layer.backward(&[input], &output, &probe).unwrap();
    let analytic = &grads.inputs[0];
    assert_eq!(analytic.desc, input.desc);

    for i in sample_indices(input.len()) {
        let mut plus = input.clone();
        plus.data[i] += EPS;
        let mut minus = input.clone();
        minus.data[i] -= EPS;

        let numeric = (probe_loss(&layer.forward(&[&plus]).unwrap(), &probe)
            - probe_loss(&layer.forward(&[&minus]).unwrap(), &probe))
            / (2.0 * EPS);
        assert_close(analytic.data[i], numeric, "input", i);
    }
}

pub fn check_parameter_gradient<L: Layer>(layer: &mut L, input: &Tensor, param: usize) {
    let output = layer.forward(&[input]).unwrap();
    let probe = seeded_tensor(output.desc.clone(), 98);
    let grads = layer.backward(&[input], &output, &probe).unwrap();
    let analytic = grads.parameters[param].clone();

    for i in sample_indices(analytic.len()) {
        let saved = layer.parameters()[param].data[i];

        layer.parameters_mut()[param].data[i] = saved + EPS;
        let plus = probe_loss(&layer.forward(&[input]).unwrap(), &probe);
        layer.parameters_mut()[param].data[i] = saved - EPS;
        let minus = probe_loss(&layer.forward(&[input]).unwrap(), &probe);
        layer.parameters_mut()[param].data[i] = saved;

        assert_close(analytic.data[i], (plus - minus) / (2.0 * EPS), "parameter", i);
    }
}
