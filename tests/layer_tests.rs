use alexnet::{
    ActivationType,
    Error,
    Layer,
    LayerConfig,
    Mode,
    Padding,
    Shape,
};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STEP: f32 = 1e-2;
const TOLERANCE: f32 = 2e-2;

fn random_array(shape: &[usize], rng: &mut StdRng) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(shape), |_| rng.random_range(-1.0..1.0))
}

/// Weighted sum of the layer output, so d(loss)/d(output) is `coeffs`.
fn probe(layer: &mut Box<dyn Layer>, input: &ArrayD<f32>, coeffs: &ArrayD<f32>) -> f32 {
    let output = layer.forward(input, Mode::Training).unwrap();
    (&output * coeffs).sum()
}

fn assert_close(analytic: &ArrayD<f32>, numeric: &ArrayD<f32>, what: &str) {
    assert_eq!(analytic.shape(), numeric.shape());
    for (i, (a, n)) in analytic.iter().zip(numeric.iter()).enumerate() {
        assert!(
            (a - n).abs() < TOLERANCE,
            "{} gradient mismatch at {}: analytic {} vs numeric {}",
            what, i, a, n
        );
    }
}

/// Compares backward() against central differences for the input and for
/// every trainable parameter.
fn check_gradients(mut layer: Box<dyn Layer>, input: ArrayD<f32>, rng: &mut StdRng) {
    let output = layer.forward(&input, Mode::Training).unwrap();
    let coeffs = random_array(output.shape(), rng);
    let grad_input = layer.backward(&coeffs).unwrap();
    let grad_params: Vec<ArrayD<f32>> = layer
        .parameters()
        .iter()
        .map(|p| p.grad.to_owned())
        .collect();

    // Input gradient
    let mut numeric = ArrayD::zeros(input.raw_dim());
    for (idx, slot) in numeric.iter_mut().enumerate() {
        let mut plus = input.clone();
        let mut minus = input.clone();
        *plus.iter_mut().nth(idx).unwrap() += STEP;
        *minus.iter_mut().nth(idx).unwrap() -= STEP;
        *slot = (probe(&mut layer, &plus, &coeffs) - probe(&mut layer, &minus, &coeffs)) / (2.0 * STEP);
    }
    assert_close(&grad_input, &numeric, "input");

    // Parameter gradients
    for (p, analytic) in grad_params.iter().enumerate() {
        let mut numeric = ArrayD::zeros(analytic.raw_dim());
        for (idx, slot) in numeric.iter_mut().enumerate() {
            *layer.parameters()[p].value.iter_mut().nth(idx).unwrap() += STEP;
            let plus = probe(&mut layer, &input, &coeffs);
            *layer.parameters()[p].value.iter_mut().nth(idx).unwrap() -= 2.0 * STEP;
            let minus = probe(&mut layer, &input, &coeffs);
            *layer.parameters()[p].value.iter_mut().nth(idx).unwrap() += STEP;
            *slot = (plus - minus) / (2.0 * STEP);
        }
        assert_close(analytic, &numeric, &format!("parameter {}", p));
    }
}

fn spatial(height: usize, width: usize, channels: usize) -> Shape {
    Shape::Spatial { height, width, channels }
}

#[test]
fn test_conv2d_valid_gradients() {
    let mut rng = StdRng::seed_from_u64(1);
    let layer = LayerConfig::conv2d(3, 3, 2, Padding::Valid)
        .build("conv2d_1", spatial(7, 7, 2), &mut rng)
        .unwrap();
    assert_eq!(layer.output_shape(), spatial(3, 3, 3));

    let input = random_array(&[2, 7, 7, 2], &mut rng);
    check_gradients(layer, input, &mut rng);
}

#[test]
fn test_conv2d_same_gradients() {
    let mut rng = StdRng::seed_from_u64(2);
    let layer = LayerConfig::conv2d(2, 5, 1, Padding::Same)
        .build("conv2d_2", spatial(4, 4, 2), &mut rng)
        .unwrap();
    assert_eq!(layer.output_shape(), spatial(4, 4, 2));

    let input = random_array(&[1, 4, 4, 2], &mut rng);
    check_gradients(layer, input, &mut rng);
}

#[test]
fn test_conv2d_same_strided_gradients() {
    let mut rng = StdRng::seed_from_u64(10);
    // Padding of 3 splits as 1 before and 2 after
    let layer = LayerConfig::conv2d(2, 4, 2, Padding::Same)
        .build("conv2d_3", spatial(5, 5, 2), &mut rng)
        .unwrap();
    assert_eq!(layer.output_shape(), spatial(3, 3, 2));

    let input = random_array(&[2, 5, 5, 2], &mut rng);
    check_gradients(layer, input, &mut rng);
}

#[test]
fn test_dense_gradients() {
    let mut rng = StdRng::seed_from_u64(3);
    for activation in [ActivationType::Sigmoid, ActivationType::Tanh, ActivationType::Linear] {
        let layer = LayerConfig::dense(3, activation)
            .build("dense_1", Shape::Flat(5), &mut rng)
            .unwrap();
        let input = random_array(&[4, 5], &mut rng);
        check_gradients(layer, input, &mut rng);
    }
}

#[test]
fn test_batch_norm_gradients() {
    let mut rng = StdRng::seed_from_u64(4);
    let layer = LayerConfig::batch_norm()
        .build("batch_normalization_1", spatial(2, 3, 2), &mut rng)
        .unwrap();

    let input = random_array(&[2, 2, 3, 2], &mut rng);
    check_gradients(layer, input, &mut rng);
}

#[test]
fn test_max_pool_gradients() {
    let mut rng = StdRng::seed_from_u64(5);
    let layer = LayerConfig::max_pool(2)
        .build("max_pooling2d_1", spatial(5, 4, 3), &mut rng)
        .unwrap();
    assert_eq!(layer.output_shape(), spatial(2, 2, 3));

    // Distinct, well separated values so no step changes which element wins
    let values: Vec<f32> = (0..60).map(|i| ((i * 7) % 60) as f32 * 0.1).collect();
    let input = ArrayD::from_shape_vec(IxDyn(&[1, 5, 4, 3]), values).unwrap();
    check_gradients(layer, input, &mut rng);
}

#[test]
fn test_relu_activation_layer() {
    let mut rng = StdRng::seed_from_u64(6);
    let mut layer = LayerConfig::activation(ActivationType::ReLU)
        .build("activation_1", Shape::Flat(3), &mut rng)
        .unwrap();

    let input = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![-2.0, 0.5, 3.0]).unwrap();
    let output = layer.forward(&input, Mode::Training).unwrap();
    assert_eq!(output.as_slice().unwrap(), &[0.0, 0.5, 3.0]);

    let grad = layer.backward(&ArrayD::ones(IxDyn(&[1, 3]))).unwrap();
    assert_eq!(grad.as_slice().unwrap(), &[0.0, 1.0, 1.0]);
}

#[test]
fn test_forward_rejects_wrong_input_size() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut layer = LayerConfig::dense(2, ActivationType::ReLU)
        .build("dense_1", Shape::Flat(3), &mut rng)
        .unwrap();

    // Try to forward propagate with incorrect input size
    let invalid_input = ArrayD::zeros(IxDyn(&[1, 2]));
    assert!(matches!(
        layer.forward(&invalid_input, Mode::Inference),
        Err(Error::InputShape { .. })
    ));
}

#[test]
fn test_parameter_counts() {
    let mut rng = StdRng::seed_from_u64(8);
    let conv = LayerConfig::conv2d(48, 7, 2, Padding::Valid)
        .build("conv2d_1", spatial(100, 100, 3), &mut rng)
        .unwrap();
    let norm = LayerConfig::batch_norm()
        .build("batch_normalization_1", conv.output_shape(), &mut rng)
        .unwrap();

    assert_eq!(conv.output_shape(), spatial(47, 47, 48));
    assert_eq!(conv.parameter_count(), 7 * 7 * 3 * 48 + 48);
    assert_eq!(norm.parameter_count(), 4 * 48);
    assert_eq!(norm.trainable_parameter_count(), 2 * 48);
}

#[test]
fn test_reinitialized_layers_differ() {
    let mut rng = StdRng::seed_from_u64(9);
    let config = LayerConfig::dense(4, ActivationType::ReLU);
    let first = config.build("dense_1", Shape::Flat(3), &mut rng).unwrap();
    let second = config.build("dense_1", Shape::Flat(3), &mut rng).unwrap();

    assert_eq!(first.config(), second.config());
    assert_ne!(first.weights()[0], second.weights()[0]);
}
