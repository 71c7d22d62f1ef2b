use alexnet::{
    like_alexnet,
    like_alexnet_seeded,
    ActivationType,
    AdamConfig,
    Error,
    FitConfig,
    LayerConfig,
    Loss,
    Metric,
    Model,
    OptimizerConfig,
    Padding,
    Shape,
    WeightInitStrategy,
};
use ndarray::{Array, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_images(batch: usize, side: usize, seed: u64) -> ArrayD<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayD::from_shape_fn(IxDyn(&[batch, side, side, 3]), |_| rng.random_range(0.0..1.0))
}

fn assert_dimension_mismatch(result: Result<Model, Error>, expected_layer: &str) {
    match result {
        Err(Error::DimensionMismatch { layer, .. }) => assert_eq!(layer, expected_layer),
        Err(other) => panic!("expected a dimension mismatch, got {}", other),
        Ok(_) => panic!("expected {} to reject the input shape", expected_layer),
    }
}

#[test]
fn test_builds_for_documented_input_shape() {
    let model = like_alexnet_seeded((100, 100, 3), AdamConfig::default(), 0).unwrap();

    assert_eq!(model.layers().len(), 18);
    assert_eq!(model.output_shape(), Shape::Flat(1));
    assert_eq!(
        model.layer_configs().last(),
        Some(&LayerConfig::dense(1, ActivationType::Sigmoid))
    );
    assert!(model.is_compiled());
}

#[test]
fn test_feature_map_shapes_and_parameter_count() {
    let model = like_alexnet_seeded((100, 100, 3), AdamConfig::default(), 0).unwrap();
    let shapes: Vec<Shape> = model.layers().iter().map(|layer| layer.output_shape()).collect();
    let spatial = |height, width, channels| Shape::Spatial { height, width, channels };

    assert_eq!(shapes[0], spatial(47, 47, 48));
    assert_eq!(shapes[3], spatial(23, 23, 48));
    assert_eq!(shapes[5], spatial(23, 23, 128));
    assert_eq!(shapes[8], spatial(11, 11, 128));
    assert_eq!(shapes[9], spatial(5, 5, 192));
    assert_eq!(shapes[12], Shape::Flat(4800));
    assert_eq!(shapes[13], Shape::Flat(2048));

    assert_eq!(model.parameter_count(), 14_414_529);
    assert_eq!(model.trainable_parameter_count(), 14_414_529 - 736);
}

#[test]
fn test_unspecified_hyperparameters_use_defaults() {
    let model = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 0).unwrap();
    assert_eq!(
        model.optimizer_config(),
        Some(OptimizerConfig::Adam(AdamConfig {
            learning_rate: 0.001,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: None,
            decay: 0.0,
        }))
    );

    let overrides = AdamConfig::from_json(r#"{"lr": 0.01, "beta_1": 0.8}"#).unwrap();
    let model = like_alexnet_seeded((32, 32, 3), overrides, 0).unwrap();
    match model.optimizer_config() {
        Some(OptimizerConfig::Adam(config)) => {
            assert_eq!(config.learning_rate, 0.01);
            assert_eq!(config.beta_1, 0.8);
            assert_eq!(config.beta_2, 0.999);
            assert_eq!(config.epsilon, None);
            assert_eq!(config.decay, 0.0);
        }
        other => panic!("expected Adam, got {:?}", other),
    }
}

#[test]
fn test_incompatible_input_shape_fails() {
    // Too small for the first 7x7 kernel
    assert_dimension_mismatch(like_alexnet((6, 6, 3), AdamConfig::default()), "conv2d_1");
    // 10 -> 2 -> 1, then the second pooling has nothing to pool
    assert_dimension_mismatch(like_alexnet((10, 10, 3), AdamConfig::default()), "max_pooling2d_2");
    // 28 -> 11 -> 5 -> 5 -> 2, too small for the last 3x3 kernel
    assert_dimension_mismatch(like_alexnet((28, 28, 3), AdamConfig::default()), "conv2d_3");
    assert_dimension_mismatch(like_alexnet((100, 100, 0), AdamConfig::default()), "conv2d_1");

    assert!(like_alexnet((29, 29, 3), AdamConfig::default()).is_ok());
}

#[test]
fn test_compiled_loss_and_metrics() {
    let model = like_alexnet_seeded((32, 32, 1), AdamConfig::default(), 0).unwrap();

    assert_eq!(model.loss(), Some(Loss::BinaryCrossEntropy));
    assert!(model.metrics().contains(&Metric::Accuracy));
}

#[test]
fn test_identical_arguments_identical_architecture() {
    let first = like_alexnet((32, 32, 3), AdamConfig::default()).unwrap();
    let second = like_alexnet((32, 32, 3), AdamConfig::default()).unwrap();

    assert_eq!(first.architecture(), second.architecture());
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_ne!(first.weights()[0], second.weights()[0]);
}

#[test]
fn test_seeded_builds_are_reproducible() {
    let first = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 9).unwrap();
    let second = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 9).unwrap();

    assert_eq!(first.weights(), second.weights());
}

#[test]
fn test_layer_names_follow_keras_convention() {
    let model = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 0).unwrap();
    let names: Vec<&str> = model.layers().iter().map(|layer| layer.name()).collect();

    assert_eq!(&names[..5], &["conv2d_1", "activation_1", "batch_normalization_1", "max_pooling2d_1", "dropout_1"]);
    assert_eq!(names[17], "dense_3");
}

#[test]
fn test_architecture_json_round_trip() {
    let model = like_alexnet_seeded((32, 32, 3), AdamConfig::default().with_decay(0.1), 0).unwrap();
    let json = model.to_json().unwrap();

    let rebuilt = Model::from_json(&json, Some(1)).unwrap();
    assert_eq!(rebuilt.architecture(), model.architecture());
    assert!(rebuilt.is_compiled());
}

#[test]
fn test_kernel_initializer_is_part_of_the_architecture() {
    let mut model = Model::with_seed((4, 4, 1), 5);
    model
        .add(LayerConfig::conv2d(8, 3, 1, Padding::Valid).with_kernel_initializer(WeightInitStrategy::HeNormal))
        .unwrap()
        .add(LayerConfig::flatten())
        .unwrap()
        .add(LayerConfig::dense(1, ActivationType::Sigmoid))
        .unwrap();
    model.compile(AdamConfig::default(), Loss::BinaryCrossEntropy, &[Metric::Accuracy]);

    let json = model.to_json().unwrap();
    assert!(json.contains("\"kernel_initializer\": \"he_normal\""));
    assert!(json.contains("\"kernel_initializer\": \"glorot_uniform\""));

    let rebuilt = Model::from_json(&json, Some(6)).unwrap();
    assert_eq!(rebuilt.layer_configs(), model.layer_configs());

    // He normal is unbounded, Glorot uniform with fan_in 9 and fan_out 72 stays within 0.27
    let kernel = model.weights()[0].to_owned();
    assert_eq!(kernel.len(), 3 * 3 * 8);
    assert!(kernel.iter().any(|w| w.abs() > 0.3));
}

#[test]
fn test_predict_outputs_probabilities() {
    let mut model = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 1).unwrap();
    let images = random_images(2, 32, 2);

    let first = model.predict(&images).unwrap();
    let second = model.predict(&images).unwrap();

    assert_eq!(first.shape(), &[2, 1]);
    assert!(first.iter().all(|p| (0.0..=1.0).contains(p)));
    // Inference mode is deterministic: no dropout, frozen statistics
    assert_eq!(first, second);
}

#[test]
fn test_predict_rejects_wrong_input_shape() {
    let mut model = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 1).unwrap();
    let images = random_images(1, 31, 2);

    assert!(matches!(model.predict(&images), Err(Error::InputShape { .. })));
}

#[test]
fn test_train_on_batch_updates_weights() {
    let mut model = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 3).unwrap();
    let images = random_images(2, 32, 4);
    let labels = Array::from_vec(vec![0.0, 1.0]).into_dyn();
    let before = model.weights()[0].to_owned();

    let logs = model.train_on_batch(&images, &labels).unwrap();

    assert!(logs.loss.is_finite() && logs.loss > 0.0);
    let accuracy = logs.metric(Metric::Accuracy).unwrap();
    assert!((0.0..=1.0).contains(&accuracy));
    assert_ne!(model.weights()[0], before.view());
    assert_eq!(model.optimizer().map(|o| o.iterations()), Some(1));
}

#[test]
fn test_target_shape_must_match_output() {
    let mut model = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 3).unwrap();
    let images = random_images(2, 32, 4);
    let labels = Array::from_vec(vec![0.0, 1.0, 1.0]).into_dyn();

    assert!(matches!(
        model.train_on_batch(&images, &labels),
        Err(Error::TargetShape { .. })
    ));
}

#[test]
fn test_training_requires_compilation() {
    let mut model = Model::with_seed((1, 1, 2), 0);
    model
        .add(LayerConfig::flatten())
        .unwrap()
        .add(LayerConfig::dense(1, ActivationType::Sigmoid))
        .unwrap();

    let inputs = ArrayD::zeros(IxDyn(&[1, 1, 1, 2]));
    let targets = ArrayD::zeros(IxDyn(&[1, 1]));
    assert!(matches!(model.train_on_batch(&inputs, &targets), Err(Error::NotCompiled)));
    assert!(matches!(model.evaluate(&inputs, &targets), Err(Error::NotCompiled)));
}

#[test]
fn test_fit_separates_linear_data() {
    let mut model = Model::with_seed((1, 1, 2), 42);
    model
        .add(LayerConfig::flatten())
        .unwrap()
        .add(LayerConfig::dense(8, ActivationType::ReLU))
        .unwrap()
        .add(LayerConfig::dense(1, ActivationType::Sigmoid))
        .unwrap();
    model.compile(
        AdamConfig::default().with_learning_rate(0.05),
        Loss::BinaryCrossEntropy,
        &[Metric::Accuracy],
    );

    let points = vec![
        1.0, 1.0, 2.0, 0.5, 0.5, 2.0, 1.5, 1.5,
        -1.0, -1.0, -2.0, -0.5, -0.5, -2.0, -1.5, -1.5,
    ];
    let inputs = Array::from_shape_vec((8, 1, 1, 2), points).unwrap().into_dyn();
    let targets = Array::from_vec(vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]).into_dyn();

    let history = model
        .fit(&inputs, &targets, &FitConfig::new().with_epochs(200).with_batch_size(4))
        .unwrap();

    assert_eq!(history.epochs.len(), 200);
    let first = history.epochs[0].loss;
    let last = history.last().unwrap().loss;
    assert!(last < first * 0.5, "loss went from {} to {}", first, last);

    let logs = model.evaluate(&inputs, &targets).unwrap();
    assert_eq!(logs.metric(Metric::Accuracy), Some(1.0));
}

#[test]
fn test_fit_rejects_zero_batch_size() {
    let mut model = like_alexnet_seeded((32, 32, 3), AdamConfig::default(), 0).unwrap();
    let images = random_images(1, 32, 0);
    let labels = Array::from_vec(vec![1.0]).into_dyn();

    assert!(matches!(
        model.fit(&images, &labels, &FitConfig::new().with_batch_size(0)),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_summary_lists_every_layer() {
    let model = like_alexnet_seeded((100, 100, 3), AdamConfig::default(), 0).unwrap();
    let summary = model.summary();

    assert!(summary.contains("conv2d_1 (Conv2D)"));
    assert!(summary.contains("(None, 47, 47, 48)"));
    assert!(summary.contains("dense_3 (Dense)"));
    assert!(summary.contains("Total params: 14414529"));
    assert!(summary.contains("Non-trainable params: 736"));
}
