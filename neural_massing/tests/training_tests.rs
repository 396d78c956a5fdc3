//! Integration tests for the auto-decoder trainer.

use burn::backend::{Autodiff, NdArray};

use neural_massing::{
    config::{SamplerConfig, SdfDecoderConfig, TrainingConfig},
    data::{MeshSampler, ShapeBatch, ShapeDataset},
    training::{AutoDecoderTrainer, StopReason, TrainerState},
    LatentTable, MassingError, Point3, TriangleMesh,
};

type TestBackend = Autodiff<NdArray>;

fn toy_boxes() -> Vec<(String, TriangleMesh)> {
    vec![
        (
            "tower".to_string(),
            TriangleMesh::axis_aligned_box(Point3::new(0.4, 0.4, 0.1), Point3::new(0.6, 0.6, 0.85)),
        ),
        (
            "slab".to_string(),
            TriangleMesh::axis_aligned_box(Point3::new(0.25, 0.25, 0.1), Point3::new(0.75, 0.75, 0.35)),
        ),
        (
            "bar".to_string(),
            TriangleMesh::axis_aligned_box(Point3::new(0.3, 0.42, 0.1), Point3::new(0.7, 0.58, 0.6)),
        ),
    ]
}

fn toy_dataset(num_samples: usize) -> ShapeDataset {
    let sampler = MeshSampler::new(SamplerConfig::new().with_num_samples(num_samples).with_seed(Some(7))).unwrap();
    ShapeDataset::from_meshes(&toy_boxes(), &sampler).unwrap()
}

fn small_config(latent_dim: usize) -> TrainingConfig {
    let mut config = TrainingConfig::fast(latent_dim)
        .with_batch_size(3)
        .with_samples_per_shape(256)
        .with_decoder_learning_rate(3e-3)
        .with_latent_learning_rate(1e-2)
        .with_lr_decay_interval(1000)
        .with_num_epochs(60)
        .with_checkpoint_interval(1000);
    config.decoder = SdfDecoderConfig::fast(latent_dim).with_hidden_dim(32);
    config
}

#[test]
fn test_loss_decreases_on_toy_boxes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Default::default();
    let dataset = toy_dataset(2000);
    let mut trainer = AutoDecoderTrainer::<TestBackend>::new(small_config(8), dataset.size(), &device).unwrap();

    let report = trainer.fit(&dataset).unwrap();
    assert_eq!(report.stop_reason, StopReason::EpochBudget);
    assert_eq!(report.epochs, 60);
    assert_eq!(report.total_steps, 60);
    assert!(report.final_loss.is_finite());
    assert!(report.last_checkpoint.is_none());

    let (first, last) = trainer.loss_history().quartile_means().unwrap();
    assert!(last < first, "loss did not improve: first quartile {first}, last quartile {last}");
    assert!(trainer.latents().iter().all(|z| z.is_finite()));
}

#[test]
fn test_early_stop_on_plateau() {
    let device = Default::default();
    let dataset = toy_dataset(500);
    let config = small_config(4)
        .with_num_epochs(50)
        .with_early_stop_tolerance(Some(10.0))
        .with_early_stop_window(2);
    let dir = tempfile::tempdir().unwrap();
    let mut trainer = AutoDecoderTrainer::<TestBackend>::new(config, dataset.size(), &device)
        .unwrap()
        .with_checkpoint_dir(dir.path());

    // Any improvement is below the tolerance, so the first full window pair stops training.
    let report = trainer.fit(&dataset).unwrap();
    assert_eq!(report.stop_reason, StopReason::EarlyStop);
    assert_eq!(report.epochs, 4);
    assert_eq!(report.last_checkpoint, Some(dir.path().join("checkpoint_4")));
    assert_eq!(trainer.state(), TrainerState::Done);
}

#[test]
fn test_non_finite_latent_reports_divergence() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let checkpoint_dir = dir.path().join("checkpoint_0");

    let trainer = AutoDecoderTrainer::<TestBackend>::new(small_config(4), 2, &device).unwrap();
    let mut checkpoint = trainer.checkpoint().unwrap();
    checkpoint.latents = LatentTable::from_rows(4, vec![vec![0.0; 4], vec![f32::INFINITY; 4]]).unwrap();
    checkpoint.save(&checkpoint_dir).unwrap();

    let mut trainer = AutoDecoderTrainer::<TestBackend>::resume(&checkpoint_dir, &device).unwrap();
    let decoder_before = trainer.decoder().to_host().unwrap();
    let batch = ShapeBatch {
        points: vec![Point3::splat(0.5), Point3::splat(0.2)],
        distances: vec![-0.1, 0.1],
        shape_indices: vec![1, 1],
    };

    match trainer.train_step(&batch) {
        Err(MassingError::TrainingDiverged {
            epoch,
            step,
            last_checkpoint,
            ..
        }) => {
            assert_eq!(epoch, 0);
            assert_eq!(step, 1);
            assert_eq!(last_checkpoint, Some(checkpoint_dir.clone()));
        }
        other => panic!("expected divergence, got {other:?}"),
    }

    // Nothing was applied.
    assert_eq!(trainer.total_steps(), 0);
    assert_eq!(trainer.decoder().to_host().unwrap(), decoder_before);
}

#[test]
fn test_invalid_inputs_are_rejected() {
    let device = Default::default();

    let config = small_config(4).with_clamp_distance(0.0);
    assert!(matches!(
        AutoDecoderTrainer::<TestBackend>::new(config, 3, &device),
        Err(MassingError::Configuration { .. })
    ));

    let mut trainer = AutoDecoderTrainer::<TestBackend>::new(small_config(4), 3, &device).unwrap();
    let unknown_shape = ShapeBatch {
        points: vec![Point3::splat(0.5)],
        distances: vec![0.0],
        shape_indices: vec![3],
    };
    assert!(trainer.train_step(&unknown_shape).unwrap_err().is_data_error());

    let mismatched = ShapeBatch {
        points: vec![Point3::splat(0.5), Point3::splat(0.1)],
        distances: vec![0.0],
        shape_indices: vec![0, 0],
    };
    assert!(trainer.train_step(&mismatched).unwrap_err().is_data_error());
    assert_eq!(trainer.state(), TrainerState::Initialized);
}

#[test]
fn test_open_mesh_rejected_by_sampler() {
    let closed = TriangleMesh::axis_aligned_box(Point3::splat(0.3), Point3::splat(0.7));
    let mut open = closed.clone();
    open.faces.pop();

    let sampler = MeshSampler::new(SamplerConfig::fast().with_seed(Some(1))).unwrap();
    let err = ShapeDataset::from_meshes(&[("closed", closed), ("open", open)], &sampler).unwrap_err();
    assert!(err.is_data_error());
    assert!(err.to_string().contains("open"));
}
