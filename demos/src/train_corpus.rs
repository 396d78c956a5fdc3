//! Train an auto-decoder on a directory of massing OBJ files.
//!
//! 1. Read every `.obj` in the input directory
//! 2. Normalize the corpus into the unit cube (footprints on `z = 0`)
//! 3. Sample signed distances around each mesh
//! 4. Train the decoder and latent codes, checkpointing as it goes
//! 5. Reconstruct every training shape from its latent code
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin train_corpus -- input/towers output/run [epochs] [latent_dim]
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use burn::backend::{Autodiff, NdArray};
use instant::Instant;

use massing_core::{read_obj_file, write_obj_file, CorpusNormalizer, TriangleMesh};
use neural_massing::{
    config::{ReconstructionConfig, SamplerConfig, TrainingConfig},
    data::{MeshSampler, ShapeDataset},
    training::{find_latest_checkpoint, AutoDecoderTrainer, StopReason},
};

type MyBackend = Autodiff<NdArray>;

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("Error {context}: {err}");
    std::process::exit(1);
}

fn obj_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => fail(&format!("reading '{}'", dir.display()), e),
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("obj")))
        .collect();
    paths.sort();
    paths
}

fn main() {
    env_logger::init();

    println!("═══════════════════════════════════════════════════════════════");
    println!("            Massing Auto-Decoder Training");
    println!("═══════════════════════════════════════════════════════════════");
    println!();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: {} <input_dir> <output_dir> [epochs] [latent_dim]", args[0]);
        std::process::exit(2);
    }
    let input_dir = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);
    let epochs: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let latent_dim: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(64);

    let checkpoint_dir = output_dir.join("checkpoints");
    let mesh_dir = output_dir.join("reconstructions");
    for dir in [&checkpoint_dir, &mesh_dir] {
        if let Err(e) = fs::create_dir_all(dir) {
            fail(&format!("creating '{}'", dir.display()), e);
        }
    }

    // =========================================================================
    // Step 1: Load and normalize the corpus
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 1: Load Corpus                                         │");
    println!("└─────────────────────────────────────────────────────────────┘");

    let start = Instant::now();
    let mut names = Vec::new();
    let mut meshes: Vec<TriangleMesh> = Vec::new();
    for path in obj_files(&input_dir) {
        match read_obj_file(&path) {
            Ok(mesh) => {
                names.push(path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned()));
                meshes.push(mesh);
            }
            Err(e) => log::warn!("skipping {}: {e}", path.display()),
        }
    }
    if meshes.is_empty() {
        fail(&format!("loading '{}'", input_dir.display()), "no readable OBJ files");
    }
    let scale = match CorpusNormalizer::default().normalize(&mut meshes) {
        Ok(scale) => scale,
        Err(e) => fail("normalizing corpus", e),
    };
    let load_time = start.elapsed();

    println!("  Input directory: {}", input_dir.display());
    println!("  Shapes:          {}", meshes.len());
    println!("  Corpus scale:    {scale:.6}");
    println!("  Load time:       {:.3}s", load_time.as_secs_f64());
    println!();

    // =========================================================================
    // Step 2: Sample signed distances
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 2: Sample Signed Distances                             │");
    println!("└─────────────────────────────────────────────────────────────┘");

    let sampler = match MeshSampler::new(SamplerConfig::new().with_seed(Some(0))) {
        Ok(sampler) => sampler,
        Err(e) => fail("configuring sampler", e),
    };
    let start = Instant::now();
    let named: Vec<(String, TriangleMesh)> = names.into_iter().zip(meshes).collect();
    let dataset = match ShapeDataset::from_meshes(&named, &sampler) {
        Ok(dataset) => dataset,
        Err(e) => fail("sampling corpus", e),
    };
    let sample_time = start.elapsed();

    println!("  Samples/shape:   {}", sampler.config().num_samples);
    println!("  Total samples:   {}", dataset.total_samples());
    println!("  Sample time:     {:.3}s", sample_time.as_secs_f64());
    println!();

    // =========================================================================
    // Step 3: Train
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 3: Train Decoder and Latent Codes                      │");
    println!("└─────────────────────────────────────────────────────────────┘");

    let mut config = TrainingConfig::default()
        .with_num_epochs(epochs)
        .with_sanity_check_resolution(32);
    config.decoder.latent_dim = latent_dim;

    println!("  Latent dim:      {latent_dim}");
    println!("  Decoder:         {} layers x {}", config.decoder.num_layers, config.decoder.hidden_dim);
    println!("  Epochs:          {}", config.num_epochs);
    println!("  Checkpoints:     {} (every {} epochs)", checkpoint_dir.display(), config.checkpoint_interval);
    println!();

    let device = Default::default();
    // A previous run in the same output directory is continued with its own configuration.
    let trainer = match find_latest_checkpoint(&checkpoint_dir) {
        Some(latest) => {
            println!("  Resuming from:   {}", latest.display());
            AutoDecoderTrainer::<MyBackend>::resume(&latest, &device)
        }
        None => AutoDecoderTrainer::<MyBackend>::new(config, dataset.size(), &device),
    };
    let mut trainer = match trainer {
        Ok(trainer) => trainer.with_checkpoint_dir(&checkpoint_dir),
        Err(e) => fail("creating trainer", e),
    };

    let start = Instant::now();
    let report = match trainer.fit(&dataset) {
        Ok(report) => report,
        Err(e) => fail("training", e),
    };
    let train_time = start.elapsed();

    let reason = match report.stop_reason {
        StopReason::EpochBudget => "epoch budget",
        StopReason::EarlyStop => "loss plateau",
        StopReason::Cancelled => "cancelled",
    };
    println!("  Epochs run:      {} ({reason})", report.epochs);
    println!("  Steps:           {}", report.total_steps);
    println!("  Final loss:      {:.6}", report.final_loss);
    println!("  Train time:      {:.3}s", train_time.as_secs_f64());
    if let Some(path) = &report.last_checkpoint {
        println!("  Last checkpoint: {}", path.display());
    }
    println!();

    // =========================================================================
    // Step 4: Reconstruct training shapes
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 4: Reconstruct Training Shapes                         │");
    println!("└─────────────────────────────────────────────────────────────┘");

    let model = match trainer.freeze() {
        Ok(model) => model,
        Err(e) => fail("freezing model", e),
    };
    let start = Instant::now();
    for record in dataset.iter() {
        let mesh = match model.reconstruct_shape(record.index, ReconstructionConfig::new()) {
            Ok(mesh) => mesh,
            Err(e) => fail(&format!("reconstructing {}", record.name), e),
        };
        let path = mesh_dir.join(format!("{}.obj", record.name));
        if let Err(e) = write_obj_file(&mesh, &path) {
            fail(&format!("writing '{}'", path.display()), e);
        }
        println!("  {:<24} {:>7} vertices {:>7} faces", record.name, mesh.num_vertices(), mesh.num_faces());
    }
    let recon_time = start.elapsed();
    println!("  Reconstruct time: {:.3}s", recon_time.as_secs_f64());
    println!();

    println!("═══════════════════════════════════════════════════════════════");
    println!("                        SUMMARY");
    println!("═══════════════════════════════════════════════════════════════");
    let total = load_time + sample_time + train_time + recon_time;
    println!("  Total time:      {:.3}s", total.as_secs_f64());
    println!("  Output:          {}", output_dir.display());
    println!("═══════════════════════════════════════════════════════════════");
}
