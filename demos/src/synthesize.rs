//! Synthesize new massings from a trained model.
//!
//! Loads the latest checkpoint under a run directory, mixes latent codes by
//! random interpolation and latent arithmetic, and writes each result as OBJ.
//! Every synthesized code is recorded in `ledger.json` next to the meshes, so
//! later runs can build on earlier results and trace them back to the corpus.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin synthesize -- output/run/checkpoints output/synth [count] [seed] [resolution]
//! ```

use std::env;
use std::fs;
use std::path::PathBuf;

use burn::backend::{Autodiff, NdArray};
use instant::Instant;
use rand::rngs::StdRng;
use rand::SeedableRng;

use massing_core::write_obj_file;
use neural_massing::{
    config::{LatentOptimizerConfig, ReconstructionConfig},
    synthesis::{Provenance, SynthesisLedger, SynthesisRequest, Synthesizer},
    training::find_latest_checkpoint,
    TrainedModel,
};

type MyBackend = Autodiff<NdArray>;

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("Error {context}: {err}");
    std::process::exit(1);
}

fn describe(provenance: &Provenance) -> String {
    match provenance {
        Provenance::Initial { shape } => format!("training shape {shape}"),
        Provenance::Interpolation { sources, factors } => format!("interpolate {sources:?} by {factors:?}"),
        Provenance::Arithmetic { base, add, subtract } => format!("{base} + {add:?} - {subtract:?}"),
        Provenance::Recovered { loss } => format!("recovered (loss {loss:.5})"),
    }
}

fn main() {
    env_logger::init();

    println!("═══════════════════════════════════════════════════════════════");
    println!("            Massing Latent-Space Synthesis");
    println!("═══════════════════════════════════════════════════════════════");
    println!();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: {} <checkpoint_dir> <output_dir> [count] [seed] [resolution]", args[0]);
        std::process::exit(2);
    }
    let checkpoint_base = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);
    let count: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(8);
    let seed: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0);
    let resolution: usize = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(64);

    if let Err(e) = fs::create_dir_all(&output_dir) {
        fail(&format!("creating '{}'", output_dir.display()), e);
    }

    // =========================================================================
    // Step 1: Load the trained model
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 1: Load Model                                          │");
    println!("└─────────────────────────────────────────────────────────────┘");

    let Some(checkpoint) = find_latest_checkpoint(&checkpoint_base) else {
        fail(&format!("loading '{}'", checkpoint_base.display()), "no checkpoint found");
    };
    let device = Default::default();
    let start = Instant::now();
    let model = match TrainedModel::<NdArray>::load(&checkpoint, &device) {
        Ok(model) => model,
        Err(e) => fail(&format!("loading '{}'", checkpoint.display()), e),
    };
    let load_time = start.elapsed();

    let ledger_path = output_dir.join("ledger.json");
    let mut ledger = if ledger_path.exists() {
        match SynthesisLedger::load(&ledger_path) {
            Ok(ledger) => ledger,
            Err(e) => fail(&format!("reading '{}'", ledger_path.display()), e),
        }
    } else {
        SynthesisLedger::from_table(model.latents())
    };

    println!("  Checkpoint:      {}", checkpoint.display());
    println!("  Shapes:          {}", model.num_shapes());
    println!("  Latent dim:      {}", model.decoder().latent_dim());
    println!("  Ledger entries:  {}", ledger.len());
    println!("  Load time:       {:.3}s", load_time.as_secs_f64());
    println!();

    // =========================================================================
    // Step 2: Synthesize
    // =========================================================================
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ Step 2: Synthesize {count:<3} Massings                             │");
    println!("└─────────────────────────────────────────────────────────────┘");

    let reconstruction = ReconstructionConfig::new().with_resolution(resolution);
    let inference = LatentOptimizerConfig::from_training(model.config());
    let synthesizer = match Synthesizer::<MyBackend>::new(&model, reconstruction, inference) {
        Ok(synthesizer) => synthesizer,
        Err(e) => fail("configuring synthesizer", e),
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let start = Instant::now();
    for i in 0..count {
        let candidates: Vec<usize> = (0..ledger.len()).collect();
        let request = if i % 2 == 0 {
            SynthesisRequest::random_interpolation(&candidates, &mut rng)
        } else {
            SynthesisRequest::random_arithmetic(&candidates, &mut rng)
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => fail("building request", e),
        };
        let (index, synthesis) = match synthesizer.synthesize_into(&mut ledger, &request) {
            Ok(result) => result,
            Err(e) => fail("synthesizing", e),
        };

        let path = output_dir.join(format!("massing_{index:04}.obj"));
        if synthesis.mesh.is_empty() {
            log::warn!("latent {index} has no zero crossing in the unit cube; writing an empty mesh");
        }
        if let Err(e) = write_obj_file(&synthesis.mesh, &path) {
            fail(&format!("writing '{}'", path.display()), e);
        }
        let provenance = ledger.entry(index).map(|e| describe(&e.provenance)).unwrap_or_default();
        println!("  #{index:<4} {:>7} faces  {provenance}", synthesis.mesh.num_faces());
    }
    let synth_time = start.elapsed();

    if let Err(e) = ledger.save(&ledger_path) {
        fail(&format!("writing '{}'", ledger_path.display()), e);
    }
    println!("  Synthesis time:  {:.3}s", synth_time.as_secs_f64());
    println!();

    println!("═══════════════════════════════════════════════════════════════");
    println!("                        SUMMARY");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Ledger:          {} ({} entries)", ledger_path.display(), ledger.len());
    println!("  Output:          {}", output_dir.display());
    println!("═══════════════════════════════════════════════════════════════");
}
