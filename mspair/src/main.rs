use std::path::PathBuf;
use clap::Parser;
use log::info;

use mspair::data::dataset::TrainingDataset;
use mspair::{DataGeneratorBuilder, GeneratorConfig};

/// Runs the pair generator over a binned dataset and reports label statistics per epoch.
#[derive(Parser, Debug)]
#[command(name = "mspair", version, about)]
struct Args {
    /// JSON file with binned spectra, sample ids, scores and identity keys
    #[arg(short, long)]
    dataset: PathBuf,

    /// JSON generator configuration, defaults are used for missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed of the random source
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of epochs to run
    #[arg(long, default_value_t = 1)]
    epochs: usize,
}

fn main() -> mspair::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GeneratorConfig::from_json_file(path)?,
        None => GeneratorConfig::default(),
    };
    let bands = config.same_prob_bins.clone();

    let dataset = TrainingDataset::from_json_file(&args.dataset)?;
    let mut generator = DataGeneratorBuilder::new()
        .spectra(dataset.binned_spectra()?)
        .sample_ids(dataset.sample_ids.clone())
        .scores(&dataset.score_matrix()?)
        .identities(dataset.identities()?)
        .config(config)
        .build_seeded(args.seed)?;

    for epoch in 0..args.epochs {
        let mut labels: Vec<f32> = Vec::new();
        let mut occupied = 0usize;

        for batch in generator.epoch_batches() {
            let batch = batch?;
            labels.extend(batch.labels.iter());
            occupied += batch.reference.iter().chain(batch.query.iter()).filter(|&&v| v > 0.0).count();
        }
        generator.on_epoch_end();

        if labels.is_empty() {
            info!("epoch {}: no complete batch, sample id list is shorter than batch_size", epoch);
            continue;
        }

        let mean = labels.iter().sum::<f32>() / labels.len() as f32;
        info!(
            "epoch {}: {} pairs, mean label {:.4}, {:.1} peaks per spectrum",
            epoch,
            labels.len(),
            mean,
            occupied as f64 / (2 * labels.len()) as f64
        );
        for band in &bands {
            let hits = labels.iter().filter(|&&l| band.contains(l as f64, 0.0)).count();
            info!("  band ({:.2}, {:.2}]: {} pairs", band.low, band.high, hits);
        }
    }

    Ok(())
}
