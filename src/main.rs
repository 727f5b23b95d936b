//! Training and compression experiments for a variational autoencoder
//! on MNIST.

use std::{path::Path, process::ExitCode, time::Instant};
use vae_compress::{
    backend::{Autodiff, AutodiffBackend, NdArray},
    error::Error,
    experiment::{
        run_one, standard_runs, ExperimentConfig, ExperimentRun, MnistLoaders,
    },
    model::VaeConfig,
};

#[cfg(feature = "wgpu")]
use vae_compress::backend::Wgpu;

fn main() -> ExitCode {
    env_logger::init();

    let config = ExperimentConfig::new(VaeConfig::new());
    match launch(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        },
    }
}

fn launch(config: ExperimentConfig) -> Result<(), Error> {
    #[cfg(feature = "wgpu")]
    if !config.no_gpu {
        return run_experiments::<Autodiff<Wgpu>>(&Default::default(), config);
    }
    run_experiments::<Autodiff<NdArray>>(&Default::default(), config)
}

/// Train the baseline model, then rerun it under every standard
/// compression descriptor, timing each phase.
fn run_experiments<AB: AutodiffBackend>(
    device: &AB::Device,
    config: ExperimentConfig,
) -> Result<(), Error> {
    const ARTIFACT_DIR: &str = "results";

    AB::seed(config.seed);
    let artifact_dir = Path::new(ARTIFACT_DIR);
    let checkpoint = artifact_dir.join("model");
    let loaders = MnistLoaders::<AB>::new(&config, device);

    let run = ExperimentRun::<AB>::new(config.to_owned(), artifact_dir, device);
    log::info!(
        target: "vae_compress",
        "baseline model holds {} of parameters",
        run.model.size_readable(),
    );

    let time = Instant::now();
    let run = run.fit(&loaders)?;
    println!(
        "Time to run training on the data using VAE Model: {:.3}s",
        time.elapsed().as_secs_f64(),
    );
    run.save_model(&checkpoint)?;

    let mut run = ExperimentRun::<AB>::new(config.to_owned(), artifact_dir, device)
        .load_model(&checkpoint)?;
    let time = Instant::now();
    run.evaluate(1, &loaders)?;
    println!(
        "Time to run inference on the data using VAE Model: {:.3}s",
        time.elapsed().as_secs_f64(),
    );

    for descriptor in standard_runs() {
        run_one(
            &descriptor,
            &config,
            &loaders,
            device,
            artifact_dir,
            &checkpoint,
        )?;
    }
    Ok(())
}
