//! Declarative run descriptors.

pub use super::*;
pub use crate::quant::{build, OpId, OpQuantConfig, StrategyKind};

use std::{path::Path, time::Instant};

/// Model initialization of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModelInit {
    /// Load the baseline checkpoint.
    FromCheckpoint,
    /// Initialize fresh parameters.
    Fresh,
}

/// Work schedule of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Schedule {
    /// Evaluate the compressed model once.
    EvalOnly,
    /// Train the compressed model, export it, and evaluate once.
    TrainAndEval,
}

/// Export file stems of a run, relative to the artifact directory.
#[derive(Clone, Debug)]
pub struct ExportPaths {
    /// Model file stem.
    pub model_stem: String,
    /// Calibration file stem.
    pub calibration_stem: String,
}

impl ExportPaths {
    /// Initialize from the two file stems.
    pub fn new(
        model_stem: &str,
        calibration_stem: &str,
    ) -> Self {
        Self {
            model_stem: model_stem.to_string(),
            calibration_stem: calibration_stem.to_string(),
        }
    }
}

/// One compression run, declared as data.
#[derive(Clone, Debug)]
pub struct RunDescriptor {
    /// Run label used in reports.
    pub label: String,
    /// Compression strategy family.
    pub strategy: StrategyKind,
    /// Quantization configuration list.
    pub configure: Vec<OpQuantConfig>,
    /// Model initialization.
    pub init: ModelInit,
    /// Work schedule.
    pub schedule: Schedule,
    /// Export file stems.
    pub export: Option<ExportPaths>,
}

/// The standard compression runs, two configuration lists per family.
pub fn standard_runs() -> Vec<RunDescriptor> {
    let naive = [
        vec![OpQuantConfig::new(&[OpId::Fc1, OpId::Fc3]).with_weight(8)],
        vec![OpQuantConfig::new(&[OpId::Fc22, OpId::Fc21]).with_weight(8)],
    ];
    let qat = [
        vec![
            OpQuantConfig::new(&[OpId::Fc1]).with_weight(8).with_input(8),
            OpQuantConfig::new(&[OpId::Relu1]).with_output(8),
            OpQuantConfig::new(&[OpId::Fc3])
                .with_output(8)
                .with_weight(8)
                .with_input(8),
        ],
        vec![
            OpQuantConfig::new(&[OpId::Fc21]).with_weight(8).with_input(8),
            OpQuantConfig::new(&[OpId::Relu2]).with_output(8),
            OpQuantConfig::new(&[OpId::Fc3])
                .with_output(8)
                .with_weight(8)
                .with_input(8),
        ],
    ];
    let bnn = [
        vec![
            OpQuantConfig::new(&[OpId::Fc1, OpId::Fc21]).with_weight(1),
            OpQuantConfig::new(&[OpId::Fc22, OpId::Fc3]).with_output(1),
        ],
        vec![
            OpQuantConfig::new(&[OpId::Fc22, OpId::Fc3]).with_weight(1),
            OpQuantConfig::new(&[OpId::Fc1, OpId::Fc21]).with_output(1),
        ],
    ];
    let dorefa = [
        vec![OpQuantConfig::new(&[OpId::Fc1, OpId::Fc21]).with_weight(8)],
        vec![OpQuantConfig::new(&[OpId::Fc22, OpId::Fc3]).with_weight(8)],
    ];

    let mut runs = Vec::with_capacity(8);
    for (index, configure) in naive.into_iter().enumerate() {
        runs.push(RunDescriptor {
            label: format!("Naive Quantizer configure list {}", index + 1),
            strategy: StrategyKind::Naive,
            configure,
            init: ModelInit::FromCheckpoint,
            schedule: Schedule::EvalOnly,
            export: None,
        });
    }
    for (index, configure) in qat.into_iter().enumerate() {
        runs.push(RunDescriptor {
            label: format!("QAT Quantizer configure list {}", index + 1),
            strategy: StrategyKind::Qat,
            configure,
            init: ModelInit::Fresh,
            schedule: Schedule::TrainAndEval,
            export: Some(ExportPaths::new("QAT_Quantizer", "mnist_calibration")),
        });
    }
    for (index, configure) in bnn.into_iter().enumerate() {
        runs.push(RunDescriptor {
            label: format!("BNN Quantizer configure list {}", index + 1),
            strategy: StrategyKind::Bnn,
            configure,
            init: ModelInit::Fresh,
            schedule: Schedule::TrainAndEval,
            export: Some(ExportPaths::new(
                "BNNQuantizer",
                "BNNQuantizer_calibration",
            )),
        });
    }
    for (index, configure) in dorefa.into_iter().enumerate() {
        runs.push(RunDescriptor {
            label: format!("DoReFa Quantizer configure list {}", index + 1),
            strategy: StrategyKind::Dorefa,
            configure,
            init: ModelInit::Fresh,
            schedule: Schedule::TrainAndEval,
            export: Some(ExportPaths::new(
                "DoReFaQuantizer",
                "DoReFaQuantizer_calibration",
            )),
        });
    }
    runs
}

/// Execute one run descriptor end to end.
pub fn run_one<AB: AutodiffBackend>(
    descriptor: &RunDescriptor,
    config: &ExperimentConfig,
    loaders: &MnistLoaders<AB>,
    device: &AB::Device,
    artifact_dir: &Path,
    checkpoint: &Path,
) -> Result<(), Error> {
    log::info!(
        target: "vae_compress::experiment",
        "running {} with {} configuration entries",
        descriptor.label,
        descriptor.configure.len(),
    );

    let mut run = ExperimentRun::<AB>::new(config.to_owned(), artifact_dir, device);
    if descriptor.init == ModelInit::FromCheckpoint {
        run = run.load_model(checkpoint)?;
    }
    let strategy = build(descriptor.strategy, &descriptor.configure)?;
    let mut run = run.compress(strategy)?;
    println!("{}", run.model);

    match descriptor.schedule {
        Schedule::TrainAndEval => {
            let time = Instant::now();
            run = run.fit(loaders)?;
            println!(
                "Time to run training on the data using VAE Model with {}: {:.3}s",
                descriptor.label,
                time.elapsed().as_secs_f64(),
            );

            if let Some(paths) = &descriptor.export {
                let calibration = run.export(paths)?;
                println!("calibration_config: {calibration}");
            }

            let time = Instant::now();
            run.evaluate(1, loaders)?;
            println!(
                "Time to run inference on the data using VAE Model with {}: {:.3}s",
                descriptor.label,
                time.elapsed().as_secs_f64(),
            );
        },
        Schedule::EvalOnly => {
            let time = Instant::now();
            run.evaluate(1, loaders)?;
            println!(
                "Time to run inference on the data using VAE Model with {}: {:.3}s",
                descriptor.label,
                time.elapsed().as_secs_f64(),
            );
        },
    }
    Ok(())
}
