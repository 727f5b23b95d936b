//! Experiment runs.
//!
//! An [`ExperimentRun`] owns one model, its optional compression
//! strategy, and an artifact directory, so successive runs never share
//! state through globals.

pub mod descriptor;

pub use crate::{
    dataset::{MnistBatch, VaeBatcher},
    error::Error,
    model::{Vae, VaeConfig, VaeLoss, VaeOutput},
    quant::{CalibrationConfig, Compressor},
};
pub use burn::{
    config::Config,
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::{
            vision::{MnistDataset, MnistItem},
            Dataset, InMemDataset,
        },
    },
    module::Module,
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Distribution, ElementConversion, Tensor,
    },
};
pub use descriptor::*;

use crate::render;
use std::{fs, path::PathBuf, sync::Arc};

/// Most image columns on a reconstruction comparison sheet.
pub const COMPARISON_LIMIT: usize = 8;
/// Images decoded onto a sample sheet.
pub const SAMPLE_COUNT: usize = 64;
/// Images per row of a sample sheet.
pub const SAMPLE_ROW: usize = 8;

/// Experiment configuration.
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    /// Batch size for training and evaluation.
    #[config(default = 128)]
    pub batch_size: usize,
    /// Number of training epochs.
    #[config(default = 10)]
    pub epochs: usize,
    /// Disable the GPU backend.
    #[config(default = false)]
    pub no_gpu: bool,
    /// Random seed.
    #[config(default = 1)]
    pub seed: u64,
    /// Batches between training progress reports.
    #[config(default = 10)]
    pub log_interval: usize,
    /// Optimizer learning rate.
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Optimizer epsilon.
    #[config(default = 1e-8)]
    pub epsilon: f32,
    /// Data loading workers per split.
    #[config(default = 1)]
    pub num_workers: usize,
    /// Model configuration.
    pub model: VaeConfig,
}

/// Shuffled loaders over the train and test splits.
pub struct MnistLoaders<B: Backend> {
    /// Training split.
    pub train: Arc<dyn DataLoader<MnistBatch<B>>>,
    /// Test split.
    pub test: Arc<dyn DataLoader<MnistBatch<B>>>,
}

impl<B: Backend> MnistLoaders<B> {
    /// Initialize loaders over the MNIST splits, downloading them on
    /// first use.
    pub fn new(
        config: &ExperimentConfig,
        device: &B::Device,
    ) -> Self {
        Self::from_datasets(
            MnistDataset::train(),
            MnistDataset::test(),
            config,
            device,
        )
    }

    /// Initialize loaders over the given splits.
    pub fn from_datasets<D: Dataset<MnistItem> + 'static>(
        train: D,
        test: D,
        config: &ExperimentConfig,
        device: &B::Device,
    ) -> Self {
        let train = DataLoaderBuilder::new(VaeBatcher::<B>::new(device.to_owned()))
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .build(train);
        let test = DataLoaderBuilder::new(VaeBatcher::<B>::new(device.to_owned()))
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .build(test);
        Self { train, test }
    }
}

/// One isolated training or evaluation run.
///
/// ## Details
///
/// The run owns its model and compression strategy. Training moves the
/// model through the optimizer and back, so the methods consuming `self`
/// return the updated run.
pub struct ExperimentRun<AB: AutodiffBackend> {
    /// Run configuration.
    pub config: ExperimentConfig,
    /// The model under experiment.
    pub model: Vae<AB>,
    compressor: Option<Box<dyn Compressor<AB>>>,
    criterion: VaeLoss,
    artifact_dir: PathBuf,
    device: AB::Device,
}

impl<AB: AutodiffBackend> ExperimentRun<AB> {
    /// Initialize a run with a freshly initialized model.
    pub fn new(
        config: ExperimentConfig,
        artifact_dir: impl Into<PathBuf>,
        device: &AB::Device,
    ) -> Self {
        Self {
            model: config.model.init(device),
            config,
            compressor: None,
            criterion: VaeLoss::init(),
            artifact_dir: artifact_dir.into(),
            device: device.to_owned(),
        }
    }

    /// Attach a compression strategy and compress the model.
    pub fn compress(
        mut self,
        mut compressor: Box<dyn Compressor<AB>>,
    ) -> Result<Self, Error> {
        self.model = compressor.compress(self.model)?;
        self.compressor = Some(compressor);
        Ok(self)
    }

    /// Applies the forward pass on the input tensor, through the
    /// compression strategy when one is attached.
    pub fn forward(
        &mut self,
        images: Tensor<AB, 2>,
    ) -> VaeOutput<AB> {
        match &mut self.compressor {
            Some(compressor) => compressor.forward(&self.model, images),
            None => self.model.forward(images),
        }
    }

    /// Decode latent codes, through the compression strategy when one
    /// is attached.
    pub fn decode(
        &mut self,
        latents: Tensor<AB, 2>,
    ) -> Tensor<AB, 2> {
        match &mut self.compressor {
            Some(compressor) => compressor.decode(&self.model, latents),
            None => self.model.decode(latents),
        }
    }

    fn set_training(
        &mut self,
        training: bool,
    ) {
        if let Some(compressor) = &mut self.compressor {
            compressor.set_training(training);
        }
    }

    /// Train the model over the configured number of epochs.
    ///
    /// ## Details
    ///
    /// Every epoch evaluates the test split and renders a sample sheet.
    pub fn fit(
        mut self,
        loaders: &MnistLoaders<AB>,
    ) -> Result<Self, Error> {
        let mut optim = AdamConfig::new()
            .with_epsilon(self.config.epsilon)
            .init();
        for epoch in 1..=self.config.epochs {
            self = self.train_epoch(epoch, loaders, &mut optim);
            self.evaluate(epoch, loaders)?;
            self.sample(epoch)?;
        }
        Ok(self)
    }

    /// Train one epoch, reporting the loss every few batches.
    pub fn train_epoch(
        mut self,
        epoch: usize,
        loaders: &MnistLoaders<AB>,
        optim: &mut impl Optimizer<Vae<AB>, AB>,
    ) -> Self {
        self.set_training(true);
        let item_count = loaders.train.num_items();
        let batch_count = item_count.div_ceil(self.config.batch_size);
        let mut loss_sum = 0.0;

        for (index, batch) in loaders.train.iter().enumerate() {
            let size = batch.images.dims()[0];
            let output = self.forward(batch.images.to_owned());
            let loss = self.criterion.forward(
                output.reconstruction,
                batch.images,
                output.mean,
                output.log_var,
            );
            let loss_value = loss.to_owned().into_scalar().elem::<f64>();
            loss_sum += loss_value;

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = optim.step(self.config.learning_rate, self.model, grads);

            if index % self.config.log_interval == 0 {
                println!(
                    "Train Epoch: {} [{}/{} ({:.0}%)]\tLoss: {:.6}",
                    epoch,
                    index * self.config.batch_size,
                    item_count,
                    100.0 * index as f64 / batch_count as f64,
                    loss_value / size as f64,
                );
            }
        }

        println!(
            "====> Epoch: {} Average loss: {:.4}",
            epoch,
            loss_sum / item_count as f64,
        );
        self
    }

    /// Evaluate the mean test loss.
    ///
    /// ## Details
    ///
    /// Strategy statistics stay frozen until the next training epoch.
    /// The first batch renders a reconstruction comparison sheet under
    /// the artifact directory.
    pub fn evaluate(
        &mut self,
        epoch: usize,
        loaders: &MnistLoaders<AB>,
    ) -> Result<f64, Error> {
        self.set_training(false);
        let item_count = loaders.test.num_items();
        let mut loss_sum = 0.0;

        for (index, batch) in loaders.test.iter().enumerate() {
            let images = batch.images.detach();
            let output = self.forward(images.to_owned());
            let loss = self.criterion.forward(
                output.reconstruction.to_owned(),
                images.to_owned(),
                output.mean,
                output.log_var,
            );
            loss_sum += loss.into_scalar().elem::<f64>();

            if index == 0 {
                let path = self
                    .artifact_dir
                    .join(format!("reconstruction_{epoch}.png"));
                render::save_comparison(
                    images,
                    output.reconstruction.detach(),
                    COMPARISON_LIMIT,
                    &path,
                )?;
            }
        }

        let loss_mean = loss_sum / item_count as f64;
        println!("====> Test set loss: {loss_mean:.4}");
        Ok(loss_mean)
    }

    /// Render a sheet of images decoded from random latent codes.
    pub fn sample(
        &mut self,
        epoch: usize,
    ) -> Result<(), Error> {
        let latents = Tensor::random(
            [SAMPLE_COUNT, self.config.model.dim_latent],
            Distribution::Normal(0.0, 1.0),
            &self.device,
        );
        let images = self.decode(latents).detach();
        let path = self.artifact_dir.join(format!("sample_{epoch}.png"));
        render::save_grid(images, SAMPLE_ROW, &path)
    }

    /// Save the model parameters at the path.
    pub fn save_model(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<(), Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model.to_owned().save_file(path.to_owned(), &recorder)?;

        log::debug!(
            target: "vae_compress::experiment",
            "model saved to {path:?}",
        );

        Ok(())
    }

    /// Load the model parameters saved at the path.
    pub fn load_model(
        mut self,
        path: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model = self
            .model
            .load_file(path.into(), &recorder, &self.device)?;
        Ok(self)
    }

    /// Export the compressed model and its calibration snapshot under
    /// the artifact directory.
    pub fn export(
        &self,
        paths: &ExportPaths,
    ) -> Result<CalibrationConfig, Error> {
        let Some(compressor) = &self.compressor else {
            return Err(Error::Validation(
                "exporting a run without a compression strategy".to_string(),
                "preceded by compression".to_string(),
            ));
        };
        self.save_model(self.artifact_dir.join(&paths.model_stem))?;

        let calibration = compressor.calibration();
        calibration.save(
            self.artifact_dir
                .join(format!("{}.json", paths.calibration_stem)),
        )?;
        Ok(calibration)
    }
}
