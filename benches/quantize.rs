use divan::Bencher;
use vae_compress::{
    backend::NdArray,
    model::VaeConfig,
    quant::{
        BnnQuantizer, Compressor, DorefaQuantizer, NaiveQuantizer, OpId,
        OpQuantConfig, QatQuantizer, Tensor,
    },
};

type B = NdArray;

fn main() {
    divan::main();
}

mod cpu {
    use super::*;
    use rayon::prelude::*;

    #[divan::bench(sample_count = 100, sample_size = 10)]
    fn affine_fake_quantize(bencher: Bencher) {
        bencher
            .with_inputs(data::random_vec_f32())
            .bench_local_refs(|weights| {
                weights
                    .par_iter()
                    .map(|w| {
                        let position =
                            (w * 127.5 + 128.5).floor().clamp(0.0, 255.0);
                        (position - 128.0) * (2.0 / 255.0)
                    })
                    .sum::<f32>()
            });
    }
}

mod strategy {
    use super::*;

    #[divan::bench(sample_count = 100, sample_size = 10)]
    fn qat_weight(bencher: Bencher) {
        bencher
            .with_inputs(|| {
                let configure = [OpQuantConfig::new(&[OpId::Fc1]).with_weight(8)];
                (
                    QatQuantizer::init(&configure).unwrap(),
                    data::random_weight(),
                )
            })
            .bench_local_refs(|(strategy, weight)| {
                Compressor::<B>::weight(strategy, OpId::Fc1, weight.to_owned())
            });
    }

    #[divan::bench(sample_count = 100, sample_size = 10)]
    fn bnn_weight(bencher: Bencher) {
        bencher
            .with_inputs(|| {
                let configure = [OpQuantConfig::new(&[OpId::Fc1]).with_weight(1)];
                (
                    BnnQuantizer::init(&configure).unwrap(),
                    data::random_weight(),
                )
            })
            .bench_local_refs(|(strategy, weight)| {
                Compressor::<B>::weight(strategy, OpId::Fc1, weight.to_owned())
            });
    }

    #[divan::bench(sample_count = 100, sample_size = 10)]
    fn dorefa_weight(bencher: Bencher) {
        bencher
            .with_inputs(|| {
                let configure = [OpQuantConfig::new(&[OpId::Fc1]).with_weight(8)];
                (
                    DorefaQuantizer::init(&configure).unwrap(),
                    data::random_weight(),
                )
            })
            .bench_local_refs(|(strategy, weight)| {
                Compressor::<B>::weight(strategy, OpId::Fc1, weight.to_owned())
            });
    }

    #[divan::bench(sample_count = 100, sample_size = 2)]
    fn naive_compress(bencher: Bencher) {
        bencher
            .with_inputs(|| {
                let configure =
                    [OpQuantConfig::new(&[OpId::Fc1, OpId::Fc3]).with_weight(8)];
                (
                    NaiveQuantizer::init(&configure).unwrap(),
                    VaeConfig::new().init::<B>(&Default::default()),
                )
            })
            .bench_local_refs(|(strategy, model)| {
                strategy.compress(model.to_owned()).unwrap()
            });
    }
}

mod data {
    use super::*;
    use burn::tensor::Distribution;
    use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};

    const DIM_INPUT: usize = 784;
    const DIM_HIDDEN: usize = 400;

    pub fn random_vec_f32() -> impl FnMut() -> Vec<f32> {
        || {
            StdRng::seed_from_u64(0)
                .sample_iter(Uniform::new(-1.0_f32, 1.0))
                .take(DIM_INPUT * DIM_HIDDEN)
                .collect()
        }
    }

    pub fn random_weight() -> Tensor<B, 2> {
        Tensor::random(
            [DIM_INPUT, DIM_HIDDEN],
            Distribution::Normal(0.0, 1.0),
            &Default::default(),
        )
    }
}
