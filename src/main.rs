//! Cifra training entrypoint
//!
//! Trains the convolutional MNIST classifier inside a SageMaker-style
//! container: data comes from `SM_CHANNEL_TRAINING`, the final snapshot
//! goes to `SM_MODEL_DIR`, and the host list in `SM_HOSTS` decides
//! whether gradients are averaged across a replica group.
//!
//! # Usage
//!
//! ```bash
//! # Local single-host run
//! cifra --model-dir ./model --data-dir ./data --epochs 5
//!
//! # Inside a managed container the SM_* environment carries the same
//! # settings, so the binary runs with no flags at all
//! cifra
//! ```

use cifra::autograd::Context;
use cifra::config::Cli;
use cifra::data::{DataLoader, DistributedSampler, MnistDataset, Sampler};
use cifra::dist::Topology;
use cifra::io::{save_model, ModelFormat, SaveConfig};
use cifra::nn::Net;
use cifra::optim::{Optimizer, SGD};
use cifra::train::{NllLoss, Trainer};
use cifra::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let topology = Topology::new(cli.host_list()?, cli.current_host.clone())?;
    let config = cli.train_config();
    config.validate()?;

    let world_size = topology.world_size();
    let rank = topology.rank();
    println!(
        "Number of hosts {}. Distributed training - {}",
        world_size,
        topology.is_distributed()
    );
    println!("Number of gpus available - {}", cli.num_gpus);
    if topology.is_distributed() {
        println!(
            "Initialized the replica group: {} replicas in one process. Current host rank is {}.",
            world_size, rank
        );
    }

    let train_data = MnistDataset::train(&cli.data_dir)?;
    let test_data = MnistDataset::test(&cli.data_dir)?;

    // One loader per replica; shards reshuffle per epoch inside the trainer
    let mut train_loaders: Vec<DataLoader<'_>> = (0..world_size)
        .map(|replica_rank| {
            let sampler = if topology.is_distributed() {
                Sampler::Distributed(DistributedSampler::new(world_size, replica_rank))
            } else {
                Sampler::shuffled(config.seed)
            };
            DataLoader::new(&train_data, config.batch_size, sampler)
        })
        .collect();
    let mut test_loader = DataLoader::new(
        &test_data,
        config.test_batch_size,
        Sampler::shuffled(config.seed),
    );

    let train_share = train_loaders[rank].sample_count();
    println!(
        "Processes {}/{} ({:.0}%) of train data",
        train_share,
        train_data.len(),
        100.0 * train_share as f32 / train_data.len() as f32
    );
    println!(
        "Processes {}/{} ({:.0}%) of test data",
        test_loader.sample_count(),
        test_data.len(),
        100.0 * test_loader.sample_count() as f32 / test_data.len() as f32
    );

    // Every replica starts from the same seed, so the group begins in
    // lockstep and gradient averaging keeps it there
    println!("Create neural network module");
    let replicas: Vec<Net> = (0..world_size)
        .map(|_| {
            let mut rng = StdRng::seed_from_u64(config.seed);
            Net::new(&mut rng)
        })
        .collect();
    println!(
        "Model has {} trainable parameters",
        replicas[rank].num_parameters()
    );

    let optimizers: Vec<Box<dyn Optimizer>> = (0..world_size)
        .map(|_| Box::new(SGD::new(config.lr, config.momentum)) as Box<dyn Optimizer>)
        .collect();

    let mut trainer = Trainer::new(replicas, optimizers, rank, config.clone());
    trainer.set_loss(Box::new(NllLoss::mean()));

    let mut ctx = Context::with_seed(config.seed);
    trainer.train(&mut train_loaders, &mut test_loader, &mut ctx)?;

    println!("Saving the model.");
    std::fs::create_dir_all(&cli.model_dir)?;
    let path = cli.model_dir.join("model.safetensors");
    save_model(
        &trainer.net().to_model("mnist-cnn"),
        &path,
        &SaveConfig::new(ModelFormat::SafeTensors),
    )?;
    println!("Saved snapshot to {}", path.display());

    Ok(())
}
