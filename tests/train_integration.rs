//! End-to-end training pipeline tests.
//!
//! Builds small IDX datasets on disk, runs the full train/eval loop,
//! and checks learnability, replica lockstep, and snapshot round trips.

use cifra::autograd::Context;
use cifra::data::{DataLoader, DistributedSampler, MnistDataset, Sampler};
use cifra::dist::Topology;
use cifra::io::{load_model, save_model, ModelFormat, SaveConfig};
use cifra::nn::Net;
use cifra::optim::{Optimizer, SGD};
use cifra::train::{NllLoss, TrainConfig, Trainer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// A digit stand-in: a bright horizontal band whose position encodes the class
fn banded_image(class: u8) -> Vec<u8> {
    let mut pixels = vec![25u8; 28 * 28];
    let top = class as usize * 2 + 2;
    for row in top..top + 3 {
        for col in 0..28 {
            pixels[row * 28 + col] = 200;
        }
    }
    pixels
}

fn write_split(dir: &Path, images_name: &str, labels_name: &str, labels: &[u8]) {
    let mut images = Vec::new();
    images.extend_from_slice(&2051u32.to_be_bytes());
    images.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    images.extend_from_slice(&28u32.to_be_bytes());
    images.extend_from_slice(&28u32.to_be_bytes());
    for &label in labels {
        images.extend(banded_image(label));
    }
    fs::write(dir.join(images_name), images).unwrap();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2049u32.to_be_bytes());
    bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    bytes.extend_from_slice(labels);
    fs::write(dir.join(labels_name), bytes).unwrap();
}

fn write_dataset(dir: &Path, train_count: usize, test_count: usize) {
    let train_labels: Vec<u8> = (0..train_count).map(|i| (i % 4) as u8).collect();
    let test_labels: Vec<u8> = (0..test_count).map(|i| (i % 4) as u8).collect();
    write_split(
        dir,
        "train-images-idx3-ubyte",
        "train-labels-idx1-ubyte",
        &train_labels,
    );
    write_split(
        dir,
        "t10k-images-idx3-ubyte",
        "t10k-labels-idx1-ubyte",
        &test_labels,
    );
}

fn single_replica_trainer(config: &TrainConfig) -> Trainer {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let replicas = vec![Net::new(&mut rng)];
    let optimizers: Vec<Box<dyn Optimizer>> =
        vec![Box::new(SGD::new(config.lr, config.momentum))];
    let mut trainer = Trainer::new(replicas, optimizers, 0, config.clone());
    trainer.set_loss(Box::new(NllLoss::mean()));
    trainer
}

#[test]
fn training_reduces_eval_loss_on_separable_digits() {
    let dir = tempdir().unwrap();
    write_dataset(dir.path(), 64, 16);

    let train_data = MnistDataset::train(dir.path()).unwrap();
    let test_data = MnistDataset::test(dir.path()).unwrap();

    let config = TrainConfig::new().with_batch_size(8).with_log_interval(1000);
    let mut trainer = single_replica_trainer(&config);
    let mut train_loaders = vec![DataLoader::new(&train_data, 8, Sampler::shuffled(1))];
    let mut test_loader = DataLoader::new(&test_data, 16, Sampler::Sequential);
    let mut ctx = Context::with_seed(config.seed);

    let (loss_before, _) = trainer.evaluate(&mut test_loader, &mut ctx);
    assert!(
        (1.0..4.0).contains(&loss_before),
        "untrained loss should sit near ln(10), got {loss_before}"
    );

    for epoch in 1..=3 {
        trainer
            .train_epoch(epoch, &mut train_loaders, &mut ctx)
            .unwrap();
    }

    let (loss_after, accuracy) = trainer.evaluate(&mut test_loader, &mut ctx);
    assert!(
        loss_after < loss_before,
        "loss did not fall: {loss_before} -> {loss_after}"
    );
    assert!((0.0..=1.0).contains(&accuracy));
}

#[test]
fn distributed_training_keeps_replicas_in_lockstep() {
    let dir = tempdir().unwrap();
    write_dataset(dir.path(), 32, 8);

    let train_data = MnistDataset::train(dir.path()).unwrap();

    let hosts = vec!["algo-1".to_string(), "algo-2".to_string()];
    let topology = Topology::new(hosts, "algo-2".to_string()).unwrap();
    assert!(topology.is_distributed());
    assert_eq!(topology.rank(), 1);

    let world_size = topology.world_size();
    let config = TrainConfig::new().with_batch_size(4).with_log_interval(1000);

    let mut train_loaders: Vec<DataLoader<'_>> = (0..world_size)
        .map(|rank| {
            DataLoader::new(
                &train_data,
                config.batch_size,
                Sampler::Distributed(DistributedSampler::new(world_size, rank)),
            )
        })
        .collect();
    for loader in &train_loaders {
        assert_eq!(loader.sample_count(), 16);
    }

    let replicas: Vec<Net> = (0..world_size)
        .map(|_| {
            let mut rng = StdRng::seed_from_u64(config.seed);
            Net::new(&mut rng)
        })
        .collect();
    let optimizers: Vec<Box<dyn Optimizer>> = (0..world_size)
        .map(|_| Box::new(SGD::new(config.lr, config.momentum)) as Box<dyn Optimizer>)
        .collect();

    let mut trainer = Trainer::new(replicas, optimizers, topology.rank(), config.clone());
    trainer.set_loss(Box::new(NllLoss::mean()));

    let mut ctx = Context::with_seed(config.seed);
    for epoch in 1..=2 {
        trainer
            .train_epoch(epoch, &mut train_loaders, &mut ctx)
            .unwrap();
    }

    // Averaged gradients applied through identical optimizers must keep
    // every replica's parameters bit-identical
    let replicas = trainer.replicas();
    let reference = replicas[0].parameters();
    for other in &replicas[1..] {
        for ((name, a), (_, b)) in reference.iter().zip(other.parameters().iter()) {
            assert_eq!(a.data(), b.data(), "replica drift in {name}");
        }
    }
}

#[test]
fn snapshot_round_trip_preserves_eval_outputs() {
    let dir = tempdir().unwrap();
    write_dataset(dir.path(), 32, 8);

    let train_data = MnistDataset::train(dir.path()).unwrap();
    let test_data = MnistDataset::test(dir.path()).unwrap();

    let config = TrainConfig::new().with_batch_size(8).with_log_interval(1000);
    let mut trainer = single_replica_trainer(&config);
    let mut train_loaders = vec![DataLoader::new(&train_data, 8, Sampler::shuffled(1))];
    let mut ctx = Context::with_seed(config.seed);
    trainer.train_epoch(1, &mut train_loaders, &mut ctx).unwrap();

    let path = dir.path().join("model.safetensors");
    save_model(
        &trainer.net().to_model("mnist-cnn"),
        &path,
        &SaveConfig::new(ModelFormat::SafeTensors),
    )
    .unwrap();

    let loaded = load_model(&path).unwrap();
    assert_eq!(loaded.metadata.name, "mnist-cnn");
    let restored = Net::from_model(&loaded).unwrap();

    let mut test_loader = DataLoader::new(&test_data, 8, Sampler::Sequential);
    let batch = test_loader.iter().next().unwrap();

    ctx.eval();
    let original_out = trainer.net().forward(&batch.inputs, batch.len(), &ctx);
    let restored_out = restored.forward(&batch.inputs, batch.len(), &ctx);
    assert_eq!(original_out.data(), restored_out.data());
}
