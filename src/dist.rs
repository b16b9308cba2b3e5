//! Replica topology and gradient synchronization
//!
//! A multi-host training job runs one model replica per configured host
//! inside this process. Replicas start from the same seed, consume
//! disjoint shards, and exchange gradients by averaging after every
//! backward pass, which keeps their parameters bit-identical throughout
//! the run.

use crate::nn::Net;
use crate::{Error, Result};
use ndarray::Array1;

/// The hosts participating in a run, and which one this process is
#[derive(Debug, Clone)]
pub struct Topology {
    hosts: Vec<String>,
    current_host: String,
}

impl Topology {
    pub fn new(hosts: Vec<String>, current_host: impl Into<String>) -> Result<Self> {
        let current_host = current_host.into();
        if hosts.is_empty() {
            return Err(Error::ConfigError("host list is empty".to_string()));
        }
        if !hosts.contains(&current_host) {
            return Err(Error::ConfigError(format!(
                "current host {current_host} not in host list {hosts:?}"
            )));
        }

        Ok(Self {
            hosts,
            current_host,
        })
    }

    /// Position of the current host in the host list
    pub fn rank(&self) -> usize {
        // Membership is checked at construction
        self.hosts
            .iter()
            .position(|h| h == &self.current_host)
            .unwrap_or(0)
    }

    /// Number of participating hosts
    pub fn world_size(&self) -> usize {
        self.hosts.len()
    }

    /// Whether more than one host is configured
    pub fn is_distributed(&self) -> bool {
        self.hosts.len() > 1
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn current_host(&self) -> &str {
        &self.current_host
    }
}

/// Average per-parameter gradients across replicas, in place
///
/// Sums each parameter's gradient over all replicas, divides by the
/// replica count, and writes the average back to every replica. With
/// fewer than two replicas this is a no-op. Fails if any replica is
/// missing a gradient.
pub fn average_gradients(replicas: &[Net]) -> Result<()> {
    let world_size = replicas.len();
    if world_size < 2 {
        return Ok(());
    }

    let param_count = replicas[0].parameters().len();
    for index in 0..param_count {
        let mut sum = replica_grad(&replicas[0], index)?;
        for replica in &replicas[1..] {
            sum += &replica_grad(replica, index)?;
        }
        sum /= world_size as f32;

        for replica in replicas {
            replica.parameters()[index].1.set_grad(sum.clone());
        }
    }

    Ok(())
}

fn replica_grad(replica: &Net, index: usize) -> Result<Array1<f32>> {
    let (name, tensor) = replica.parameters()[index];
    tensor
        .grad()
        .ok_or_else(|| Error::InvalidGradient(format!("no gradient for {name}")))
}
