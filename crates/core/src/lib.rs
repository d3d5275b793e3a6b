pub mod cluster;
pub mod error;
pub mod instance;
pub mod node;

use error::MolsimError;
use instance::{InstanceRecord, NodeRole};

/// Instance-management API of a cloud provider.
pub trait InstanceProvider {
    fn describe_instances(&self) -> Result<Vec<InstanceRecord>, MolsimError>;
    fn run_instances(&self, request: &LaunchRequest) -> Result<Vec<InstanceRecord>, MolsimError>;
    fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), MolsimError>;
}

/// A remote-control handle to one node.
pub trait Connection {
    fn host(&self) -> &str;
    /// Run a command on the node and return its standard output, one entry per line.
    fn execute(&self, command: &str) -> Result<Vec<String>, MolsimError>;
    fn close(&mut self) -> Result<(), MolsimError> {
        Ok(())
    }
}

pub trait Connector {
    fn connect(&self, host: &str) -> Result<Box<dyn Connection>, MolsimError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub image_id: String,
    pub instance_type: String,
    pub min_count: usize,
    pub max_count: usize,
    pub key_name: String,
    pub role: NodeRole,
    pub cluster_name: String,
}

/// Images whose instances make up the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterImages {
    pub worker: String,
    pub master: Option<String>,
}

impl ClusterImages {
    pub fn contains(&self, image_id: &str) -> bool {
        self.worker == image_id || self.master.as_deref() == Some(image_id)
    }

    /// The master image, when it differs from the worker image.
    pub fn distinct_master(&self) -> Option<&str> {
        self.master.as_deref().filter(|m| *m != self.worker)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize {
    pub min: usize,
    pub max: usize,
}

/// Batch sizes for a cluster of `size` nodes.
///
/// Returns the master batch (if a distinct master image is launched) and the
/// worker batch. Without a master image the single batch doubles as both.
pub fn launch_plan(size: usize, distinct_master: bool) -> (Option<BatchSize>, BatchSize) {
    if distinct_master {
        let workers = size.saturating_sub(1);
        let master = BatchSize { min: 1, max: 1 };
        let batch = BatchSize {
            min: (workers / 2).max(1),
            max: workers.max(1),
        };
        (Some(master), batch)
    } else {
        let batch = BatchSize {
            min: (size / 2).max(1),
            max: size.max(1),
        };
        (None, batch)
    }
}
