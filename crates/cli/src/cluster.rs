use molsim_core::cluster::{is_cluster_up, master_node, running_instances};
use molsim_core::error::MolsimError;
use molsim_core::instance::{InstanceRecord, NodeRole, instance_rows};
use molsim_core::node::get_nodes;
use molsim_core::{Connector, InstanceProvider, LaunchRequest, launch_plan};
use std::io::{BufRead, Write};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::ls;
use crate::spinner::Spinner;
use crate::ssh;

const WAITING: &str = ">>> Waiting for cluster to start... ";
const CONFIRM_STOP: &str = ">>> This will shutdown all EC2 instances. Are you sure (yes/no)? ";
const CONFIRM_STOP_SLAVES: &str =
    ">>> This will shutdown all slave EC2 instances. Are you sure (yes/no)? ";

/// Create, wait for, list and terminate the cluster.
///
/// Nothing is cached between calls: every operation re-queries the provider.
pub struct ClusterController<'a, W: Write, R: BufRead> {
    provider: &'a dyn InstanceProvider,
    config: &'a ClusterConfig,
    out: W,
    input: R,
}

impl<'a, W: Write, R: BufRead> ClusterController<'a, W, R> {
    pub fn new(provider: &'a dyn InstanceProvider, config: &'a ClusterConfig, out: W, input: R) -> Self {
        ClusterController {
            provider,
            config,
            out,
            input,
        }
    }

    fn launch(&mut self, image_id: &str, min: usize, max: usize, role: NodeRole) -> Result<(), MolsimError> {
        let request = LaunchRequest {
            image_id: image_id.to_string(),
            instance_type: self.config.instance_type.clone(),
            min_count: min,
            max_count: max,
            key_name: self.config.key_name.clone(),
            role,
            cluster_name: self.config.name.clone(),
        };
        let records = self.provider.run_instances(&request)?;
        for record in &records {
            writeln!(self.out, "{}", record)?;
        }
        Ok(())
    }

    pub fn create_cluster(&mut self) -> Result<(), MolsimError> {
        let images = self.config.images.clone();
        let (master_batch, batch) = launch_plan(self.config.size, images.distinct_master().is_some());

        match (images.distinct_master(), master_batch) {
            (Some(master_image), Some(master_batch)) => {
                writeln!(self.out, ">>> Launching master node...")?;
                writeln!(self.out, ">>> MASTER AMI: {}", master_image)?;
                self.launch(master_image, master_batch.min, master_batch.max, NodeRole::Master)?;

                writeln!(self.out, ">>> Launching worker nodes...")?;
                writeln!(self.out, ">>> NODE AMI: {}", images.worker)?;
                // A failed worker launch leaves the master running.
                if let Err(e) = self.launch(&images.worker, batch.min, batch.max, NodeRole::Worker) {
                    warn!(error = %e, "worker launch failed after master launch");
                    writeln!(self.out, ">>> Worker launch failed; the master node is still running")?;
                    return Err(e);
                }
            }
            _ => {
                writeln!(self.out, ">>> Launching master and worker nodes...")?;
                writeln!(self.out, ">>> MASTER AMI: {}", images.worker)?;
                writeln!(self.out, ">>> NODE AMI: {}", images.worker)?;
                self.launch(&images.worker, batch.min, batch.max, NodeRole::Worker)?;
            }
        }
        Ok(())
    }

    /// Poll until exactly the configured number of cluster instances run.
    pub fn wait_for_cluster(&mut self) -> Result<Vec<InstanceRecord>, MolsimError> {
        let started = Instant::now();
        let spinner = Spinner::start(WAITING, self.config.spinner, self.config.spinner_interval);
        if spinner.is_hidden() {
            write!(self.out, "{}", WAITING)?;
            self.out.flush()?;
        }

        loop {
            let records = self.provider.describe_instances()?;
            if is_cluster_up(&records, &self.config.images, self.config.size) {
                self.finish_waiting(spinner, "done")?;
                return Ok(records);
            }

            let waited = started.elapsed();
            if waited >= self.config.startup_timeout {
                self.finish_waiting(spinner, "timed out")?;
                return Err(MolsimError::StartupTimeout {
                    expected: self.config.size,
                    running: running_instances(&records, &self.config.images).len(),
                    waited,
                });
            }
            debug!(
                running = running_instances(&records, &self.config.images).len(),
                expected = self.config.size,
                "cluster not up yet"
            );
            thread::sleep(self.config.poll_interval.min(self.config.startup_timeout - waited));
        }
    }

    fn finish_waiting(&mut self, spinner: Spinner, outcome: &str) -> Result<(), MolsimError> {
        // A drawn spinner clears its whole line, prefix included.
        let drawn = !spinner.is_hidden();
        spinner.stop();
        if drawn {
            write!(self.out, "{}", WAITING)?;
        }
        writeln!(self.out, "{}", outcome)?;
        Ok(())
    }

    pub fn start_cluster(&mut self) -> Result<(), MolsimError> {
        writeln!(self.out, ">>> Starting cluster...")?;
        self.create_cluster()?;
        let records = self.wait_for_cluster()?;

        let Some(master) = master_node(&records) else {
            writeln!(self.out, ">>> No master node found...")?;
            return Ok(());
        };
        writeln!(self.out, ">>> The master node is {}", master)?;
        writeln!(self.out, ">>> The cluster has been started.")?;
        writeln!(self.out, ">>> ssh into the master node as {} by running:", self.config.ssh_user)?;
        writeln!(self.out)?;
        writeln!(self.out, "$ molsim ssh-master")?;
        writeln!(self.out)?;
        writeln!(self.out, ">>> or as {} directly:", self.config.cluster_user)?;
        writeln!(self.out)?;
        writeln!(self.out, "$ ssh {}@{}", self.config.cluster_user, master)?;
        Ok(())
    }

    pub fn list_instances(&mut self) -> Result<(), MolsimError> {
        let records = self.provider.describe_instances()?;
        if instance_rows(&records).next().is_none() {
            writeln!(self.out, "No instances found.")?;
            return Ok(());
        }
        writeln!(self.out, ">>> EC2 Instances:")?;
        writeln!(self.out, "{}", ls::instance_table(&records, chrono::Utc::now()))?;
        Ok(())
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool, MolsimError> {
        write!(self.out, "{}", prompt)?;
        self.out.flush()?;
        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']) == "yes")
    }

    fn terminate(&mut self, instances: Vec<String>, label: &str) -> Result<Vec<String>, MolsimError> {
        if !instances.is_empty() {
            for instance in &instances {
                writeln!(self.out, ">>> Shutting down {}: {}", label, instance)?;
            }
            writeln!(self.out, "\n>>> Waiting for instances to shutdown ....")?;
            self.provider.terminate_instances(&instances)?;
            thread::sleep(self.config.settle_delay);
        }
        Ok(instances)
    }

    /// Terminate every running cluster instance after an exact `yes`.
    ///
    /// Returns the instances that were asked to terminate.
    pub fn stop_cluster(&mut self) -> Result<Vec<String>, MolsimError> {
        if !self.confirm(CONFIRM_STOP)? {
            writeln!(self.out, ">>> Exiting without shutting down instances....")?;
            return Ok(Vec::new());
        }
        writeln!(self.out, ">>> Listing instances ...")?;
        self.list_instances()?;
        let records = self.provider.describe_instances()?;
        let instances = running_instances(&records, &self.config.images);
        let terminated = self.terminate(instances, "instance")?;
        writeln!(self.out, ">>> Listing new state of instances")?;
        self.list_instances()?;
        Ok(terminated)
    }

    /// Like `stop_cluster`, but spares the first running instance (the master).
    pub fn stop_slaves(&mut self) -> Result<Vec<String>, MolsimError> {
        if !self.confirm(CONFIRM_STOP_SLAVES)? {
            writeln!(self.out, ">>> Exiting without shutting down instances....")?;
            return Ok(Vec::new());
        }
        writeln!(self.out, ">>> Listing instances ...")?;
        self.list_instances()?;
        let records = self.provider.describe_instances()?;
        let slaves: Vec<String> = running_instances(&records, &self.config.images)
            .into_iter()
            .skip(1)
            .collect();
        let terminated = self.terminate(slaves, "slave instance")?;
        writeln!(self.out, ">>> Listing new state of slave instances")?;
        self.list_instances()?;
        Ok(terminated)
    }

    pub fn master_node(&mut self) -> Result<Option<String>, MolsimError> {
        let records = self.provider.describe_instances()?;
        let master = master_node(&records);
        match &master {
            Some(host) => writeln!(self.out, ">>> MASTER NODE: {}", host)?,
            None => writeln!(self.out, ">>> No master node found...")?,
        }
        Ok(master)
    }

    pub fn ssh_master(&mut self) -> Result<(), MolsimError> {
        if let Some(master) = self.master_node()? {
            ssh::interactive(&self.config.ssh_user, &self.config.key_location, &master)?;
        }
        Ok(())
    }

    /// Build the node registry, print it and close every connection.
    pub fn list_nodes(&mut self, connector: &dyn Connector) -> Result<usize, MolsimError> {
        let records = self.provider.describe_instances()?;
        let mut nodes = get_nodes(&records, &self.config.images, connector)?;
        if nodes.is_empty() {
            writeln!(self.out, "No nodes found.")?;
            return Ok(0);
        }
        writeln!(self.out, "{}", ls::node_table(&nodes))?;
        for node in &mut nodes {
            if let Err(e) = node.close() {
                warn!(host = %node.external_name, error = %e, "failed to close connection");
            }
        }
        Ok(nodes.len())
    }
}
