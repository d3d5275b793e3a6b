use clap::{Parser, Subcommand};
use molsim_core::error::MolsimError;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cluster;
mod config;
mod ls;
mod providers;
mod spinner;
mod ssh;

use cluster::ClusterController;

#[derive(Parser, Debug)]
#[command(name = "molsim")]
#[command(about = "molsim - provision and manage an EC2 compute cluster")]
struct Args {
    /// Config file to use instead of ~/.molsim/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch the cluster and wait until every node is running
    Start,
    /// Terminate every running cluster instance
    Stop,
    /// Terminate every running cluster instance except the master
    StopSlaves,
    /// List all instances
    List,
    /// Print the master node hostname
    Master,
    /// Open a shell on the master node
    SshMaster,
    /// Connect to every node and list the node registry
    Nodes,
}

fn run(args: Args) -> Result<(), MolsimError> {
    let config = config::parse_config(args.config.as_deref())?;
    let provider = providers::create_provider_handle(&config.ec2)?;

    let stdin = io::stdin();
    let mut controller = ClusterController::new(provider.as_ref(), &config.cluster, io::stdout(), stdin.lock());

    match args.command {
        Commands::Start => controller.start_cluster(),
        Commands::Stop => controller.stop_cluster().map(|_| ()),
        Commands::StopSlaves => controller.stop_slaves().map(|_| ()),
        Commands::List => controller.list_instances(),
        Commands::Master => controller.master_node().map(|_| ()),
        Commands::SshMaster => controller.ssh_master(),
        Commands::Nodes => {
            let connector = ssh::SshConnector::new(&config.cluster.ssh_user, &config.cluster.key_location);
            controller.list_nodes(&connector).map(|_| ())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
