mod config;
mod data_aquisition;
mod network;
mod parsers;
mod topology;

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::DEFAULT_CONFIG_PATH;
use data_aquisition::netconf::NetconfConnector;
use network::render::{OutputFormat, RenderOptions};
use topology::{FailurePolicy, RunOptions, collector::{DedupStrategy, SettlePoll}, execute};

#[derive(Parser, Debug)]
#[command(name = "lldp-topology")]
#[command(about = "This program displays a graphical representation of a given network.")]
#[command(version)]
struct Args {
    /// specify json file path where router information is stored
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    file: PathBuf,

    /// What to do when a router cannot be polled
    #[arg(long, value_enum, default_value = "abort")]
    policy: FailurePolicy,

    /// How repeated adjacency reports are recognised
    #[arg(long, value_enum, default_value = "exact")]
    dedup: DedupStrategy,

    /// How long to wait for LLDP neighbors after enabling it (e.g. "10s"; 0 disables)
    #[arg(long, default_value = "0s", value_parser = humantime::parse_duration)]
    settle_timeout: Duration,

    /// Output file stem for the graph
    #[arg(short, long, default_value = "network_graph")]
    output: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "png")]
    format: OutputFormat,

    /// Do not open the rendered graph
    #[arg(long)]
    no_view: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging();

    info!("Initializing execution...");

    let options = RunOptions {
        policy: args.policy,
        dedup: args.dedup,
        settle: SettlePoll::new(args.settle_timeout),
    };
    let render_options = RenderOptions {
        output: args.output,
        format: args.format,
        view: !args.no_view,
        ..Default::default()
    };

    match execute(&args.file, NetconfConnector, options, &render_options).await {
        Ok(summary) => {
            info!(
                links = summary.report.observations.len(),
                path = %summary.artifact.display(),
                "Finalizing successful execution..."
            );
        }
        Err(err) => {
            println!("An error has occurred:  {}", err);
            std::process::exit(1);
        }
    }
}
