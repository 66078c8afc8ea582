use clap::Parser;
use king_consensus::config::{parse_addresses, parse_node_ids};
use king_consensus::consensus::{DedupPolicy, KingPolicy};
use king_consensus::logger;
use king_consensus::topology::DEFAULT_BASE_PORT;
use king_consensus::{Cluster, ClusterConfig, TransportKind};
use std::error::Error;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "King algorithm Byzantine agreement simulation", long_about = None)]
struct Cli {
    /// Comma-separated host addresses; participants are assigned to them
    /// round-robin.
    #[arg(long, env = "KING_ADDRESSES", default_value = "127.0.0.1", alias = "adressesList")]
    addresses: String,

    /// Total number of participants in the run.
    #[arg(long, env = "KING_NODES", default_value_t = 5)]
    nodes: usize,

    /// Comma-separated ids of the participants hosted by this process.
    /// Required when more than one address is given.
    #[arg(long, env = "KING_NODE_IDS", alias = "nodeIds")]
    node_ids: Option<String>,

    /// Participant i listens on base-port + i + 1.
    #[arg(long, env = "KING_BASE_PORT", default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    /// display-only or advance-round
    #[arg(long, env = "KING_POLICY", default_value_t = KingPolicy::default())]
    king_policy: KingPolicy,

    /// accept-all or keep-first
    #[arg(long, env = "KING_DEDUP", default_value_t = DedupPolicy::default())]
    dedup: DedupPolicy,

    /// tcp or local
    #[arg(long, env = "KING_TRANSPORT", default_value_t = TransportKind::default())]
    transport: TransportKind,

    /// Seed for initial plans and traitor lies.
    #[arg(long, env = "KING_SEED")]
    seed: Option<u64>,

    /// Log source locations and a host banner.
    #[arg(long, env = "KING_DETAILED_LOGS")]
    detailed_logs: bool,

    /// Emit logs as JSON lines.
    #[cfg(feature = "json")]
    #[arg(long, env = "KING_JSON_LOGS")]
    json_logs: bool,

    /// Print the final report as JSON instead of plain lines.
    #[arg(long, env = "KING_REPORT_JSON")]
    report_json: bool,
}

impl Cli {
    fn init_logging(&self) {
        #[cfg(feature = "json")]
        {
            if self.json_logs {
                logger::init_logger_json();
                return;
            }
        }

        if self.detailed_logs {
            logger::init_logger_detailed();
        } else {
            logger::init_logger();
        }
    }

    fn config(&self) -> Result<ClusterConfig, Box<dyn Error>> {
        let node_ids = self.node_ids.as_deref().map(parse_node_ids).transpose()?;

        Ok(ClusterConfig {
            addresses: parse_addresses(&self.addresses),
            total_nodes: self.nodes,
            node_ids,
            base_port: self.base_port,
            king_policy: self.king_policy,
            dedup_policy: self.dedup,
            transport: self.transport,
            seed: self.seed,
            traitors: None,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    cli.init_logging();

    let config = cli.config()?;
    info!(host = logger::hostname(), nodes = config.total_nodes, "starting run");

    let report = Cluster::from_config(config)?.run().await?;

    if cli.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Consensus achieved. Final plans:");
    for participant in &report.participants {
        println!("Node {} plan: {}", participant.id, participant.plan);
    }
    if !report.unreachable.is_empty() {
        warn!(nodes = ?report.unreachable, "participants that never started listening");
    }
    match report.honest_agreement() {
        Some(plan) => info!(%plan, "honest participants agree"),
        None => info!("honest participants hosted here disagree"),
    }
    Ok(())
}
