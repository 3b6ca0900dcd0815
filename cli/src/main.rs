//! ChainLog CLI: fetch, watch and decode contract event logs.
//!
//! # Commands
//! ```text
//! chainlog logs    --rpc-url <url> --artifact <file> --event <id> [--from N] [--to N] [--args JSON]
//! chainlog watch   --rpc-url <url> --abi <file> --address <addr> --event <id> [--args JSON]
//! chainlog tx-logs --rpc-url <url> --artifact <file> --tx <hash> --event <id>
//! chainlog topics  --abi <file> --event <id> [--args JSON]
//! chainlog resolve --abi <file> --event <id>
//! ```
//!
//! Logs are printed to stdout as one JSON object per line.

use alloy_primitives::{Address, B256};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use chainlog_core::args::normalize_args;
use chainlog_core::topic::{encode_topics, topic_filter};
use chainlog_core::{
    BackendKind, ChainlogConfig, Contract, IndexedArgs, LogBackend, LogEngine,
};
use chainlog_http::{HttpBackend, HttpBackendConfig};
use chainlog_ws::WsBackend;

mod logging;

#[derive(Parser)]
#[command(
    name = "chainlog",
    about = "Fetch, watch and decode EVM contract event logs",
    long_about = "
ChainLog CLI: resolve events against a contract ABI, encode indexed filter
arguments into topics, and fetch or watch matching logs over HTTP or
WebSocket JSON-RPC.

Event identifiers may be a bare name (Transfer), a type-only signature
(Transfer(address,address,uint256)) or an annotated signature.

Indexed arguments (--args) are JSON: an array for positional values
('[null, \"0xabc...\"]') or an object keyed by parameter name
('{\"to\": \"0xabc...\"}'). A nested array means \"any of\".

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the configured log level
",
    version
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON structured logs on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ContractArgs {
    /// Deployment artifact: {"address": "0x..", "abi": [..]}
    #[arg(long)]
    artifact: Option<PathBuf>,
    /// JSON ABI file
    #[arg(long, conflicts_with = "artifact")]
    abi: Option<PathBuf>,
    /// Contract address (overrides the artifact's address)
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args)]
struct NodeArgs {
    /// JSON-RPC endpoint; http(s):// or ws(s)://
    #[arg(long)]
    rpc_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch logs of an event over a block range
    Logs {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        contract: ContractArgs,
        /// Event name or signature
        #[arg(long)]
        event: String,
        /// First block (default: 0)
        #[arg(long)]
        from: Option<u64>,
        /// Last block (default: latest)
        #[arg(long)]
        to: Option<u64>,
        /// Indexed argument filter as JSON
        #[arg(long)]
        args: Option<String>,
    },

    /// Stream new logs of an event until Ctrl-C
    Watch {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        contract: ContractArgs,
        #[arg(long)]
        event: String,
        #[arg(long)]
        args: Option<String>,
    },

    /// Decode the logs of one event from a transaction receipt
    #[command(name = "tx-logs")]
    TxLogs {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        contract: ContractArgs,
        /// Transaction hash
        #[arg(long)]
        tx: String,
        #[arg(long)]
        event: String,
    },

    /// Print the topic filter for an event and indexed arguments (offline)
    Topics {
        #[command(flatten)]
        contract: ContractArgs,
        #[arg(long)]
        event: String,
        #[arg(long)]
        args: Option<String>,
    },

    /// Show which event an identifier resolves to (offline)
    Resolve {
        #[command(flatten)]
        contract: ContractArgs,
        #[arg(long)]
        event: String,
    },
}

/// A command that needs a node.
enum Online {
    Logs {
        contract: Contract,
        event: String,
        from: Option<u64>,
        to: Option<u64>,
        args: IndexedArgs,
    },
    Watch {
        contract: Contract,
        event: String,
        args: IndexedArgs,
    },
    TxLogs {
        contract: Contract,
        tx: B256,
        event: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => Some(
            ChainlogConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
        ),
        None => None,
    };

    let mut log_config = file_config
        .as_ref()
        .map(|c| c.log.clone())
        .unwrap_or_default();
    if cli.json_logs {
        log_config.json = true;
    }
    if cli.verbose {
        log_config.level = "debug".into();
    }
    logging::init_tracing(&log_config);

    match cli.command {
        Commands::Logs { node, contract, event, from, to, args } => {
            let online = Online::Logs {
                contract: load_contract(&contract)?,
                event,
                from,
                to,
                args: parse_args(args.as_deref())?,
            };
            run_online(node_config(file_config, node)?, online).await
        }

        Commands::Watch { node, contract, event, args } => {
            let online = Online::Watch {
                contract: load_contract(&contract)?,
                event,
                args: parse_args(args.as_deref())?,
            };
            run_online(node_config(file_config, node)?, online).await
        }

        Commands::TxLogs { node, contract, tx, event } => {
            let online = Online::TxLogs {
                contract: load_contract(&contract)?,
                tx: tx.parse().with_context(|| format!("invalid transaction hash '{tx}'"))?,
                event,
            };
            run_online(node_config(file_config, node)?, online).await
        }

        Commands::Topics { contract, event, args } => {
            cmd_topics(&load_contract(&contract)?, &event, parse_args(args.as_deref())?)
        }

        Commands::Resolve { contract, event } => cmd_resolve(&load_contract(&contract)?, &event),
    }
}

// ─── Setup ────────────────────────────────────────────────────────────────────

fn load_contract(args: &ContractArgs) -> Result<Contract> {
    let address = args
        .address
        .as_deref()
        .map(|a| a.parse::<Address>().with_context(|| format!("invalid address '{a}'")))
        .transpose()?;

    if let Some(path) = &args.artifact {
        return Contract::from_artifact_file(path, address)
            .with_context(|| format!("loading artifact {}", path.display()));
    }
    let Some(path) = &args.abi else {
        bail!("either --artifact or --abi is required");
    };
    let abi = std::fs::read_to_string(path)
        .with_context(|| format!("reading ABI {}", path.display()))?;
    Contract::from_abi_json(address.unwrap_or(Address::ZERO), &abi)
        .with_context(|| format!("parsing ABI {}", path.display()))
}

fn parse_args(json: Option<&str>) -> Result<IndexedArgs> {
    let Some(json) = json else {
        return Ok(IndexedArgs::None);
    };
    let value: serde_json::Value =
        serde_json::from_str(json).context("--args must be valid JSON")?;
    Ok(IndexedArgs::from_json(&value)?)
}

/// `--rpc-url` overrides the config file's endpoint.
fn node_config(file_config: Option<ChainlogConfig>, node: NodeArgs) -> Result<ChainlogConfig> {
    match (file_config, node.rpc_url) {
        (Some(mut cfg), Some(url)) => {
            cfg.rpc_url = url;
            Ok(cfg)
        }
        (Some(cfg), None) => Ok(cfg),
        (None, Some(url)) => Ok(ChainlogConfig::new(url)),
        (None, None) => bail!("an RPC endpoint is required: pass --rpc-url or --config"),
    }
}

async fn run_online(config: ChainlogConfig, command: Online) -> Result<()> {
    match config.backend_kind()? {
        BackendKind::Http => {
            let backend = HttpBackend::new(&config.rpc_url, HttpBackendConfig::from(&config))?;
            run_with(LogEngine::new(backend), command).await
        }
        BackendKind::Ws => {
            let backend = WsBackend::connect(&config.rpc_url)
                .await
                .with_context(|| format!("connecting to {}", config.rpc_url))?;
            run_with(LogEngine::new(backend), command).await
        }
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn run_with<B>(engine: LogEngine<B>, command: Online) -> Result<()>
where
    B: LogBackend,
    B::Log: Serialize,
{
    match command {
        Online::Logs { contract, event, from, to, args } => {
            let logs = engine.fetch_logs(&contract, &event, from, to, args).await?;
            for log in &logs {
                println!("{}", serde_json::to_string(log)?);
            }
            tracing::info!(count = logs.len(), "done");
        }

        Online::TxLogs { contract, tx, event } => {
            for log in engine.fetch_transaction_logs(&contract, tx, &event).await? {
                println!("{}", serde_json::to_string(&log)?);
            }
        }

        Online::Watch { contract, event, args } => {
            let handle = engine
                .watch_logs_with(&contract, &event, args, |log| {
                    println!("{}", serde_json::to_string(&log)?);
                    Ok(())
                })
                .await?;
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            handle.unsubscribe();
        }
    }
    Ok(())
}

fn cmd_topics(contract: &Contract, event: &str, args: IndexedArgs) -> Result<()> {
    let descriptor = contract.event(event)?;
    let normalized = normalize_args(descriptor, args)?;
    let topics = topic_filter(descriptor, encode_topics(descriptor, &normalized)?);
    println!("{}", serde_json::to_string_pretty(&topics)?);
    Ok(())
}

fn cmd_resolve(contract: &Contract, event: &str) -> Result<()> {
    let d = contract.event(event)?;
    println!("Event:     {d}");
    println!("Signature: {}", d.signature());
    if d.anonymous {
        println!("Topic0:    (anonymous)");
    } else {
        println!("Topic0:    {}", d.signature_topic());
    }
    for (i, p) in d.indexed_params() {
        let supported = if p.indexed_type().is_some() { "" } else { "  (hash only)" };
        println!("  indexed #{i} {} {}{supported}", p.ty, d.param_key(i));
    }
    Ok(())
}
