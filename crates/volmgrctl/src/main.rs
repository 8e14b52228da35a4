mod config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use executor::mock::MockExecutor;
use executor::tcp::TcpExecutor;
use tracing_subscriber::EnvFilter;

use common::{BrickId, View, VolumeId};
use config::Config;
use store::Store;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let format = std::env::var("VOLMGR_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

        if format.eq_ignore_ascii_case("json") {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter.clone())
                .with_target(true)
                .json()
                .flatten_event(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
    });
}

#[derive(Parser)]
#[command(name = "volmgrctl")]
#[command(about = "Brick allocation and replacement control utility", long_about = None)]
struct Cli {
    /// Path to the TOML config file; defaults are used when absent.
    #[arg(long, default_value = "volmgr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Brick allocation operations.
    Alloc {
        #[command(subcommand)]
        command: AllocCommands,
    },
    /// Replaces a brick in a live volume with one on a different node.
    ReplaceBrick {
        #[arg(long)]
        volume_id: String,
        #[arg(long)]
        brick_id: String,
    },
}

#[derive(Subcommand)]
enum AllocCommands {
    /// Allocates `gb_size` gigabytes worth of bricks for a volume.
    Create {
        #[arg(long)]
        volume_id: String,
        #[arg(long)]
        gb_size: u64,
    },
    /// Lists the bricks currently persisted for a volume.
    List {
        #[arg(long)]
        volume_id: String,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let store = Store::open(&config.store_path)
        .await
        .with_context(|| format!("opening store at {}", config.store_path.display()))?;

    match command {
        Commands::Alloc { command: AllocCommands::Create { volume_id, gb_size } } => {
            let volume_id = parse_volume_id(&volume_id)?;
            let bricks = volmgr::alloc_bricks_in_cluster(&store, volume_id, gb_size, config.brick_max_num())
                .await?;
            for brick in &bricks {
                println!("{} {} {}", brick.id, brick.node_id, brick.path);
            }
            println!("allocated {} bricks", bricks.len());
        }
        Commands::Alloc { command: AllocCommands::List { volume_id } } => {
            let volume_id = parse_volume_id(&volume_id)?;
            let view = store.view().await;
            let volume = view
                .volume(volume_id)
                .ok_or_else(|| anyhow::anyhow!("volume {volume_id} not found"))?;
            for brick_id in &volume.bricks {
                if let Some(brick) = view.brick(*brick_id) {
                    println!("{} {} {}", brick.id, brick.node_id, brick.path);
                }
            }
        }
        Commands::ReplaceBrick { volume_id, brick_id } => {
            let volume_id = parse_volume_id(&volume_id)?;
            let brick_id = parse_brick_id(&brick_id)?;
            let new_brick = if config.mock_executor {
                volmgr::replace_brick(&store, &MockExecutor::new(), volume_id, brick_id).await?
            } else {
                let addresses = resolve_addresses(&config.agent_addresses)?;
                volmgr::replace_brick(&store, &TcpExecutor::new(addresses), volume_id, brick_id).await?
            };
            println!("replaced {} with {}", brick_id, new_brick.id);
        }
    }

    Ok(())
}

fn parse_volume_id(raw: &str) -> Result<VolumeId> {
    uuid::Uuid::parse_str(raw)
        .map(VolumeId::from_uuid)
        .with_context(|| format!("invalid volume id {raw}"))
}

fn parse_brick_id(raw: &str) -> Result<BrickId> {
    uuid::Uuid::parse_str(raw)
        .map(BrickId::from_uuid)
        .with_context(|| format!("invalid brick id {raw}"))
}

fn resolve_addresses(raw: &HashMap<String, String>) -> Result<HashMap<common::NodeId, String>> {
    raw.iter()
        .map(|(id, addr)| {
            let node_id = uuid::Uuid::parse_str(id)
                .map(common::NodeId::from_uuid)
                .with_context(|| format!("invalid node id {id} in agent_addresses"))?;
            Ok((node_id, addr.clone()))
        })
        .collect()
}
