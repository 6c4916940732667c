// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::mpsc;

use shared_state_rs::engine::{StateRegistry, StoreConfig, TypeConfig};
use shared_state_rs::flow::server;
use shared_state_rs::flow::{DeploymentConfig, DeploymentLoader, Getter, SetMessage, Setter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the state files
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Deployment file declaring stores and getters
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the declared stores over HTTP
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Print a store's exposed state
    Get {
        #[arg(short, long)]
        name: String,
    },
    /// Write a value into a store
    Set {
        #[arg(short, long)]
        name: String,

        /// JSON literal, or plain text
        #[arg(short, long)]
        value: String,

        /// Store type when the store is not declared (str, bool, num, obj)
        #[arg(short, long)]
        data_type: Option<String>,
    },
    /// List the known units by measure
    Units,
}

fn load_deployment(path: Option<&PathBuf>) -> anyhow::Result<DeploymentConfig> {
    match path {
        Some(path) => DeploymentLoader::new()
            .load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(DeploymentConfig::default()),
    }
}

fn open_registry(deployment: &DeploymentConfig, flag: Option<PathBuf>) -> StateRegistry {
    let dir = deployment.resolve_state_dir(flag);
    log::info!("Using state directory {}", dir.display());
    let registry = StateRegistry::with_state_dir(dir);
    match deployment.notify_capacity {
        Some(capacity) => registry.with_notify_capacity(capacity),
        None => registry,
    }
}

/// The declared config for `name`, else one built from the type tag
fn store_config(
    deployment: &DeploymentConfig,
    name: &str,
    data_type: Option<&str>,
) -> anyhow::Result<StoreConfig> {
    if let Some(config) = deployment.store(name) {
        return Ok(config.clone());
    }
    let data_type = match data_type {
        Some(tag) => TypeConfig::from_tag(tag)?,
        None => TypeConfig::Obj,
    };
    // One history slot so that ad-hoc writes reach the state file
    Ok(StoreConfig::new(name, data_type).with_history(1, 0))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let deployment = load_deployment(args.config.as_ref())?;

    match args.command {
        Commands::Serve { port } => {
            let registry = open_registry(&deployment, args.state_dir);
            for config in &deployment.stores {
                let store = registry.acquire(config.clone()).await?;
                log::info!("Registered state '{}' ({})", store.name(), store.data_type().tag());
            }

            let (tx, mut rx) = mpsc::channel(64);
            let mut getters = Vec::new();
            for config in &deployment.getters {
                let getter = Getter::attach(config.clone(), &registry, tx.clone())
                    .await
                    .with_context(|| format!("attaching getter for '{}'", config.state))?;
                getters.push(getter);
            }
            drop(tx);
            tokio::spawn(async move {
                while let Some(output) = rx.recv().await {
                    log::info!("{}: {}", output.topic, output.payload);
                }
            });

            server::serve(registry.clone(), port, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Failed to listen for shutdown signal: {}", e);
                }
            })
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

            drop(getters);
            registry.shutdown().await;
        }
        Commands::Get { name } => {
            let registry = open_registry(&deployment, args.state_dir);
            let store = registry.acquire(store_config(&deployment, &name, None)?).await?;
            if !store.is_initialized() {
                anyhow::bail!("No state stored for '{}'", name);
            }
            println!("{}", serde_json::to_string_pretty(&store.exposed_state().await)?);
            registry.shutdown().await;
        }
        Commands::Set {
            name,
            value,
            data_type,
        } => {
            let registry = open_registry(&deployment, args.state_dir);
            let config = store_config(&deployment, &name, data_type.as_deref())?;
            let setter = Setter::new(registry.acquire(config).await?);
            setter.apply(&SetMessage::new(parse_value(&value))).await;
            setter.store().flush().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&setter.store().exposed_state().await)?
            );
            registry.shutdown().await;
        }
        Commands::Units => {
            let registry = StateRegistry::in_memory();
            for (measure, units) in registry.units().list() {
                println!("{}: {}", measure, units.join(", "));
            }
        }
    }

    Ok(())
}
