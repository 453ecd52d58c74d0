// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use objsync::load_config_with_env;
use objsync::StoreFactory;

/// objsync - move content-addressed object graphs between stores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one object from the source store
    Get { id: String },

    /// Check which of the given ids the target store already holds
    Has { ids: Vec<String> },

    /// Copy an object and its full closure from source to target
    Copy { root_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let sync_config = load_config_with_env(&args.config)?;

    // Initialize tracing with configured level
    let log_level = match sync_config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting objsync");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Source store: {}", sync_config.source.store);
    info!("Target store: {}", sync_config.target.store);

    // Create and prepare the stores
    let source = StoreFactory::create(&sync_config.source)?;
    source.initialize().await?;
    let target = StoreFactory::create(&sync_config.target)?;
    target.initialize().await?;

    match args.command {
        Command::Get { id } => match source.get_object(&id).await? {
            Some(payload) => println!("{}", payload),
            None => {
                eprintln!("{}: not found in '{}'", id, source.transport_name());
                std::process::exit(1);
            }
        },

        Command::Has { ids } => {
            let found = target.has_objects(&ids).await?;
            for id in &ids {
                let present = found.get(id).copied().unwrap_or(false);
                println!("{}\t{}", id, present);
            }
        }

        Command::Copy { root_id } => {
            source.set_on_progress(Arc::new(|name, count| {
                info!("{}: {} objects transferred", name, count);
            }));
            target.set_on_error(Arc::new(|name, error| {
                tracing::error!("{}: {}", name, error);
            }));

            let on_children_known = |count: usize| {
                info!("Closure has {} children", count);
            };
            source
                .copy_object_and_children(&root_id, target.as_ref(), Some(&on_children_known))
                .await?;

            info!(
                "Copied '{}' into '{}' ({} objects this session)",
                root_id,
                target.transport_name(),
                target.saved_object_count()
            );
        }
    }

    Ok(())
}
