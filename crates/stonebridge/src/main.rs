//! Stonebridge broker shell
//!
//! Runs the plugin broker standalone against a logging stub host: loads
//! a plugin configuration, starts the configured processes and brokers
//! their messages until Ctrl-C. Useful for exercising plugins without a
//! full game server around them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stonebridge::host::{CommandHandler, Host};
use stonebridge::proto::CustomItemDefinition;
use stonebridge::Manager;

/// Stonebridge plugin broker
#[derive(Parser, Debug)]
#[command(name = "stonebridge")]
#[command(about = "Plugin-process broker shell", long_about = None)]
struct Args {
    /// Path to the plugin configuration file
    #[arg(short, long, default_value = "plugins.toml")]
    config: PathBuf,
}

/// Host stub that logs what a real server would execute.
struct StubHost;

impl Host for StubHost {
    fn broadcast_chat(&self, message: &str) {
        info!(target: "host", "chat broadcast: {}", message);
    }

    fn register_command(
        &self,
        name: &str,
        description: &str,
        aliases: &[String],
        _handler: Arc<dyn CommandHandler>,
    ) {
        info!(target: "host", %name, %description, ?aliases, "command registered");
    }

    fn register_custom_item(&self, item: &CustomItemDefinition) -> Result<()> {
        info!(target: "host", id = %item.id, name = %item.display_name, "custom item registered");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stonebridge=info,plugin=info,host=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting stonebridge v{}", env!("CARGO_PKG_VERSION"));

    let manager = Manager::new(Arc::new(StubHost));
    manager.start(&args.config).await?;
    info!("{} plugin process(es) running", manager.processes().len());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    manager.close().await;
    Ok(())
}
