//! Port Selector Command Line Tool
//!
//! This binary runs a protocol gateway: one TCP port in front, connections
//! forwarded to a backend chosen by the bytes they send first.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use port_selector::common::{init_logger, set_log_level, Network, Result};
use port_selector::config::{defaults, ConfigOverrides, SelectorConfig};
use port_selector::gateway::Gateway;
use port_selector::protocol::MatchMode;
use port_selector::{APP_NAME, VERSION};

/// Port Selector: share one TCP port between several protocols
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration file (JSON); config.json is used when present
    #[clap(short, long, env = "PORT_SELECTOR_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Network (tcp, tcp4, tcp6)
    #[clap(long)]
    network: Option<Network>,

    /// Host to bind
    #[clap(long)]
    host: Option<String>,

    /// Port to bind
    #[clap(short, long)]
    port: Option<u16>,

    /// Number of prefix bytes inspected per connection
    #[clap(long)]
    header_size: Option<usize>,

    /// Match mode (equal, prefix, case_insensitive)
    #[clap(long)]
    match_mode: Option<MatchMode>,

    /// Prefix read timeout in milliseconds, 0 to wait forever
    #[clap(long)]
    peek_timeout_ms: Option<u64>,

    /// Log level
    #[clap(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[clap(long)]
    check: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            network: self.network,
            host: self.host.clone(),
            port: self.port,
            header_size: self.header_size,
            match_mode: self.match_mode,
            peek_timeout_ms: self.peek_timeout_ms,
            log_level: self.log_level.clone(),
        }
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Starting {} v{}", APP_NAME, VERSION);

    let config = SelectorConfig::resolve(args.config_file.as_deref(), &args.overrides())?;
    set_log_level(&config.log_level);

    if args.check {
        info!("Configuration is valid");
        return Ok(());
    }

    info!(
        "Listening on {}, header size {}, match mode {}",
        config.listen_display(),
        config.header_size,
        config.match_mode
    );

    let gateway = Gateway::new(&config).await?;

    let selector = gateway.selector().clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                selector.close();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    info!("Gateway ready on {}, press Ctrl+C to stop", gateway.local_addr());
    gateway.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Until the configuration is read, only the command line knows a level
    init_logger(args.log_level.as_deref().unwrap_or(defaults::LOG_LEVEL_STR));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}: {}", APP_NAME, e);
            ExitCode::FAILURE
        }
    }
}
