use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use smartflow_gateway::{ApiServer, Config};

/// SmartFlow - Real-time voice chat gateway
#[derive(Parser)]
#[command(name = "smartflow", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "SMARTFLOW_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,smartflow_gateway=info",
        1 => "info,smartflow_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        port = config.port,
        media_dir = %config.media_dir.display(),
        max_streams_per_user = config.limits.max_streams_per_user,
        vad = config.vad.enabled,
        "starting smartflow gateway"
    );

    if config.ws_auth_token.is_none() {
        tracing::warn!("WS_AUTH_TOKEN not set, streams are unauthenticated");
    }

    let server = ApiServer::from_config(config)?;
    server.run().await?;

    Ok(())
}
