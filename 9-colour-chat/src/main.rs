use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use colour_chat::{
    cli::{Cli, Command, ServeArgs},
    relay,
    server::{Server, ServerConfig},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Relay(args) => relay::run(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let listener = match TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))
    {
        Ok(listener) => listener,
        Err(err) => {
            error!("{err:#}");
            return Err(err);
        }
    };

    let server = Server::new(
        listener,
        ServerConfig {
            queue_capacity: args.queue_capacity,
        },
    );
    let addr = server.local_addr()?;
    info!("server listening on {}", addr);
    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("server exited with error: {err:?}");
        return Err(err);
    }
    Ok(())
}
