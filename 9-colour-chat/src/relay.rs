//! Bare relay client: stdin goes to the server, the server goes to stdout.

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{debug, info, warn};

use crate::cli::RelayArgs;

pub async fn run(args: RelayArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("connected to {}", args.server);

    relay(stream, io::stdin(), io::stdout()).await
}

/// Pumps `input` into the socket and the socket into `output` at the same
/// time. When `input` ends the socket's write side is shut down, and the call
/// returns once the server has closed its side.
pub async fn relay<I, O>(stream: TcpStream, mut input: I, mut output: O) -> Result<()>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let (mut from_server, mut to_server) = stream.into_split();

    let downstream = tokio::spawn(async move {
        if let Err(err) = io::copy(&mut from_server, &mut output).await {
            debug!(?err, "stopped copying server output");
        }
        let _ = output.flush().await;
    });

    io::copy(&mut input, &mut to_server)
        .await
        .context("failed to forward input to server")?;
    if let Err(err) = to_server.shutdown().await {
        warn!(?err, "failed to half-close connection");
    }

    downstream.await.context("server output task failed")?;
    Ok(())
}
