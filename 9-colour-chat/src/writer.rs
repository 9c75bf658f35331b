use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

/// Starts draining `queue` into `sink`, one line per item, in arrival order.
///
/// The task ends once every sender of the queue is gone and the queue is
/// empty, or at the first failed write. It hands the sink back so the
/// connection can keep using it.
pub fn spawn<W>(sink: W, queue: mpsc::Receiver<String>) -> JoinHandle<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(drain(sink, queue))
}

async fn drain<W>(mut sink: W, mut queue: mpsc::Receiver<String>) -> W
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = queue.recv().await {
        if let Err(err) = write_line(&mut sink, &line).await {
            debug!(?err, "failed to write to client; dropping its queue");
            break;
        }
    }
    sink
}

pub async fn write_line<W>(sink: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    sink.write_all(&encoded).await?;
    sink.flush().await
}
