//! Minimal line client: logs in, forwards input lines, prints server lines.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, FramedRead, LinesCodec};
use tracing::debug;

use crate::protocol::LOGIN_PREFIX;

/// Connect to `addr` as `login` and bridge stdin/stdout until either side closes.
pub async fn connect_command(addr: &str, login: &str) -> Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    run_client(stream, login, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Drive a client session over an established stream.
///
/// Returns when the server closes the connection or `input` reaches EOF.
pub async fn run_client<R, W>(stream: TcpStream, login: &str, input: R, mut output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut server = Framed::new(stream, LinesCodec::new());
    let mut input = FramedRead::new(input, LinesCodec::new());

    server
        .send(format!("{LOGIN_PREFIX}{login}"))
        .await
        .context("Failed to send login")?;

    loop {
        tokio::select! {
            line = server.next() => match line {
                Some(Ok(line)) => {
                    output.write_all(line.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                Some(Err(e)) => return Err(e).context("Failed to read from server"),
                None => {
                    debug!("server closed the connection");
                    break;
                }
            },
            line = input.next() => match line {
                Some(Ok(line)) => server.send(line).await.context("Failed to send message")?,
                Some(Err(e)) => return Err(e).context("Failed to read input"),
                None => {
                    debug!("input closed");
                    break;
                }
            },
        }
    }

    let _ = SinkExt::<String>::close(&mut server).await;
    Ok(())
}
