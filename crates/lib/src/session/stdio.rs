//! Newline-delimited JSON transport.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Session, SessionError, SessionSummary};
use crate::fetch::PackageHost;
use crate::protocol::{Message, ProtocolError};

/// Inbound lines buffered ahead of the session.
const INBOUND_BUFFER: usize = 16;

/// Serve one session over a line-oriented stream pair.
///
/// Each inbound line is one JSON message; blank lines are ignored. Every
/// outbound message is written as one line and flushed immediately. The end
/// of the inbound stream or a failed write cancels the session.
pub async fn serve_lines<H, R, W>(session: Session<H>, reader: R, mut writer: W) -> Result<SessionSummary, SessionError>
where
  H: PackageHost,
  R: AsyncBufRead + Unpin + Send + 'static,
  W: AsyncWrite + Unpin,
{
  let cancel = session.cancel_token();
  let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
  let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

  let reader_task = tokio::spawn(async move {
    let mut lines = reader.lines();
    loop {
      match lines.next_line().await {
        Ok(Some(line)) if line.trim().is_empty() => continue,
        Ok(Some(line)) => {
          if inbound_tx.send(line).await.is_err() {
            break;
          }
        }
        Ok(None) => break,
        Err(e) => {
          warn!(error = %e, "failed to read from client");
          break;
        }
      }
    }
    debug!("inbound stream closed");
  });

  let write_all = async move {
    while let Some(message) = outbound_rx.recv().await {
      let line = message.to_json()?;
      if let Err(e) = write_line(&mut writer, &line).await {
        warn!(error = %e, "failed to write to client, cancelling session");
        cancel.cancel();
        return Err(ProtocolError::Io(e));
      }
    }
    Ok::<_, ProtocolError>(())
  };

  let (result, written) = tokio::join!(session.run(inbound_rx, outbound_tx), write_all);
  reader_task.abort();

  let summary = result?;
  written?;
  Ok(summary)
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
  writer.write_all(line.as_bytes()).await?;
  writer.write_all(b"\n").await?;
  writer.flush().await
}
