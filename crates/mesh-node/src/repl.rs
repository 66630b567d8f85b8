//! Operator loop: read lines, connect or broadcast.

use mesh_server::Node;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::input::Command;

const PROMPT: &str = "> ";

/// Why the loop returned.
#[derive(Debug, PartialEq, Eq)]
pub enum Exit {
    /// The operator typed `q`.
    Quit,
    /// Input reached end of file.
    InputClosed,
}

/// Run the loop until `q` or end of input.
///
/// Connection failures are reported on `output` and do not end the loop.
pub async fn run<R, W>(node: &Node, input: R, mut output: W) -> std::io::Result<Exit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            info!("input closed");
            return Ok(Exit::InputClosed);
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => return Ok(Exit::Quit),
            Command::Usage(usage) => {
                output.write_all(format!("{usage}\n").as_bytes()).await?;
            }
            Command::Connect(address) => {
                let reply = match node.connect_to(&address).await {
                    Ok(conn) => format!("connected to {}\n", conn.peer()),
                    Err(e) => format!("error: {e}\n"),
                };
                output.write_all(reply.as_bytes()).await?;
            }
            Command::Broadcast(text) => {
                let report = node.broadcast(&text).await;
                debug!(
                    sent = report.sent,
                    failed = report.failed,
                    skipped = report.skipped,
                    "broadcast finished"
                );
            }
        }
    }
}
