//! Operator console on stdin
//!
//! Accepts `active` and `trot`, one per line, and latches the matching
//! button pulse for the next published message.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::commands::{Command, CommandLatch};

/// Reads commands until EOF or cancellation; returns how many were latched
pub async fn run_console<R>(input: R, latch: CommandLatch, cancel: CancellationToken) -> usize
where
    R: AsyncBufRead + Unpin,
{
    info!("Console ready, commands: active, trot");
    let mut lines = input.lines();
    let mut accepted = 0;

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<Command>() {
                Ok(command) => {
                    info!("Console command: {:?}", command);
                    latch.request(command);
                    accepted += 1;
                }
                Err(e) => warn!("Console: {}", e),
            },
            Ok(None) => {
                info!("Console input closed");
                break;
            }
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        }
    }

    accepted
}
