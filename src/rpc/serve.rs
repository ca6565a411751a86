//! Stdio serve loop: one JSON document per line in, one per line out.
//!
//! Logging goes to stderr, so stdout carries nothing but responses.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::session::Session;
use super::wire::{Request, Response, INVALID_REQUEST};

/// Read requests from stdin until EOF or session termination.
pub async fn serve(mut session: Session) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    crate::log_event!("rpc", "serving on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => session.dispatch(request).await,
            Err(e) => {
                let error = crate::error::ProtocolError::InvalidRequest {
                    reason: e.to_string(),
                };
                Some(Response::error(None, INVALID_REQUEST, error.to_string()))
            }
        };

        if let Some(response) = response {
            let mut payload = serde_json::to_string(&response).map_err(std::io::Error::other)?;
            payload.push('\n');
            stdout.write_all(payload.as_bytes()).await?;
            stdout.flush().await?;
        }

        if session.is_terminated() {
            break;
        }
    }

    Ok(())
}
