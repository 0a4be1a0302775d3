//! JSON-lines transport: one request per input line, one reply or event per
//! output line.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::events::ServiceEvent;
use crate::ipc::channel::RequestChannel;
use crate::ipc::{Envelope, Reply, Response};
use crate::AppError;

fn encode<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(line) => Some(line),
        Err(err) => {
            warn!(target: "auramatic", event = "encode_failed", error = %err);
            None
        }
    }
}

/// Best-effort correlation id of a line that failed to parse as a request.
fn salvage_id(line: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("id").and_then(serde_json::Value::as_u64))
        .unwrap_or(0)
}

fn invalid_request(line: &str, err: &serde_json::Error) -> Reply {
    let app = AppError::new(AppError::INVALID_REQUEST_CODE, err.to_string())
        .with_context("line", err.line().to_string())
        .with_context("column", err.column().to_string());
    Reply {
        id: salvage_id(line),
        response: Response::from(app),
    }
}

/// Serve `channel` over a line-oriented byte stream until `reader` reaches
/// EOF. Requests are handled concurrently; every in-flight request is
/// answered before this returns.
pub async fn serve<R, W>(
    channel: RequestChannel,
    mut events: broadcast::Receiver<ServiceEvent>,
    reader: R,
    mut writer: W,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(mut line) = out_rx.recv().await {
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        io::Result::Ok(())
    });

    let event_tx = out_tx.clone();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let event_task = tokio::spawn(async move {
        let forward = |event: ServiceEvent| match encode(&event) {
            Some(line) => event_tx.send(line).is_ok(),
            None => true,
        };
        loop {
            tokio::select! {
                biased;
                received = events.recv() => match received {
                    Ok(event) => {
                        if !forward(event) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "auramatic", event = "events_lagged", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = &mut stop_rx => {
                    // Events published by the last requests are still owed.
                    while let Ok(event) = events.try_recv() {
                        if !forward(event) {
                            break;
                        }
                    }
                    break;
                }
            }
        }
    });

    let mut in_flight = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let envelope = match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(target: "auramatic", event = "invalid_request", error = %err);
                if let Some(encoded) = encode(&invalid_request(line, &err)) {
                    let _ = out_tx.send(encoded);
                }
                continue;
            }
        };

        let channel = channel.clone();
        let out_tx = out_tx.clone();
        in_flight.spawn(async move {
            let Envelope { id, request } = envelope;
            let reply = match channel.call_with_id(id, request).await {
                Ok(reply) => reply,
                Err(err) => Reply {
                    id,
                    response: Response::from(AppError::new(AppError::GENERIC_CODE, err.to_string())),
                },
            };
            if let Response::Superseded { recipe_id } = reply.response {
                debug!(target: "auramatic", event = "reply_suppressed", id, recipe_id);
                return;
            }
            if let Some(encoded) = encode(&reply) {
                let _ = out_tx.send(encoded);
            }
        });
    }

    while in_flight.join_next().await.is_some() {}
    let _ = stop_tx.send(());
    let _ = event_task.await;
    drop(out_tx);

    match writer_task.await {
        Ok(result) => result,
        Err(join) => Err(io::Error::new(io::ErrorKind::Other, join)),
    }
}
