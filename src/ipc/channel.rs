use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::commands;
use crate::ipc::{Reply, Request, Response};
use crate::service::RecipeService;
use crate::util::dispatch_async_with_fence;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("request channel is closed")]
    Closed,
    #[error("request {0} was dropped without a reply")]
    Dropped(u64),
}

struct Call {
    id: u64,
    request: Request,
    reply: oneshot::Sender<Reply>,
}

/// Asynchronous request/response link between a UI and the service.
///
/// Each call gets exactly one reply carrying its correlation id. Requests run
/// concurrently; there are no retries and no timeouts.
#[derive(Clone)]
pub struct RequestChannel {
    tx: mpsc::Sender<Call>,
    next_id: Arc<AtomicU64>,
}

impl RequestChannel {
    /// Start the dispatcher. It runs until every clone of the channel is
    /// dropped and the in-flight requests it spawned have been answered.
    pub fn spawn(service: RecipeService, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Call>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                let service = service.clone();
                tokio::spawn(async move {
                    let Call { id, request, reply } = call;
                    let response =
                        match dispatch_async_with_fence(|| commands::handle(&service, request)).await
                        {
                            Ok(response) => response,
                            Err(err) => Response::from(err),
                        };
                    if reply.send(Reply { id, response }).is_err() {
                        tracing::debug!(target: "auramatic", event = "reply_unclaimed", id);
                    }
                });
            }
            tracing::debug!(target: "auramatic", event = "dispatcher_stopped");
        });
        (
            Self {
                tx,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            handle,
        )
    }

    /// Send `request` under a fresh correlation id.
    pub async fn call(&self, request: Request) -> Result<Reply, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.call_with_id(id, request).await
    }

    /// Send `request` under a caller-chosen correlation id.
    pub async fn call_with_id(&self, id: u64, request: Request) -> Result<Reply, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Call { id, request, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        rx.await.map_err(|_| ChannelError::Dropped(id))
    }
}
