//! Live-notification transport: one push endpoint, no failover chain.
//!
//! If the endpoint is unreachable the caller can still bootstrap, it just
//! receives no live updates (explicit degraded mode, not a hard failure).

use crate::{parse_base, Error, Result};
use futures_util::{Stream as FutStream, StreamExt};
use lattice_types::api::Notification;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, trace, warn};
use url::Url;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Connects per-stage notification streams.
#[derive(Clone, Debug)]
pub struct Notifier {
    endpoint: Url,
}

impl Notifier {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: parse_base(endpoint, "ws|wss")?,
        })
    }

    /// Subscribe to the change feed for one stage. Events arrive in the
    /// order the transport delivers them; the stream performs no
    /// deduplication or reordering.
    pub async fn subscribe(&self, stage_id: &str) -> Result<NotificationStream> {
        let url = self.endpoint.join(&format!("stage/{stage_id}/updates"))?;
        let (ws, _) = connect_async(url.as_str()).await?;
        Ok(NotificationStream::new(ws))
    }
}

/// Stream of notifications from the WebSocket connection.
#[derive(Debug)]
pub struct NotificationStream {
    receiver: mpsc::Receiver<Result<Notification>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

impl NotificationStream {
    pub(crate) fn new<S>(ws: WebSocketStream<S>) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let handle = Self::spawn_reader(ws, tx);
        Self {
            receiver: rx,
            _handle: handle,
        }
    }

    fn spawn_reader<S>(
        ws: WebSocketStream<S>,
        tx: mpsc::Sender<Result<Notification>>,
    ) -> tokio::task::JoinHandle<()>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ws = ws;
            while let Some(msg) = ws.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        trace!(len = text.len(), "received notification frame");
                        match serde_json::from_str::<Notification>(&text) {
                            Ok(event) => {
                                if tx.send(Ok(event)).await.is_err() {
                                    break; // Receiver dropped
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "failed to decode notification");
                                if tx.send(Err(Error::InvalidData(err))).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("notification stream closed");
                        let _ = tx.send(Err(Error::ConnectionClosed)).await;
                        break;
                    }
                    Ok(_) => {} // Ignore binary/ping/pong frames
                    Err(err) => {
                        error!("notification stream error: {}", err);
                        let _ = tx.send(Err(err.into())).await;
                        break;
                    }
                }
            }
        })
    }

    /// Receive the next notification from the stream.
    pub async fn next(&mut self) -> Option<Result<Notification>> {
        self.receiver.recv().await
    }
}

impl FutStream for NotificationStream {
    type Item = Result<Notification>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
