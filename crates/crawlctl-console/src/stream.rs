use crate::app::AppEvent;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

/// A running log stream connection. Dropping the handle has the same effect
/// as [`StreamHandle::close`].
pub struct StreamHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn spawn(endpoint: Url, tx: mpsc::Sender<AppEvent>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(stream_loop(endpoint, tx, shutdown_rx));
        Self {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Asks the task to send a close frame. Only the first call has an effect.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Closes the connection and waits up to `grace` for the close frame to
    /// go out before aborting the task.
    pub async fn finish(mut self, grace: Duration) {
        self.close();
        if timeout(grace, &mut self.task).await.is_err() {
            self.task.abort();
        }
    }
}

/// Dials `endpoint` once and forwards every frame in arrival order. There is
/// no reconnect: the task ends after an error, a peer close or a shutdown.
pub async fn stream_loop(
    endpoint: Url,
    tx: mpsc::Sender<AppEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connect = tokio::select! {
        result = connect_async(endpoint.as_str()) => result,
        _ = &mut shutdown => return,
    };
    let ws = match connect {
        Ok((ws, _response)) => ws,
        Err(err) => {
            warn!(event = "stream_connect_error", endpoint = %endpoint, error = %err);
            let _ = tx
                .send(AppEvent::StreamErrored {
                    reason: err.to_string(),
                })
                .await;
            return;
        }
    };
    if tx.send(AppEvent::StreamOpened).await.is_err() {
        return;
    }

    let (mut sink, mut source) = ws.split();
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(err) = sink.send(Message::Close(None)).await {
                    debug!(event = "stream_close_error", error = %err);
                }
                return;
            }
            incoming = source.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            debug!(event = "stream_binary_frame_dropped");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = tx.send(AppEvent::StreamClosed).await;
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(event = "stream_read_error", endpoint = %endpoint, error = %err);
                        let _ = tx
                            .send(AppEvent::StreamErrored {
                                reason: err.to_string(),
                            })
                            .await;
                        return;
                    }
                };
                let frame = AppEvent::StreamFrame {
                    text,
                    received_at: Utc::now(),
                };
                if tx.send(frame).await.is_err() {
                    return;
                }
            }
        }
    }
}
