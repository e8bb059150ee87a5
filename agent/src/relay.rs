//! Best-effort relay to the meeting backend websocket.
//!
//! One socket per agent process, shared by every track pipeline. A single
//! send-loop task owns the write half and is fed through a channel, so
//! concurrent pipelines may interleave frames but never split one. There is
//! no reconnect: if the socket dies the relay degrades to local-only mode.

use crate::messages::OutboundMessage;
use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// `<base>/<session-id>?token=<jwt>`, the path shape the backend routes on.
pub fn build_backend_url(base: &str, session_id: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid backend url: {base}"))?;

    url.path_segments_mut()
        .map_err(|_| anyhow!("backend url cannot carry a session path: {base}"))?
        .pop_if_empty()
        .push(session_id);

    url.query_pairs_mut().append_pair("token", token);

    Ok(url)
}

/// Loggable form of the backend URL with the token removed.
pub fn redact_url(url: &Url) -> String {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == "token" {
                (k.to_string(), "REDACTED".to_string())
            } else {
                (k.to_string(), v.to_string())
            }
        })
        .collect();

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

pub struct BackendRelay {
    tx: Option<mpsc::Sender<String>>,
}

impl BackendRelay {
    /// Open the backend socket and start its send loop.
    pub async fn connect(url: &Url) -> Result<Self> {
        let (ws_stream, _resp) = connect_async(url.as_str())
            .await
            .with_context(|| format!("backend connect failed: {}", redact_url(url)))?;

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<String>(128);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = rx.recv() => {
                        let Some(frame) = frame else {
                            let _ = ws_write.send(Message::Close(None)).await;
                            break;
                        };

                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            warn!("backend send failed: {e}");
                            break;
                        }
                    }
                    item = ws_read.next() => {
                        match item {
                            // The backend may echo chat history; nothing to do.
                            Some(Ok(Message::Close(_))) | None => {
                                info!("backend websocket closed");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("backend websocket error: {e}");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self { tx: Some(tx) })
    }

    /// Relay that drops every message, used when the backend is unreachable.
    pub fn offline() -> Self {
        Self { tx: None }
    }

    pub fn is_connected(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue one frame. Failures are logged and swallowed so a dead backend
    /// never takes a track pipeline down with it.
    pub async fn send(&self, msg: &OutboundMessage) {
        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize outbound message: {e}");
                return;
            }
        };

        let Some(tx) = &self.tx else {
            debug!("local-only mode, not relayed: {json}");
            return;
        };

        if tx.send(json).await.is_err() {
            warn!("backend send loop has ended, message dropped");
        }
    }

    /// Relay backed by a bare channel, for asserting on sent frames in tests.
    #[cfg(test)]
    pub(crate) fn from_parts(tx: mpsc::Sender<String>) -> Self {
        Self { tx: Some(tx) }
    }
}
