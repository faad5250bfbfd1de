//! The socket boundary of a session.
//!
//! A [`Link`] is one open connection seen as a pair of channels. Sessions
//! never touch the socket directly, so the reconnect logic can be driven by
//! an in-memory [`Dialer`] in tests and by [`WsDialer`] in production.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Binary(Bytes),
    /// Close the connection gracefully.
    Close,
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Binary(Bytes),
    /// The peer closed the connection.
    Closed,
    /// The connection broke.
    Failed(String),
}

/// One open connection.
///
/// Dropping `outgoing` closes the connection; `incoming` ends after
/// [`Incoming::Closed`] or [`Incoming::Failed`].
#[derive(Debug)]
pub struct Link {
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    pub incoming: mpsc::UnboundedReceiver<Incoming>,
}

/// Opens links. The session applies its own connect timeout around `dial`.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, url: &str) -> BoxFuture<'static, Result<Link>>;
}

/// WebSocket dialer over plain TCP (`ws://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

impl Dialer for WsDialer {
    fn dial(&self, url: &str) -> BoxFuture<'static, Result<Link>> {
        let url = url.to_owned();
        Box::pin(async move {
            let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|err| SessionError::Connect {
                    url: url.clone(),
                    reason: err.to_string(),
                })?;
            debug!(url = %url, "websocket open");

            let (mut sink, mut stream) = socket.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
            let (in_tx, in_rx) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                while let Some(outgoing) = out_rx.recv().await {
                    let (message, closing) = match outgoing {
                        Outgoing::Text(text) => (Message::Text(text.into()), false),
                        Outgoing::Binary(data) => (Message::Binary(data), false),
                        Outgoing::Close => (Message::Close(None), true),
                    };
                    if let Err(err) = sink.send(message).await {
                        debug!(error = %err, "websocket send failed");
                        return;
                    }
                    if closing {
                        return;
                    }
                }
                let _ = sink.close().await;
            });

            tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    let event = match message {
                        Ok(Message::Text(text)) => Incoming::Text(text.as_str().to_owned()),
                        Ok(Message::Binary(data)) => Incoming::Binary(data),
                        Ok(Message::Close(frame)) => {
                            trace!(?frame, "websocket close frame");
                            let _ = in_tx.send(Incoming::Closed);
                            return;
                        }
                        // Ping/pong are answered by tungstenite.
                        Ok(_) => continue,
                        Err(err) => {
                            let _ = in_tx.send(Incoming::Failed(err.to_string()));
                            return;
                        }
                    };
                    if in_tx.send(event).is_err() {
                        return;
                    }
                }
                let _ = in_tx.send(Incoming::Closed);
            });

            Ok(Link {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}
