//! Duplex, message-oriented transport to the role-play counterpart.
//!
//! The session driver only sees the [`Transport`] and [`Connector`] traits, so
//! the websocket implementation here can be swapped for an in-memory pair in
//! tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

/// How long `close` waits for the peer to acknowledge the close frame.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// An open connection carrying text-encoded records.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<()>;

    /// Waits for the next text record. Returns `None` once the peer has
    /// closed the connection. Cancelling the returned future loses nothing.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens transports; one call per session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}

/// Connects to the counterpart over a websocket.
pub struct WsConnector {
    url: String,
    api_key: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(api_key) = &self.api_key {
            request
                .headers_mut()
                .insert("Authorization", format!("Bearer {}", api_key).parse()?);
        }

        let (stream, _) = connect_async(request)
            .await
            .context("Failed to connect to role-play counterpart")?;
        info!(url = %self.url, "Connected to role-play counterpart.");
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "Counterpart sent close frame.");
                    return None;
                }
                Ok(WsMessage::Binary(data)) => {
                    warn!(len = data.len(), "Dropping binary frame from counterpart.");
                }
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        // Drain until the peer acknowledges the close.
        let drained = tokio::time::timeout(CLOSE_ACK_TIMEOUT, async {
            while let Some(Ok(_)) = self.stream.next().await {}
        })
        .await;
        if drained.is_err() {
            debug!("Counterpart did not acknowledge close in time.");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport pair for driving sessions without a network.

    use super::*;
    use anyhow::anyhow;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    };
    use tokio::sync::mpsc;

    pub struct ChannelTransport {
        to_peer: mpsc::UnboundedSender<String>,
        from_peer: mpsc::UnboundedReceiver<Result<String>>,
        fail_sends: Arc<AtomicBool>,
        close_delay: Duration,
        closed: Arc<AtomicBool>,
    }

    /// The counterpart's side of a [`ChannelTransport`].
    pub struct PeerEnd {
        pub to_client: mpsc::UnboundedSender<Result<String>>,
        pub from_client: mpsc::UnboundedReceiver<String>,
        fail_sends: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    impl PeerEnd {
        pub fn say(&self, json: &str) {
            self.to_client.send(Ok(json.to_string())).unwrap();
        }

        /// Makes the client's next read fail with `message`.
        pub fn break_reads(&self, message: &str) {
            self.to_client.send(Err(anyhow!(message.to_string()))).unwrap();
        }

        /// Makes every later client send fail.
        pub fn break_sends(&self) {
            self.fail_sends.store(true, Ordering::SeqCst);
        }

        pub async fn next_record(&mut self) -> serde_json::Value {
            let text = self.from_client.recv().await.expect("client hung up");
            serde_json::from_str(&text).unwrap()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        /// Waits for the client to finish closing its side.
        pub async fn wait_closed(&self) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while !self.is_closed() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("transport was never closed");
        }
    }

    pub fn pair(close_delay: Duration) -> (ChannelTransport, PeerEnd) {
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        (
            ChannelTransport {
                to_peer,
                from_peer,
                fail_sends: fail_sends.clone(),
                close_delay,
                closed: closed.clone(),
            },
            PeerEnd {
                to_client,
                from_client,
                fail_sends,
                closed,
            },
        )
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, text: String) -> Result<()> {
            if self.fail_sends.load(Ordering::SeqCst) {
                anyhow::bail!("broken pipe");
            }
            self.to_peer
                .send(text)
                .map_err(|_| anyhow!("peer dropped"))
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            self.from_peer.recv().await
        }

        async fn close(&mut self) -> Result<()> {
            tokio::time::sleep(self.close_delay).await;
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out a single prepared transport.
    pub struct ChannelConnector {
        transport: Mutex<Option<ChannelTransport>>,
    }

    impl ChannelConnector {
        pub fn new() -> (Self, PeerEnd) {
            Self::with_close_delay(Duration::ZERO)
        }

        /// A connector whose transport takes `close_delay` to close.
        pub fn with_close_delay(close_delay: Duration) -> (Self, PeerEnd) {
            let (transport, peer) = pair(close_delay);
            (
                Self {
                    transport: Mutex::new(Some(transport)),
                },
                peer,
            )
        }
    }

    #[async_trait]
    impl Connector for ChannelConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            let transport = self
                .transport
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow!("transport already used"))?;
            Ok(Box::new(transport))
        }
    }
}
