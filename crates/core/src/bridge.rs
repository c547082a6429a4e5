//! Pub/sub bridge client.
//!
//! The bridge speaks rosbridge v2 JSON over a WebSocket. Outbound frames go
//! through an unbounded channel drained by a writer task, so every
//! [`BridgeLink`] operation is an enqueue and never waits on the socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rover_protocol::BridgeOp;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::config::TopicConfig;
use crate::control::BoxFuture;
use crate::error::{Error, Result};

/// An open bridge connection.
///
/// The orchestrator owns the only strong handle that manages its lifecycle;
/// publishers borrow it.
pub trait BridgeLink: Send + Sync {
	/// Queues one operation for sending.
	fn send(&self, op: BridgeOp) -> Result<()>;

	/// Closes the connection. Further sends fail.
	fn terminate(&self);

	fn is_open(&self) -> bool;

	fn advertise(&self, topic: &TopicConfig) -> Result<()> {
		self.send(BridgeOp::Advertise {
			topic: topic.name.clone(),
			msg_type: topic.msg_type.clone(),
		})
	}

	fn publish(&self, topic: &str, msg: Value) -> Result<()> {
		self.send(BridgeOp::Publish {
			topic: topic.to_string(),
			msg,
		})
	}

	fn unadvertise(&self, topic: &str) -> Result<()> {
		self.send(BridgeOp::Unadvertise { topic: topic.to_string() })
	}
}

/// Opens bridge connections. One call is one attempt; retrying is the caller's job.
pub trait BridgeConnector: Send + Sync {
	fn connect<'a>(&'a self, host: &'a str, port: u16, timeout: Duration) -> BoxFuture<'a, Result<Arc<dyn BridgeLink>>>;
}

enum Outbound {
	Frame(String),
	Close,
}

/// WebSocket-backed [`BridgeLink`].
pub struct WebSocketBridge {
	url: String,
	tx: mpsc::UnboundedSender<Outbound>,
	open: Arc<AtomicBool>,
}

impl WebSocketBridge {
	/// Connects to `url` (e.g. `ws://10.0.0.5:9090`) and starts the I/O tasks.
	pub async fn connect(url: &str) -> Result<Self> {
		let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
		let (mut sink, mut stream) = ws.split();
		let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
		let open = Arc::new(AtomicBool::new(true));

		let writer_open = Arc::clone(&open);
		let writer_url = url.to_string();
		tokio::spawn(async move {
			while let Some(outbound) = rx.recv().await {
				match outbound {
					Outbound::Frame(text) => {
						if let Err(e) = sink.send(Message::Text(text.into())).await {
							warn!(target = "rover.bridge", url = %writer_url, error = %e, "bridge write failed");
							break;
						}
					}
					Outbound::Close => {
						let _ = sink.send(Message::Close(None)).await;
						let _ = sink.close().await;
						break;
					}
				}
			}
			writer_open.store(false, Ordering::SeqCst);
			debug!(target = "rover.bridge", url = %writer_url, "bridge writer stopped");
		});

		let reader_open = Arc::clone(&open);
		let reader_url = url.to_string();
		tokio::spawn(async move {
			while let Some(message) = stream.next().await {
				match message {
					Ok(Message::Text(text)) => debug!(target = "rover.bridge", url = %reader_url, %text, "bridge message"),
					Ok(Message::Close(_)) => break,
					Ok(_) => {}
					Err(e) => {
						debug!(target = "rover.bridge", url = %reader_url, error = %e, "bridge read failed");
						break;
					}
				}
			}
			reader_open.store(false, Ordering::SeqCst);
		});

		debug!(target = "rover.bridge", %url, "bridge connected");
		Ok(Self {
			url: url.to_string(),
			tx,
			open,
		})
	}

	pub fn url(&self) -> &str {
		&self.url
	}
}

impl BridgeLink for WebSocketBridge {
	fn send(&self, op: BridgeOp) -> Result<()> {
		if !self.is_open() {
			return Err(Error::Transport(format!("bridge {} is closed", self.url)));
		}
		let text = serde_json::to_string(&op)?;
		self.tx
			.send(Outbound::Frame(text))
			.map_err(|_| Error::Transport(format!("bridge {} is closed", self.url)))
	}

	fn terminate(&self) {
		let _ = self.tx.send(Outbound::Close);
		self.open.store(false, Ordering::SeqCst);
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
	}
}

/// Connects [`WebSocketBridge`]s at `ws://<host>:<port>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl BridgeConnector for WebSocketConnector {
	fn connect<'a>(&'a self, host: &'a str, port: u16, timeout: Duration) -> BoxFuture<'a, Result<Arc<dyn BridgeLink>>> {
		Box::pin(async move {
			let url = format!("ws://{}:{}", host, port);
			let bridge = tokio::time::timeout(timeout, WebSocketBridge::connect(&url))
				.await
				.map_err(|_| Error::Transport(format!("bridge connect to {url} timed out after {timeout:?}")))??;
			Ok(Arc::new(bridge) as Arc<dyn BridgeLink>)
		})
	}
}
