//! Single-owner task around a [`SessionOrchestrator`].
//!
//! The presentation layer never touches the orchestrator directly. It sends
//! intents through a [`DriverHandle`] and gets each answer back on a oneshot
//! channel; every state change is also published on a `watch` channel for
//! re-rendering. Only the driver task mutates session state.
//!
//! While an intent is in flight the driver keeps draining its queue. A
//! disconnect (or shutdown) arriving in that window is never held up:
//!
//! * during a connect it cancels the token, which abandons a pending primary
//!   start or cuts bridge negotiation short;
//! * during a capability start, store-map or reset it drops the pending
//!   request, so a late answer can never commit.
//!
//! The session-ending request is then applied next. Any other intent waits
//! its turn.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::ControlFlow;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capability::{Capability, CapabilityState};
use crate::config::SensorVariant;
use crate::error::{Error, Result};
use crate::session::{ConnectOutcome, SessionOrchestrator, SessionSnapshot};

const INTENT_QUEUE_DEPTH: usize = 64;

enum Request {
	Connect {
		host: String,
		port: Option<String>,
		reply: oneshot::Sender<Result<ConnectOutcome>>,
	},
	Disconnect {
		reply: oneshot::Sender<()>,
	},
	Toggle {
		capability: Capability,
		reply: oneshot::Sender<Result<CapabilityState>>,
	},
	StoreMap {
		reply: oneshot::Sender<Result<()>>,
	},
	Reset {
		reply: oneshot::Sender<Result<()>>,
	},
	SetVariant {
		variant: SensorVariant,
		reply: oneshot::Sender<Result<()>>,
	},
	Key {
		key: String,
		reply: oneshot::Sender<Result<()>>,
	},
	Joint {
		joint: String,
		degrees: f64,
		reply: oneshot::Sender<Result<f64>>,
	},
	Settle {
		reply: oneshot::Sender<()>,
	},
	Shutdown {
		reply: oneshot::Sender<()>,
	},
}

impl Request {
	fn ends_session(&self) -> bool {
		matches!(self, Request::Disconnect { .. } | Request::Shutdown { .. })
	}
}

/// Intents not yet handled: those queued behind an in-flight one, then the channel.
struct Inbox {
	rx: mpsc::Receiver<Request>,
	open: bool,
	backlog: VecDeque<Request>,
}

impl Inbox {
	async fn next(&mut self) -> Option<Request> {
		if let Some(request) = self.backlog.pop_front() {
			return Some(request);
		}
		if !self.open {
			return None;
		}
		let request = self.rx.recv().await;
		self.open = request.is_some();
		request
	}

	/// Awaits `work` while queueing whatever arrives meanwhile.
	///
	/// Returns `None` as soon as a session-ending request arrives or every
	/// handle is dropped; `work` is dropped unfinished.
	async fn unless_session_ends<T>(&mut self, work: impl Future<Output = T>) -> Option<T> {
		tokio::pin!(work);

		loop {
			tokio::select! {
				output = &mut work => return Some(output),
				incoming = self.rx.recv(), if self.open => match incoming {
					Some(request) => {
						let ends = request.ends_session();
						self.backlog.push_back(request);
						if ends {
							return None;
						}
					}
					None => {
						self.open = false;
						return None;
					}
				},
			}
		}
	}
}

pub struct SessionDriver {
	orchestrator: SessionOrchestrator,
	inbox: Inbox,
	state_tx: watch::Sender<SessionSnapshot>,
}

impl SessionDriver {
	/// Moves `orchestrator` into a new task and returns the handle to drive it.
	///
	/// The task ends on [`DriverHandle::shutdown`] or once every handle is dropped;
	/// either way the session is disconnected and pending stops are awaited.
	pub fn spawn(orchestrator: SessionOrchestrator) -> DriverHandle {
		let (tx, rx) = mpsc::channel(INTENT_QUEUE_DEPTH);
		let (state_tx, state_rx) = watch::channel(orchestrator.snapshot());

		let driver = SessionDriver {
			orchestrator,
			inbox: Inbox {
				rx,
				open: true,
				backlog: VecDeque::new(),
			},
			state_tx,
		};
		tokio::spawn(driver.run());

		DriverHandle { tx, state: state_rx }
	}

	async fn run(mut self) {
		while let Some(request) = self.inbox.next().await {
			if self.handle(request).await.is_break() {
				debug!(target = "rover.driver", "driver shut down");
				return;
			}
		}

		debug!(target = "rover.driver", "all handles dropped; shutting down session");
		self.orchestrator.shutdown().await;
		self.publish_state();
	}

	async fn handle(&mut self, request: Request) -> ControlFlow<()> {
		match request {
			Request::Connect { host, port, reply } => {
				let outcome = self.connect(&host, port.as_deref()).await;
				self.publish_state();
				let _ = reply.send(outcome);
			}
			Request::Disconnect { reply } => {
				self.orchestrator.disconnect();
				self.publish_state();
				let _ = reply.send(());
			}
			Request::Toggle { capability, reply } => {
				let result = self.inbox.unless_session_ends(self.orchestrator.toggle(capability)).await;
				self.publish_state();
				let _ = reply.send(abandoned_unless_done("toggle", result));
			}
			Request::StoreMap { reply } => {
				let result = self.inbox.unless_session_ends(self.orchestrator.store_map()).await;
				let _ = reply.send(abandoned_unless_done("store map", result));
			}
			Request::Reset { reply } => {
				let result = self.inbox.unless_session_ends(self.orchestrator.reset()).await;
				self.publish_state();
				let _ = reply.send(abandoned_unless_done("reset", result));
			}
			Request::SetVariant { variant, reply } => {
				let result = self.orchestrator.set_sensor_variant(variant);
				self.publish_state();
				let _ = reply.send(result);
			}
			Request::Key { key, reply } => {
				let _ = reply.send(self.orchestrator.press_key(&key));
			}
			Request::Joint { joint, degrees, reply } => {
				let _ = reply.send(self.orchestrator.set_joint(&joint, degrees));
			}
			Request::Settle { reply } => {
				self.orchestrator.settle().await;
				let _ = reply.send(());
			}
			Request::Shutdown { reply } => {
				self.orchestrator.shutdown().await;
				self.publish_state();
				let _ = reply.send(());
				return ControlFlow::Break(());
			}
		}
		ControlFlow::Continue(())
	}

	/// Runs a connect while still accepting intents, so a disconnect can cancel it.
	async fn connect(&mut self, host: &str, port: Option<&str>) -> Result<ConnectOutcome> {
		let cancel = CancellationToken::new();
		let connect = self.orchestrator.connect_with_cancel(host, port, cancel.clone());
		tokio::pin!(connect);

		loop {
			tokio::select! {
				outcome = &mut connect => return outcome,
				incoming = self.inbox.rx.recv(), if self.inbox.open => match incoming {
					Some(request) => {
						if request.ends_session() && !cancel.is_cancelled() {
							debug!(target = "rover.driver", "disconnect during connect; cancelling");
							cancel.cancel();
						}
						self.inbox.backlog.push_back(request);
					}
					None => {
						self.inbox.open = false;
						cancel.cancel();
					}
				},
			}
		}
	}

	fn publish_state(&self) {
		let snapshot = self.orchestrator.snapshot();
		self.state_tx.send_if_modified(|current| {
			if *current == snapshot {
				false
			} else {
				*current = snapshot;
				true
			}
		});
	}
}

fn abandoned_unless_done<T>(action: &str, result: Option<Result<T>>) -> Result<T> {
	result.unwrap_or_else(|| {
		debug!(target = "rover.driver", action, "session ended while in flight; result discarded");
		Err(Error::Cancelled)
	})
}

/// Cloneable entry point to a running [`SessionDriver`].
#[derive(Clone)]
pub struct DriverHandle {
	tx: mpsc::Sender<Request>,
	state: watch::Receiver<SessionSnapshot>,
}

impl DriverHandle {
	async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
		let (reply, response) = oneshot::channel();
		self.tx.send(build(reply)).await.map_err(|_| Error::DriverClosed)?;
		response.await.map_err(|_| Error::DriverClosed)
	}

	pub async fn connect(&self, host: impl Into<String>, port: Option<String>) -> Result<ConnectOutcome> {
		let host = host.into();
		self.request(|reply| Request::Connect { host, port, reply }).await?
	}

	pub async fn disconnect(&self) -> Result<()> {
		self.request(|reply| Request::Disconnect { reply }).await
	}

	pub async fn toggle(&self, capability: Capability) -> Result<CapabilityState> {
		self.request(|reply| Request::Toggle { capability, reply }).await?
	}

	pub async fn store_map(&self) -> Result<()> {
		self.request(|reply| Request::StoreMap { reply }).await?
	}

	pub async fn reset(&self) -> Result<()> {
		self.request(|reply| Request::Reset { reply }).await?
	}

	pub async fn set_sensor_variant(&self, variant: SensorVariant) -> Result<()> {
		self.request(|reply| Request::SetVariant { variant, reply }).await?
	}

	pub async fn press_key(&self, key: impl Into<String>) -> Result<()> {
		let key = key.into();
		self.request(|reply| Request::Key { key, reply }).await?
	}

	pub async fn set_joint(&self, joint: impl Into<String>, degrees: f64) -> Result<f64> {
		let joint = joint.into();
		self.request(|reply| Request::Joint { joint, degrees, reply }).await?
	}

	/// Waits for every stop dispatched so far to finish.
	pub async fn settle(&self) -> Result<()> {
		self.request(|reply| Request::Settle { reply }).await
	}

	/// Disconnects, waits for teardown and stops the driver task.
	pub async fn shutdown(&self) -> Result<()> {
		self.request(|reply| Request::Shutdown { reply }).await
	}

	/// Latest published state.
	pub fn snapshot(&self) -> SessionSnapshot {
		self.state.borrow().clone()
	}

	/// A receiver notified on every state change.
	pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
		self.state.clone()
	}
}
