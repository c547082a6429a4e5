//! In-memory control plane and bridge for tests.
//!
//! Lets the orchestrator run end to end without a robot: responses are
//! scripted per script name, and every request and bridge frame is recorded
//! for inspection.
//!
//! # Example
//!
//! ```ignore
//! let plane = Arc::new(FakeControlPlane::new());
//! plane.respond("star_car", ScriptResponse::with_message("error", "already active"));
//! let bridge = Arc::new(FakeBridge::failing(2));
//!
//! let mut session = SessionOrchestrator::new(config, plane.clone(), bridge.clone());
//! session.connect("10.0.0.5", None).await?;
//! assert_eq!(bridge.attempts(), 3);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rover_protocol::{BridgeOp, ScriptResponse};
use serde_json::Value;

use crate::bridge::{BridgeConnector, BridgeLink};
use crate::control::{BoxFuture, ControlPlane, Endpoint, ServiceCommand};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Scripted {
	Respond(ScriptResponse),
	Fail(String),
}

#[derive(Default)]
struct PlaneState {
	scripted: HashMap<String, Scripted>,
	requests: Vec<(Endpoint, ServiceCommand)>,
	latency: Duration,
}

/// Scripted [`ControlPlane`].
///
/// Unscripted starts answer "Script execution started"; unscripted stops
/// answer `success`. Keys are the last path segment, so `camera` and
/// `camera_stop` are scripted independently.
#[derive(Default)]
pub struct FakeControlPlane {
	state: Mutex<PlaneState>,
}

impl FakeControlPlane {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn respond(&self, key: &str, response: ScriptResponse) {
		self.state.lock().scripted.insert(key.to_string(), Scripted::Respond(response));
	}

	/// Makes requests for `key` fail as if the host were unreachable.
	pub fn fail_with(&self, key: &str, reason: &str) {
		self.state.lock().scripted.insert(key.to_string(), Scripted::Fail(reason.to_string()));
	}

	pub fn clear_script(&self, key: &str) {
		self.state.lock().scripted.remove(key);
	}

	/// Delay applied to every answer.
	pub fn set_latency(&self, latency: Duration) {
		self.state.lock().latency = latency;
	}

	pub fn calls(&self) -> Vec<ServiceCommand> {
		self.state.lock().requests.iter().map(|(_, command)| command.clone()).collect()
	}

	pub fn requests(&self) -> Vec<(Endpoint, ServiceCommand)> {
		self.state.lock().requests.clone()
	}

	/// Request paths in call order, e.g. `/run-script/star_car`.
	pub fn paths(&self) -> Vec<String> {
		self.state.lock().requests.iter().map(|(_, command)| command.path()).collect()
	}

	pub fn count(&self, path: &str) -> usize {
		self.paths().iter().filter(|p| p.as_str() == path).count()
	}

	pub fn clear_calls(&self) {
		self.state.lock().requests.clear();
	}
}

impl ControlPlane for FakeControlPlane {
	fn run<'a>(&'a self, endpoint: &'a Endpoint, command: &'a ServiceCommand) -> BoxFuture<'a, Result<ScriptResponse>> {
		let path = command.path();
		let key = path.trim_start_matches("/run-script/").to_string();

		let (scripted, latency) = {
			let mut state = self.state.lock();
			state.requests.push((endpoint.clone(), command.clone()));
			(state.scripted.get(&key).cloned(), state.latency)
		};

		Box::pin(async move {
			if !latency.is_zero() {
				tokio::time::sleep(latency).await;
			}
			match scripted {
				Some(Scripted::Respond(response)) => Ok(response),
				Some(Scripted::Fail(reason)) => Err(Error::Transport(reason)),
				None if key.ends_with(rover_protocol::STOP_SUFFIX) => Ok(ScriptResponse::with_message("success", "stopped")),
				None => Ok(ScriptResponse::started()),
			}
		})
	}
}

/// Recording [`BridgeLink`].
#[derive(Default)]
pub struct FakeLink {
	ops: Mutex<Vec<BridgeOp>>,
	terminated: AtomicBool,
}

impl FakeLink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn ops(&self) -> Vec<BridgeOp> {
		self.ops.lock().clone()
	}

	/// Messages published on `topic`, oldest first.
	pub fn published(&self, topic: &str) -> Vec<Value> {
		self.ops
			.lock()
			.iter()
			.filter_map(|op| match op {
				BridgeOp::Publish { topic: t, msg } if t == topic => Some(msg.clone()),
				_ => None,
			})
			.collect()
	}

	/// Topics currently advertised (advertised and not yet unadvertised).
	pub fn advertised(&self) -> Vec<String> {
		let mut topics: Vec<String> = Vec::new();
		for op in self.ops.lock().iter() {
			match op {
				BridgeOp::Advertise { topic, .. } => topics.push(topic.clone()),
				BridgeOp::Unadvertise { topic } => topics.retain(|t| t != topic),
				BridgeOp::Publish { .. } => {}
			}
		}
		topics
	}

	pub fn is_terminated(&self) -> bool {
		self.terminated.load(Ordering::SeqCst)
	}
}

impl BridgeLink for FakeLink {
	fn send(&self, op: BridgeOp) -> Result<()> {
		if self.is_terminated() {
			return Err(Error::Transport("bridge is closed".to_string()));
		}
		self.ops.lock().push(op);
		Ok(())
	}

	fn terminate(&self) {
		self.terminated.store(true, Ordering::SeqCst);
	}

	fn is_open(&self) -> bool {
		!self.is_terminated()
	}
}

struct BridgeState {
	failures_remaining: u32,
	attempts: Vec<(String, u16)>,
	links: Vec<Arc<FakeLink>>,
	latency: Duration,
}

/// [`BridgeConnector`] that fails a set number of times before connecting.
pub struct FakeBridge {
	state: Mutex<BridgeState>,
}

impl Default for FakeBridge {
	fn default() -> Self {
		Self::failing(0)
	}
}

impl FakeBridge {
	pub fn new() -> Self {
		Self::default()
	}

	/// Refuses the first `failures` attempts.
	pub fn failing(failures: u32) -> Self {
		Self {
			state: Mutex::new(BridgeState {
				failures_remaining: failures,
				attempts: Vec::new(),
				links: Vec::new(),
				latency: Duration::ZERO,
			}),
		}
	}

	pub fn unreachable() -> Self {
		Self::failing(u32::MAX)
	}

	/// Delay before each attempt resolves.
	pub fn set_latency(&self, latency: Duration) {
		self.state.lock().latency = latency;
	}

	pub fn attempts(&self) -> usize {
		self.state.lock().attempts.len()
	}

	pub fn attempted_addresses(&self) -> Vec<(String, u16)> {
		self.state.lock().attempts.clone()
	}

	pub fn last_link(&self) -> Option<Arc<FakeLink>> {
		self.state.lock().links.last().cloned()
	}
}

impl BridgeConnector for FakeBridge {
	fn connect<'a>(&'a self, host: &'a str, port: u16, _timeout: Duration) -> BoxFuture<'a, Result<Arc<dyn BridgeLink>>> {
		Box::pin(async move {
			let latency = {
				let mut state = self.state.lock();
				state.attempts.push((host.to_string(), port));
				state.latency
			};
			if !latency.is_zero() {
				tokio::time::sleep(latency).await;
			}

			let mut state = self.state.lock();
			if state.failures_remaining > 0 {
				if state.failures_remaining != u32::MAX {
					state.failures_remaining -= 1;
				}
				return Err(Error::Transport(format!("connection refused: ws://{host}:{port}")));
			}

			let link = Arc::new(FakeLink::new());
			state.links.push(Arc::clone(&link));
			Ok(link as Arc<dyn BridgeLink>)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn unscripted_plane_starts_and_stops() {
		let plane = FakeControlPlane::new();
		let endpoint = Endpoint::new("10.0.0.5", 5000);

		let start = plane.run(&endpoint, &ServiceCommand::start("camera", Duration::from_secs(1))).await.unwrap();
		let stop = plane.run(&endpoint, &ServiceCommand::stop("camera", Duration::from_secs(1))).await.unwrap();

		assert_eq!(start, ScriptResponse::started());
		assert_eq!(stop.status, "success");
		assert_eq!(plane.paths(), vec!["/run-script/camera", "/run-script/camera_stop"]);
	}

	#[tokio::test]
	async fn bridge_fails_then_connects() {
		let bridge = FakeBridge::failing(1);
		assert!(bridge.connect("h", 9090, Duration::from_secs(1)).await.is_err());
		let link = bridge.connect("h", 9090, Duration::from_secs(1)).await.unwrap();
		assert!(link.is_open());
		assert_eq!(bridge.attempts(), 2);
		assert!(bridge.last_link().is_some());
	}

	#[test]
	fn link_tracks_advertised_topics() {
		let link = FakeLink::new();
		link.send(BridgeOp::Advertise {
			topic: "/a".into(),
			msg_type: "t".into(),
		})
		.unwrap();
		link.unadvertise("/a").unwrap();
		assert!(link.advertised().is_empty());
		link.terminate();
		assert!(link.publish("/a", Value::Null).is_err());
	}
}
