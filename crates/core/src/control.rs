//! Control-plane client: start and stop named scripts over HTTP.
//!
//! The wire contract is one `GET /run-script/<name>` (or `<name>_stop`) per
//! action, answered with `{status, message}`. [`ControlPlane`] is the seam the
//! orchestrator talks to; [`HttpControlPlane`] is the production client and
//! [`crate::fake::FakeControlPlane`] the in-memory one used by tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rover_protocol::{ScriptOutcome, ScriptResponse, script_path};
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::error::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where the control plane listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
	pub host: String,
	pub port: u16,
}

impl Endpoint {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self { host: host.into(), port }
	}

	pub fn base_url(&self) -> String {
		format!("http://{}:{}", self.host, self.port)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
	Start,
	Stop,
}

/// One start or stop request, built per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
	pub script: String,
	pub action: ScriptAction,
	pub timeout: Duration,
}

impl ServiceCommand {
	pub fn start(script: impl Into<String>, timeout: Duration) -> Self {
		Self {
			script: script.into(),
			action: ScriptAction::Start,
			timeout,
		}
	}

	pub fn stop(script: impl Into<String>, timeout: Duration) -> Self {
		Self {
			script: script.into(),
			action: ScriptAction::Stop,
			timeout,
		}
	}

	pub fn path(&self) -> String {
		script_path(&self.script, self.action == ScriptAction::Stop)
	}
}

/// Request/response access to the control plane.
pub trait ControlPlane: Send + Sync {
	/// Sends `command` and returns the parsed body.
	///
	/// Transport failures (refused, timeout) are [`Error::Transport`]; a body
	/// that is not the expected JSON is [`Error::Protocol`].
	fn run<'a>(&'a self, endpoint: &'a Endpoint, command: &'a ServiceCommand) -> BoxFuture<'a, Result<ScriptResponse>>;
}

/// `reqwest`-backed control plane client.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
	client: reqwest::Client,
}

impl HttpControlPlane {
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.build()
			.map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;
		Ok(Self { client })
	}
}

impl ControlPlane for HttpControlPlane {
	fn run<'a>(&'a self, endpoint: &'a Endpoint, command: &'a ServiceCommand) -> BoxFuture<'a, Result<ScriptResponse>> {
		Box::pin(async move {
			let url = format!("{}{}", endpoint.base_url(), command.path());
			debug!(target = "rover.control", %url, "sending control request");

			let response = self.client.get(&url).timeout(command.timeout).send().await?;
			let status = response.status();
			let body = response.text().await?;

			serde_json::from_str::<ScriptResponse>(&body)
				.map_err(|e| Error::protocol(&command.script, format!("unparseable response (HTTP {}): {}", status.as_u16(), e)))
		})
	}
}

/// Control-plane operations as the orchestrator uses them.
///
/// Wraps a [`ControlPlane`] with the request timeout and the already-running
/// phrase set, and knows how to dispatch fire-and-forget stops.
#[derive(Clone)]
pub struct ServiceClient {
	plane: Arc<dyn ControlPlane>,
	timeout: Duration,
	already_running_phrases: Arc<[String]>,
}

impl ServiceClient {
	pub fn new(plane: Arc<dyn ControlPlane>, timeout: Duration, already_running_phrases: Vec<String>) -> Self {
		Self {
			plane,
			timeout,
			already_running_phrases: already_running_phrases.into(),
		}
	}

	/// Starts `script` and waits for the answer.
	///
	/// `Started` and `AlreadyRunning` are both success; anything else is an
	/// [`Error::Protocol`] carrying the server's message.
	pub async fn start(&self, endpoint: &Endpoint, script: &str) -> Result<ScriptOutcome> {
		let command = ServiceCommand::start(script, self.timeout);
		let response = self.plane.run(endpoint, &command).await?;
		let phrases: &[String] = &self.already_running_phrases;
		let outcome = response.classify(phrases);

		match outcome {
			ScriptOutcome::Rejected(message) => Err(Error::protocol(script, format!("server error: {message}"))),
			running => {
				debug!(target = "rover.control", script, outcome = ?running, "script running");
				Ok(running)
			}
		}
	}

	/// Fires a stop for `script` on `tracker` and returns immediately.
	///
	/// The task only performs I/O; its outcome is logged and dropped.
	pub fn dispatch_stop(&self, tracker: &TaskTracker, endpoint: Endpoint, script: String) {
		let plane = Arc::clone(&self.plane);
		let command = ServiceCommand::stop(script, self.timeout);

		tracker.spawn(async move {
			match plane.run(&endpoint, &command).await {
				Ok(response) => debug!(
					target = "rover.control",
					script = %command.script,
					status = %response.status,
					"stop acknowledged"
				),
				Err(err) => debug!(
					target = "rover.control",
					script = %command.script,
					error = %err,
					"stop failed; ignoring"
				),
			}
		});
	}
}
