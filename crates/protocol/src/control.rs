//! Control-plane response body and its classification.

use serde::{Deserialize, Serialize};

/// Status string the control plane reports when a script was launched.
pub const STATUS_STARTED: &str = "Script execution started";

/// Suffix appended to a script name to address its stop endpoint.
pub const STOP_SUFFIX: &str = "_stop";

/// Body returned by `GET /run-script/<name>`.
///
/// Both fields are optional on the wire; a missing field reads as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResponse {
	#[serde(default)]
	pub status: String,
	#[serde(default)]
	pub message: String,
}

/// Structured reading of a [`ScriptResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
	/// The script was launched by this request.
	Started,
	/// The script was already running; the phrase that matched is kept.
	AlreadyRunning(String),
	/// Anything else. Carries the server message for display.
	Rejected(String),
}

impl ScriptOutcome {
	/// Started and already-running both leave the service up.
	pub fn is_running(&self) -> bool {
		matches!(self, ScriptOutcome::Started | ScriptOutcome::AlreadyRunning(_))
	}
}

impl ScriptResponse {
	/// Builds a response the way the control plane reports a fresh launch.
	pub fn started() -> Self {
		Self {
			status: STATUS_STARTED.to_string(),
			message: String::new(),
		}
	}

	/// Builds a response carrying only a message, e.g. an "already active" notice.
	pub fn with_message(status: &str, message: &str) -> Self {
		Self {
			status: status.to_string(),
			message: message.to_string(),
		}
	}

	/// Classifies the response against the configured already-running phrases.
	///
	/// Phrase matching is case-insensitive substring search on `message`.
	pub fn classify<S: AsRef<str>>(&self, already_running_phrases: &[S]) -> ScriptOutcome {
		if self.status == STATUS_STARTED {
			return ScriptOutcome::Started;
		}

		let message = self.message.to_lowercase();
		for phrase in already_running_phrases {
			let phrase = phrase.as_ref();
			if !phrase.is_empty() && message.contains(&phrase.to_lowercase()) {
				return ScriptOutcome::AlreadyRunning(phrase.to_string());
			}
		}

		let detail = if self.message.is_empty() { self.status.clone() } else { self.message.clone() };
		ScriptOutcome::Rejected(detail)
	}
}

/// Path of the start (`stop == false`) or stop endpoint for `script`.
pub fn script_path(script: &str, stop: bool) -> String {
	if stop {
		format!("/run-script/{script}{STOP_SUFFIX}")
	} else {
		format!("/run-script/{script}")
	}
}
