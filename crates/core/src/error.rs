//! Error types for rover session operations.

use thiserror::Error;

use crate::capability::GuardViolation;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Malformed user input, rejected before any network call.
	#[error("invalid input: {0}")]
	Validation(String),

	/// The request never produced a response (connect refused, timeout, socket closed).
	#[error("transport error: {0}")]
	Transport(String),

	/// The control plane answered, but not with a running script.
	#[error("{script}: {message}")]
	Protocol { script: String, message: String },

	#[error("rejected: {0}")]
	Guard(#[from] GuardViolation),

	#[error("gave up after {attempts} attempt(s): {last}")]
	RetryExhausted { attempts: u32, last: String },

	#[error("operation cancelled")]
	Cancelled,

	#[error("no command mapped to key '{0}'")]
	UnmappedKey(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("session driver has shut down")]
	DriverClosed,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn protocol(script: &str, message: impl Into<String>) -> Self {
		Error::Protocol {
			script: script.to_string(),
			message: message.into(),
		}
	}

	/// Informational errors the console shows without treating them as failures.
	pub fn is_informational(&self) -> bool {
		matches!(self, Error::UnmappedKey(_))
	}

	pub fn is_guard(&self) -> bool {
		matches!(self, Error::Guard(_))
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Error::Transport(format!("request timed out: {err}"))
		} else {
			Error::Transport(err.to_string())
		}
	}
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
	fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
		Error::Transport(err.to_string())
	}
}
