//! Session orchestration: connect, disconnect, capabilities and teardown.
//!
//! [`SessionOrchestrator`] is the single writer of session and capability
//! state. Start requests are awaited and committed only on success; stop
//! requests are fired onto a [`TaskTracker`] and the local state is committed
//! immediately, so teardown never waits on the network.

use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeConnector, BridgeLink, WebSocketConnector};
use crate::capability::{Capability, CapabilityIntent, CapabilityState, CapabilityStates, GuardViolation};
use crate::config::{RoverConfig, SensorVariant};
use crate::control::{ControlPlane, Endpoint, HttpControlPlane, ServiceClient};
use crate::error::{Error, Result};
use crate::telemetry::{ArmPose, TelemetryPublisher};

/// Identity of the current connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
	pub is_connected: bool,
	pub host: String,
	pub port: u16,
	pub bridge_port: u16,
	pub sensor_variant: SensorVariant,
}

impl Session {
	fn disconnected(config: &RoverConfig, sensor_variant: SensorVariant) -> Self {
		Self {
			is_connected: false,
			host: String::new(),
			port: config.control_plane.default_port,
			bridge_port: config.bridge.port,
			sensor_variant,
		}
	}

	pub fn endpoint(&self) -> Endpoint {
		Endpoint::new(self.host.clone(), self.port)
	}
}

/// Read-only view handed to the presentation layer after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
	pub session: Session,
	pub capabilities: CapabilityStates,
	pub store_map_enabled: bool,
	pub bridge_connected: bool,
}

/// Result of a successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
	pub snapshot: SessionSnapshot,
	/// Set when the bridge could not be negotiated. The session is still usable.
	pub bridge_warning: Option<String>,
}

pub struct SessionOrchestrator {
	config: RoverConfig,
	services: ServiceClient,
	connector: Arc<dyn BridgeConnector>,
	session: Session,
	capabilities: CapabilityStates,
	bridge: Option<Arc<dyn BridgeLink>>,
	arm: ArmPose,
	stops: TaskTracker,
}

impl SessionOrchestrator {
	pub fn new(config: RoverConfig, plane: Arc<dyn ControlPlane>, connector: Arc<dyn BridgeConnector>) -> Self {
		let services = ServiceClient::new(
			plane,
			config.control_plane.request_timeout(),
			config.control_plane.already_running_phrases.clone(),
		);
		let session = Session::disconnected(&config, config.sensor_variant);
		let arm = ArmPose::from_limits(&config.joints);

		Self {
			config,
			services,
			connector,
			session,
			capabilities: CapabilityStates::default(),
			bridge: None,
			arm,
			stops: TaskTracker::new(),
		}
	}

	/// Orchestrator wired to the real HTTP control plane and WebSocket bridge.
	pub fn with_network(config: RoverConfig) -> Result<Self> {
		let plane = Arc::new(HttpControlPlane::new()?);
		Ok(Self::new(config, plane, Arc::new(WebSocketConnector)))
	}

	pub fn config(&self) -> &RoverConfig {
		&self.config
	}

	pub fn session(&self) -> &Session {
		&self.session
	}

	pub fn capabilities(&self) -> &CapabilityStates {
		&self.capabilities
	}

	pub fn is_connected(&self) -> bool {
		self.session.is_connected
	}

	pub fn snapshot(&self) -> SessionSnapshot {
		SessionSnapshot {
			session: self.session.clone(),
			capabilities: self.capabilities,
			store_map_enabled: self.capabilities.store_map_enabled(),
			bridge_connected: self.bridge.as_ref().is_some_and(|link| link.is_open()),
		}
	}

	/// Publisher borrowing the current bridge link, if any.
	pub fn telemetry(&self) -> TelemetryPublisher<'_> {
		TelemetryPublisher::new(self.bridge.as_deref(), &self.config.bridge)
	}

	/// Connects with a token nobody else holds. See [`Self::connect_with_cancel`].
	pub async fn connect(&mut self, host: &str, port: Option<&str>) -> Result<ConnectOutcome> {
		self.connect_with_cancel(host, port, CancellationToken::new()).await
	}

	/// Starts the primary service on `host:port` and negotiates the bridge.
	///
	/// `port` of `None` or blank means the configured default (5000). An
	/// "already running" answer counts as success. On any failure before the
	/// commit, the session is left untouched. Cancelling `cancel` while the
	/// primary start is pending abandons the connect; once committed, it only
	/// cuts bridge negotiation short, which then yields a warning.
	///
	/// # Errors
	///
	/// * [`Error::Validation`] for a malformed host or port (no request made)
	/// * [`Error::Guard`] when a session is already connected
	/// * [`Error::Transport`] / [`Error::Protocol`] when the primary start fails
	/// * [`Error::Cancelled`] when `cancel` fires before the primary start answers
	pub async fn connect_with_cancel(&mut self, host: &str, port: Option<&str>, cancel: CancellationToken) -> Result<ConnectOutcome> {
		let host = validate_host(host)?;
		let port = parse_port(port, self.config.control_plane.default_port)?;

		if self.session.is_connected {
			return Err(GuardViolation::new("connect", format!("no active session (connected to {}:{})", self.session.host, self.session.port)).into());
		}

		let endpoint = Endpoint::new(host.clone(), port);
		let primary = self.config.services.primary.clone();
		debug!(target = "rover.session", %host, port, script = %primary, "starting primary service");

		let started = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(Error::Cancelled),
			started = self.services.start(&endpoint, &primary) => started,
		};
		if let Err(err) = started {
			warn!(target = "rover.session", %host, port, error = %err, "connect failed");
			return Err(err);
		}

		self.session = Session {
			is_connected: true,
			host,
			port,
			bridge_port: self.config.bridge.port,
			sensor_variant: self.session.sensor_variant,
		};
		self.capabilities.force_all_inactive();
		self.arm.reset();
		info!(target = "rover.session", host = %self.session.host, port, "connected");

		let bridge_warning = match self.negotiate_bridge(&cancel).await {
			Ok(()) => None,
			Err(err) => {
				warn!(
					target = "rover.session",
					host = %self.session.host,
					bridge_port = self.session.bridge_port,
					error = %err,
					"bridge unavailable; continuing without real-time commands"
				);
				Some(format!("bridge unavailable: {err}"))
			}
		};

		Ok(ConnectOutcome {
			snapshot: self.snapshot(),
			bridge_warning,
		})
	}

	async fn negotiate_bridge(&mut self, cancel: &CancellationToken) -> Result<()> {
		let policy = self.config.bridge.retry_policy();
		let connector = Arc::clone(&self.connector);
		let host = self.session.host.clone();
		let port = self.session.bridge_port;

		let link = policy
			.execute(cancel, |attempt| {
				let connector = Arc::clone(&connector);
				let host = host.clone();
				async move {
					debug!(
						target = "rover.bridge",
						%host,
						port,
						attempt = attempt.attempt,
						max_attempts = attempt.max_attempts,
						"connecting bridge"
					);
					connector.connect(&host, port, attempt.attempt_timeout).await
				}
			})
			.await?;

		let advertised = link
			.advertise(&self.config.bridge.wheel_topic)
			.and_then(|()| link.advertise(&self.config.bridge.arm_topic));
		if let Err(err) = advertised {
			link.terminate();
			return Err(err);
		}

		info!(target = "rover.bridge", %host, port, "bridge connected");
		self.bridge = Some(link);
		Ok(())
	}

	/// Drops the session locally and tears the remote side down in the background.
	///
	/// Never fails. Stops for every service are dispatched unconditionally with
	/// the endpoint captured before the session is cleared. Must be called
	/// from within a tokio runtime.
	pub fn disconnect(&mut self) {
		if !self.session.is_connected {
			debug!(target = "rover.session", "disconnect while not connected; nothing to do");
			self.release_bridge();
			return;
		}

		let endpoint = self.session.endpoint();
		let variant = self.session.sensor_variant;

		self.session = Session::disconnected(&self.config, variant);
		let was_active = self.capabilities.force_all_inactive();
		self.release_bridge();

		let services = &self.config.services;
		let scripts = [
			services.primary.clone(),
			services.mapping_script(variant),
			services.localization_script(variant),
			services.camera.clone(),
			services.perception.clone(),
		];
		for script in scripts {
			self.services.dispatch_stop(&self.stops, endpoint.clone(), script);
		}

		info!(
			target = "rover.session",
			host = %endpoint.host,
			port = endpoint.port,
			?was_active,
			"disconnected; teardown dispatched"
		);
	}

	fn release_bridge(&mut self) {
		let Some(link) = self.bridge.take() else {
			return;
		};
		for topic in [&self.config.bridge.wheel_topic.name, &self.config.bridge.arm_topic.name] {
			if let Err(err) = link.unadvertise(topic) {
				debug!(target = "rover.bridge", topic = %topic, error = %err, "unadvertise failed; ignoring");
			}
		}
		link.terminate();
		debug!(target = "rover.bridge", "bridge released");
	}

	/// Flips `capability`: stops it when active, starts it otherwise.
	pub async fn toggle(&mut self, capability: Capability) -> Result<CapabilityState> {
		if self.capabilities.is_active(capability) {
			self.deactivate(capability)?;
			Ok(CapabilityState::Inactive)
		} else {
			self.activate(capability).await?;
			Ok(CapabilityState::Active)
		}
	}

	/// Starts `capability` after the guard allows it. Already active is a no-op.
	///
	/// # Errors
	///
	/// * [`Error::Guard`] when disconnected or a capability rule forbids it;
	///   no request is made
	/// * [`Error::Transport`] / [`Error::Protocol`] when the start fails; the
	///   state is unchanged
	pub async fn activate(&mut self, capability: Capability) -> Result<()> {
		let intent = CapabilityIntent::Activate(capability);
		let endpoint = self.require_connected(&intent)?;
		if self.capabilities.is_active(capability) {
			return Ok(());
		}

		self.capabilities.check(intent)?;

		let script = self.script_for(capability);
		self.services.start(&endpoint, &script).await?;

		self.capabilities.apply(intent)?;
		info!(target = "rover.session", %capability, %script, "capability active");
		Ok(())
	}

	/// Marks `capability` inactive now and stops it in the background.
	///
	/// Dropping the camera also drops perception, with its own stop only if it
	/// was active. Already inactive is a no-op.
	pub fn deactivate(&mut self, capability: Capability) -> Result<()> {
		let intent = CapabilityIntent::Deactivate(capability);
		let endpoint = self.require_connected(&intent)?;
		if !self.capabilities.is_active(capability) {
			return Ok(());
		}

		let transition = self.capabilities.apply(intent)?;
		self.dispatch_stop(&endpoint, capability);
		for forced in transition.forced_inactive {
			info!(target = "rover.session", capability = %forced, cause = %capability, "capability forced inactive");
			self.dispatch_stop(&endpoint, forced);
		}

		info!(target = "rover.session", %capability, "capability inactive");
		Ok(())
	}

	/// Asks the robot to persist the map being built. Only while mapping.
	pub async fn store_map(&mut self) -> Result<()> {
		let endpoint = self.require_connected(&"store map")?;
		if !self.capabilities.store_map_enabled() {
			return Err(GuardViolation::new("store map", "mapping to be active").into());
		}

		let script = self.config.services.store_map.clone();
		self.services.start(&endpoint, &script).await?;
		info!(target = "rover.session", %script, "store map requested");
		Ok(())
	}

	/// Soft restart: drop mapping and localization, then restart the primary service.
	///
	/// Camera and perception keep their recorded state. A failed restart is
	/// returned but leaves the session connected.
	pub async fn reset(&mut self) -> Result<()> {
		let endpoint = self.require_connected(&"reset")?;

		for capability in [Capability::Mapping, Capability::Localization] {
			if self.capabilities.is_active(capability) {
				self.capabilities.apply(CapabilityIntent::Deactivate(capability))?;
			}
			self.dispatch_stop(&endpoint, capability);
		}

		let primary = self.config.services.primary.clone();
		self.services.start(&endpoint, &primary).await?;
		info!(target = "rover.session", script = %primary, "primary service restarted");
		Ok(())
	}

	/// Selects the range-sensor driver used for mapping and localization.
	pub fn set_sensor_variant(&mut self, variant: SensorVariant) -> Result<()> {
		if self.capabilities.is_active(Capability::Mapping) || self.capabilities.is_active(Capability::Localization) {
			return Err(GuardViolation::new("change sensor variant", "mapping and localization to be inactive").into());
		}
		self.session.sensor_variant = variant;
		debug!(target = "rover.session", %variant, "sensor variant selected");
		Ok(())
	}

	/// Publishes the wheel speeds mapped to `key`.
	pub fn press_key(&self, key: &str) -> Result<()> {
		self.telemetry().dispatch_key(key, &self.config.key_map)
	}

	/// Moves one arm joint (clamped to its limits) and publishes the whole pose.
	pub fn set_joint(&mut self, joint: &str, degrees: f64) -> Result<f64> {
		let applied = self.arm.set(joint, degrees)?;
		self.telemetry().publish_arm_trajectory(self.arm.angles());
		Ok(applied)
	}

	pub fn arm_pose(&self) -> &ArmPose {
		&self.arm
	}

	/// Waits until every dispatched stop has finished. New stops may still be
	/// dispatched afterwards.
	pub async fn settle(&self) {
		self.stops.close();
		self.stops.wait().await;
		self.stops.reopen();
	}

	/// Disconnects and waits for the teardown requests to complete.
	pub async fn shutdown(&mut self) {
		self.disconnect();
		self.settle().await;
	}

	fn require_connected(&self, action: &dyn std::fmt::Display) -> Result<Endpoint> {
		if self.session.is_connected {
			Ok(self.session.endpoint())
		} else {
			Err(GuardViolation::new(action, "a connected session").into())
		}
	}

	fn script_for(&self, capability: Capability) -> String {
		let services = &self.config.services;
		let variant = self.session.sensor_variant;
		match capability {
			Capability::Mapping => services.mapping_script(variant),
			Capability::Localization => services.localization_script(variant),
			Capability::Camera => services.camera.clone(),
			Capability::Perception => services.perception.clone(),
		}
	}

	fn dispatch_stop(&self, endpoint: &Endpoint, capability: Capability) {
		let script = self.script_for(capability);
		self.services.dispatch_stop(&self.stops, endpoint.clone(), script);
	}
}

/// Accepts exactly four dot-separated decimal octets, each in `0..=255`, and
/// returns the canonical form (`010.0.0.5` becomes `10.0.0.5`).
pub fn validate_host(host: &str) -> Result<String> {
	let host = host.trim();
	let octets: Vec<u8> = host
		.split('.')
		.map(|p| if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) { p.parse::<u8>().ok() } else { None })
		.collect::<Option<_>>()
		.unwrap_or_default();

	match octets[..] {
		[a, b, c, d] => Ok(Ipv4Addr::new(a, b, c, d).to_string()),
		_ => Err(Error::Validation(format!("invalid IP address '{host}'"))),
	}
}

/// Blank or missing means `default`; otherwise a non-zero `u16`.
pub fn parse_port(port: Option<&str>, default: u16) -> Result<u16> {
	let Some(text) = port.map(str::trim).filter(|p| !p.is_empty()) else {
		return Ok(default);
	};
	match text.parse::<u16>() {
		Ok(0) | Err(_) => Err(Error::Validation(format!("invalid port '{text}'"))),
		Ok(port) => Ok(port),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn host_validation() {
		assert_eq!(validate_host("10.0.0.5").unwrap(), "10.0.0.5");
		assert_eq!(validate_host(" 192.168.0.10 ").unwrap(), "192.168.0.10");
		assert!(validate_host("0.0.0.0").is_ok());
		assert!(validate_host("255.255.255.255").is_ok());

		assert_eq!(validate_host("010.0.0.05").unwrap(), "10.0.0.5");
		assert_eq!(validate_host("192.168.000.010").unwrap(), "192.168.0.10");

		for bad in ["10.0.0.300", "10.0.0", "10.0.0.5.1", "10..0.5", "a.b.c.d", "10.0.0.-1", "", "10.0.0.+5", "99999999999.0.0.1"] {
			assert!(matches!(validate_host(bad), Err(Error::Validation(_))), "{bad:?} should be rejected");
		}
	}

	#[test]
	fn port_parsing() {
		assert_eq!(parse_port(None, 5000).unwrap(), 5000);
		assert_eq!(parse_port(Some("  "), 5000).unwrap(), 5000);
		assert_eq!(parse_port(Some("8080"), 5000).unwrap(), 8080);
		assert!(parse_port(Some("0"), 5000).is_err());
		assert!(parse_port(Some("70000"), 5000).is_err());
		assert!(parse_port(Some("50a"), 5000).is_err());
		assert!(parse_port(Some("-1"), 5000).is_err());
	}
}
