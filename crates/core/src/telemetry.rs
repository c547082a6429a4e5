//! Real-time command publishing: wheel speeds and arm trajectories.
//!
//! [`TelemetryPublisher`] is a borrowed view over the session's bridge link.
//! It never opens or closes the link, and it never blocks: every publish is a
//! queue push on the link. Delivery is best effort.

use std::collections::BTreeMap;

use rover_protocol::{Float64MultiArray, JointTrajectory};
use serde::Serialize;
use tracing::{debug, warn};

use crate::bridge::BridgeLink;
use crate::config::{BridgeConfig, JointLimit, KeyMap};
use crate::error::{Error, Result};

pub struct TelemetryPublisher<'a> {
	link: Option<&'a dyn BridgeLink>,
	topics: &'a BridgeConfig,
}

impl<'a> TelemetryPublisher<'a> {
	pub fn new(link: Option<&'a dyn BridgeLink>, topics: &'a BridgeConfig) -> Self {
		Self { link, topics }
	}

	pub fn is_connected(&self) -> bool {
		self.link.is_some_and(|link| link.is_open())
	}

	/// Publishes one wheel-velocity vector. No-op with a warning without a bridge.
	pub fn publish_wheel(&self, speeds: &[f64]) {
		let msg = Float64MultiArray::flat(speeds.to_vec());
		self.publish(&self.topics.wheel_topic.name, &msg);
	}

	/// Publishes the arm pose as a single immediate trajectory point.
	///
	/// Joints are ordered by name and converted from degrees to radians.
	pub fn publish_arm_trajectory<'j, I>(&self, joint_angles_deg: I)
	where
		I: IntoIterator<Item = (&'j String, &'j f64)>,
	{
		let msg = arm_trajectory(joint_angles_deg);
		self.publish(&self.topics.arm_topic.name, &msg);
	}

	/// Looks `key` up in `key_map` and publishes the mapped wheel speeds.
	///
	/// # Errors
	///
	/// [`Error::UnmappedKey`] when the key has no entry; nothing is published.
	pub fn dispatch_key(&self, key: &str, key_map: &KeyMap) -> Result<()> {
		let speeds = key_map.get(key).ok_or_else(|| Error::UnmappedKey(key.to_string()))?;
		debug!(target = "rover.telemetry", key, ?speeds, "key mapped");
		self.publish_wheel(speeds);
		Ok(())
	}

	fn publish<M: Serialize>(&self, topic: &str, msg: &M) {
		let Some(link) = self.link.filter(|link| link.is_open()) else {
			warn!(target = "rover.telemetry", topic, "bridge not connected; dropping message");
			return;
		};

		let value = match serde_json::to_value(msg) {
			Ok(value) => value,
			Err(e) => {
				warn!(target = "rover.telemetry", topic, error = %e, "failed to encode message");
				return;
			}
		};

		if let Err(e) = link.publish(topic, value) {
			warn!(target = "rover.telemetry", topic, error = %e, "publish failed");
		}
	}
}

/// Builds the trajectory message for a set of joint angles in degrees.
pub fn arm_trajectory<'j, I>(joint_angles_deg: I) -> JointTrajectory
where
	I: IntoIterator<Item = (&'j String, &'j f64)>,
{
	let mut joints: Vec<(&String, f64)> = joint_angles_deg.into_iter().map(|(name, deg)| (name, *deg)).collect();
	joints.sort_by(|a, b| a.0.cmp(b.0));

	let (names, positions): (Vec<String>, Vec<f64>) = joints.into_iter().map(|(name, deg)| (name.clone(), deg.to_radians())).unzip();
	JointTrajectory::single_point(names, positions)
}

/// Current arm slider positions, kept inside the configured joint limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmPose {
	limits: BTreeMap<String, JointLimit>,
	angles: BTreeMap<String, f64>,
}

impl ArmPose {
	/// Every joint at its configured default.
	pub fn from_limits(limits: &BTreeMap<String, JointLimit>) -> Self {
		let angles = limits.iter().map(|(name, limit)| (name.clone(), limit.default)).collect();
		Self {
			limits: limits.clone(),
			angles,
		}
	}

	/// Moves one joint, clamping into its limits. Returns the applied angle.
	pub fn set(&mut self, joint: &str, degrees: f64) -> Result<f64> {
		if !degrees.is_finite() {
			return Err(Error::Validation(format!("joint '{joint}': angle must be a finite number")));
		}
		let limit = self
			.limits
			.get(joint)
			.ok_or_else(|| Error::Validation(format!("unknown joint '{joint}'")))?;

		let applied = limit.clamp(degrees);
		self.angles.insert(joint.to_string(), applied);
		Ok(applied)
	}

	pub fn reset(&mut self) {
		for (name, limit) in &self.limits {
			self.angles.insert(name.clone(), limit.default);
		}
	}

	pub fn angles(&self) -> &BTreeMap<String, f64> {
		&self.angles
	}
}
