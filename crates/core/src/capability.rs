//! Capability state machine: mapping, localization, camera and perception.
//!
//! Rules:
//! * mapping and localization are mutually exclusive
//! * perception needs the camera; dropping the camera drops perception
//! * storing a map is only possible while mapping
//!
//! This module is pure bookkeeping. It never touches the network; the
//! orchestrator consults [`CapabilityStates::check`] before any request and
//! commits with [`CapabilityStates::apply`] afterwards.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
	Mapping,
	Localization,
	Camera,
	Perception,
}

impl Capability {
	pub const ALL: [Capability; 4] = [Capability::Mapping, Capability::Localization, Capability::Camera, Capability::Perception];

	pub fn as_str(self) -> &'static str {
		match self {
			Capability::Mapping => "mapping",
			Capability::Localization => "localization",
			Capability::Camera => "camera",
			Capability::Perception => "perception",
		}
	}
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Capability {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"mapping" | "slam" => Ok(Capability::Mapping),
			"localization" | "loc" => Ok(Capability::Localization),
			"camera" | "cam" => Ok(Capability::Camera),
			"perception" | "yolo" => Ok(Capability::Perception),
			other => Err(Error::Validation(format!("unknown capability '{other}'"))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityState {
	#[default]
	Inactive,
	Active,
}

impl CapabilityState {
	pub fn is_active(self) -> bool {
		self == CapabilityState::Active
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityIntent {
	Activate(Capability),
	Deactivate(Capability),
}

impl CapabilityIntent {
	pub fn capability(self) -> Capability {
		match self {
			CapabilityIntent::Activate(c) | CapabilityIntent::Deactivate(c) => c,
		}
	}
}

impl fmt::Display for CapabilityIntent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CapabilityIntent::Activate(c) => write!(f, "activate {c}"),
			CapabilityIntent::Deactivate(c) => write!(f, "deactivate {c}"),
		}
	}
}

/// An intent refused by a capability rule, naming the unmet precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action}: requires {requires}")]
pub struct GuardViolation {
	pub action: String,
	pub requires: String,
}

impl GuardViolation {
	pub fn new(action: impl fmt::Display, requires: impl Into<String>) -> Self {
		Self {
			action: action.to_string(),
			requires: requires.into(),
		}
	}
}

/// Side effects of a committed intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
	pub intent: CapabilityIntent,
	/// Capabilities switched off as a consequence (e.g. perception when the camera goes).
	pub forced_inactive: Vec<Capability>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CapabilityStates {
	pub mapping: CapabilityState,
	pub localization: CapabilityState,
	pub camera: CapabilityState,
	pub perception: CapabilityState,
}

impl CapabilityStates {
	pub fn state(&self, capability: Capability) -> CapabilityState {
		match capability {
			Capability::Mapping => self.mapping,
			Capability::Localization => self.localization,
			Capability::Camera => self.camera,
			Capability::Perception => self.perception,
		}
	}

	pub fn is_active(&self, capability: Capability) -> bool {
		self.state(capability).is_active()
	}

	fn set(&mut self, capability: Capability, state: CapabilityState) {
		match capability {
			Capability::Mapping => self.mapping = state,
			Capability::Localization => self.localization = state,
			Capability::Camera => self.camera = state,
			Capability::Perception => self.perception = state,
		}
	}

	/// Whether the store-map action is currently available.
	pub fn store_map_enabled(&self) -> bool {
		self.mapping.is_active()
	}

	/// Checks `intent` against the rules without changing anything.
	pub fn check(&self, intent: CapabilityIntent) -> Result<(), GuardViolation> {
		match intent {
			CapabilityIntent::Activate(Capability::Mapping) if self.localization.is_active() => {
				Err(GuardViolation::new(intent, "localization to be inactive"))
			}
			CapabilityIntent::Activate(Capability::Localization) if self.mapping.is_active() => {
				Err(GuardViolation::new(intent, "mapping to be inactive"))
			}
			CapabilityIntent::Activate(Capability::Perception) if !self.camera.is_active() => {
				Err(GuardViolation::new(intent, "camera to be active"))
			}
			_ => Ok(()),
		}
	}

	/// Checks and commits `intent`. On a guard failure nothing changes.
	pub fn apply(&mut self, intent: CapabilityIntent) -> Result<Transition, GuardViolation> {
		self.check(intent)?;

		let mut forced_inactive = Vec::new();
		match intent {
			CapabilityIntent::Activate(capability) => self.set(capability, CapabilityState::Active),
			CapabilityIntent::Deactivate(capability) => {
				self.set(capability, CapabilityState::Inactive);
				if capability == Capability::Camera && self.perception.is_active() {
					self.perception = CapabilityState::Inactive;
					forced_inactive.push(Capability::Perception);
				}
			}
		}

		Ok(Transition { intent, forced_inactive })
	}

	/// Switches everything off, returning what was active.
	pub fn force_all_inactive(&mut self) -> Vec<Capability> {
		let previously_active = self.active();
		*self = Self::default();
		previously_active
	}

	pub fn active(&self) -> Vec<Capability> {
		Capability::ALL.into_iter().filter(|c| self.is_active(*c)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use CapabilityIntent::{Activate, Deactivate};

	fn all_intents() -> Vec<CapabilityIntent> {
		Capability::ALL.into_iter().flat_map(|c| [Activate(c), Deactivate(c)]).collect()
	}

	fn assert_invariants(states: &CapabilityStates) {
		assert!(!(states.mapping.is_active() && states.localization.is_active()), "{states:?}");
		assert!(!states.perception.is_active() || states.camera.is_active(), "{states:?}");
		assert_eq!(states.store_map_enabled(), states.mapping.is_active());
	}

	#[test]
	fn invariants_hold_for_every_sequence() {
		let intents = all_intents();
		let mut frontier = vec![CapabilityStates::default()];

		for _ in 0..5 {
			let mut next = Vec::new();
			for states in &frontier {
				for intent in &intents {
					let mut candidate = *states;
					let before = candidate;
					match candidate.apply(*intent) {
						Ok(_) => next.push(candidate),
						Err(_) => assert_eq!(candidate, before, "guard failure must not mutate"),
					}
					assert_invariants(&candidate);
				}
			}
			next.sort_by_key(|s| format!("{s:?}"));
			next.dedup();
			frontier = next;
		}
	}

	#[test]
	fn localization_blocked_while_mapping() {
		let mut states = CapabilityStates::default();
		states.apply(Activate(Capability::Mapping)).unwrap();

		let err = states.apply(Activate(Capability::Localization)).unwrap_err();
		assert_eq!(err.requires, "mapping to be inactive");
		assert_eq!(err.to_string(), "cannot activate localization: requires mapping to be inactive");
		assert!(states.mapping.is_active());
		assert!(!states.localization.is_active());
	}

	#[test]
	fn mapping_blocked_while_localizing() {
		let mut states = CapabilityStates::default();
		states.apply(Activate(Capability::Localization)).unwrap();
		assert!(states.check(Activate(Capability::Mapping)).is_err());
		assert!(!states.store_map_enabled());
	}

	#[test]
	fn store_map_follows_mapping() {
		let mut states = CapabilityStates::default();
		assert!(!states.store_map_enabled());
		states.apply(Activate(Capability::Mapping)).unwrap();
		assert!(states.store_map_enabled());
		states.apply(Deactivate(Capability::Mapping)).unwrap();
		assert!(!states.store_map_enabled());
	}

	#[test]
	fn perception_needs_camera() {
		let mut states = CapabilityStates::default();
		let err = states.apply(Activate(Capability::Perception)).unwrap_err();
		assert_eq!(err.requires, "camera to be active");
	}

	#[test]
	fn dropping_camera_drops_perception() {
		let mut states = CapabilityStates::default();
		states.apply(Activate(Capability::Camera)).unwrap();
		states.apply(Activate(Capability::Perception)).unwrap();

		let transition = states.apply(Deactivate(Capability::Camera)).unwrap();
		assert_eq!(transition.forced_inactive, vec![Capability::Perception]);
		assert!(!states.camera.is_active());
		assert!(!states.perception.is_active());
	}

	#[test]
	fn dropping_idle_camera_forces_nothing() {
		let mut states = CapabilityStates::default();
		states.apply(Activate(Capability::Camera)).unwrap();
		let transition = states.apply(Deactivate(Capability::Camera)).unwrap();
		assert!(transition.forced_inactive.is_empty());
	}

	#[test]
	fn force_all_inactive_reports_previous() {
		let mut states = CapabilityStates::default();
		states.apply(Activate(Capability::Mapping)).unwrap();
		states.apply(Activate(Capability::Camera)).unwrap();

		assert_eq!(states.force_all_inactive(), vec![Capability::Mapping, Capability::Camera]);
		assert_eq!(states, CapabilityStates::default());
	}

	#[test]
	fn names_parse_with_aliases() {
		assert_eq!("slam".parse::<Capability>().unwrap(), Capability::Mapping);
		assert_eq!("YOLO".parse::<Capability>().unwrap(), Capability::Perception);
		assert!("lidar".parse::<Capability>().is_err());
	}
}
