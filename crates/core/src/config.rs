//! Static configuration supplied to a session.
//!
//! Loaded once (JSON, every section optional) and handed to the orchestrator
//! by value. Nothing here is mutated after startup.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

pub const DEFAULT_CONTROL_PORT: u16 = 5000;
pub const DEFAULT_BRIDGE_PORT: u16 = 9090;

/// Range-sensor driver the mapping and localization scripts are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorVariant {
	#[default]
	Ydlidar,
	Rplidar,
}

impl SensorVariant {
	pub fn as_str(self) -> &'static str {
		match self {
			SensorVariant::Ydlidar => "ydlidar",
			SensorVariant::Rplidar => "rplidar",
		}
	}
}

impl fmt::Display for SensorVariant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for SensorVariant {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"ydlidar" => Ok(SensorVariant::Ydlidar),
			"rplidar" => Ok(SensorVariant::Rplidar),
			other => Err(Error::Validation(format!("unknown sensor variant '{other}' (expected ydlidar or rplidar)"))),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
	pub default_port: u16,
	pub request_timeout_ms: u64,
	/// Message fragments meaning "the script is already up". The server never
	/// documented its wording, so these stay configurable.
	pub already_running_phrases: Vec<String>,
}

impl Default for ControlPlaneConfig {
	fn default() -> Self {
		Self {
			default_port: DEFAULT_CONTROL_PORT,
			request_timeout_ms: 5_000,
			already_running_phrases: vec!["already active".to_string(), "already running".to_string()],
		}
	}
}

impl ControlPlaneConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
	pub name: String,
	pub msg_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
	pub port: u16,
	pub max_attempts: u32,
	pub attempt_timeout_ms: u64,
	pub retry_delay_ms: u64,
	pub wheel_topic: TopicConfig,
	pub arm_topic: TopicConfig,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			port: DEFAULT_BRIDGE_PORT,
			max_attempts: 5,
			attempt_timeout_ms: 5_000,
			retry_delay_ms: 1_000,
			wheel_topic: TopicConfig {
				name: "/wheel_speeds".to_string(),
				msg_type: "std_msgs/Float64MultiArray".to_string(),
			},
			arm_topic: TopicConfig {
				name: "/arm_controller/joint_trajectory".to_string(),
				msg_type: "trajectory_msgs/JointTrajectory".to_string(),
			},
		}
	}
}

impl BridgeConfig {
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(self.max_attempts)
			.with_attempt_timeout(Duration::from_millis(self.attempt_timeout_ms))
			.with_delay(Duration::from_millis(self.retry_delay_ms))
	}
}

/// Script names on the control plane.
///
/// `mapping` and `localization` are prefixes; the sensor variant is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNames {
	pub primary: String,
	pub mapping: String,
	pub localization: String,
	pub camera: String,
	pub perception: String,
	pub store_map: String,
}

impl Default for ServiceNames {
	fn default() -> Self {
		Self {
			primary: "star_car".to_string(),
			mapping: "slam".to_string(),
			localization: "localization".to_string(),
			camera: "camera".to_string(),
			perception: "yolo".to_string(),
			store_map: "store_map".to_string(),
		}
	}
}

impl ServiceNames {
	pub fn mapping_script(&self, variant: SensorVariant) -> String {
		format!("{}_{}", self.mapping, variant)
	}

	pub fn localization_script(&self, variant: SensorVariant) -> String {
		format!("{}_{}", self.localization, variant)
	}
}

/// Angle limits for one arm joint, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
	pub min: f64,
	pub max: f64,
	pub default: f64,
}

impl JointLimit {
	pub fn new(min: f64, max: f64, default: f64) -> Self {
		Self { min, max, default }
	}

	pub fn clamp(&self, degrees: f64) -> f64 {
		degrees.clamp(self.min, self.max)
	}
}

/// Key symbol to per-wheel speeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMap(HashMap<String, Vec<f64>>);

impl KeyMap {
	pub fn new(entries: HashMap<String, Vec<f64>>) -> Self {
		Self(entries)
	}

	pub fn get(&self, key: &str) -> Option<&[f64]> {
		self.0.get(key).map(Vec::as_slice)
	}

	pub fn insert(&mut self, key: impl Into<String>, speeds: Vec<f64>) {
		self.0.insert(key.into(), speeds);
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	fn builtin() -> Self {
		let mut map = Self::default();
		map.insert("w", vec![1.0, 1.0, 1.0, 1.0]);
		map.insert("s", vec![-1.0, -1.0, -1.0, -1.0]);
		map.insert("a", vec![-1.0, 1.0, -1.0, 1.0]);
		map.insert("d", vec![1.0, -1.0, 1.0, -1.0]);
		map.insert("x", vec![0.0, 0.0, 0.0, 0.0]);
		map
	}
}

/// Everything a session needs that is not typed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
	pub control_plane: ControlPlaneConfig,
	pub bridge: BridgeConfig,
	pub services: ServiceNames,
	pub sensor_variant: SensorVariant,
	pub key_map: KeyMap,
	pub joints: BTreeMap<String, JointLimit>,
}

impl Default for RoverConfig {
	fn default() -> Self {
		let joints = BTreeMap::from([
			("shoulder".to_string(), JointLimit::new(-90.0, 90.0, 0.0)),
			("elbow".to_string(), JointLimit::new(0.0, 150.0, 90.0)),
			("wrist".to_string(), JointLimit::new(-90.0, 90.0, 0.0)),
			("gripper".to_string(), JointLimit::new(0.0, 60.0, 0.0)),
		]);

		Self {
			control_plane: ControlPlaneConfig::default(),
			bridge: BridgeConfig::default(),
			services: ServiceNames::default(),
			sensor_variant: SensorVariant::default(),
			key_map: KeyMap::builtin(),
			joints,
		}
	}
}

impl RoverConfig {
	/// Reads and validates a JSON config file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json(&content)
	}

	pub fn from_json(content: &str) -> Result<Self> {
		let config: Self = serde_json::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.bridge.max_attempts == 0 {
			return Err(Error::Config("bridge.max_attempts must be at least 1".to_string()));
		}
		if self.control_plane.request_timeout_ms == 0 {
			return Err(Error::Config("control_plane.request_timeout_ms must be positive".to_string()));
		}

		for (name, limit) in &self.joints {
			if !(limit.min <= limit.default && limit.default <= limit.max) {
				return Err(Error::Config(format!(
					"joint '{name}': expected min <= default <= max, got {} / {} / {}",
					limit.min, limit.default, limit.max
				)));
			}
		}

		for key in self.key_map.keys() {
			if self.key_map.get(key).is_some_and(<[f64]>::is_empty) {
				return Err(Error::Config(format!("key '{key}' maps to no wheel speeds")));
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_json_yields_defaults() {
		let config = RoverConfig::from_json("{}").unwrap();
		assert_eq!(config, RoverConfig::default());
		assert_eq!(config.control_plane.default_port, 5000);
		assert_eq!(config.bridge.port, 9090);
	}

	#[test]
	fn partial_sections_keep_other_defaults() {
		let config = RoverConfig::from_json(
			r#"{
				"sensor_variant": "rplidar",
				"bridge": { "max_attempts": 3 },
				"key_map": { "i": [0.5, 0.5] }
			}"#,
		)
		.unwrap();

		assert_eq!(config.sensor_variant, SensorVariant::Rplidar);
		assert_eq!(config.bridge.max_attempts, 3);
		assert_eq!(config.bridge.retry_delay_ms, 1_000);
		assert_eq!(config.key_map.get("i"), Some(&[0.5, 0.5][..]));
		assert!(config.key_map.get("w").is_none());
	}

	#[test]
	fn variant_composes_script_names() {
		let names = ServiceNames::default();
		assert_eq!(names.mapping_script(SensorVariant::Ydlidar), "slam_ydlidar");
		assert_eq!(names.localization_script(SensorVariant::Rplidar), "localization_rplidar");
	}

	#[test]
	fn variant_parses_case_insensitively() {
		assert_eq!("RPLidar".parse::<SensorVariant>().unwrap(), SensorVariant::Rplidar);
		assert!("lidar".parse::<SensorVariant>().is_err());
	}

	#[test]
	fn joint_default_outside_range_is_rejected() {
		let err = RoverConfig::from_json(r#"{"joints": {"elbow": {"min": 0, "max": 90, "default": 120}}}"#).unwrap_err();
		assert!(matches!(err, Error::Config(msg) if msg.contains("elbow")));
	}

	#[test]
	fn zero_attempts_is_rejected() {
		assert!(RoverConfig::from_json(r#"{"bridge": {"max_attempts": 0}}"#).is_err());
	}

	#[test]
	fn load_reads_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rover.json");
		std::fs::write(&path, r#"{"services": {"primary": "base"}}"#).unwrap();
		let config = RoverConfig::load(&path).unwrap();
		assert_eq!(config.services.primary, "base");
		assert_eq!(config.services.camera, "camera");
	}
}
