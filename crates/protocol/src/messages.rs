//! Message payloads published on the bridge.
//!
//! Field layout follows the ROS message definitions the bridge converts to:
//! `std_msgs/Float64MultiArray` and `trajectory_msgs/JointTrajectory`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiArrayDimension {
	pub label: String,
	pub size: u32,
	pub stride: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiArrayLayout {
	pub dim: Vec<MultiArrayDimension>,
	pub data_offset: u32,
}

/// Flat numeric array; the wheel-velocity payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Float64MultiArray {
	pub layout: MultiArrayLayout,
	pub data: Vec<f64>,
}

impl Float64MultiArray {
	/// Wraps `data` with an empty layout; receivers treat it as one flat vector.
	pub fn flat(data: Vec<f64>) -> Self {
		Self {
			layout: MultiArrayLayout::default(),
			data,
		}
	}
}

/// ROS `builtin_interfaces/Duration`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosDuration {
	pub secs: i32,
	pub nsecs: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointTrajectoryPoint {
	pub positions: Vec<f64>,
	pub velocities: Vec<f64>,
	pub accelerations: Vec<f64>,
	pub effort: Vec<f64>,
	pub time_from_start: RosDuration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointTrajectory {
	pub joint_names: Vec<String>,
	pub points: Vec<JointTrajectoryPoint>,
}

impl JointTrajectory {
	/// A trajectory with one immediate point holding only positions.
	pub fn single_point(joint_names: Vec<String>, positions: Vec<f64>) -> Self {
		Self {
			joint_names,
			points: vec![JointTrajectoryPoint {
				positions,
				..Default::default()
			}],
		}
	}
}
