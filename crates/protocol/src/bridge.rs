//! Bridge operations, rosbridge v2 JSON framing.
//!
//! ```json
//! {"op": "advertise", "topic": "/wheel_speeds", "type": "std_msgs/Float64MultiArray"}
//! {"op": "publish", "topic": "/wheel_speeds", "msg": {"layout": {...}, "data": [1.0, 1.0]}}
//! {"op": "unadvertise", "topic": "/wheel_speeds"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One frame sent to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeOp {
	Advertise {
		topic: String,
		#[serde(rename = "type")]
		msg_type: String,
	},
	Publish {
		topic: String,
		msg: Value,
	},
	Unadvertise {
		topic: String,
	},
}

impl BridgeOp {
	pub fn topic(&self) -> &str {
		match self {
			BridgeOp::Advertise { topic, .. } | BridgeOp::Publish { topic, .. } | BridgeOp::Unadvertise { topic } => topic,
		}
	}
}
