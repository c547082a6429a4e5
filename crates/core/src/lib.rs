// rover: session orchestration for a remotely operated robot
//
// Drives the robot's HTTP control plane (start/stop named services), the
// rosbridge-style pub/sub link used for wheel and arm commands, and the
// capability rules that decide which services may run together.

pub mod bridge;
pub mod capability;
pub mod config;
pub mod control;
pub mod driver;
pub mod error;
pub mod fake;
pub mod retry;
pub mod session;
pub mod telemetry;

pub use bridge::{BridgeConnector, BridgeLink, WebSocketBridge, WebSocketConnector};
pub use capability::{Capability, CapabilityIntent, CapabilityState, CapabilityStates, GuardViolation, Transition};
pub use config::{BridgeConfig, ControlPlaneConfig, DEFAULT_BRIDGE_PORT, DEFAULT_CONTROL_PORT, JointLimit, KeyMap, RoverConfig, SensorVariant, ServiceNames, TopicConfig};
pub use control::{ControlPlane, Endpoint, HttpControlPlane, ScriptAction, ServiceClient, ServiceCommand};
pub use driver::{DriverHandle, SessionDriver};
pub use error::{Error, Result};
pub use retry::{RetryAttempt, RetryPolicy};
pub use session::{ConnectOutcome, Session, SessionOrchestrator, SessionSnapshot, parse_port, validate_host};
pub use telemetry::{ArmPose, TelemetryPublisher, arm_trajectory};
