//! Wire types for the rover control plane and pub/sub bridge.
//!
//! This crate contains the serde-serializable types exchanged with the two
//! external services a rover session talks to:
//!
//! * the control plane, an HTTP host that starts and stops named scripts and
//!   answers with a small `{status, message}` JSON body
//! * the bridge, a rosbridge-style WebSocket endpoint accepting
//!   `advertise` / `publish` / `unadvertise` operations
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization and the
//!   control-plane response classifier
//! * 1:1 with the wire: field names match what the services send and expect
//! * Stable: Changes only when a wire contract changes
//!
//! Session orchestration is built on top of these types in `rover-rs`.

pub mod bridge;
pub mod control;
pub mod messages;

pub use bridge::*;
pub use control::*;
pub use messages::*;
