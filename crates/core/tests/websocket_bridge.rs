//! WebSocketBridge against a local tungstenite server acting as the bridge.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rover::fake::FakeControlPlane;
use rover::{BridgeConnector, BridgeLink, Error, RoverConfig, SessionOrchestrator, WebSocketConnector};
use rover_protocol::BridgeOp;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Accepts one client and collects every frame until it closes.
async fn spawn_bridge_server() -> (u16, JoinHandle<Vec<BridgeOp>>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

		let mut ops = Vec::new();
		while let Some(message) = ws.next().await {
			match message {
				Ok(Message::Text(text)) => ops.push(serde_json::from_str::<BridgeOp>(&text).unwrap()),
				Ok(Message::Close(_)) | Err(_) => break,
				Ok(_) => {}
			}
		}
		ops
	});
	(port, server)
}

#[tokio::test]
async fn frames_arrive_in_order_and_close_ends_the_stream() {
	let (port, server) = spawn_bridge_server().await;
	let config = RoverConfig::default();

	let link = WebSocketConnector.connect("127.0.0.1", port, Duration::from_secs(2)).await.unwrap();
	assert!(link.is_open());

	link.advertise(&config.bridge.wheel_topic).unwrap();
	link.publish("/wheel_speeds", serde_json::json!({ "data": [1.0, 1.0, 1.0, 1.0] })).unwrap();
	link.unadvertise("/wheel_speeds").unwrap();
	link.terminate();
	assert!(!link.is_open());
	assert!(link.publish("/wheel_speeds", serde_json::Value::Null).is_err());

	let ops = tokio::time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
	assert_eq!(ops.len(), 3);
	assert_eq!(
		ops[0],
		BridgeOp::Advertise {
			topic: "/wheel_speeds".into(),
			msg_type: "std_msgs/Float64MultiArray".into(),
		}
	);
	assert!(matches!(&ops[1], BridgeOp::Publish { topic, msg } if topic == "/wheel_speeds" && msg["data"][0] == 1.0));
	assert_eq!(ops[2], BridgeOp::Unadvertise { topic: "/wheel_speeds".into() });
}

#[tokio::test]
async fn nothing_listening_is_a_transport_error() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	drop(listener);

	let err = WebSocketConnector.connect("127.0.0.1", port, Duration::from_secs(2)).await.err().unwrap();
	assert!(matches!(err, Error::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn session_publishes_commands_over_the_bridge() {
	let (port, server) = spawn_bridge_server().await;
	let mut config = RoverConfig::default();
	config.bridge.port = port;

	let mut session = SessionOrchestrator::new(config, Arc::new(FakeControlPlane::new()), Arc::new(WebSocketConnector));
	let outcome = session.connect("127.0.0.1", None).await.unwrap();
	assert!(outcome.bridge_warning.is_none(), "{:?}", outcome.bridge_warning);
	assert!(outcome.snapshot.bridge_connected);

	session.press_key("w").unwrap();
	session.set_joint("elbow", 180.0).unwrap();
	session.disconnect();

	let ops = tokio::time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
	let summary: Vec<(&str, &str)> = ops
		.iter()
		.map(|op| {
			let kind = match op {
				BridgeOp::Advertise { .. } => "advertise",
				BridgeOp::Publish { .. } => "publish",
				BridgeOp::Unadvertise { .. } => "unadvertise",
			};
			(kind, op.topic())
		})
		.collect();

	assert_eq!(
		summary,
		vec![
			("advertise", "/wheel_speeds"),
			("advertise", "/arm_controller/joint_trajectory"),
			("publish", "/wheel_speeds"),
			("publish", "/arm_controller/joint_trajectory"),
			("unadvertise", "/wheel_speeds"),
			("unadvertise", "/arm_controller/joint_trajectory"),
		]
	);

	// Elbow clamped to its 150 degree limit.
	let BridgeOp::Publish { msg, .. } = &ops[3] else {
		panic!("expected arm publish");
	};
	let names = msg["joint_names"].as_array().unwrap();
	let elbow = names.iter().position(|n| n.as_str() == Some("elbow")).unwrap();
	let radians = msg["points"][0]["positions"][elbow].as_f64().unwrap();
	assert!((radians - 150f64.to_radians()).abs() < 1e-9);
}
