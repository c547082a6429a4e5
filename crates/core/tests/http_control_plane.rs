//! HttpControlPlane against a local axum server speaking the run-script contract.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use rover::fake::FakeBridge;
use rover::{ControlPlane, Endpoint, Error, HttpControlPlane, RoverConfig, ServiceClient, ServiceCommand, SessionOrchestrator};
use rover_protocol::ScriptOutcome;
use serde_json::json;
use tokio::net::TcpListener;

type RequestLog = Arc<Mutex<Vec<String>>>;

async fn run_script(Path(name): Path<String>, State(log): State<RequestLog>) -> Response {
	log.lock().push(name.clone());
	match name.as_str() {
		"busy" => Json(json!({ "status": "error", "message": "Script busy already active" })).into_response(),
		"crash" => Json(json!({ "status": "error", "message": "Traceback: launch file not found" })).into_response(),
		"html" => (StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>").into_response(),
		"slow" => {
			tokio::time::sleep(Duration::from_secs(2)).await;
			Json(json!({ "status": "Script execution started" })).into_response()
		}
		stop if stop.ends_with("_stop") => Json(json!({ "status": "success", "message": "stopped" })).into_response(),
		_ => Json(json!({ "status": "Script execution started", "message": "" })).into_response(),
	}
}

async fn spawn_server() -> (SocketAddr, RequestLog) {
	let log = RequestLog::default();
	let app = Router::new().route("/run-script/{name}", get(run_script)).with_state(Arc::clone(&log));

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	(addr, log)
}

fn client(timeout: Duration) -> ServiceClient {
	let plane = Arc::new(HttpControlPlane::new().unwrap());
	ServiceClient::new(plane, timeout, vec!["already active".to_string()])
}

fn endpoint(addr: SocketAddr) -> Endpoint {
	Endpoint::new(addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn start_and_already_running_are_both_running() {
	let (addr, log) = spawn_server().await;
	let services = client(Duration::from_secs(2));

	let started = services.start(&endpoint(addr), "star_car").await.unwrap();
	let busy = services.start(&endpoint(addr), "busy").await.unwrap();

	assert_eq!(started, ScriptOutcome::Started);
	assert!(matches!(busy, ScriptOutcome::AlreadyRunning(ref msg) if msg.contains("already active")));
	assert_eq!(*log.lock(), vec!["star_car", "busy"]);
}

#[tokio::test]
async fn server_error_is_a_protocol_error_with_its_message() {
	let (addr, _log) = spawn_server().await;
	let err = client(Duration::from_secs(2)).start(&endpoint(addr), "crash").await.unwrap_err();

	match err {
		Error::Protocol { script, message } => {
			assert_eq!(script, "crash");
			assert!(message.contains("launch file not found"), "{message}");
		}
		other => panic!("expected protocol error, got {other:?}"),
	}
}

#[tokio::test]
async fn non_json_body_is_a_protocol_error() {
	let (addr, _log) = spawn_server().await;
	let plane = HttpControlPlane::new().unwrap();
	let command = ServiceCommand::start("html", Duration::from_secs(2));

	let err = plane.run(&endpoint(addr), &command).await.unwrap_err();
	assert!(matches!(err, Error::Protocol { .. }), "{err:?}");
}

#[tokio::test]
async fn slow_server_times_out_as_transport_error() {
	let (addr, _log) = spawn_server().await;
	let err = client(Duration::from_millis(100)).start(&endpoint(addr), "slow").await.unwrap_err();

	assert!(matches!(err, Error::Transport(ref msg) if msg.contains("timed out")), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);

	let err = client(Duration::from_secs(2)).start(&endpoint(addr), "star_car").await.unwrap_err();
	assert!(matches!(err, Error::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn session_teardown_reaches_the_server() {
	let (addr, log) = spawn_server().await;
	let plane = Arc::new(HttpControlPlane::new().unwrap());
	let mut session = SessionOrchestrator::new(RoverConfig::default(), plane, Arc::new(FakeBridge::new()));

	session.connect("127.0.0.1", Some(&addr.port().to_string())).await.unwrap();
	session.toggle(rover::Capability::Camera).await.unwrap();
	session.disconnect();
	session.settle().await;

	let mut seen = log.lock().clone();
	assert_eq!(&seen[..2], ["star_car", "camera"]);
	seen.drain(..2);
	seen.sort();
	assert_eq!(seen, vec!["camera_stop", "localization_ydlidar_stop", "slam_ydlidar_stop", "star_car_stop", "yolo_stop"]);
}
