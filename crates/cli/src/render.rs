//! Human-readable views of session state.

use colored::Colorize;
use rover::{Capability, CapabilityState, SessionSnapshot};

pub fn status_line(snapshot: &SessionSnapshot) -> String {
	let session = &snapshot.session;
	let link = if session.is_connected {
		format!("{} {}:{}", "connected".green().bold(), session.host, session.port)
	} else {
		"disconnected".red().bold().to_string()
	};
	let bridge = if snapshot.bridge_connected {
		format!("bridge :{}", session.bridge_port).green()
	} else {
		"no bridge".dimmed()
	};

	let capabilities: Vec<String> = Capability::ALL
		.into_iter()
		.map(|c| match snapshot.capabilities.state(c) {
			CapabilityState::Active => c.as_str().cyan().bold().to_string(),
			CapabilityState::Inactive => c.as_str().dimmed().to_string(),
		})
		.collect();

	let store_map = if snapshot.store_map_enabled { " [store-map]".yellow().to_string() } else { String::new() };

	format!(
		"{link} | {bridge} | sensor {} | {}{store_map}",
		session.sensor_variant,
		capabilities.join(" ")
	)
}

pub fn help() -> String {
	let verbs = [
		("connect <host> [port]", "start the primary service and the bridge"),
		("disconnect", "stop everything and drop the session"),
		("toggle <capability>", "mapping | localization | camera | perception"),
		("store-map", "save the map being built (mapping only)"),
		("reset", "stop mapping/localization and restart the primary service"),
		("variant <name>", "ydlidar | rplidar"),
		("key <k>", "publish the wheel speeds mapped to k"),
		("joint <name> <degrees>", "move one arm joint"),
		("status", "print the session state"),
		("quit", "disconnect and exit"),
	];
	verbs
		.iter()
		.map(|(verb, what)| format!("  {} {what}", format!("{verb:<24}").bold()))
		.collect::<Vec<_>>()
		.join("\n")
}
