mod cli;
mod console;
mod logging;
mod render;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use rover::{RoverConfig, SessionDriver, SessionOrchestrator};
use serde_json::json;
use tracing::{error, info};

use crate::cli::{Cli, Commands, Overrides};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);
	if cli.no_color {
		colored::control::set_override(false);
	}

	if let Err(err) = run(cli).await {
		error!(target = "rover", error = %format!("{err:#}"), "command failed");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	match cli.command {
		Commands::Console { host, overrides } => {
			let config = load_config(cli.config.as_deref(), &overrides)?;
			let orchestrator = SessionOrchestrator::with_network(config)?;
			let handle = SessionDriver::spawn(orchestrator);
			console::run(handle, host.map(|host| (host, None))).await
		}
		Commands::Probe { host, overrides, json } => {
			let config = load_config(cli.config.as_deref(), &overrides)?;
			probe(config, &host, json).await
		}
		Commands::ShowConfig { overrides } => {
			let config = load_config(cli.config.as_deref(), &overrides)?;
			println!("{}", serde_json::to_string_pretty(&config)?);
			Ok(())
		}
	}
}

/// One-shot health check: connect, report, tear down.
async fn probe(config: RoverConfig, host: &str, as_json: bool) -> anyhow::Result<()> {
	let mut session = SessionOrchestrator::with_network(config)?;
	let result = session.connect(host, None).await;
	session.shutdown().await;

	let outcome = result.with_context(|| format!("connecting to {host}"))?;
	if as_json {
		let report = json!({
			"snapshot": outcome.snapshot,
			"bridge_warning": outcome.bridge_warning,
		});
		println!("{}", serde_json::to_string_pretty(&report)?);
	} else {
		println!("{}", render::status_line(&outcome.snapshot));
		if let Some(warning) = outcome.bridge_warning {
			println!("warning: {warning}");
		}
	}
	info!(target = "rover", %host, "probe finished; session torn down");
	Ok(())
}

fn load_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<RoverConfig> {
	let mut config = match path {
		Some(path) => RoverConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
		None => RoverConfig::default(),
	};

	if let Some(port) = overrides.port.as_deref() {
		config.control_plane.default_port = rover::parse_port(Some(port), config.control_plane.default_port)?;
	}
	if let Some(port) = overrides.bridge_port {
		config.bridge.port = port;
	}
	if let Some(variant) = overrides.variant {
		config.sensor_variant = variant;
	}

	config.validate()?;
	Ok(config)
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use rover::SensorVariant;

	use super::*;

	#[test]
	fn overrides_apply_on_top_of_the_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{ "bridge": {{ "port": 9191, "max_attempts": 2 }}, "sensor_variant": "ydlidar" }}"#).unwrap();

		let overrides = Overrides {
			port: Some("5050".into()),
			bridge_port: None,
			variant: Some(SensorVariant::Rplidar),
		};
		let config = load_config(Some(file.path()), &overrides).unwrap();

		assert_eq!(config.control_plane.default_port, 5050);
		assert_eq!(config.bridge.port, 9191);
		assert_eq!(config.bridge.max_attempts, 2);
		assert_eq!(config.sensor_variant, SensorVariant::Rplidar);
	}

	#[test]
	fn bad_port_override_is_rejected() {
		let overrides = Overrides {
			port: Some("0".into()),
			..Default::default()
		};
		assert!(load_config(None, &overrides).is_err());
	}

	#[test]
	fn missing_config_file_names_the_path() {
		let err = load_config(Some(Path::new("/nonexistent/rover.json")), &Overrides::default()).unwrap_err();
		assert!(format!("{err:#}").contains("/nonexistent/rover.json"));
	}
}
