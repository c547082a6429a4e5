use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rover::SensorVariant;

#[derive(Parser, Debug)]
#[command(name = "rover")]
#[command(about = "Rover console - start services, toggle capabilities and drive a remote robot")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// JSON configuration file (every section optional)
	#[arg(short, long, global = true, value_name = "FILE", env = "ROVER_CONFIG")]
	pub config: Option<PathBuf>,

	/// Disable colored output
	#[arg(long, global = true)]
	pub no_color: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Interactive session: type `help` once started
	#[command(alias = "con")]
	Console {
		/// Connect to this host right away
		#[arg(long)]
		host: Option<String>,

		#[command(flatten)]
		overrides: Overrides,
	},

	/// Connect, print the session state and disconnect again
	Probe {
		/// Robot address (four decimal octets)
		host: String,

		#[command(flatten)]
		overrides: Overrides,

		/// Print the resulting state as JSON
		#[arg(long)]
		json: bool,
	},

	/// Print the effective configuration as JSON
	#[command(name = "show-config")]
	ShowConfig {
		#[command(flatten)]
		overrides: Overrides,
	},
}

/// Settings that override the configuration file for one run.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
	/// Control-plane port (default 5000)
	#[arg(short, long)]
	pub port: Option<String>,

	/// Bridge WebSocket port (default 9090)
	#[arg(long, value_name = "PORT")]
	pub bridge_port: Option<u16>,

	/// Range sensor driving mapping and localization
	#[arg(long, value_name = "ydlidar|rplidar")]
	pub variant: Option<SensorVariant>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn probe_parses_host_and_overrides() {
		let cli = Cli::try_parse_from(["rover", "-vv", "probe", "10.0.0.5", "--port", "5001", "--variant", "rplidar"]).unwrap();
		assert_eq!(cli.verbose, 2);

		let Commands::Probe { host, overrides, json } = cli.command else {
			panic!("expected probe");
		};
		assert_eq!(host, "10.0.0.5");
		assert_eq!(overrides.port.as_deref(), Some("5001"));
		assert_eq!(overrides.variant, Some(SensorVariant::Rplidar));
		assert!(!json);
	}

	#[test]
	fn unknown_variant_is_rejected() {
		assert!(Cli::try_parse_from(["rover", "console", "--variant", "sonar"]).is_err());
	}

	#[test]
	fn verify_cli() {
		use clap::CommandFactory;
		Cli::command().debug_assert();
	}
}
