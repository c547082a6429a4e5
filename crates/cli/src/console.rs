//! Line-oriented console over a [`DriverHandle`].
//!
//! Each line is one verb (`connect 10.0.0.5`, `toggle camera`, `joint elbow 45`).
//! A bare single character is a drive key, so `w`, `a`, `s`, `d`, `x` work as
//! in a teleop pad.

use std::io::Write;

use colored::Colorize;
use rover::{Capability, DriverHandle, Error, SensorVariant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::render;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
	Connect { host: String, port: Option<String> },
	Disconnect,
	Toggle(Capability),
	StoreMap,
	Reset,
	Variant(SensorVariant),
	Key(String),
	Joint { name: String, degrees: f64 },
	Status,
	Help,
	Quit,
}

/// Parses one console line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
	let line = line.trim();
	if line.is_empty() || line.starts_with('#') {
		return Ok(None);
	}

	let mut words = line.split_whitespace();
	let verb = words.next().unwrap_or_default().to_ascii_lowercase();
	let args: Vec<&str> = words.collect();

	let command = match (verb.as_str(), args.as_slice()) {
		("connect" | "c", [host]) => ConsoleCommand::Connect {
			host: host.to_string(),
			port: None,
		},
		("connect" | "c", [host, port]) => ConsoleCommand::Connect {
			host: host.to_string(),
			port: Some(port.to_string()),
		},
		("connect" | "c", _) => return Err("usage: connect <host> [port]".to_string()),
		("disconnect" | "dc", []) => ConsoleCommand::Disconnect,
		("toggle" | "t", [name]) => ConsoleCommand::Toggle(name.parse().map_err(|e: Error| e.to_string())?),
		("toggle" | "t", _) => return Err("usage: toggle <mapping|localization|camera|perception>".to_string()),
		("store-map" | "save", []) => ConsoleCommand::StoreMap,
		("reset", []) => ConsoleCommand::Reset,
		("variant", [name]) => ConsoleCommand::Variant(name.parse().map_err(|e: Error| e.to_string())?),
		("variant", _) => return Err("usage: variant <ydlidar|rplidar>".to_string()),
		("key" | "k", [key]) => ConsoleCommand::Key(key.to_string()),
		("joint" | "j", [name, degrees]) => ConsoleCommand::Joint {
			name: name.to_string(),
			degrees: degrees.parse().map_err(|_| format!("not a number: '{degrees}'"))?,
		},
		("joint" | "j", _) => return Err("usage: joint <name> <degrees>".to_string()),
		("status" | "st", []) => ConsoleCommand::Status,
		("help" | "?", []) => ConsoleCommand::Help,
		("quit" | "exit" | "q", []) => ConsoleCommand::Quit,
		(key, []) if key.chars().count() == 1 => ConsoleCommand::Key(key.to_string()),
		(other, _) => return Err(format!("unknown command '{other}' (try `help`)")),
	};
	Ok(Some(command))
}

/// Reads commands from stdin until `quit`, end of input or Ctrl-C, then shuts the session down.
pub async fn run(handle: DriverHandle, connect_to: Option<(String, Option<String>)>) -> anyhow::Result<()> {
	let mut state = handle.subscribe();
	println!("{}", render::status_line(&state.borrow_and_update()));

	if let Some((host, port)) = connect_to {
		execute(&handle, ConsoleCommand::Connect { host, port }).await;
	}

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		if state.has_changed().unwrap_or(false) {
			println!("{}", render::status_line(&state.borrow_and_update()));
		}
		print!("{} ", "rover>".bold());
		std::io::stdout().flush()?;

		let line = tokio::select! {
			line = lines.next_line() => line?,
			_ = tokio::signal::ctrl_c() => None,
		};
		let Some(line) = line else {
			println!();
			break;
		};

		match parse_line(&line) {
			Ok(None) => {}
			Ok(Some(ConsoleCommand::Quit)) => break,
			Ok(Some(ConsoleCommand::Status)) => println!("{}", render::status_line(&state.borrow_and_update())),
			Ok(Some(ConsoleCommand::Help)) => println!("{}", render::help()),
			Ok(Some(command)) => execute(&handle, command).await,
			Err(message) => eprintln!("{}", message.yellow()),
		}
	}

	debug!(target = "rover.console", "console closed; shutting down session");
	handle.shutdown().await?;
	Ok(())
}

async fn execute(handle: &DriverHandle, command: ConsoleCommand) {
	let result = match command {
		ConsoleCommand::Connect { host, port } => handle.connect(host, port).await.map(|outcome| {
			if let Some(warning) = outcome.bridge_warning {
				eprintln!("{} {warning}", "warning:".yellow().bold());
			}
		}),
		ConsoleCommand::Disconnect => handle.disconnect().await,
		ConsoleCommand::Toggle(capability) => handle
			.toggle(capability)
			.await
			.map(|state| println!("{capability}: {}", format!("{state:?}").to_lowercase())),
		ConsoleCommand::StoreMap => handle.store_map().await.map(|()| println!("map saved")),
		ConsoleCommand::Reset => handle.reset().await,
		ConsoleCommand::Variant(variant) => handle.set_sensor_variant(variant).await,
		ConsoleCommand::Key(key) => handle.press_key(key).await,
		ConsoleCommand::Joint { name, degrees } => handle
			.set_joint(name.as_str(), degrees)
			.await
			.map(|applied| println!("{name} -> {applied:.1} deg")),
		ConsoleCommand::Status | ConsoleCommand::Help | ConsoleCommand::Quit => Ok(()),
	};

	if let Err(err) = result {
		report(&err);
	}
}

fn report(err: &Error) {
	if err.is_informational() {
		eprintln!("{}", err.to_string().yellow());
	} else if err.is_guard() {
		eprintln!("{} {err}", "rejected:".yellow().bold());
	} else {
		eprintln!("{} {err}", "error:".red().bold());
	}
}
