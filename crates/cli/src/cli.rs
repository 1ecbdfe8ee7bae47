use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dinstaller::ClientConfig;

use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "dinstaller")]
#[command(about = "D-Installer client - drive an installation from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Client configuration file (JSON)
	#[arg(long, global = true, value_name = "FILE", env = "DINSTALLER_CONFIG")]
	pub config: Option<PathBuf>,

	/// Session gateway base URL
	#[arg(long, global = true, value_name = "URL", env = "DINSTALLER_GATEWAY")]
	pub gateway: Option<String>,

	/// Message bus WebSocket URL
	#[arg(long, global = true, value_name = "URL", env = "DINSTALLER_BUS")]
	pub bus: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

impl Cli {
	/// Configuration file contents with command-line overrides applied.
	pub fn client_config(&self) -> Result<ClientConfig> {
		let mut config = match &self.config {
			Some(path) => ClientConfig::load(path)?,
			None => ClientConfig::default(),
		};
		if let Some(gateway) = &self.gateway {
			config.gateway_url = gateway.clone();
		}
		if let Some(bus) = &self.bus {
			config.bus_url = bus.clone();
		}
		Ok(config)
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Log into the session gateway (password from DINSTALLER_PASSWORD or stdin)
	Login { user: String },

	/// Show whether the gateway accepts the current session
	Whoami,

	/// Print the installer status
	Status,

	/// Print status changes as they happen until interrupted
	Watch,

	/// List installable products
	Products,

	/// List available languages
	#[command(alias = "langs")]
	Languages,

	/// List candidate disks
	Disks,

	/// Show the storage proposal
	Storage,

	/// Read or write installer options
	Option {
		#[command(subcommand)]
		action: OptionAction,
	},

	/// Select the product to install
	Select { product: String },

	/// Start the installation
	Start,

	/// Print the effective client configuration
	Config,
}

#[derive(Subcommand, Debug)]
pub enum OptionAction {
	/// Read an option
	Get { name: String },

	/// Write an option
	Set {
		name: String,
		value: String,
		/// Wire type tag: s (string), b (bool), i (int32), x (int64), u (uint32), d (double)
		#[arg(short = 't', long = "type", default_value = "s")]
		tag: String,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_option_set_with_type() {
		let args = ["dinstaller", "-vv", "option", "set", "Timeout", "30", "--type", "u"];
		let cli = Cli::try_parse_from(args).unwrap();
		assert_eq!(cli.verbose, 2);
		match cli.command {
			Commands::Option {
				action: OptionAction::Set { name, value, tag },
			} => {
				assert_eq!(name, "Timeout");
				assert_eq!(value, "30");
				assert_eq!(tag, "u");
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn option_type_defaults_to_string() {
		let cli = Cli::try_parse_from(["dinstaller", "option", "set", "Disk", "/dev/sda"]).unwrap();
		assert!(matches!(
			cli.command,
			Commands::Option { action: OptionAction::Set { ref tag, .. } } if tag == "s"
		));
	}

	#[test]
	fn flags_override_config_defaults() {
		let cli = Cli::try_parse_from([
			"dinstaller",
			"--gateway",
			"https://installer:9090",
			"--bus",
			"wss://installer:9090/cockpit/socket",
			"status",
		])
		.unwrap();
		let config = cli.client_config().unwrap();
		assert_eq!(config.gateway_url, "https://installer:9090");
		assert_eq!(config.bus_url, "wss://installer:9090/cockpit/socket");
		assert_eq!(config.login_path, "/cockpit/login");
	}
}
