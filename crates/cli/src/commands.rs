//! Command implementations. Every command prints JSON on stdout.

use dinstaller::{ClientConfig, InstallerClient, InstallerStatus, OptionValue, SessionAuthenticator};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::cli::{Cli, Commands, OptionAction};
use crate::error::{CliError, Result};

const PASSWORD_ENV: &str = "DINSTALLER_PASSWORD";

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = cli.client_config()?;
	debug!(
		target = "dinstaller",
		gateway = %config.gateway_url,
		bus = %config.bus_url,
		"using configuration"
	);

	match cli.command {
		Commands::Config => print_json(&config),
		Commands::Login { user } => login(&config, &user).await,
		Commands::Whoami => whoami(&config).await,
		Commands::Status => {
			let status = connect(&config).await?.get_status().await?;
			print_json(&json!({ "status": status.code(), "installing": status.is_installing() }))
		}
		Commands::Watch => watch(&config).await,
		Commands::Products => print_json(&connect(&config).await?.get_products().await?),
		Commands::Languages => print_json(&connect(&config).await?.get_languages().await?),
		Commands::Disks => print_json(&connect(&config).await?.get_disks().await?),
		Commands::Storage => print_json(&connect(&config).await?.get_storage().await?),
		Commands::Option { action } => option(&config, action).await,
		Commands::Select { product } => {
			connect(&config).await?.select_product(&product).await?;
			print_json(&json!({ "selected": product }))
		}
		Commands::Start => {
			connect(&config).await?.start_installation().await?;
			print_json(&json!({ "started": true }))
		}
	}
}

async fn connect(config: &ClientConfig) -> Result<InstallerClient> {
	info!(target = "dinstaller", url = %config.bus_url, "connecting to installer");
	Ok(InstallerClient::connect(config).await?)
}

async fn login(config: &ClientConfig, user: &str) -> Result<()> {
	let password = read_password().await?;
	let auth = SessionAuthenticator::from_config(config)?;
	auth.authorize(user, &password).await?;
	print_json(&json!({ "authenticated": true, "user": user }))
}

async fn whoami(config: &ClientConfig) -> Result<()> {
	let auth = SessionAuthenticator::from_config(config)?;
	if !auth.is_logged_in().await {
		return print_json(&json!({ "loggedIn": false, "user": null }));
	}
	let user = auth.current_user().await.ok();
	print_json(&json!({ "loggedIn": true, "user": user }))
}

async fn watch(config: &ClientConfig) -> Result<()> {
	let installer = connect(config).await?;
	let mut statuses = installer.status().watch();
	let initial = installer.status().status_or_idle().await;
	print_line(&status_json(initial))?;

	loop {
		tokio::select! {
			status = statuses.next() => match status {
				Some(status) => print_line(&status_json(status))?,
				None => break,
			},
			_ = tokio::signal::ctrl_c() => break,
		}
	}
	Ok(())
}

async fn option(config: &ClientConfig, action: OptionAction) -> Result<()> {
	match action {
		OptionAction::Get { name } => {
			let value = connect(config)
				.await?
				.get_option(&name)
				.await
				.ok_or_else(|| CliError::OptionUnavailable(name.clone()))?;
			print_json(&option_json(&name, &value))
		}
		OptionAction::Set { name, value, tag } => {
			let parsed = parse_value(&tag, &value)?;
			connect(config).await?.set_option(&name, parsed.clone()).await?;
			print_json(&option_json(&name, &parsed))
		}
	}
}

/// Parses `text` as a value of wire type `tag`.
pub fn parse_value(tag: &str, text: &str) -> Result<OptionValue> {
	OptionValue::parse(tag, text).ok_or_else(|| CliError::InvalidValue {
		tag: tag.to_string(),
		value: text.to_string(),
	})
}

fn status_json(status: InstallerStatus) -> serde_json::Value {
	json!({ "status": status.code(), "installing": status.is_installing() })
}

fn option_json(name: &str, value: &OptionValue) -> serde_json::Value {
	json!({ "name": name, "type": value.tag(), "value": value.to_json() })
}

/// Password from the environment, else the first line of stdin.
async fn read_password() -> Result<String> {
	if let Ok(password) = std::env::var(PASSWORD_ENV) {
		return Ok(password);
	}

	let line = tokio::task::spawn_blocking(|| {
		let mut input = String::new();
		std::io::stdin().read_line(&mut input).map(|_| input)
	})
	.await
	.map_err(|err| CliError::Io(std::io::Error::other(err)))??;

	let password = line.trim_end_matches(['\r', '\n']).to_string();
	if password.is_empty() {
		return Err(CliError::MissingPassword);
	}
	Ok(password)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn print_line<T: Serialize + ?Sized>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string(value)?);
	Ok(())
}
