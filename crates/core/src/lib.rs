//! Client for the D-Installer service.
//!
//! Connects an interactive front end to the installer: session login against
//! the gateway, status polling and notifications, typed option access, and
//! the domain queries (products, languages, disks, storage proposal) used to
//! populate the installer screens.
//!
//! # Example
//!
//! ```ignore
//! use dinstaller::{ClientConfig, InstallerClient, SessionAuthenticator};
//!
//! let config = ClientConfig::default();
//! let auth = SessionAuthenticator::from_config(&config)?;
//! auth.authorize("root", "linux").await?;
//!
//! let installer = InstallerClient::connect(&config).await?;
//! let _subscription = installer.status().on_status_changed(|status| println!("{status}"));
//! installer.set_option("Disk", "/dev/sda").await?;
//! installer.start_installation().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod installer;
pub mod remote;
pub mod session;
pub mod signal;
pub mod status;
pub mod transport;

pub use config::ClientConfig;
pub use connection::Connection;
pub use dinstaller_protocol as protocol;
pub use dinstaller_protocol::{
    Disk, InstallerStatus, Language, MountAssignment, OptionValue, Product,
};
pub use error::{Error, Result};
pub use installer::InstallerClient;
pub use remote::RemoteObject;
pub use session::{
    Gateway, GatewayFuture, GatewayResponse, HttpGateway, Session, SessionAuthenticator,
};
pub use signal::Subscription;
pub use status::{StatusStream, StatusWatcher};
