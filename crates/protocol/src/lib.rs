//! Wire types for the D-Installer bus protocol.
//!
//! This crate contains the serde-serializable types exchanged between the
//! installer front end and the installer service. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization and the
//!   variant codec
//! * 1:1 with the installer object: field names match the bus payloads
//! * Stable: Changes only when the wire protocol changes
//!
//! Client behavior is built on top of these types in `dinstaller-client`;
//! the server side lives in `dinstaller-orchestrator`.

pub mod message;
pub mod names;
pub mod types;
pub mod variant;

pub use message::*;
pub use types::*;
pub use variant::{FromVariant, IntoVariant, OptionValue, Variant};
