//! Domain values exchanged with the installer object.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer-coded installer status.
///
/// `0` means idle; every other value, including negative and unknown codes,
/// means the installer is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallerStatus(i32);

impl InstallerStatus {
    pub const IDLE: Self = Self(0);
    pub const PROBING: Self = Self(1);
    pub const PROPOSING: Self = Self(2);
    pub const INSTALLING: Self = Self(3);

    pub const fn from_code(code: i32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_installing(self) -> bool {
        self.0 != 0
    }
}

impl Default for InstallerStatus {
    fn default() -> Self {
        Self::IDLE
    }
}

impl fmt::Display for InstallerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::IDLE => f.write_str("idle"),
            Self::PROBING => f.write_str("probing"),
            Self::PROPOSING => f.write_str("proposing"),
            Self::INSTALLING => f.write_str("installing"),
            Self(code) => write!(f, "busy ({code})"),
        }
    }
}

/// Installable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub display_name: String,
}

impl Product {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

/// Language listing as sent by the installer: code to
/// `(code, native name, encoding, territory, english name)`.
pub type LanguageMap = BTreeMap<String, Vec<String>>;

/// Client-facing language entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    pub name: String,
}

impl Language {
    /// Projects a wire tuple keyed by `code`; the native name is the second field.
    ///
    /// Returns `None` when the tuple is too short to carry a name.
    pub fn from_entry(code: &str, fields: &[String]) -> Option<Self> {
        fields.get(1).map(|name| Self {
            id: code.to_string(),
            name: name.clone(),
        })
    }
}

/// Storage device candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub name: String,
    pub model: String,
    pub size: String,
}

/// One entry of the storage proposal. Proposals are ordered plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountAssignment {
    pub mount: String,
    pub device: String,
    #[serde(rename = "type")]
    pub fs_type: String,
    pub size: String,
}
