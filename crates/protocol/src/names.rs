//! Well-known object paths, interfaces, methods and signals.

/// Object path of the installer object.
pub const INSTALLER_PATH: &str = "/org/opensuse/YaST/Installer";
/// Interface implemented by the installer object.
pub const INSTALLER_INTERFACE: &str = "org.opensuse.YaST.Installer";
/// Generic property access interface.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Methods of [`INSTALLER_INTERFACE`].
pub mod method {
    pub const GET_STATUS: &str = "GetStatus";
    pub const GET_PRODUCTS: &str = "GetProducts";
    pub const SELECT_PRODUCT: &str = "SelectProduct";
    pub const GET_LANGUAGES: &str = "GetLanguages";
    pub const GET_DISKS: &str = "GetDisks";
    pub const GET_STORAGE: &str = "GetStorage";
    pub const START: &str = "Start";
}

/// Methods of [`PROPERTIES_INTERFACE`].
pub mod property {
    pub const GET: &str = "Get";
    pub const SET: &str = "Set";
}

/// Signals emitted by the installer object.
pub mod signal {
    pub const STATUS_CHANGED: &str = "StatusChanged";
}

/// Error names carried in error replies.
pub mod error {
    pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
}
