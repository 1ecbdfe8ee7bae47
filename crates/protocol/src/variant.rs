//! Tagged variant values and their conversion to native values.
//!
//! Property values travel as a `{"t": tag, "v": value}` pair. The tag decides
//! how the payload is interpreted; unknown tags are passed through untouched
//! so newer services keep working with older clients.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tags understood by the codec.
pub mod tag {
    pub const STRING: &str = "s";
    pub const BOOLEAN: &str = "b";
    pub const INT32: &str = "i";
    pub const INT64: &str = "x";
    pub const UINT32: &str = "u";
    pub const DOUBLE: &str = "d";
}

/// A generic (type tag, value) pair as it appears on the wire.
///
/// ```json
/// { "t": "s", "v": "/dev/sda" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(rename = "t")]
    pub tag: String,
    #[serde(rename = "v")]
    pub value: Value,
}

impl Variant {
    pub fn new(tag: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }

    /// Decodes into a native value. Never fails.
    pub fn decode(self) -> OptionValue {
        OptionValue::from(self)
    }
}

/// Native representation of a decoded variant.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Double(f64),
    /// Unrecognized tag, or a payload that does not match its tag.
    Opaque(Variant),
}

impl OptionValue {
    /// Wire tag this value encodes with.
    pub fn tag(&self) -> &str {
        match self {
            Self::String(_) => tag::STRING,
            Self::Bool(_) => tag::BOOLEAN,
            Self::Int32(_) => tag::INT32,
            Self::Int64(_) => tag::INT64,
            Self::Uint32(_) => tag::UINT32,
            Self::Double(_) => tag::DOUBLE,
            Self::Opaque(variant) => &variant.tag,
        }
    }

    /// Plain JSON form of the value, without the tag.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::from(s.as_str()),
            Self::Bool(b) => Value::from(*b),
            Self::Int32(n) => Value::from(*n),
            Self::Int64(n) => Value::from(*n),
            Self::Uint32(n) => Value::from(*n),
            Self::Double(n) => Value::from(*n),
            Self::Opaque(variant) => variant.value.clone(),
        }
    }

    /// Parses `text` as a value of the given wire tag.
    ///
    /// Returns `None` when the tag is unknown or the text does not parse.
    pub fn parse(tag_name: &str, text: &str) -> Option<Self> {
        match tag_name {
            tag::STRING => Some(Self::String(text.to_string())),
            tag::BOOLEAN => text.parse().ok().map(Self::Bool),
            tag::INT32 => text.parse().ok().map(Self::Int32),
            tag::INT64 => text.parse().ok().map(Self::Int64),
            tag::UINT32 => text.parse().ok().map(Self::Uint32),
            tag::DOUBLE => text.parse().ok().map(Self::Double),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Variant> for OptionValue {
    fn from(variant: Variant) -> Self {
        let decoded = match variant.tag.as_str() {
            tag::STRING => variant.value.as_str().map(|s| Self::String(s.to_string())),
            tag::BOOLEAN => variant.value.as_bool().map(Self::Bool),
            tag::INT32 => {
                variant.value.as_i64().and_then(|n| i32::try_from(n).ok()).map(Self::Int32)
            }
            tag::INT64 => variant.value.as_i64().map(Self::Int64),
            tag::UINT32 => {
                variant.value.as_u64().and_then(|n| u32::try_from(n).ok()).map(Self::Uint32)
            }
            tag::DOUBLE => variant.value.as_f64().map(Self::Double),
            _ => None,
        };
        decoded.unwrap_or(Self::Opaque(variant))
    }
}

/// Native types that can be sent as a [`Variant`].
///
/// Only implemented for types with a wire tag, so encoding an unsupported
/// type is rejected at compile time.
pub trait IntoVariant {
    fn into_variant(self) -> Variant;
}

impl IntoVariant for Variant {
    fn into_variant(self) -> Variant {
        self
    }
}

impl IntoVariant for OptionValue {
    fn into_variant(self) -> Variant {
        match self {
            Self::Opaque(variant) => variant,
            other => Variant::new(other.tag().to_string(), other.to_json()),
        }
    }
}

impl IntoVariant for String {
    fn into_variant(self) -> Variant {
        Variant::new(tag::STRING, self)
    }
}

impl IntoVariant for &str {
    fn into_variant(self) -> Variant {
        Variant::new(tag::STRING, self)
    }
}

impl IntoVariant for bool {
    fn into_variant(self) -> Variant {
        Variant::new(tag::BOOLEAN, self)
    }
}

impl IntoVariant for i32 {
    fn into_variant(self) -> Variant {
        Variant::new(tag::INT32, self)
    }
}

impl IntoVariant for i64 {
    fn into_variant(self) -> Variant {
        Variant::new(tag::INT64, self)
    }
}

impl IntoVariant for u32 {
    fn into_variant(self) -> Variant {
        Variant::new(tag::UINT32, self)
    }
}

impl IntoVariant for f64 {
    fn into_variant(self) -> Variant {
        Variant::new(tag::DOUBLE, self)
    }
}

/// Native types that can be extracted from a decoded [`OptionValue`].
pub trait FromVariant: Sized {
    fn from_option_value(value: OptionValue) -> Option<Self>;
}

impl FromVariant for OptionValue {
    fn from_option_value(value: OptionValue) -> Option<Self> {
        Some(value)
    }
}

impl FromVariant for String {
    fn from_option_value(value: OptionValue) -> Option<Self> {
        match value {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromVariant for bool {
    fn from_option_value(value: OptionValue) -> Option<Self> {
        match value {
            OptionValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromVariant for i64 {
    fn from_option_value(value: OptionValue) -> Option<Self> {
        match value {
            OptionValue::Int32(n) => Some(n.into()),
            OptionValue::Int64(n) => Some(n),
            OptionValue::Uint32(n) => Some(n.into()),
            _ => None,
        }
    }
}

impl FromVariant for i32 {
    fn from_option_value(value: OptionValue) -> Option<Self> {
        match value {
            OptionValue::Int32(n) => Some(n),
            _ => None,
        }
    }
}

impl FromVariant for u32 {
    fn from_option_value(value: OptionValue) -> Option<Self> {
        match value {
            OptionValue::Uint32(n) => Some(n),
            _ => None,
        }
    }
}

impl FromVariant for f64 {
    fn from_option_value(value: OptionValue) -> Option<Self> {
        match value {
            OptionValue::Double(n) => Some(n),
            _ => None,
        }
    }
}
