//! Dimmer configuration flags.
//!
//! Flag input arrives as loosely typed key/value pairs (for example from a
//! bus command payload). It is validated here, before any command is
//! queued, so an unknown key never causes partial wire activity.

use serde_json::{Map, Value};

use crate::error::FlagError;

/// Validated set of dimmer flags to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimmerFlags {
    /// LED backlight level (factory default `0x1f`).
    pub backlight: Option<u8>,
    /// Level used when the device is turned on locally.
    pub on_level: Option<u8>,
}

impl DimmerFlags {
    /// Keys accepted by [`DimmerFlags::from_json`].
    pub const VALID: &'static [&'static str] = &["backlight", "on_level"];

    /// Parse flags from a JSON object.
    ///
    /// Values may be integers or strings (decimal or `0x` prefixed hex).
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Unsupported`] listing every unknown key, or
    /// [`FlagError::InvalidValue`] when a value is not a byte.
    pub fn from_json(input: &Map<String, Value>) -> Result<Self, FlagError> {
        let mut unknown: Vec<String> = input
            .keys()
            .filter(|k| !Self::VALID.contains(&k.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(FlagError::Unsupported {
                unknown,
                valid: Self::VALID,
            });
        }

        Ok(Self {
            backlight: input_byte(input, "backlight")?,
            on_level: input_byte(input, "on_level")?,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backlight.is_none() && self.on_level.is_none()
    }
}

fn input_byte(input: &Map<String, Value>, flag: &str) -> Result<Option<u8>, FlagError> {
    let Some(value) = input.get(flag) else {
        return Ok(None);
    };

    let invalid = || FlagError::InvalidValue {
        flag: flag.to_string(),
    };

    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u8::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    };

    parsed.map(Some).ok_or_else(invalid)
}
