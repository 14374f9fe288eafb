//! Typed conversion of configuration strings.

use std::{path::PathBuf, time::Duration};

use crate::core::{ConfigError, Result};

/// Conversion from a resolved configuration string.
///
/// `Default` supplies the fallback returned by typed reads when conversion
/// fails.
pub trait FromConfigValue: Sized + Default + Clone + Send + Sync + 'static {
    /// Parses `raw`.
    ///
    /// # Errors
    /// Returns `ConfigError::Conversion` on a type mismatch or overflow.
    fn from_config_value(raw: &str) -> Result<Self>;
}

macro_rules! from_str_impl {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromConfigValue for $ty {
                fn from_config_value(raw: &str) -> Result<Self> {
                    raw.trim()
                        .parse::<$ty>()
                        .map_err(|e| ConfigError::conversion::<$ty>(raw, e))
                }
            }
        )*
    };
}

from_str_impl!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl FromConfigValue for String {
    fn from_config_value(raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }
}

impl FromConfigValue for bool {
    fn from_config_value(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::conversion::<bool>(raw, "expected true/false")),
        }
    }
}

impl FromConfigValue for char {
    fn from_config_value(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(ConfigError::conversion::<char>(raw, "expected exactly one character")),
        }
    }
}

impl FromConfigValue for PathBuf {
    fn from_config_value(raw: &str) -> Result<Self> {
        Ok(PathBuf::from(raw))
    }
}

/// Durations are whole milliseconds.
impl FromConfigValue for Duration {
    fn from_config_value(raw: &str) -> Result<Self> {
        raw.trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::conversion::<Duration>(raw, e))
    }
}
