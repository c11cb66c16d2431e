//! Service configuration from environment variables.
//!
//! Variable names use a double underscore as the section separator, matching
//! the deployment environment this service is configured from:
//!
//! - `ConnectionStrings__DefaultConnection`: Redis connection URL. When
//!   unset, the service runs on its in-memory stores.
//! - `NonceValidation__WindowDuration`: anti-replay window as `HH:MM:SS`,
//!   default `24:00:00`.
//! - `NodeEviction__MaxNodesPerClusterVersion`: per-group registration cap,
//!   default 5.
//! - `RateLimiting__Disabled`: `true`/`false`; request throttling is handled
//!   in front of this service, the flag is only surfaced in logs.

use std::time::Duration;
use thiserror::Error;

const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_MAX_PER_GROUP: usize = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {name}: {detail}")]
    Invalid { name: &'static str, detail: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub connection_string: Option<String>,
    pub nonce_window: Duration,
    pub max_per_group: usize,
    pub rate_limiting_disabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection_string: None,
            nonce_window: DEFAULT_WINDOW,
            max_per_group: DEFAULT_MAX_PER_GROUP,
            rate_limiting_disabled: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Settings::default();

        if let Ok(url) = std::env::var("ConnectionStrings__DefaultConnection")
            && !url.is_empty()
        {
            settings.connection_string = Some(url);
        }

        if let Ok(window) = std::env::var("NonceValidation__WindowDuration") {
            settings.nonce_window = parse_window(&window)?;
        }

        if let Ok(max) = std::env::var("NodeEviction__MaxNodesPerClusterVersion") {
            settings.max_per_group = max.parse::<usize>().ok().filter(|m| *m > 0).ok_or_else(
                || ConfigError::Invalid {
                    name: "NodeEviction__MaxNodesPerClusterVersion",
                    detail: format!("'{}' is not a positive integer", max),
                },
            )?;
        }

        if let Ok(disabled) = std::env::var("RateLimiting__Disabled") {
            settings.rate_limiting_disabled =
                disabled.parse::<bool>().map_err(|_| ConfigError::Invalid {
                    name: "RateLimiting__Disabled",
                    detail: format!("'{}' is not true or false", disabled),
                })?;
        }

        Ok(settings)
    }
}

/// Parse a `HH:MM:SS` window. Hours may exceed 24; minutes and seconds
/// must stay under 60.
fn parse_window(text: &str) -> Result<Duration, ConfigError> {
    let invalid = |detail: String| ConfigError::Invalid {
        name: "NonceValidation__WindowDuration",
        detail,
    };

    let parts: Vec<&str> = text.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(invalid(format!("'{}' is not in HH:MM:SS form", text)));
    };

    let hours: u64 = hours
        .parse()
        .map_err(|_| invalid(format!("'{}' has a non-numeric hours field", text)))?;
    let minutes: u64 = minutes
        .parse()
        .ok()
        .filter(|m| *m < 60)
        .ok_or_else(|| invalid(format!("'{}' has an invalid minutes field", text)))?;
    let seconds: u64 = seconds
        .parse()
        .ok()
        .filter(|s| *s < 60)
        .ok_or_else(|| invalid(format!("'{}' has an invalid seconds field", text)))?;

    let total = hours * 3600 + minutes * 60 + seconds;
    if total == 0 {
        return Err(invalid(format!("'{}' is a zero-length window", text)));
    }
    Ok(Duration::from_secs(total))
}
