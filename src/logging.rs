// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Log subscriber setup for the binary.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Profile;

/// Target of the device transport's log events.
const TUYA_TARGET: &str = "moes_bridge::protocol::tuya";

/// Target of everything else in the crate.
const APP_TARGET: &str = "moes_bridge";

/// Logging setup error.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The global subscriber could not be installed.
    #[error("failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    /// `RUST_LOG` holds an invalid filter.
    #[error("invalid RUST_LOG filter: {0}")]
    InvalidFilter(String),
}

/// Filter directives for a profile.
///
/// | Profile | root    | app     | device transport |
/// |---------|---------|---------|------------------|
/// | DEV     | `debug` | `debug` | `info`           |
/// | PROD    | `warn`  | `info`  | `warn`           |
#[must_use]
pub fn profile_directives(profile: Profile) -> String {
    let (root, app, tuya) = match profile {
        Profile::Dev => ("debug", "debug", "info"),
        Profile::Prod => ("warn", "info", "warn"),
    };
    format!("{root},{APP_TARGET}={app},{TUYA_TARGET}={tuya}")
}

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` overrides the profile's filter when set.
///
/// # Errors
///
/// Returns error if `RUST_LOG` is invalid or a subscriber is already set.
pub fn init_logging(profile: Profile) -> Result<(), LoggingError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(&directives)
            .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?,
        _ => EnvFilter::try_new(profile_directives(profile))
            .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(matches!(profile, Profile::Dev))
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_directives() {
        assert_eq!(
            profile_directives(Profile::Dev),
            "debug,moes_bridge=debug,moes_bridge::protocol::tuya=info"
        );
    }

    #[test]
    fn prod_directives() {
        assert_eq!(
            profile_directives(Profile::Prod),
            "warn,moes_bridge=info,moes_bridge::protocol::tuya=warn"
        );
    }

    #[test]
    fn directives_parse() {
        for profile in [Profile::Dev, Profile::Prod] {
            assert!(EnvFilter::try_new(profile_directives(profile)).is_ok());
        }
    }
}
