// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or as a `BRIDGE_*` environment
//! variable; flags win.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::engine::{MAX_INTERVAL, SyncTiming};

/// Name the device is published under when none is given.
pub const DEFAULT_DEVICE_NAME: &str = "BHT-002-GALW";

const MAX_INTERVAL_SECS: u64 = MAX_INTERVAL.as_secs();

/// Runtime profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Verbose logging.
    #[default]
    Dev,
    /// Quiet logging.
    Prod,
}

impl Profile {
    /// Maps a target-environment name to a profile.
    ///
    /// Only `PROD` (any case) selects [`Profile::Prod`]; every other name
    /// falls back to [`Profile::Dev`].
    #[must_use]
    pub fn from_target_env(name: &str) -> Self {
        if name.eq_ignore_ascii_case("prod") {
            Self::Prod
        } else {
            Self::Dev
        }
    }

    /// Upper-case profile name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dev => "DEV",
            Self::Prod => "PROD",
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[allow(clippy::unnecessary_wraps)]
fn parse_profile(value: &str) -> Result<Profile, String> {
    Ok(Profile::from_target_env(value))
}

/// Bridge options.
#[derive(Debug, Clone, Parser)]
#[command(name = "moes-bridge")]
#[command(about = "Bridge a Moes/Tuya thermostat to an MQTT broker")]
#[command(version)]
pub struct BridgeArgs {
    /// Target environment (DEV/PROD); selects the logging profile
    #[arg(long, env = "BRIDGE_TARGET_ENV", default_value = "DEV", value_parser = parse_profile)]
    pub target_env: Profile,

    /// Tuya: device id
    #[arg(long, env = "BRIDGE_TUYA_DEV_ID")]
    pub tuya_dev_id: String,

    /// Tuya: device IP address
    #[arg(long, env = "BRIDGE_TUYA_DEV_IP")]
    pub tuya_dev_ip: String,

    /// Tuya: device local key
    #[arg(long, env = "BRIDGE_TUYA_DEV_LOCAL_KEY", hide_env_values = true)]
    pub tuya_dev_local_key: String,

    /// Tuya: device name used in logs and the default topic root
    #[arg(long, env = "BRIDGE_TUYA_DEV_NAME", default_value = DEFAULT_DEVICE_NAME)]
    pub tuya_dev_name: String,

    /// MQTT: broker address
    #[arg(long, env = "BRIDGE_MQTT_BROKER_ADDR")]
    pub mqtt_broker_addr: String,

    /// MQTT: broker port
    #[arg(long, env = "BRIDGE_MQTT_BROKER_PORT", default_value_t = 8883)]
    pub mqtt_broker_port: u16,

    /// MQTT: user name
    #[arg(long, env = "BRIDGE_MQTT_USER", requires = "mqtt_password")]
    pub mqtt_user: Option<String>,

    /// MQTT: password
    #[arg(long, env = "BRIDGE_MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// MQTT: CA certificate of the broker; enables TLS
    #[arg(long, env = "BRIDGE_MQTT_TLS_PATH")]
    pub mqtt_tls_path: Option<PathBuf>,

    /// MQTT: topic root (default: home/hvac/thermostat/<device name>)
    #[arg(long, env = "BRIDGE_MQTT_TOPIC_ROOT")]
    pub mqtt_topic_root: Option<String>,

    /// Stop after this many polling passes (0 runs forever)
    #[arg(long, env = "BRIDGE_MAX_ITERATIONS", default_value_t = 0)]
    pub max_iterations: u64,

    /// Seconds between keep-alive pings
    #[arg(
        long,
        env = "BRIDGE_PING_INTERVAL",
        default_value_t = 9,
        value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS)
    )]
    pub ping_interval: u64,

    /// Seconds between forced full-status requests
    #[arg(
        long,
        env = "BRIDGE_FULL_STATUS_INTERVAL",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS)
    )]
    pub full_status_interval: u64,

    /// Seconds after which an unchanged state is published again
    #[arg(
        long,
        env = "BRIDGE_PUBLISH_INTERVAL",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS)
    )]
    pub publish_interval: u64,
}

impl BridgeArgs {
    /// Topic root, falling back to the device-name default.
    #[must_use]
    pub fn topic_root(&self) -> String {
        self.mqtt_topic_root
            .clone()
            .unwrap_or_else(|| format!("home/hvac/thermostat/{}", self.tuya_dev_name))
    }

    /// Engine intervals.
    #[must_use]
    pub fn timing(&self) -> SyncTiming {
        SyncTiming::default()
            .with_ping_interval(Duration::from_secs(self.ping_interval))
            .with_full_status_interval(Duration::from_secs(self.full_status_interval))
            .with_publish_interval(Duration::from_secs(self.publish_interval))
    }

    /// Username and password, when both are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.mqtt_user
            .as_deref()
            .zip(self.mqtt_password.as_deref())
    }
}
