// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transports on both sides of the bridge.
//!
//! # Protocols
//!
//! - [`TuyaDevice`]: the thermostat, over the Tuya 3.3 local protocol
//!   (feature `tuya`)
//! - [`MqttBridgeClient`]: the home-automation side, over MQTT
//!   (feature `mqtt`)

#[cfg(feature = "mqtt")]
mod mqtt;
#[cfg(feature = "tuya")]
pub mod tuya;

#[cfg(feature = "mqtt")]
pub use mqtt::{
    BridgeTopics, DEFAULT_MQTT_PORT, MqttBridgeClient, MqttBridgeClientBuilder, MqttBridgeConfig,
    OFFLINE, ONLINE, default_topic_root,
};
#[cfg(feature = "tuya")]
pub use tuya::{DEFAULT_TUYA_PORT, TuyaConfig, TuyaDevice, TuyaDeviceBuilder};
