// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `moes_bridge` - Bridge a Moes/Tuya smart thermostat to MQTT.
//!
//! The bridge polls a BHT-002 family thermostat over the Tuya local
//! protocol, keeps a typed snapshot of its state, publishes that snapshot to
//! an MQTT broker, and applies commands received from the broker back to the
//! device.
//!
//! # Supported Features
//!
//! - **Point codec**: Device data points mapped to six typed attributes
//! - **State synchronization**: Change detection with periodic republish
//! - **Commands**: Partial JSON states turned into minimal device writes
//! - **Polling**: Keep-alive, periodic full status, connection-loss tracking
//! - **MQTT**: Availability with last will, state and command topics, TLS
//!
//! # Architecture
//!
//! ```text
//! TuyaDevice ──batch──▶ codec ──fields──▶ SyncEngine ──state──▶ Notifier ──▶ MQTT STATE
//!     ▲                                        │
//!     └──────────────── writes ◀───────────────┘◀── command task ◀── MQTT COMMAND
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use moes_bridge::bridge::Bridge;
//! use moes_bridge::engine::{SyncEngine, SyncTiming};
//! use moes_bridge::protocol::{MqttBridgeClient, TuyaDevice};
//! use moes_bridge::subscription::Notifier;
//!
//! #[tokio::main]
//! async fn main() -> moes_bridge::Result<()> {
//!     let device = TuyaDevice::builder()
//!         .device_id("bf0123456789abcdefghij")
//!         .address("192.168.1.60")
//!         .local_key("0123456789abcdef")
//!         .build()?;
//!
//!     let notifier = Arc::new(Notifier::new());
//!     let mqtt = MqttBridgeClient::builder()
//!         .host("broker.local")
//!         .port(1883)
//!         .topic_root("home/hvac/thermostat/BHT-002-GALW")
//!         .build(Arc::clone(&notifier))
//!         .await?;
//!
//!     let engine = Arc::new(SyncEngine::new("BHT-002-GALW", device, notifier, SyncTiming::default()));
//!     let bridge = Bridge::new(engine, mqtt);
//!     bridge.scheduler(0).run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Testing Without a Device
//!
//! ```
//! use std::sync::Arc;
//! use moes_bridge::codec::RawBatch;
//! use moes_bridge::device::MockThermostat;
//! use moes_bridge::engine::{SyncEngine, SyncTiming};
//! use moes_bridge::scheduler::PollingScheduler;
//! use moes_bridge::subscription::Notifier;
//!
//! # async fn example() {
//! let device = MockThermostat::new();
//! device.push_status(RawBatch::from_json(r#"{"dps":{"1":true,"2":42}}"#).unwrap());
//!
//! let engine = Arc::new(SyncEngine::new("test", device, Arc::new(Notifier::new()), SyncTiming::default()));
//! PollingScheduler::new(Arc::clone(&engine)).with_max_iterations(1).run().await;
//!
//! assert_eq!(engine.current().await.target_temperature(), Some(21.0));
//! # }
//! ```

pub mod app;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod subscription;

pub use app::AppContext;
pub use codec::RawBatch;
pub use device::{MockThermostat, ThermostatDevice};
pub use engine::{SyncEngine, SyncTiming};
pub use error::{CodecError, DeviceError, Error, ParseError, ProtocolError, Result};
pub use scheduler::{Phase, PollingScheduler};
pub use state::{Field, FieldSet, FieldValue, ThermostatState};
pub use subscription::Notifier;

#[cfg(feature = "mqtt")]
pub use bridge::Bridge;
#[cfg(feature = "mqtt")]
pub use protocol::MqttBridgeClient;
#[cfg(feature = "tuya")]
pub use protocol::TuyaDevice;
