// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device boundary.
//!
//! The synchronization engine talks to the thermostat only through the
//! [`ThermostatDevice`] capability trait. The crate ships two
//! implementations:
//!
//! - [`TuyaDevice`](crate::protocol::TuyaDevice): the Tuya local protocol
//!   over TCP (feature `tuya`)
//! - [`MockThermostat`]: a scripted, call-recording double for tests and
//!   harnesses
//!
//! # Examples
//!
//! ```
//! use moes_bridge::device::{DeviceCall, MockThermostat, ThermostatDevice};
//!
//! # async fn example() -> moes_bridge::Result<()> {
//! let device = MockThermostat::new();
//! device.turn_on().await?;
//! device.send_ping().await?;
//!
//! assert_eq!(device.calls(), vec![DeviceCall::TurnOn, DeviceCall::Ping]);
//! # Ok(())
//! # }
//! ```

mod mock;

pub use mock::{DeviceCall, MockThermostat};

use std::future::Future;

use serde_json::Value;

use crate::codec::RawBatch;
use crate::error::Result;

/// Point id carrying the power state.
pub const POWER_POINT: u8 = 1;

/// Narrow capability interface over a thermostat transport.
///
/// Every call may block the polling loop for as long as the transport
/// allows; implementations enforce their own timeouts.
pub trait ThermostatDevice: Send + Sync {
    /// Requests the full point map.
    ///
    /// A reply carrying an `Error` marker is returned as `Ok`; `Err` is
    /// reserved for transport failures.
    fn status(&self) -> impl Future<Output = Result<RawBatch>> + Send;

    /// Waits for the next pushed update.
    ///
    /// Returns `None` if nothing arrived before the transport's read timeout.
    fn receive(&self) -> impl Future<Output = Result<Option<RawBatch>>> + Send;

    /// Sends a keep-alive so the device does not drop the session.
    fn send_ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// Writes one point.
    ///
    /// With `nowait` the call returns as soon as the write is sent, without
    /// consuming the device's acknowledgement.
    fn set_value(
        &self,
        point: u8,
        value: Value,
        nowait: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Turns the thermostat on.
    fn turn_on(&self) -> impl Future<Output = Result<()>> + Send {
        self.set_value(POWER_POINT, Value::Bool(true), false)
    }

    /// Turns the thermostat off.
    fn turn_off(&self) -> impl Future<Output = Result<()>> + Send {
        self.set_value(POWER_POINT, Value::Bool(false), false)
    }
}
