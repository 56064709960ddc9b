// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tuya local protocol, version 3.3.
//!
//! - [`frame`]: wire framing and AES payload encryption
//! - [`TuyaDevice`]: a [`ThermostatDevice`](crate::device::ThermostatDevice)
//!   over TCP

pub mod frame;
mod client;

pub use client::{DEFAULT_TUYA_PORT, TuyaConfig, TuyaDevice, TuyaDeviceBuilder};
