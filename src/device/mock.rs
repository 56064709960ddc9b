// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted thermostat double.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::codec::RawBatch;
use crate::error::{DeviceError, ProtocolError, Result};

use super::ThermostatDevice;

/// A call made against a [`MockThermostat`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    /// `status()`
    Status,
    /// `receive()`
    Receive,
    /// `send_ping()`
    Ping,
    /// `set_value(point, value, nowait)`
    SetValue {
        /// Point id.
        point: u8,
        /// Wire value.
        value: Value,
        /// Whether the acknowledgement was skipped.
        nowait: bool,
    },
    /// `turn_on()`
    TurnOn,
    /// `turn_off()`
    TurnOff,
}

impl DeviceCall {
    /// Returns `true` for calls that change device state.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::SetValue { .. } | Self::TurnOn | Self::TurnOff)
    }
}

/// A thermostat that replays scripted replies and records every call.
///
/// `status()` pops the next scripted status reply, or returns an empty reply
/// once the script runs out. `receive()` pops the next scripted event, or
/// returns `None`.
#[derive(Debug, Default)]
pub struct MockThermostat {
    status_replies: Mutex<VecDeque<std::result::Result<RawBatch, String>>>,
    receive_replies: Mutex<VecDeque<Option<RawBatch>>>,
    calls: Mutex<Vec<DeviceCall>>,
    reject_writes: AtomicBool,
}

impl MockThermostat {
    /// Creates a mock with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a status reply.
    pub fn push_status(&self, reply: RawBatch) {
        self.status_replies.lock().push_back(Ok(reply));
    }

    /// Queues a status transport failure.
    pub fn push_status_failure(&self, message: impl Into<String>) {
        self.status_replies.lock().push_back(Err(message.into()));
    }

    /// Queues a pushed event (`None` for a read timeout).
    pub fn push_receive(&self, reply: Option<RawBatch>) {
        self.receive_replies.lock().push_back(reply);
    }

    /// Makes every subsequent write fail.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Release);
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    /// Returns only the state-changing calls.
    #[must_use]
    pub fn writes(&self) -> Vec<DeviceCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.is_write())
            .cloned()
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().push(call);
    }

    fn write(&self, call: DeviceCall) -> Result<()> {
        self.record(call);
        if self.reject_writes.load(Ordering::Acquire) {
            return Err(DeviceError::WriteRejected("mock rejects writes".to_string()).into());
        }
        Ok(())
    }
}

impl ThermostatDevice for MockThermostat {
    async fn status(&self) -> Result<RawBatch> {
        self.record(DeviceCall::Status);
        match self.status_replies.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ProtocolError::ConnectionFailed(message).into()),
            None => Ok(RawBatch::default()),
        }
    }

    async fn receive(&self) -> Result<Option<RawBatch>> {
        self.record(DeviceCall::Receive);
        Ok(self.receive_replies.lock().pop_front().flatten())
    }

    async fn send_ping(&self) -> Result<()> {
        self.record(DeviceCall::Ping);
        Ok(())
    }

    async fn set_value(&self, point: u8, value: Value, nowait: bool) -> Result<()> {
        self.write(DeviceCall::SetValue {
            point,
            value,
            nowait,
        })
    }

    async fn turn_on(&self) -> Result<()> {
        self.write(DeviceCall::TurnOn)
    }

    async fn turn_off(&self) -> Result<()> {
        self.write(DeviceCall::TurnOff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_replays_script_then_empty() {
        let mock = MockThermostat::new();
        mock.push_status(RawBatch::error("boom"));

        assert!(mock.status().await.unwrap().is_error());
        assert_eq!(mock.status().await.unwrap(), RawBatch::default());
        assert_eq!(mock.calls(), vec![DeviceCall::Status, DeviceCall::Status]);
    }

    #[tokio::test]
    async fn status_failure_is_transport_error() {
        let mock = MockThermostat::new();
        mock.push_status_failure("refused");
        assert!(mock.status().await.is_err());
    }

    #[tokio::test]
    async fn receive_defaults_to_none() {
        let mock = MockThermostat::new();
        assert_eq!(mock.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_writes_are_still_recorded() {
        let mock = MockThermostat::new();
        mock.reject_writes(true);

        assert!(mock.turn_off().await.is_err());
        assert_eq!(mock.writes(), vec![DeviceCall::TurnOff]);
    }
}
