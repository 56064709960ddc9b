// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tuya local-protocol device client.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::frame::{CommandCode, Frame, TuyaCipher};
use crate::codec::RawBatch;
use crate::device::ThermostatDevice;
use crate::error::{DeviceError, ProtocolError, Result};

/// Default Tuya local port.
pub const DEFAULT_TUYA_PORT: u16 = 6668;

/// Configuration for a [`TuyaDevice`].
#[derive(Debug, Clone)]
pub struct TuyaConfig {
    device_id: String,
    address: String,
    local_key: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    retry_delay: Duration,
}

impl Default for TuyaConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            address: String::new(),
            local_key: String::new(),
            port: DEFAULT_TUYA_PORT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Open socket plus bytes and replies not consumed yet.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
    pending: VecDeque<RawBatch>,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(1024),
            pending: VecDeque::new(),
        }
    }
}

/// A thermostat reached over the Tuya 3.3 local protocol.
///
/// The socket is opened on first use and dropped after any I/O or framing
/// error; the next call reconnects. Calls are serialized.
///
/// # Examples
///
/// ```no_run
/// use moes_bridge::device::ThermostatDevice;
/// use moes_bridge::protocol::TuyaDevice;
///
/// # async fn example() -> moes_bridge::Result<()> {
/// let device = TuyaDevice::builder()
///     .device_id("bf0123456789abcdefghij")
///     .address("192.168.1.60")
///     .local_key("0123456789abcdef")
///     .build()?;
///
/// let status = device.status().await?;
/// println!("{:?}", status.dps());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TuyaDevice {
    config: TuyaConfig,
    cipher: TuyaCipher,
    seq: AtomicU32,
    connection: Mutex<Option<Connection>>,
}

impl TuyaDevice {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> TuyaDeviceBuilder {
        TuyaDeviceBuilder::default()
    }

    /// Device id.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    /// Device address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Device port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    fn timestamp() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    fn query_payload(&self) -> Value {
        let id = &self.config.device_id;
        json!({ "gwId": id, "devId": id, "uid": id, "t": Self::timestamp() })
    }

    fn control_payload(&self, point: u8, value: Value) -> Value {
        let id = &self.config.device_id;
        let mut dps = serde_json::Map::new();
        dps.insert(point.to_string(), value);
        json!({
            "devId": id,
            "uid": id,
            "t": Self::timestamp(),
            "dps": dps,
        })
    }

    async fn open<'a>(&self, slot: &'a mut Option<Connection>) -> Result<&'a mut Connection> {
        let connection = match slot.take() {
            Some(connection) => connection,
            None => Connection::new(self.connect_stream().await?),
        };
        Ok(slot.insert(connection))
    }

    async fn connect_stream(&self) -> Result<TcpStream> {
        let target = (self.config.address.as_str(), self.config.port);
        tracing::debug!(
            device = %self.config.device_id,
            address = %self.config.address,
            port = self.config.port,
            "Connecting to device"
        );

        let failure = match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).map_err(ProtocolError::Io)?;
                return Ok(stream);
            }
            Ok(Err(e)) => ProtocolError::ConnectionFailed(format!(
                "{}:{}: {e}",
                self.config.address, self.config.port
            )),
            Err(_) => ProtocolError::Timeout(duration_millis(self.config.connect_timeout)),
        };

        // Pace reconnect attempts against an unreachable device.
        tokio::time::sleep(self.config.retry_delay).await;
        Err(failure.into())
    }

    async fn send(&self, connection: &mut Connection, command: CommandCode, payload: &Value) -> Result<()> {
        let plain = serde_json::to_vec(payload).map_err(crate::error::ParseError::from)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::request(seq, command, self.cipher.seal(command, &plain));

        tracing::trace!(device = %self.config.device_id, seq, ?command, "Sending frame");
        connection.stream.write_all(&frame.encode()?).await.map_err(ProtocolError::Io)?;
        Ok(())
    }

    /// Reads the next frame, or `None` once `deadline` passes.
    async fn read_frame(&self, connection: &mut Connection, deadline: Instant) -> Result<Option<Frame>> {
        loop {
            if let Some((frame, used)) = Frame::decode(&connection.buffer)? {
                connection.buffer.drain(..used);
                return Ok(Some(frame));
            }

            match tokio::time::timeout_at(deadline, connection.stream.read_buf(&mut connection.buffer)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(ProtocolError::ConnectionFailed("connection closed by device".to_string()).into());
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(ProtocolError::Io(e).into()),
            }
        }
    }

    /// Reads frames until one carries a batch, or `None` at `deadline`.
    ///
    /// Empty acknowledgements and heartbeat replies are skipped.
    async fn read_batch(&self, connection: &mut Connection, deadline: Instant) -> Result<Option<RawBatch>> {
        while let Some(frame) = self.read_frame(connection, deadline).await? {
            if frame.command_code() == Some(CommandCode::HeartBeat) || frame.payload.is_empty() {
                tracing::trace!(device = %self.config.device_id, seq = frame.seq, "Skipping empty frame");
                continue;
            }

            let plain = self.cipher.open(&frame.payload)?;
            let text = String::from_utf8_lossy(&plain);
            tracing::trace!(device = %self.config.device_id, payload = %text, "Received payload");
            return Ok(Some(RawBatch::from_json(&text)?));
        }
        Ok(None)
    }

    async fn status_on(&self, slot: &mut Option<Connection>) -> Result<RawBatch> {
        let connection = self.open(slot).await?;
        // A full status supersedes queued write acknowledgements.
        if !connection.pending.is_empty() {
            tracing::debug!(
                device = %self.config.device_id,
                dropped = connection.pending.len(),
                "Discarding queued acknowledgements"
            );
            connection.pending.clear();
        }
        self.send(connection, CommandCode::DpQuery, &self.query_payload()).await?;

        let deadline = Instant::now() + self.config.read_timeout;
        self.read_batch(connection, deadline)
            .await?
            .ok_or_else(|| ProtocolError::Timeout(duration_millis(self.config.read_timeout)).into())
    }

    async fn receive_on(&self, slot: &mut Option<Connection>) -> Result<Option<RawBatch>> {
        let connection = self.open(slot).await?;
        if let Some(batch) = connection.pending.pop_front() {
            return Ok(Some(batch));
        }
        let deadline = Instant::now() + self.config.read_timeout;
        self.read_batch(connection, deadline).await
    }

    async fn ping_on(&self, slot: &mut Option<Connection>) -> Result<()> {
        let id = &self.config.device_id;
        let payload = json!({ "gwId": id, "devId": id });
        let connection = self.open(slot).await?;
        self.send(connection, CommandCode::HeartBeat, &payload).await
    }

    async fn set_value_on(
        &self,
        slot: &mut Option<Connection>,
        point: u8,
        value: Value,
        nowait: bool,
    ) -> Result<()> {
        let payload = self.control_payload(point, value);
        let connection = self.open(slot).await?;
        self.send(connection, CommandCode::Control, &payload).await?;
        if nowait {
            return Ok(());
        }

        let deadline = Instant::now() + self.config.read_timeout;
        match self.read_batch(connection, deadline).await? {
            Some(batch) if batch.is_error() => Err(DeviceError::Reported(
                batch.error_message().unwrap_or_default(),
            )
            .into()),
            // Keep the acknowledgement for the polling loop.
            Some(batch) => {
                connection.pending.push_back(batch);
                Ok(())
            }
            None => {
                tracing::debug!(device = %self.config.device_id, point, "No acknowledgement for write");
                Ok(())
            }
        }
    }

    fn reset_on_error<T>(&self, slot: &mut Option<Connection>, result: &Result<T>) {
        if let Err(e) = result
            && slot.take().is_some()
        {
            tracing::debug!(device = %self.config.device_id, error = %e, "Dropping device socket");
        }
    }
}

impl ThermostatDevice for TuyaDevice {
    async fn status(&self) -> Result<RawBatch> {
        let mut slot = self.connection.lock().await;
        let result = self.status_on(&mut slot).await;
        self.reset_on_error(&mut slot, &result);
        result
    }

    async fn receive(&self) -> Result<Option<RawBatch>> {
        let mut slot = self.connection.lock().await;
        let result = self.receive_on(&mut slot).await;
        self.reset_on_error(&mut slot, &result);
        result
    }

    async fn send_ping(&self) -> Result<()> {
        let mut slot = self.connection.lock().await;
        let result = self.ping_on(&mut slot).await;
        self.reset_on_error(&mut slot, &result);
        result
    }

    async fn set_value(&self, point: u8, value: Value, nowait: bool) -> Result<()> {
        tracing::debug!(device = %self.config.device_id, point, value = %value, nowait, "Writing point");
        let mut slot = self.connection.lock().await;
        let result = self.set_value_on(&mut slot, point, value, nowait).await;
        self.reset_on_error(&mut slot, &result);
        result
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for [`TuyaDevice`].
#[derive(Debug, Default)]
pub struct TuyaDeviceBuilder {
    config: TuyaConfig,
}

impl TuyaDeviceBuilder {
    /// Sets the device id.
    #[must_use]
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.config.device_id = id.into();
        self
    }

    /// Sets the device IP address or host name.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Sets the 16-character local key.
    #[must_use]
    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.config.local_key = key.into();
        self
    }

    /// Sets the port (default: 6668).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the connect timeout (default: 5 seconds).
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets how long a read waits for the device (default: 5 seconds).
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the pause after a failed connect (default: 1 second).
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Builds the device. No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns error if the id or address is missing, or the local key is
    /// not 16 bytes.
    pub fn build(self) -> Result<TuyaDevice> {
        if self.config.device_id.is_empty() {
            return Err(DeviceError::InvalidConfiguration("device id is required".to_string()).into());
        }
        if self.config.address.is_empty() {
            return Err(ProtocolError::InvalidAddress("device address is required".to_string()).into());
        }
        let cipher = TuyaCipher::new(&self.config.local_key)
            .map_err(|e| DeviceError::InvalidConfiguration(e.to_string()))?;

        Ok(TuyaDevice {
            config: self.config,
            cipher,
            seq: AtomicU32::new(1),
            connection: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> TuyaDeviceBuilder {
        TuyaDevice::builder()
            .device_id("bf0123456789abcdefghij")
            .address("127.0.0.1")
            .local_key("0123456789abcdef")
    }

    #[test]
    fn builder_defaults() {
        let builder = TuyaDeviceBuilder::default();
        assert_eq!(builder.config.port, 6668);
        assert_eq!(builder.config.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn build_validates_configuration() {
        assert!(builder().build().is_ok());
        assert!(builder().local_key("short").build().is_err());
        assert!(builder().device_id("").build().is_err());
        assert!(matches!(
            builder().address("").build(),
            Err(crate::Error::Protocol(ProtocolError::InvalidAddress(_)))
        ));
    }

    #[test]
    fn control_payload_shape() {
        let device = builder().build().unwrap();
        let payload = device.control_payload(2, json!(41));

        assert_eq!(payload["devId"], "bf0123456789abcdefghij");
        assert_eq!(payload["dps"], json!({ "2": 41 }));
        assert!(payload["t"].is_string());
    }

    #[test]
    fn query_payload_shape() {
        let device = builder().build().unwrap();
        let payload = device.query_payload();

        assert_eq!(payload["gwId"], payload["devId"]);
        assert_eq!(payload["uid"], payload["devId"]);
    }

    #[tokio::test]
    async fn unreachable_device_reports_transport_error() {
        // Bind then drop a listener to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let device = builder()
            .port(port)
            .retry_delay(Duration::from_millis(1))
            .build()
            .unwrap();

        assert!(matches!(device.status().await, Err(crate::Error::Protocol(_))));
    }
}
