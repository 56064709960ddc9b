// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT side of the bridge.
//!
//! Topic layout under a configurable root:
//!
//! - `{root}/LWT`: `Online` / `Offline`, retained, also the last will
//! - `{root}/STATE`: JSON state payload
//! - `{root}/COMMAND`: JSON command payload, subscribed
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use moes_bridge::protocol::MqttBridgeClient;
//! use moes_bridge::subscription::Notifier;
//!
//! # async fn example() -> moes_bridge::Result<()> {
//! let notifier = Arc::new(Notifier::new());
//! let client = MqttBridgeClient::builder()
//!     .host("broker.local")
//!     .port(8883)
//!     .credentials("user", "password")
//!     .ca_file("/etc/ssl/certs/broker-ca.pem")
//!     .topic_root("home/hvac/thermostat/BHT-002-GALW")
//!     .build(notifier)
//!     .await?;
//!
//! client.publish_availability(true)?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration,
    Transport,
};
use tokio::sync::watch;

use crate::error::{ProtocolError, Result};
use crate::state::ThermostatState;
use crate::subscription::Notifier;

/// Default broker port (MQTT over TLS).
pub const DEFAULT_MQTT_PORT: u16 = 8883;

/// Availability payload while the bridge runs.
pub const ONLINE: &str = "Online";

/// Availability payload once the bridge is gone.
pub const OFFLINE: &str = "Offline";

/// Pause after an event loop error before polling again.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Returns the default topic root for a device name.
#[must_use]
pub fn default_topic_root(device_name: &str) -> String {
    format!("home/hvac/thermostat/{device_name}")
}

/// The three bridge topics derived from one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTopics {
    lwt: String,
    state: String,
    command: String,
}

impl BridgeTopics {
    /// Derives the topics from `root`. A trailing `/` is ignored.
    #[must_use]
    pub fn new(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            lwt: format!("{root}/LWT"),
            state: format!("{root}/STATE"),
            command: format!("{root}/COMMAND"),
        }
    }

    /// Availability topic.
    #[must_use]
    pub fn lwt(&self) -> &str {
        &self.lwt
    }

    /// State topic.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Command topic.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Configuration for the bridge's broker connection.
#[derive(Debug, Clone)]
pub struct MqttBridgeConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    ca_file: Option<PathBuf>,
    topic_root: String,
    client_id: Option<String>,
    keep_alive: Duration,
}

impl Default for MqttBridgeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_MQTT_PORT,
            credentials: None,
            ca_file: None,
            topic_root: String::new(),
            client_id: None,
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// Connection from the bridge to the MQTT broker.
///
/// Cheaply cloneable. Inbound commands are handed to the [`Notifier`] the
/// client was built with; state is published with
/// [`publish_state`](Self::publish_state).
#[derive(Clone)]
pub struct MqttBridgeClient {
    inner: Arc<MqttBridgeInner>,
}

struct MqttBridgeInner {
    client: AsyncClient,
    config: MqttBridgeConfig,
    topics: BridgeTopics,
    notifier: Arc<Notifier>,
    connected: AtomicBool,
    closing: AtomicBool,
    closed: watch::Sender<bool>,
}

impl MqttBridgeClient {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> MqttBridgeClientBuilder {
        MqttBridgeClientBuilder::default()
    }

    /// Returns whether a ConnAck has been received since the last error.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Topics in use.
    #[must_use]
    pub fn topics(&self) -> &BridgeTopics {
        &self.inner.topics
    }

    /// Publishes `state` on the state topic.
    ///
    /// Never blocks; the message is queued for the event loop.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails or the request queue is full.
    pub fn publish_state(&self, state: &ThermostatState) -> Result<()> {
        let payload = state.to_payload()?;
        tracing::debug!(topic = %self.inner.topics.state, payload = %payload, "Publishing state");
        self.inner
            .client
            .try_publish(&self.inner.topics.state, QoS::AtLeastOnce, false, payload)
            .map_err(ProtocolError::Mqtt)?;
        Ok(())
    }

    /// Publishes `Online` or `Offline` (retained) on the availability topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request queue is full.
    pub fn publish_availability(&self, online: bool) -> Result<()> {
        let payload = if online { ONLINE } else { OFFLINE };
        self.inner
            .client
            .try_publish(&self.inner.topics.lwt, QoS::AtLeastOnce, true, payload)
            .map_err(ProtocolError::Mqtt)?;
        Ok(())
    }

    /// Publishes `Offline` and asks the event loop to disconnect.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub fn close(&self) -> Result<()> {
        tracing::info!(
            host = %self.inner.config.host,
            port = self.inner.config.port,
            "Disconnecting from MQTT broker"
        );
        self.inner.closing.store(true, Ordering::Release);
        if let Err(e) = self.publish_availability(false) {
            tracing::warn!(error = %e, "Failed to queue Offline message");
        }
        self.inner
            .client
            .try_disconnect()
            .map_err(ProtocolError::Mqtt)?;
        Ok(())
    }

    /// Waits until the event loop has stopped.
    pub async fn closed(&self) {
        let mut closed = self.inner.closed.subscribe();
        // The sender lives in `inner`, so the channel cannot close under us.
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Handles an inbound publish.
    fn route_message(&self, topic: &str, payload: &str) {
        if topic != self.inner.topics.command {
            tracing::debug!(topic = %topic, "Ignoring message on unexpected topic");
            return;
        }

        tracing::info!(topic = %topic, payload = %payload, "Command received");
        if let Err(e) = self.inner.notifier.dispatch_command_payload(payload) {
            tracing::warn!(payload = %payload, error = %e, "Ignoring malformed command");
        }
    }

    fn on_connected(&self) {
        self.inner.connected.store(true, Ordering::Release);
        tracing::info!(
            host = %self.inner.config.host,
            port = self.inner.config.port,
            "Connected to MQTT broker"
        );

        if let Err(e) = self.publish_availability(true) {
            tracing::warn!(error = %e, "Failed to queue Online message");
        }
        if let Err(e) = self
            .inner
            .client
            .try_subscribe(&self.inner.topics.command, QoS::AtLeastOnce)
        {
            tracing::error!(topic = %self.inner.topics.command, error = %e, "Failed to subscribe");
        }
    }
}

impl std::fmt::Debug for MqttBridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBridgeClient")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("topics", &self.inner.topics)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Builder for [`MqttBridgeClient`].
#[derive(Debug, Default)]
pub struct MqttBridgeClientBuilder {
    config: MqttBridgeConfig,
}

impl MqttBridgeClientBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 8883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Enables TLS, trusting the CA certificate in `path` (PEM).
    #[must_use]
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_file = Some(path.into());
        self
    }

    /// Sets the topic root.
    #[must_use]
    pub fn topic_root(mut self, root: impl Into<String>) -> Self {
        self.config.topic_root = root.into();
        self
    }

    /// Sets the client id (default: random).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive interval (default: 60 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Starts the client and its event loop.
    ///
    /// The connection itself is established by the event loop; this returns
    /// without waiting for the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the host or topic root is missing, or the CA file
    /// cannot be read.
    pub async fn build(self, notifier: Arc<Notifier>) -> Result<MqttBridgeClient> {
        let (client, event_loop) = self.build_parts(notifier)?;

        let client_clone = client.clone();
        tokio::spawn(async move {
            handle_bridge_events(event_loop, client_clone).await;
        });

        Ok(client)
    }

    fn build_parts(self, notifier: Arc<Notifier>) -> Result<(MqttBridgeClient, EventLoop)> {
        let config = self.config;
        if config.host.is_empty() {
            return Err(ProtocolError::InvalidAddress("MQTT broker host is required".to_string()).into());
        }
        if config.topic_root.is_empty() {
            return Err(ProtocolError::InvalidAddress("MQTT topic root is required".to_string()).into());
        }

        let topics = BridgeTopics::new(&config.topic_root);
        let client_id = config.client_id.clone().unwrap_or_else(random_client_id);

        let mut mqtt_options = MqttOptions::new(&client_id, &config.host, config.port);
        mqtt_options.set_keep_alive(config.keep_alive);
        mqtt_options.set_clean_session(true);
        mqtt_options.set_last_will(LastWill::new(
            topics.lwt(),
            OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));

        if let Some((ref username, ref password)) = config.credentials {
            mqtt_options.set_credentials(username, password);
        }

        if let Some(ref path) = config.ca_file {
            let ca = std::fs::read(path).map_err(ProtocolError::Io)?;
            mqtt_options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        tracing::debug!(
            client_id = %client_id,
            host = %config.host,
            port = config.port,
            tls = config.ca_file.is_some(),
            "Configured MQTT client"
        );

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let (closed, _) = watch::channel(false);

        let inner = MqttBridgeInner {
            client,
            config,
            topics,
            notifier,
            connected: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            closed,
        };

        Ok((
            MqttBridgeClient {
                inner: Arc::new(inner),
            },
            event_loop,
        ))
    }
}

fn random_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("moes_bridge_{}", &id[..8])
}

/// Drives the MQTT event loop until a disconnect is requested.
async fn handle_bridge_events(mut event_loop: EventLoop, client: MqttBridgeClient) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT ConnAck");
                client.on_connected();
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match std::str::from_utf8(&publish.payload) {
                    Ok(payload) => client.route_message(&publish.topic, payload),
                    Err(e) => {
                        tracing::warn!(topic = %publish.topic, error = %e, "Ignoring non-UTF-8 payload");
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                client.inner.connected.store(false, Ordering::Release);
                if client.inner.closing.load(Ordering::Acquire) {
                    break;
                }
                tracing::error!(error = %e, "MQTT event loop error");
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }

    client.inner.connected.store(false, Ordering::Release);
    client.inner.closed.send_replace(true);
}
