// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `moes-bridge` binary.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use moes_bridge::app::{AppContext, format_duration};
use moes_bridge::bridge::Bridge;
use moes_bridge::config::BridgeArgs;
use moes_bridge::engine::SyncEngine;
use moes_bridge::logging;
use moes_bridge::protocol::{MqttBridgeClient, TuyaDevice};
use moes_bridge::subscription::Notifier;

const APP_NAME: &str = "moes-bridge";

/// How long shutdown waits for the MQTT client to flush `Offline`.
const MQTT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let args = BridgeArgs::parse();
    let context = AppContext::new(APP_NAME, args.target_env);

    if let Err(e) = logging::init_logging(context.profile()) {
        eprintln!("{APP_NAME}: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        app = context.app_name(),
        profile = %context.profile(),
        started_at = %context.started_at().to_rfc2822(),
        "Starting"
    );

    let result = run(&args, &context).await;
    context.run_exit_actions();

    tracing::info!(
        duration = %format_duration(context.uptime()),
        "Total run duration"
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Bridge failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &BridgeArgs, context: &AppContext) -> moes_bridge::Result<()> {
    let device = TuyaDevice::builder()
        .device_id(&args.tuya_dev_id)
        .address(&args.tuya_dev_ip)
        .local_key(&args.tuya_dev_local_key)
        .build()?;
    tracing::info!(device = %args.tuya_dev_name, address = %args.tuya_dev_ip, "Device configured");

    let notifier = Arc::new(Notifier::new());

    let mut builder = MqttBridgeClient::builder()
        .host(&args.mqtt_broker_addr)
        .port(args.mqtt_broker_port)
        .topic_root(args.topic_root());
    if let Some((user, password)) = args.credentials() {
        builder = builder.credentials(user, password);
    }
    if let Some(ref path) = args.mqtt_tls_path {
        builder = builder.ca_file(path);
    }
    let mqtt = builder.build(Arc::clone(&notifier)).await?;

    let on_exit = mqtt.clone();
    context.register_on_exit("mqtt", move || {
        if let Err(e) = on_exit.close() {
            tracing::warn!(error = %e, "Failed to close MQTT client");
        }
    });

    let engine = Arc::new(SyncEngine::new(
        args.tuya_dev_name.clone(),
        device,
        notifier,
        args.timing(),
    ));
    let bridge = Bridge::new(engine, mqtt.clone());
    let mut scheduler = bridge.scheduler(args.max_iterations);

    tokio::select! {
        () = scheduler.run() => tracing::info!("Iteration limit reached"),
        () = shutdown_signal() => tracing::info!("Shutdown requested"),
    }

    context.run_exit_actions();
    if tokio::time::timeout(MQTT_CLOSE_TIMEOUT, mqtt.closed()).await.is_err() {
        tracing::warn!("MQTT client did not close in time");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
