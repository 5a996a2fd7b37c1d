//! Daemon mode.

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use mqtt2cube_core::{Bridge, BridgeEvent, CoreError};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

use super::CliContext;

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = CliContext::load(global, args.dev)?;
    let bridge = ctx.bridge()?;
    let mut events = bridge.events();

    if !start_until_connected(&bridge).await? {
        bridge.shutdown().await;
        return Ok(());
    }
    info!(hub = %ctx.bridge_config.hub_url, "bridge running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "UI event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    bridge.shutdown().await;
    Ok(())
}

/// Keep trying the stored broker until it answers. `Ok(false)` means
/// Ctrl-C arrived first.
async fn start_until_connected(bridge: &Bridge) -> Result<bool, CliError> {
    let delay = bridge.config().mqtt.reconnect_delay;
    loop {
        match bridge.start().await {
            Ok(()) => return Ok(true),
            Err(CoreError::MqttConnectFailed { host, port, reason }) => {
                warn!(%host, port, %reason, "broker unreachable, retrying");
            }
            Err(e) => {
                bridge.shutdown().await;
                return Err(e.into());
            }
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(false),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

fn log_event(event: &BridgeEvent) {
    let data = serde_json::to_value(event)
        .ok()
        .and_then(|mut v| v.get_mut("data").map(serde_json::Value::take))
        .unwrap_or_default();
    info!(event = event.name(), data = %data, "bridge event");
}
