//! Auto-sync flag and MQTT broker settings.

use secrecy::SecretString;
use serde::Serialize;

use mqtt2cube_core::MqttSettings;

use crate::cli::{AutoSyncArgs, GlobalOpts, MqttArgs, MqttCommand, MqttSetArgs, Toggle};
use crate::error::CliError;
use crate::output;

use super::CliContext;

// ── Auto-sync ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct AutoSyncView {
    auto_sync: bool,
}

pub fn auto_sync(args: &AutoSyncArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = CliContext::load(global, false)?;
    let bridge = ctx.bridge()?;

    if let Some(state) = args.state {
        bridge.set_auto_sync(matches!(state, Toggle::On))?;
    }

    let view = AutoSyncView {
        auto_sync: bridge.auto_sync()?,
    };
    let out = output::render_single(
        &global.output,
        &view,
        |v| format!("auto-sync: {}", on_off(v.auto_sync)),
        |v| on_off(v.auto_sync).into(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

// ── MQTT broker ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct BrokerView {
    host: String,
    port: u16,
    username: Option<String>,
    password_set: bool,
}

impl From<&MqttSettings> for BrokerView {
    fn from(s: &MqttSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            username: s.username.clone(),
            password_set: s.password.is_some(),
        }
    }
}

fn detail(v: &BrokerView) -> String {
    [
        format!("Host:     {}", v.host),
        format!("Port:     {}", v.port),
        format!("Username: {}", v.username.as_deref().unwrap_or("-")),
        format!("Password: {}", if v.password_set { "****" } else { "-" }),
    ]
    .join("\n")
}

pub async fn mqtt(args: MqttArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = CliContext::load(global, false)?;
    let bridge = ctx.bridge()?;

    match args.command {
        MqttCommand::Show => {
            let view = BrokerView::from(&bridge.mqtt_broker()?);
            let out = output::render_single(&global.output, &view, detail, |v| {
                format!("{}:{}", v.host, v.port)
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        MqttCommand::Set(set) => {
            let settings = broker_settings(set);
            let result = bridge.set_mqtt_broker(settings.clone()).await;
            bridge.shutdown().await;
            result?;
            if !global.quiet {
                eprintln!("Connected to {}:{}, settings stored", settings.host, settings.port);
            }
            Ok(())
        }
    }
}

fn broker_settings(args: MqttSetArgs) -> MqttSettings {
    MqttSettings {
        host: args.host,
        port: args.port,
        username: args.username.filter(|u| !u.is_empty()),
        password: args.password.map(SecretString::from),
    }
}
