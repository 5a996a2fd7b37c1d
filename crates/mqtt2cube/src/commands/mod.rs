//! Command dispatch: CLI args -> bridge operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod run;
pub mod settings;
pub mod sync;
pub mod token;

use std::sync::Arc;

use mqtt2cube_config::{Config, FileSettings};
use mqtt2cube_core::{Bridge, BridgeConfig, SettingsStore};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a bridge-bound command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(&args, global).await,
        Command::Devices(args) => devices::handle(&args, global).await,
        Command::Sync(args) => sync::sync(args, global).await,
        Command::Unsync(args) => sync::unsync(args, global).await,
        Command::Token(args) => token::handle(&args, global).await,
        Command::AutoSync(args) => settings::auto_sync(&args, global),
        Command::Mqtt(args) => settings::mqtt(args, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Bridge {
            code: mqtt2cube_core::result_code::INTERNAL,
            message: "command is handled before dispatch".into(),
        }),
    }
}

// ── Shared context ───────────────────────────────────────────────────

/// Loaded configuration plus the persistent settings it points at.
pub struct CliContext {
    pub config: Config,
    pub bridge_config: BridgeConfig,
    pub settings: Arc<dyn SettingsStore>,
}

impl CliContext {
    pub fn load(global: &GlobalOpts, dev: bool) -> Result<Self, CliError> {
        let config = load_config(global)?;
        let bridge_config = config.to_bridge_config(dev)?;
        let settings: Arc<dyn SettingsStore> = Arc::new(FileSettings::open(config.state_path())?);
        Ok(Self {
            config,
            bridge_config,
            settings,
        })
    }

    /// A bridge that has not been started.
    pub fn bridge(&self) -> Result<Bridge, CliError> {
        Ok(Bridge::new(
            self.bridge_config.clone(),
            Arc::clone(&self.settings),
        )?)
    }
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(mqtt2cube_config::config_path);
    Ok(mqtt2cube_config::load_config_from(&path)?)
}
