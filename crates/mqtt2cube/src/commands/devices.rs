//! Device listing.

use std::time::Duration;

use tabled::Tabled;

use mqtt2cube_core::{Bridge, DeviceSummary};

use crate::cli::{DevicesArgs, DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::CliContext;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Synced")]
    synced: String,
}

fn row(d: &DeviceSummary, color: bool) -> DeviceRow {
    DeviceRow {
        id: d.id.to_string(),
        name: d.name.clone(),
        category: d.category.to_string(),
        online: output::flag(d.online, color),
        synced: output::flag(d.synced, color),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: &DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = CliContext::load(global, false)?;
    let devices = with_discovery(&ctx, &args.discover, |bridge| async move {
        bridge.device_list().await
    })
    .await?;

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &devices,
        |d| row(d, color),
        |d| d.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Connect, let discovery populate the cache, run `f`, disconnect.
pub async fn with_discovery<F, Fut, T>(
    ctx: &CliContext,
    discover: &DiscoverArgs,
    f: F,
) -> Result<T, CliError>
where
    F: FnOnce(Bridge) -> Fut,
    Fut: Future<Output = Result<T, mqtt2cube_core::CoreError>>,
{
    let wait = Duration::from_secs(discover.discover_secs);
    let result = Bridge::oneshot(
        ctx.bridge_config.clone(),
        std::sync::Arc::clone(&ctx.settings),
        |bridge| async move {
            tracing::info!(secs = wait.as_secs(), "collecting discovery messages");
            tokio::time::sleep(wait).await;
            f(bridge).await
        },
    )
    .await?;
    Ok(result)
}
