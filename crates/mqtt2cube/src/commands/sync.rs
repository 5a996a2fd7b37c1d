//! Sync / unsync handlers.

use tabled::Tabled;

use mqtt2cube_core::MacAddress;

use crate::cli::{GlobalOpts, SyncArgs, UnsyncArgs};
use crate::error::CliError;
use crate::output;

use super::CliContext;
use super::devices::with_discovery;

#[derive(Tabled)]
struct SyncedRow {
    #[tabled(rename = "Synced")]
    mac: String,
}

pub async fn sync(args: SyncArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = CliContext::load(global, false)?;

    let synced: Vec<MacAddress> = match args.mac {
        Some(raw) if !args.all => {
            let mac = MacAddress::new(raw);
            let target = mac.clone();
            with_discovery(&ctx, &args.discover, |bridge| async move {
                bridge.sync_device(&target).await
            })
            .await?;
            vec![mac]
        }
        _ => {
            with_discovery(&ctx, &args.discover, |bridge| async move {
                bridge.sync_all().await
            })
            .await?
        }
    };

    if synced.is_empty() {
        if !global.quiet {
            eprintln!("Nothing to sync");
        }
        return Ok(());
    }
    let out = output::render_list(
        &global.output,
        &synced,
        |m| SyncedRow { mac: m.to_string() },
        ToString::to_string,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn unsync(args: UnsyncArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = CliContext::load(global, false)?;
    let mac = MacAddress::new(&args.mac);
    let target = mac.clone();
    with_discovery(&ctx, &args.discover, |bridge| async move {
        bridge.unsync_device(&target).await
    })
    .await?;

    if !global.quiet {
        eprintln!("Device {mac} removed from the hub");
    }
    Ok(())
}
