//! Hub token acquisition.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use mqtt2cube_core::CoreError;

use crate::cli::{GlobalOpts, TokenArgs};
use crate::error::CliError;

use super::CliContext;

const RETRY_INTERVAL: Duration = Duration::from_secs(5);

pub async fn handle(args: &TokenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = CliContext::load(global, false)?;
    let bridge = ctx.bridge()?;
    let deadline = Instant::now() + ctx.config.token_wait();

    loop {
        match bridge.acquire_token().await {
            Ok(()) => break,
            Err(CoreError::TokenNotIssued { message })
                if args.wait && Instant::now() + RETRY_INTERVAL < deadline =>
            {
                info!(reason = %message, "hub has not issued a token yet, retrying");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !global.quiet {
        eprintln!("Hub token stored");
    }
    Ok(())
}
