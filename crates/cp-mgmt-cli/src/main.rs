// SPDX-License-Identifier: Apache-2.0
mod config;
mod workflows;

use crate::config::{Args, LogFormat};
use anyhow::{Context, Result};
use clap::Parser;
use cp_mgmt_api::ApiClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = args.client_config()?;
    let login = args.login_args()?;
    let client = ApiClient::new(config).context("failed to create API client")?;

    client.login(&login).await.context("login failed")?;

    let outcome = workflows::run(&client, &args.command).await;
    let outcome = match outcome {
        Ok(outcome) if outcome.changed => match client.publish().await {
            Ok(_) => Ok(outcome),
            Err(e) => Err(anyhow::Error::new(e).context("publish failed")),
        },
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            if let Err(discard) = client.discard().await {
                warn!(error = %discard, "failed to discard changes");
            }
            Err(e)
        }
    };

    if let Err(e) = client.logout().await {
        warn!(error = %e, "logout failed");
    }

    let outcome = outcome?;
    info!(changed = outcome.changed, "done");
    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    Ok(())
}
