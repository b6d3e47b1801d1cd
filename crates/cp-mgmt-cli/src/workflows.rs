// SPDX-License-Identifier: Apache-2.0
//! Scripted workflows run inside one logged-in session.

use crate::config::Command;
use anyhow::{Context, Result};
use cp_mgmt_api::{ApiClient, ApiRequest, ApiResponse, ErrorKind};
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::info;

/// Result of a workflow and whether it left unpublished changes.
#[derive(Debug)]
pub struct Outcome {
    pub output: Value,
    pub changed: bool,
}

impl Outcome {
    fn read(output: Value) -> Self {
        Self {
            output,
            changed: false,
        }
    }

    fn changed(output: Value) -> Self {
        Self {
            output,
            changed: true,
        }
    }
}

/// Host names and addresses `host{i}` / `1.2.3.{i}` for `i` in `1..=count`.
pub fn host_specs(count: u8) -> Vec<(String, String)> {
    (1..=count)
        .map(|i| (format!("host{i}"), format!("1.2.3.{i}")))
        .collect()
}

pub async fn run(client: &ApiClient, command: &Command) -> Result<Outcome> {
    match command {
        Command::Call {
            command,
            payload,
            no_wait,
            publish,
        } => {
            let payload: Value =
                serde_json::from_str(payload).context("payload is not valid JSON")?;
            let mut request = ApiRequest::new(command.as_str()).payload(payload);
            if *no_wait {
                request = request.no_wait();
            }
            let response = client.call(request).await?;
            if *publish {
                Ok(Outcome::changed(response.data))
            } else {
                Ok(Outcome::read(response.data))
            }
        }
        Command::AddHosts { count, concurrent } => {
            let calls = host_specs(*count).into_iter().map(|(name, ip)| {
                json!({"name": name, "ip-address": ip})
            });
            let added = send_all(client, "add-host", calls, *concurrent).await?;
            Ok(Outcome::changed(json!({ "added": added })))
        }
        Command::DeleteHosts { count, concurrent } => {
            let calls = host_specs(*count)
                .into_iter()
                .map(|(name, _)| json!({ "name": name }));
            let deleted = send_all(client, "delete-host", calls, *concurrent).await?;
            Ok(Outcome::changed(json!({ "deleted": deleted })))
        }
        Command::AddHostIfMissing { name, ip_address } => {
            add_host_if_missing(client, name, ip_address).await
        }
        Command::AddAccessRule {
            name,
            position,
            layer,
        } => {
            let response = client
                .api_call(
                    "add-access-rule",
                    json!({"name": name, "position": position, "layer": layer}),
                )
                .await?;
            Ok(Outcome::changed(response.data))
        }
    }
}

/// Send `command` once per payload, either one at a time or all at once.
async fn send_all(
    client: &ApiClient,
    command: &str,
    payloads: impl Iterator<Item = Value>,
    concurrent: bool,
) -> Result<usize> {
    let responses: Vec<ApiResponse> = if concurrent {
        join_all(payloads.map(|payload| client.api_call(command, payload)))
            .await
            .into_iter()
            .collect::<Result<_, _>>()?
    } else {
        let mut responses = Vec::new();
        for payload in payloads {
            responses.push(client.api_call(command, payload).await?);
        }
        responses
    };
    info!(command, count = responses.len(), "all requests finished");
    Ok(responses.len())
}

async fn add_host_if_missing(client: &ApiClient, name: &str, ip_address: &str) -> Result<Outcome> {
    match client.api_call("show-host", json!({ "name": name })).await {
        Ok(existing) => {
            info!(name, "host already exists");
            return Ok(Outcome::read(existing.data));
        }
        Err(e) if e.kind() == ErrorKind::Status => {
            info!(name, "host not found, adding it");
        }
        Err(e) => return Err(e.into()),
    }
    let added = client
        .api_call("add-host", json!({"name": name, "ip-address": ip_address}))
        .await?;
    Ok(Outcome::changed(added.data))
}
