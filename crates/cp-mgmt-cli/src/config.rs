// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use cp_mgmt_api::{ClientConfig, LoginArgs, ProxyConfig};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// JSON structured logging.
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cp-mgmt", version, about = "Management API command-line client")]
pub struct Args {
    /// JSON client configuration file. Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Management server address.
    #[arg(long)]
    pub server: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// API context, e.g. web_api or gaia_api.
    #[arg(long)]
    pub context: Option<String>,

    #[arg(long)]
    pub api_version: Option<String>,

    /// Expected SHA-256 certificate fingerprint of the server.
    #[arg(long)]
    pub fingerprint: Option<String>,

    /// Proxy URL for API calls.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Skip server identity verification.
    #[arg(long = "unsafe")]
    pub unsafe_mode: bool,

    /// Accept and record an unknown server fingerprint without asking.
    #[arg(long)]
    pub unsafe_auto_accept: bool,

    /// Where accepted fingerprints are recorded.
    #[arg(long)]
    pub fingerprints_file: Option<PathBuf>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long, env = "CP_MGMT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "CP_MGMT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Domain to log in to.
    #[arg(long)]
    pub domain: Option<String>,

    /// Log output format: text or json.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send one API command with a JSON payload.
    Call {
        /// Command name, e.g. show-hosts.
        command: String,
        /// JSON object payload.
        #[arg(default_value = "{}")]
        payload: String,
        /// Return the task reference instead of waiting for the task.
        #[arg(long)]
        no_wait: bool,
        /// Publish the session after the call.
        #[arg(long)]
        publish: bool,
    },
    /// Add hosts host1..hostN with addresses 1.2.3.1..1.2.3.N and publish.
    AddHosts {
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=254))]
        count: u8,
        /// Send all requests before waiting for any of them.
        #[arg(long)]
        concurrent: bool,
    },
    /// Delete hosts host1..hostN and publish.
    DeleteHosts {
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=254))]
        count: u8,
        #[arg(long)]
        concurrent: bool,
    },
    /// Add a host unless one with the same name exists.
    AddHostIfMissing {
        #[arg(long)]
        name: String,
        #[arg(long)]
        ip_address: String,
    },
    /// Add an access rule and publish.
    AddAccessRule {
        #[arg(long)]
        name: String,
        /// Rule position: top, bottom or a rule number.
        #[arg(long, default_value = "top")]
        position: String,
        #[arg(long, default_value = "Network")]
        layer: String,
    },
}

impl Args {
    /// Client configuration from `--config` (or defaults) with flags applied on top.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(context) = &self.context {
            config.context = context.clone();
        }
        if let Some(version) = &self.api_version {
            config.api_version = Some(version.clone());
        }
        if let Some(fingerprint) = &self.fingerprint {
            config.fingerprint = Some(fingerprint.clone());
        }
        if let Some(url) = &self.proxy {
            config.proxy = Some(ProxyConfig {
                url: url.clone(),
                username: None,
                password: None,
            });
        }
        if let Some(path) = &self.fingerprints_file {
            config.fingerprints_file = path.clone();
        }
        config.unsafe_mode |= self.unsafe_mode;
        config.unsafe_auto_accept |= self.unsafe_auto_accept;
        Ok(config)
    }

    /// Login credentials. An API key takes precedence over user and password.
    pub fn login_args(&self) -> Result<LoginArgs> {
        let args = match (&self.api_key, &self.user, &self.password) {
            (Some(key), _, _) => LoginArgs::with_api_key(key),
            (None, Some(user), Some(password)) => LoginArgs::with_password(user, password),
            _ => bail!("--user and --password, or --api-key, are required"),
        };
        Ok(match &self.domain {
            Some(domain) => args.domain(domain),
            None => args,
        })
    }
}
