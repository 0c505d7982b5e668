//! Environment-variable configuration loader.
//!
//! Grounded on `server::ServerSettings` (`src/server/server.hpp`) and on the
//! teacher's preference for `anyhow` at the binary boundary. Reads the §6
//! EXTERNAL INTERFACES table; required variables produce a descriptive
//! error rather than a panic.

use std::env;

use anyhow::{bail, Context, Result};
use cachekv_common::wire::{DEFAULT_CONN_QUEUE_LIMIT, DEFAULT_NUM_SHARDS, DEFAULT_SOCK_BUF_SIZE};

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub num_shards: usize,
    pub sock_buf_size: usize,
    pub conn_queue_limit: u32,
    pub enable_compression: bool,
    pub metrics_host: String,
    pub metrics_port: u16,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self> {
        let port = required_parse("SERVER_PORT")?;
        let metrics_host = required("METRICS_HOST")?;
        let metrics_port = required_parse("METRICS_PORT")?;

        let settings = ServerSettings {
            port,
            num_shards: optional_parse("NUM_SHARDS", DEFAULT_NUM_SHARDS)?,
            sock_buf_size: optional_parse("SOCK_BUF_SIZE", DEFAULT_SOCK_BUF_SIZE)?,
            conn_queue_limit: optional_parse("CONN_QUEUE_LIMIT", DEFAULT_CONN_QUEUE_LIMIT)?,
            enable_compression: optional_parse("ENABLE_COMPRESSION", true)?,
            metrics_host,
            metrics_port,
        };

        tracing::info!(
            port = settings.port,
            num_shards = settings.num_shards,
            sock_buf_size = settings.sock_buf_size,
            conn_queue_limit = settings.conn_queue_limit,
            enable_compression = settings.enable_compression,
            metrics_host = %settings.metrics_host,
            metrics_port = settings.metrics_port,
            "resolved server settings"
        );

        Ok(settings)
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn required_parse<T: std::str::FromStr>(name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = required(name)?;
    raw.parse()
        .map_err(|err| anyhow::anyhow!("invalid value for {name} ({raw:?}): {err}"))
}

fn optional_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid value for {name} ({raw:?}): {err}")),
        Ok(_) | Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => bail!("{name} is not valid unicode"),
    }
}
