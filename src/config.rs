// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Values come from `STEPGRAPH_*` environment variables (a `.env` file is
//! loaded first by the binary) and can then be overridden by CLI flags.

use std::env;

use crate::engine::error::EngineError;

/// Round budget applied when a run does not ask for one
pub const DEFAULT_MAX_ROUNDS: u32 = 50;
/// Largest budget a single run may ask for
pub const DEFAULT_MAX_ROUNDS_LIMIT: u32 = 1000;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

pub const ENV_MAX_ROUNDS: &str = "STEPGRAPH_MAX_ROUNDS";
pub const ENV_MAX_ROUNDS_LIMIT: &str = "STEPGRAPH_MAX_ROUNDS_LIMIT";
pub const ENV_WORKERS: &str = "STEPGRAPH_WORKERS";
pub const ENV_HOST: &str = "STEPGRAPH_HOST";
pub const ENV_PORT: &str = "STEPGRAPH_PORT";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Default per-run round budget
    pub max_rounds: u32,
    /// Ceiling on any per-run budget, including caller overrides
    pub max_rounds_limit: u32,
    /// Size of the worker pool draining the submission queue
    pub workers: usize,
    pub host: String,
    pub port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_rounds_limit: DEFAULT_MAX_ROUNDS_LIMIT,
            workers: DEFAULT_WORKERS,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_ROUNDS) {
            config.max_rounds = parse_var(ENV_MAX_ROUNDS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_ROUNDS_LIMIT) {
            config.max_rounds_limit = parse_var(ENV_MAX_ROUNDS_LIMIT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WORKERS) {
            config.workers = parse_var(ENV_WORKERS, &raw)?;
        }
        if let Some(host) = lookup(ENV_HOST) {
            config.host = host;
        }
        if let Some(raw) = lookup(ENV_PORT) {
            config.port = parse_var(ENV_PORT, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_rounds_limit(mut self, limit: u32) -> Self {
        self.max_rounds_limit = limit;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        validate_max_rounds(self.max_rounds, self.max_rounds_limit)?;
        if self.workers == 0 {
            return Err(EngineError::config("workers must be at least 1"));
        }
        if self.host.trim().is_empty() {
            return Err(EngineError::config("host must not be empty"));
        }
        Ok(())
    }

    /// Address to bind the HTTP server to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A round budget must allow at least one node execution and stay within `limit`
pub fn validate_max_rounds(max_rounds: u32, limit: u32) -> Result<u32, EngineError> {
    if max_rounds == 0 {
        return Err(EngineError::config("max_rounds must be at least 1"));
    }
    if max_rounds > limit {
        return Err(EngineError::config(format!(
            "max_rounds {} exceeds the limit of {}",
            max_rounds, limit
        )));
    }
    Ok(max_rounds)
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EngineError::config(format!("{}='{}': {}", key, raw, e)))
}
