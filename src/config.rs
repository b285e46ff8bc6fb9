// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Connection settings stored in `~/.dockpull/config.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{DashboardClient, DEFAULT_DASHBOARD_URL};

/// Environment variable overriding the dashboard URL.
pub const URL_ENV_VAR: &str = "DOCKPULL_URL";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Dashboard base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for search and trigger requests, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Number of search results to show (default: 5)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_base_url() -> String {
    DEFAULT_DASHBOARD_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_results() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

impl Config {
    /// Apply `DOCKPULL_URL` and an explicit `--url`, in that order.
    pub fn with_overrides(mut self, env_url: Option<String>, cli_url: Option<String>) -> Self {
        if let Some(url) = env_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(url) = cli_url {
            self.base_url = url;
        }
        self
    }

    /// Build a client from these settings.
    pub fn client(&self) -> DashboardClient {
        DashboardClient::with_url(&self.base_url)
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let config_dir = home.join(".dockpull");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.json"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &config_path()?)
}

/// Load from an explicit path; a missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
