//! On-disk settings for the server and the forwarding proxy.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bridge::BridgeOptions;
use serde::{Deserialize, Serialize};

use crate::cli::TargetArgs;

pub const SCHEMA_VERSION: u32 = 1;

/// `config.json` contents. Every field is optional on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
	pub schema: u32,
	pub listen: String,
	pub port: u16,
	pub target_host: String,
	pub target_port: u16,
	pub preview_max_items: usize,
	pub request_timeout_ms: u64,
	pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
	pub listen: String,
	pub port: u16,
	/// `host:port` of the real debugging endpoint.
	pub backend: String,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			listen: "127.0.0.1".to_string(),
			port: 6080,
			target_host: "127.0.0.1".to_string(),
			target_port: 9222,
			preview_max_items: 10,
			request_timeout_ms: 30_000,
			proxy: ProxyConfig::default(),
		}
	}
}

impl Default for ProxyConfig {
	fn default() -> Self {
		Self {
			listen: "127.0.0.1".to_string(),
			port: 9223,
			backend: "127.0.0.1:9222".to_string(),
		}
	}
}

/// `<config dir>/rdp-bridge/config.json`.
pub fn default_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("rdp-bridge").join("config.json"))
}

impl BridgeConfig {
	/// Loads `explicit` (which must exist), else the default path when
	/// present, else the built-in defaults.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		if let Some(path) = explicit {
			return Self::read(path);
		}
		match default_path() {
			Some(path) if path.exists() => Self::read(&path),
			_ => Ok(Self::default()),
		}
	}

	fn read(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
		let config: Self =
			serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))?;
		if config.schema > SCHEMA_VERSION {
			tracing::warn!(
				target = "bridge",
				schema = config.schema,
				supported = SCHEMA_VERSION,
				"config written by a newer version"
			);
		}
		Ok(config)
	}

	pub fn apply_target(&mut self, args: &TargetArgs) {
		if let Some(host) = &args.target_host {
			self.target_host = host.clone();
		}
		if let Some(port) = args.target_port {
			self.target_port = port;
		}
	}

	/// Base URL of the target's HTTP endpoint.
	pub fn target_url(&self) -> String {
		format!("http://{}:{}", self.target_host, self.target_port)
	}

	pub fn bridge_options(&self) -> BridgeOptions {
		BridgeOptions {
			preview_max_items: self.preview_max_items,
			request_timeout: Duration::from_millis(self.request_timeout_ms),
		}
	}
}
