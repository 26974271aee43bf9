//! Configuration for the meta-transaction forwarder.
//!
//! Configuration is TOML. String values may reference environment variables
//! as `${VAR}` or `${VAR:-default}`; references are resolved before parsing.
//!
//! ## Modular Configuration Support
//!
//! A file may pull in others with `include = ["ledger.toml", "keys.toml"]`.
//! Each top-level section must appear in exactly one file.

#[cfg(feature = "testing")]
pub mod builders {
	pub mod config;
}
mod loader;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use alloy_primitives::Address;
use forwarder_types::{ReplayProtectionKind, SequencePolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Only the message; the default rendering repeats the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub forwarder: ForwarderConfig,
	pub ledger: LedgerConfig,
	pub account: AccountConfig,
	pub storage: StorageConfig,
	pub replay_protection: ReplayProtectionConfig,
}

/// Identity of this forwarder deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwarderConfig {
	/// Name used in logs.
	pub id: String,
	/// Chain id bound into every digest.
	pub chain_id: u64,
	/// Proxy hub address. Absent until the hub is deployed.
	pub hub: Option<Address>,
}

/// Ledger backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of ledger implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Confirmation depth before a submission counts as durable.
	#[serde(default = "default_confirmations")]
	pub min_confirmations: u64,
}

fn default_confirmations() -> u64 {
	1
}

/// Signing identity used for intents and for relaying.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Storage backend of the submission journal.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds between sweeps of expired entries.
	#[serde(default = "default_cleanup_interval")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval() -> u64 {
	3600
}

/// Which authority signs are bound to, and how tokens are drawn from it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayProtectionConfig {
	pub strategy: ReplayProtectionKind,
	/// Authority address. Absent until the authority is deployed.
	pub authority: Option<Address>,
	/// Multinonce queues or BitFlip word indices to draw tokens from.
	#[serde(default = "default_lanes")]
	pub lanes: Vec<u64>,
	/// Queue count of a Multinonce authority deployed by this tool.
	#[serde(default = "default_queues")]
	pub queues: u64,
	/// Ordering rule of a Multinonce authority deployed by this tool.
	#[serde(default)]
	pub policy: SequencePolicy,
}

fn default_lanes() -> Vec<u64> {
	vec![0]
}

fn default_queues() -> u64 {
	1
}

const MAX_CONFIG_BYTES: usize = 1 << 20;

static ENV_REFERENCE: LazyLock<Result<Regex, regex::Error>> =
	LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}"));

/// Substitutes `${NAME}` and `${NAME:-fallback}` references with the
/// environment. A reference without a fallback to an unset variable fails.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration is {} bytes, limit is {}",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}
	let pattern = ENV_REFERENCE
		.as_ref()
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut unset = None;
	let resolved = pattern.replace_all(input, |caps: &regex::Captures<'_>| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(fallback)) => fallback.as_str().to_owned(),
			(Err(_), None) => {
				unset.get_or_insert_with(|| name.to_owned());
				String::new()
			},
		}
	});
	match unset {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		loader::load(Path::new(path)).await
	}

	/// Table of the primary ledger implementation.
	pub fn ledger_implementation(&self) -> Option<&toml::Value> {
		self.ledger.implementations.get(&self.ledger.primary)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		let forwarder = &self.forwarder;
		ensure(!forwarder.id.is_empty(), || "forwarder.id cannot be empty".into())?;
		ensure(forwarder.chain_id > 0, || "forwarder.chain_id must be greater than 0".into())?;
		ensure(forwarder.hub != Some(Address::ZERO), || {
			"forwarder.hub cannot be the zero address".into()
		})?;

		check_selection("ledger", &self.ledger.primary, &self.ledger.implementations)?;
		check_selection("account", &self.account.primary, &self.account.implementations)?;
		check_selection("storage", &self.storage.primary, &self.storage.implementations)?;

		let confirmations = self.ledger.min_confirmations;
		ensure((1..=100).contains(&confirmations), || {
			format!("ledger.min_confirmations must be within 1..=100, got {}", confirmations)
		})?;
		let ledger_chain = self
			.ledger_implementation()
			.and_then(|table| table.get("chain_id"))
			.and_then(toml::Value::as_integer);
		if let Some(chain) = ledger_chain {
			ensure(chain == forwarder.chain_id as i64, || {
				format!(
					"ledger '{}' is configured for chain {} but forwarder.chain_id is {}",
					self.ledger.primary, chain, forwarder.chain_id
				)
			})?;
		}

		let sweep = self.storage.cleanup_interval_seconds;
		ensure((1..=86_400).contains(&sweep), || {
			format!("storage.cleanup_interval_seconds must be within 1..=86400, got {}", sweep)
		})?;

		let replay = &self.replay_protection;
		ensure(replay.authority != Some(Address::ZERO), || {
			"replay_protection.authority cannot be the zero address".into()
		})?;
		ensure(!replay.lanes.is_empty(), || "replay_protection.lanes cannot be empty".into())?;
		if replay.strategy == ReplayProtectionKind::Multinonce {
			ensure(replay.queues > 0, || "replay_protection.queues must be at least 1".into())?;
			if let Some(lane) = replay.lanes.iter().find(|lane| **lane >= replay.queues) {
				return Err(ConfigError::Validation(format!(
					"lane {} is outside the {} configured queues",
					lane, replay.queues
				)));
			}
		}
		Ok(())
	}
}

fn ensure(holds: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
	if holds {
		Ok(())
	} else {
		Err(ConfigError::Validation(message()))
	}
}

/// The primary must name one of the configured implementation tables.
fn check_selection(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	ensure(!implementations.is_empty(), || {
		format!("[{}.implementations] has no entries", component)
	})?;
	ensure(implementations.contains_key(primary), || {
		let mut names: Vec<&str> = implementations.keys().map(String::as_str).collect();
		names.sort_unstable();
		format!(
			"{}.primary '{}' is not one of the configured implementations [{}]",
			component,
			primary,
			names.join(", ")
		)
	})
}

/// Parses a TOML string, resolving environment variables and validating.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
