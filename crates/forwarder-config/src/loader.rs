//! Reading a configuration that is split over several files.
//!
//! The entry file may name other files under `include`. Included files are
//! resolved against the entry file's directory, may not include further
//! files, and may not repeat a top-level section.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{resolve_env_vars, Config, ConfigError};

/// Reads `path`, merges its includes and parses the result.
pub(crate) async fn load(path: &Path) -> Result<Config, ConfigError> {
	let base = path.parent().unwrap_or_else(|| Path::new("."));
	let mut root = read_table(path).await?;

	let includes = match root.remove("include") {
		None => return finish(root),
		Some(value) => include_list(value)?,
	};

	let mut origin: HashMap<String, PathBuf> = root
		.keys()
		.map(|section| (section.clone(), path.to_path_buf()))
		.collect();
	let mut seen = vec![canonical(path).await?];

	for include in includes {
		let file = base.join(include);
		let canon = canonical(&file).await?;
		if seen.contains(&canon) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canon.display()
			)));
		}
		seen.push(canon);

		let sections = read_table(&file).await?;
		if sections.contains_key("include") {
			return Err(ConfigError::Validation(format!(
				"Nested include in {} is not supported",
				file.display()
			)));
		}
		for (section, value) in sections {
			if let Some(first) = origin.insert(section.clone(), file.clone()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}",
					section,
					first.display(),
					file.display()
				)));
			}
			root.insert(section, value);
		}
	}
	finish(root)
}

async fn canonical(path: &Path) -> Result<PathBuf, ConfigError> {
	tokio::fs::canonicalize(path).await.map_err(|e| {
		ConfigError::Io(std::io::Error::new(
			e.kind(),
			format!("Configuration file not found: {}", path.display()),
		))
	})
}

/// Reads one file with environment references substituted.
async fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
	let text = tokio::fs::read_to_string(path).await?;
	Ok(toml::from_str(&resolve_env_vars(&text)?)?)
}

/// Re-serializes the merged table so it is validated like a single file.
fn finish(root: toml::Table) -> Result<Config, ConfigError> {
	toml::to_string(&root)
		.map_err(|e| ConfigError::Parse(format!("Failed to serialize combined config: {}", e)))?
		.parse()
}

fn include_list(value: toml::Value) -> Result<Vec<String>, ConfigError> {
	match value {
		toml::Value::String(path) => Ok(vec![path]),
		toml::Value::Array(items) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(path),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
