//! File-backed storage: one file per key under a base directory.
//!
//! Each file starts with a 16-byte header followed by the value:
//! - `[0..4]` magic `FWDJ`
//! - `[4..6]` version (u16, little-endian)
//! - `[6..14]` expiry (u64 Unix seconds, little-endian, 0 = never)
//! - `[14..16]` reserved
//!
//! Writes go to a temporary file that is renamed over the target, so a
//! reader never sees a half-written value.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use forwarder_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey,
	ValidationError,
};
use tokio::fs;

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};

const MAGIC: &[u8; 4] = b"FWDJ";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 16;

/// TTL of journal namespaces not configured otherwise: 30 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
	expires_at: u64,
}

impl FileHeader {
	fn with_ttl(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs())
		};
		Self { expires_at }
	}

	fn encode(&self) -> [u8; HEADER_SIZE] {
		let mut bytes = [0u8; HEADER_SIZE];
		bytes[0..4].copy_from_slice(MAGIC);
		bytes[4..6].copy_from_slice(&VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
			return Err(StorageError::Backend("missing journal file header".into()));
		}
		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > VERSION {
			return Err(StorageError::Backend(format!(
				"unsupported file version {}",
				version
			)));
		}
		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// TTL per namespace, read from `ttl_<namespace>` keys. Unset namespaces get
/// [`DEFAULT_TTL`]; an explicit 0 keeps entries forever.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = StorageKey::all()
			.filter_map(|key| {
				config
					.get(format!("ttl_{}", key.as_str()))
					.and_then(|v| v.as_integer())
					.map(|secs| (key, Duration::from_secs(secs.max(0) as u64)))
			})
			.collect();
		Self { ttls }
	}

	fn ttl_for(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|ns| ns.parse::<StorageKey>().ok())
			.map(|ns| self.ttls.get(&ns).copied().unwrap_or(DEFAULT_TTL))
			.unwrap_or(Duration::ZERO)
	}
}

pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let data = match fs::read(self.path_for(key)).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StorageError::NotFound),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::decode(&data)?;
		if header.is_expired() {
			return Err(StorageError::NotFound);
		}
		Ok(data[HEADER_SIZE..].to_vec())
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.ttl_config.ttl_for(key));
		let mut file_data = Vec::with_capacity(HEADER_SIZE + value.len());
		file_data.extend_from_slice(&FileHeader::with_ttl(ttl).encode());
		file_data.extend_from_slice(&value);

		let path = self.path_for(key);
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut removed = 0;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			let expired = match fs::read(&path).await {
				Ok(data) => FileHeader::decode(&data).map(|h| h.is_expired()).unwrap_or(false),
				Err(e) => {
					tracing::debug!(path = ?path, error = %e, "Skipping unreadable journal file");
					false
				},
			};
			if expired {
				match fs::remove_file(&path).await {
					Ok(_) => removed += 1,
					Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to remove expired file"),
				}
			}
		}
		Ok(removed)
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		for key in StorageKey::all() {
			optional.push(Field::new(
				format!("ttl_{}", key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(vec![], optional).validate(config)
	}
}

/// Factory function to create file storage from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/journal")
/// - `ttl_submissions`, `ttl_submission_by_tx_hash`: TTL in seconds (default: 30 days, 0 = never)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/journal");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
