//! Storage-related types for the relayer submission journal.

use std::str::FromStr;

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::ledger::TransactionHash;

/// Storage keys for different data collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Submission records keyed by signed digest
	Submissions,
	/// Maps transaction hashes to the digest they submitted
	SubmissionByTxHash,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Submissions => "submissions",
			StorageKey::SubmissionByTxHash => "submission_by_tx_hash",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Submissions, Self::SubmissionByTxHash].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"submissions" => Ok(Self::Submissions),
			"submission_by_tx_hash" => Ok(Self::SubmissionByTxHash),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

/// What a submission asked the proxy account to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
	Forward,
	Deploy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
	Pending,
	Confirmed,
	Failed(String),
}

/// Journal entry for one signed intent handed to the ledger.
///
/// The call data is kept verbatim so a dropped transaction can be re-sent
/// without asking the owner to sign again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
	pub digest: B256,
	pub kind: SubmissionKind,
	pub owner: Address,
	pub proxy_account: Address,
	pub call_data: Bytes,
	pub tx_hash: Option<TransactionHash>,
	pub status: SubmissionStatus,
	pub attempts: u32,
	pub created_at: u64,
	pub updated_at: u64,
}
