//! Journal of submissions handed to the ledger.
//!
//! Each signed intent is recorded under its digest together with the exact
//! call data, before it is sent, so it can be re-sent verbatim even when the
//! process dies between sending and recording the hash.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use forwarder_storage::{StorageError, StorageService};
use forwarder_types::{
	current_timestamp, ForwarderError, StorageKey, SubmissionKind, SubmissionRecord,
	SubmissionStatus, TransactionHash,
};

fn storage_error(err: StorageError) -> ForwarderError {
	ForwarderError::SubmissionFailure(format!("journal: {}", err))
}

fn digest_key(digest: &B256) -> String {
	hex::encode(digest)
}

pub struct SubmissionJournal {
	storage: Arc<StorageService>,
}

impl SubmissionJournal {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Writes the intent ahead of sending it: a fresh record, or a new
	/// attempt of a known one. The attempt has no transaction hash until
	/// [`attach`](Self::attach) is called.
	pub async fn begin(
		&self,
		digest: B256,
		kind: SubmissionKind,
		owner: Address,
		proxy_account: Address,
		call_data: Bytes,
	) -> Result<SubmissionRecord, ForwarderError> {
		let now = current_timestamp();
		let record = match self.get(&digest).await? {
			Some(mut existing) => {
				existing.tx_hash = None;
				existing.status = SubmissionStatus::Pending;
				existing.attempts += 1;
				existing.updated_at = now;
				existing
			},
			None => SubmissionRecord {
				digest,
				kind,
				owner,
				proxy_account,
				call_data,
				tx_hash: None,
				status: SubmissionStatus::Pending,
				attempts: 1,
				created_at: now,
				updated_at: now,
			},
		};
		self.storage
			.store(StorageKey::Submissions, &digest_key(&digest), &record)
			.await
			.map_err(storage_error)?;
		Ok(record)
	}

	/// Ties the current attempt of `digest` to the transaction that carries it.
	pub async fn attach(
		&self,
		digest: &B256,
		tx_hash: TransactionHash,
	) -> Result<SubmissionRecord, ForwarderError> {
		let mut record = self.get(digest).await?.ok_or_else(|| {
			ForwarderError::SubmissionFailure(format!("journal: no record for {}", digest))
		})?;
		record.tx_hash = Some(tx_hash);
		record.updated_at = current_timestamp();
		self.storage
			.update(StorageKey::Submissions, &digest_key(digest), &record)
			.await
			.map_err(storage_error)?;
		self.storage
			.store(StorageKey::SubmissionByTxHash, &hex::encode(tx_hash.0), digest)
			.await
			.map_err(storage_error)?;
		Ok(record)
	}

	pub async fn get(&self, digest: &B256) -> Result<Option<SubmissionRecord>, ForwarderError> {
		self.storage
			.find(StorageKey::Submissions, &digest_key(digest))
			.await
			.map_err(storage_error)
	}

	/// The record of the intent any attempt of which was sent as `hash`.
	pub async fn by_tx_hash(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<SubmissionRecord>, ForwarderError> {
		let digest: Option<B256> = self
			.storage
			.find(StorageKey::SubmissionByTxHash, &hex::encode(hash.0))
			.await
			.map_err(storage_error)?;
		match digest {
			Some(digest) => self.get(&digest).await,
			None => Ok(None),
		}
	}

	/// Sets the status of the current attempt, identified by the hash it was
	/// sent as (`None` for an attempt that never reached the ledger).
	///
	/// Outcomes of superseded attempts are ignored.
	pub async fn mark(
		&self,
		digest: &B256,
		tx_hash: Option<&TransactionHash>,
		status: SubmissionStatus,
	) -> Result<(), ForwarderError> {
		let Some(mut record) = self.get(digest).await? else {
			return Ok(());
		};
		if record.tx_hash.as_ref() != tx_hash {
			tracing::debug!(digest = %digest, tx_hash = ?tx_hash, "Ignoring outcome of superseded attempt");
			return Ok(());
		}
		record.status = status;
		record.updated_at = current_timestamp();
		self.storage
			.update(StorageKey::Submissions, &digest_key(digest), &record)
			.await
			.map_err(storage_error)
	}
}
