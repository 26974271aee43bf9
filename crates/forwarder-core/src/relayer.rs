//! Relayer API.
//!
//! Takes signed parameters from owners, checks everything that can be
//! checked locally, and submits them to the owner's proxy account from the
//! relayer's own identity. The relayer never needs the owner's key.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use forwarder_account::AccountService;
use forwarder_ledger::LedgerService;
use forwarder_types::abi::{IProxyAccount, IProxyHub};
use forwarder_types::{
	parse_signature, truncate_id, DeployParams, ForwardParams, ForwarderError, SubmissionKind,
	SubmissionRecord, SubmissionStatus, Transaction, TransactionHash, TransactionReceipt,
};
use tracing::instrument;

use crate::clients::{ledger_error, HubClient};
use crate::handler::MetaTxHandler;
use crate::journal::SubmissionJournal;

/// A checked intent ready to go to the ledger.
struct Prepared {
	digest: B256,
	kind: SubmissionKind,
	owner: Address,
	account: Address,
	call_data: Bytes,
}

/// The proxy account call an intent turns into, for callers that wrap it in
/// their own transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCall {
	pub account: Address,
	pub call_data: Bytes,
}

/// A transaction handed to the ledger whose outcome is not yet known.
pub struct PendingSubmission {
	tx_hash: TransactionHash,
	/// Journal key; `None` for hub calls, which are not journaled.
	digest: Option<B256>,
	/// The transaction as submitted, kept to re-simulate a failure.
	tx: Transaction,
	ledger: Arc<LedgerService>,
	journal: Arc<SubmissionJournal>,
}

impl std::fmt::Debug for PendingSubmission {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PendingSubmission")
			.field("tx_hash", &self.tx_hash)
			.field("digest", &self.digest)
			.finish()
	}
}

impl PendingSubmission {
	pub fn tx_hash(&self) -> TransactionHash {
		self.tx_hash
	}

	pub fn digest(&self) -> Option<B256> {
		self.digest
	}

	/// Waits for the configured confirmation depth.
	///
	/// A failed receipt becomes the taxonomy error its revert data encodes.
	/// Ledgers that do not expose revert data get the failure re-simulated
	/// against current state.
	pub async fn confirm(self) -> Result<TransactionReceipt, ForwarderError> {
		let receipt = self
			.ledger
			.confirm(&self.tx_hash)
			.await
			.map_err(ledger_error)?;

		if receipt.success {
			self.mark(SubmissionStatus::Confirmed).await;
			tracing::info!(
				tx_hash = %truncate_id(&self.tx_hash.to_string()),
				block = receipt.block_number,
				"Submission confirmed"
			);
			return Ok(receipt);
		}

		let error = match &receipt.revert_data {
			Some(data) => ForwarderError::from_revert_data(data),
			None => self.simulate_failure().await,
		};
		tracing::warn!(
			tx_hash = %truncate_id(&self.tx_hash.to_string()),
			error = %error,
			"Submission failed"
		);
		self.mark(SubmissionStatus::Failed(error.to_string())).await;
		Err(error)
	}

	async fn simulate_failure(&self) -> ForwarderError {
		match self.ledger.call(&self.tx).await {
			Ok(_) => ForwarderError::SubmissionFailure(
				"transaction failed without revert data".to_string(),
			),
			Err(e) => ledger_error(e),
		}
	}

	/// Journals the outcome. The ledger's verdict stands even if this fails.
	async fn mark(&self, status: SubmissionStatus) {
		let Some(digest) = &self.digest else {
			return;
		};
		if let Err(e) = self.journal.mark(digest, Some(&self.tx_hash), status).await {
			tracing::warn!(
				tx_hash = %truncate_id(&self.tx_hash.to_string()),
				error = %e,
				"Failed to journal submission outcome"
			);
		}
	}
}

pub struct RelayerApi {
	hub: HubClient,
	chain_id: u64,
	ledger: Arc<LedgerService>,
	journal: Arc<SubmissionJournal>,
}

impl RelayerApi {
	/// `chain_id` must be the chain the ledger reports.
	pub fn new(
		hub: Address,
		chain_id: u64,
		ledger: Arc<LedgerService>,
		journal: Arc<SubmissionJournal>,
	) -> Self {
		Self {
			hub: HubClient::new(hub, chain_id, ledger.clone()),
			chain_id,
			ledger,
			journal,
		}
	}

	pub fn hub(&self) -> &HubClient {
		&self.hub
	}

	/// Checks the fields shared by forward and deployment parameters.
	fn check_envelope(
		&self,
		hub: Address,
		authority: Address,
		chain_id: U256,
		signature: &Bytes,
	) -> Result<(), ForwarderError> {
		if hub != self.hub.address() {
			return Err(ForwarderError::Validation(format!(
				"parameters are for hub {}, relayer serves {}",
				hub,
				self.hub.address()
			)));
		}
		if chain_id != U256::from(self.chain_id) {
			return Err(ForwarderError::Validation(format!(
				"parameters are for chain {}, ledger is chain {}",
				chain_id, self.chain_id
			)));
		}
		if authority.is_zero() {
			return Err(ForwarderError::Validation(
				"replay protection authority is the zero address".to_string(),
			));
		}
		parse_signature(signature)?;
		Ok(())
	}

	async fn account_for(&self, owner: Address) -> Result<Address, ForwarderError> {
		self.hub
			.account_of(owner)
			.await?
			.ok_or(ForwarderError::AccountNotFound(owner))
	}

	async fn prepare_forward(&self, params: &ForwardParams) -> Result<Prepared, ForwarderError> {
		self.check_envelope(
			params.hub,
			params.replay_protection_authority,
			params.chain_id,
			&params.signature,
		)?;
		let digest = params.digest();
		let owner = params.recover_signer()?;
		let account = self.account_for(owner).await?;

		let call_data = IProxyAccount::forwardCall {
			target: params.target,
			value: params.value,
			data: params.data.clone(),
			replayProtection: params.replay_protection.clone(),
			replayProtectionAuthority: params.replay_protection_authority,
			signature: params.signature.clone(),
		}
		.abi_encode();

		Ok(Prepared {
			digest,
			kind: SubmissionKind::Forward,
			owner,
			account,
			call_data: call_data.into(),
		})
	}

	async fn prepare_deploy(&self, params: &DeployParams) -> Result<Prepared, ForwarderError> {
		self.check_envelope(
			params.hub,
			params.replay_protection_authority,
			params.chain_id,
			&params.signature,
		)?;
		if params.data.is_empty() {
			return Err(ForwarderError::deployment(
				forwarder_types::DeploymentFailure::MalformedBytecode,
				"init code is empty",
			));
		}
		let digest = params.digest();
		let owner = params.recover_signer()?;
		let account = self.account_for(owner).await?;

		let call_data = IProxyAccount::deployContractCall {
			initCode: params.data.clone(),
			replayProtection: params.replay_protection.clone(),
			replayProtectionAuthority: params.replay_protection_authority,
			signature: params.signature.clone(),
		}
		.abi_encode();

		Ok(Prepared {
			digest,
			kind: SubmissionKind::Deploy,
			owner,
			account,
			call_data: call_data.into(),
		})
	}

	async fn send(
		&self,
		sender: &AccountService,
		to: Address,
		call_data: Bytes,
		digest: Option<B256>,
	) -> Result<PendingSubmission, ForwarderError> {
		let mut tx = Transaction::call(self.chain_id, to, call_data);
		tx.from = Some(sender.address());

		let tx_hash = self
			.ledger
			.deliver(sender, tx.clone())
			.await
			.map_err(|e| ForwarderError::SubmissionFailure(e.to_string()))?;

		Ok(PendingSubmission {
			tx_hash,
			digest,
			tx,
			ledger: self.ledger.clone(),
			journal: self.journal.clone(),
		})
	}

	/// Journals `prepared` ahead of sending it, then ties the record to the
	/// resulting transaction.
	async fn submit(
		&self,
		sender: &AccountService,
		prepared: Prepared,
	) -> Result<PendingSubmission, ForwarderError> {
		let digest = prepared.digest;
		let record = self
			.journal
			.begin(
				digest,
				prepared.kind,
				prepared.owner,
				prepared.account,
				prepared.call_data.clone(),
			)
			.await?;

		let pending = match self
			.send(sender, prepared.account, prepared.call_data, Some(digest))
			.await
		{
			Ok(pending) => pending,
			Err(e) => {
				if let Err(journal_err) = self
					.journal
					.mark(&digest, None, SubmissionStatus::Failed(e.to_string()))
					.await
				{
					tracing::warn!(error = %journal_err, "Failed to journal unsent submission");
				}
				return Err(e);
			},
		};
		self.journal.attach(&digest, pending.tx_hash).await?;
		tracing::debug!(attempt = record.attempts, tx_hash = %pending.tx_hash, "Journaled submission");
		Ok(pending)
	}

	fn account_call(sender: &AccountService, prepared: Prepared) -> AccountCall {
		tracing::debug!(sender = %sender.address(), account = %prepared.account, "Built account call");
		AccountCall {
			account: prepared.account,
			call_data: prepared.call_data,
		}
	}

	/// Relays a signed forward from `sender`.
	///
	/// Fails with `AccountNotFound` before anything is submitted when the
	/// signer has no proxy account.
	#[instrument(skip_all, fields(target = %params.target))]
	pub async fn forward(
		&self,
		sender: &AccountService,
		params: &ForwardParams,
	) -> Result<PendingSubmission, ForwarderError> {
		let prepared = self.prepare_forward(params).await?;
		tracing::info!(
			owner = %prepared.owner,
			account = %prepared.account,
			digest = %truncate_id(&prepared.digest.to_string()),
			"Relaying forward"
		);
		self.submit(sender, prepared).await
	}

	/// Checks `params` like [`Self::forward`] and returns the encoded
	/// `forward` call and the account it is for, without submitting.
	#[instrument(skip_all, fields(target = %params.target))]
	pub async fn get_forward_call_data(
		&self,
		sender: &AccountService,
		params: &ForwardParams,
	) -> Result<AccountCall, ForwarderError> {
		let prepared = self.prepare_forward(params).await?;
		Ok(Self::account_call(sender, prepared))
	}

	/// Relays a signed deployment from `sender`.
	#[instrument(skip_all, fields(init_code_len = params.data.len()))]
	pub async fn deploy_contract(
		&self,
		sender: &AccountService,
		params: &DeployParams,
	) -> Result<PendingSubmission, ForwarderError> {
		let prepared = self.prepare_deploy(params).await?;
		tracing::info!(
			owner = %prepared.owner,
			account = %prepared.account,
			digest = %truncate_id(&prepared.digest.to_string()),
			"Relaying deployment"
		);
		self.submit(sender, prepared).await
	}

	#[instrument(skip_all, fields(init_code_len = params.data.len()))]
	pub async fn get_deploy_call_data(
		&self,
		sender: &AccountService,
		params: &DeployParams,
	) -> Result<AccountCall, ForwarderError> {
		let prepared = self.prepare_deploy(params).await?;
		Ok(Self::account_call(sender, prepared))
	}

	/// Asks the hub to create `owner`'s proxy account.
	#[instrument(skip_all, fields(owner = %owner))]
	pub async fn create_proxy_account(
		&self,
		sender: &AccountService,
		owner: Address,
	) -> Result<PendingSubmission, ForwarderError> {
		if owner.is_zero() {
			return Err(ForwarderError::Validation("owner is the zero address".to_string()));
		}
		if self.hub.account_of(owner).await?.is_some() {
			return Err(ForwarderError::DuplicateAccount(owner));
		}
		let call_data = IProxyHub::createProxyAccountCall { owner }.abi_encode();
		let pending = self
			.send(sender, self.hub.address(), call_data.into(), None)
			.await?;
		tracing::info!(owner = %owner, tx_hash = %pending.tx_hash, "Requested proxy account");
		Ok(pending)
	}

	/// Registered proxy account of `owner`.
	pub async fn proxy_account(&self, owner: Address) -> Result<Option<Address>, ForwarderError> {
		self.hub.account_of(owner).await
	}

	/// Address the hub gives (or gave) `owner`'s proxy account.
	pub async fn proxy_account_address(&self, owner: Address) -> Result<Address, ForwarderError> {
		let base = self.hub.base_account().await?;
		Ok(MetaTxHandler::proxy_account_address(
			self.hub.address(),
			owner,
			base,
		))
	}

	/// Re-sends the call data recorded for `digest`, unchanged.
	///
	/// For transactions that were dropped or priced out. The owner's
	/// signature is reused; nothing is re-signed.
	#[instrument(skip_all, fields(digest = %truncate_id(&digest.to_string())))]
	pub async fn resubmit(
		&self,
		sender: &AccountService,
		digest: B256,
	) -> Result<PendingSubmission, ForwarderError> {
		let record = self.journal.get(&digest).await?.ok_or_else(|| {
			ForwarderError::Validation(format!("no submission recorded for digest {}", digest))
		})?;
		if record.status == SubmissionStatus::Confirmed {
			return Err(ForwarderError::Validation(format!(
				"submission {} is already confirmed",
				digest
			)));
		}

		let attempt = record.attempts + 1;
		let prepared = Prepared {
			digest,
			kind: record.kind,
			owner: record.owner,
			account: record.proxy_account,
			call_data: record.call_data,
		};
		let pending = self.submit(sender, prepared).await?;
		tracing::info!(attempt, tx_hash = %pending.tx_hash, "Resubmitted");
		Ok(pending)
	}

	pub async fn submission(
		&self,
		digest: &B256,
	) -> Result<Option<SubmissionRecord>, ForwarderError> {
		self.journal.get(digest).await
	}

	/// Journal record of the intent that `tx_hash` carried, on any attempt.
	pub async fn submission_by_tx_hash(
		&self,
		tx_hash: &TransactionHash,
	) -> Result<Option<SubmissionRecord>, ForwarderError> {
		self.journal.by_tx_hash(tx_hash).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_sol_types::SolValue;
	use forwarder_account::implementations::local::LocalWallet;
	use forwarder_ledger::{LedgerError, MockLedgerInterface};
	use forwarder_storage::implementations::memory::MemoryStorage;
	use forwarder_storage::{StorageError, StorageInterface, StorageService};

	const HUB: Address = Address::new([0x0a; 20]);
	const AUTHORITY: Address = Address::new([0x0b; 20]);

	fn wallet(byte: u8) -> AccountService {
		AccountService::new(Box::new(LocalWallet::from_bytes(&B256::repeat_byte(byte)).unwrap()))
	}

	fn journal() -> Arc<SubmissionJournal> {
		Arc::new(SubmissionJournal::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		)))))
	}

	async fn signed(owner: &AccountService, chain_id: u64) -> ForwardParams {
		let mut params = ForwardParams {
			hub: HUB,
			target: Address::new([0x0c; 20]),
			value: U256::ZERO,
			data: Bytes::from(vec![0xab]),
			replay_protection: Bytes::from(vec![0u8; 64]),
			replay_protection_authority: AUTHORITY,
			chain_id: U256::from(chain_id),
			signature: Bytes::new(),
		};
		let signature = owner.sign_hash(&params.digest()).await.unwrap();
		params.signature = Bytes::copy_from_slice(&signature.as_bytes());
		params
	}

	fn relayer(mock: MockLedgerInterface) -> RelayerApi {
		RelayerApi::new(HUB, 1, Arc::new(LedgerService::new(Box::new(mock), 1)), journal())
	}

	#[tokio::test]
	async fn test_missing_account_is_not_submitted() {
		let mut mock = MockLedgerInterface::new();
		mock.expect_call()
			.returning(|_| Ok(Address::ZERO.abi_encode().into()));
		mock.expect_submit().times(0);
		mock.expect_get_nonce().times(0);

		let owner = wallet(0x21);
		let relayer = relayer(mock);
		let err = relayer
			.forward(&wallet(0x22), &signed(&owner, 1).await)
			.await
			.unwrap_err();
		assert_eq!(err, ForwarderError::AccountNotFound(owner.address()));
	}

	#[tokio::test]
	async fn test_local_checks_fail_before_lookup() {
		let mut mock = MockLedgerInterface::new();
		mock.expect_call().times(0);
		let relayer = relayer(mock);
		let owner = wallet(0x21);

		let mut params = signed(&owner, 5).await;
		assert!(matches!(
			relayer.forward(&owner, &params).await,
			Err(ForwarderError::Validation(m)) if m.contains("chain")
		));

		params = signed(&owner, 1).await;
		params.hub = Address::new([0x0d; 20]);
		assert!(matches!(
			relayer.forward(&owner, &params).await,
			Err(ForwarderError::Validation(m)) if m.contains("hub")
		));

		params = signed(&owner, 1).await;
		params.signature = Bytes::from(vec![1u8; 10]);
		assert!(matches!(
			relayer.get_forward_call_data(&owner, &params).await,
			Err(ForwarderError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_forward_call_data_targets_account() {
		let account = Address::new([0x0e; 20]);
		let mut mock = MockLedgerInterface::new();
		mock.expect_call()
			.returning(move |_| Ok(account.abi_encode().into()));
		let relayer = relayer(mock);
		let owner = wallet(0x21);
		let sender = wallet(0x22);
		let params = signed(&owner, 1).await;

		let call = relayer.get_forward_call_data(&sender, &params).await.unwrap();
		assert_eq!(call.account, account);
		let decoded = IProxyAccount::forwardCall::abi_decode(&call.call_data).unwrap();
		assert_eq!(decoded.signature, params.signature);
		assert_eq!(decoded.target, params.target);
	}

	#[tokio::test]
	async fn test_missing_account_yields_no_call_data() {
		let mut mock = MockLedgerInterface::new();
		mock.expect_call()
			.returning(|_| Ok(Address::ZERO.abi_encode().into()));
		mock.expect_submit().times(0);
		mock.expect_get_nonce().times(0);

		let owner = wallet(0x21);
		let relayer = relayer(mock);
		let params = signed(&owner, 1).await;
		let err = relayer
			.get_forward_call_data(&wallet(0x22), &params)
			.await
			.unwrap_err();
		assert_eq!(err, ForwarderError::AccountNotFound(owner.address()));
		assert!(relayer.submission(&params.digest()).await.unwrap().is_none());
	}

	/// Ledger that knows one proxy account and assigns nonce zero.
	fn ledger_with_account(account: Address) -> MockLedgerInterface {
		let mut mock = MockLedgerInterface::new();
		mock.expect_call()
			.returning(move |_| Ok(account.abi_encode().into()));
		mock.expect_get_nonce().returning(|_| Ok(0));
		mock
	}

	#[tokio::test]
	async fn test_intent_is_journaled_before_it_is_sent() {
		let mut mock = ledger_with_account(Address::new([0x0e; 20]));
		mock.expect_submit()
			.times(1)
			.returning(|_, _| Err(LedgerError::Rejected("nonce too low".to_string())));
		let relayer = relayer(mock);
		let params = signed(&wallet(0x21), 1).await;

		assert!(matches!(
			relayer.forward(&wallet(0x22), &params).await,
			Err(ForwarderError::SubmissionFailure(_))
		));
		let record = relayer.submission(&params.digest()).await.unwrap().unwrap();
		assert_eq!(record.tx_hash, None);
		assert_eq!(record.attempts, 1);
		assert!(matches!(record.status, SubmissionStatus::Failed(m) if m.contains("nonce too low")));
	}

	#[tokio::test]
	async fn test_sent_attempt_is_found_by_hash() {
		let tx_hash = TransactionHash(B256::repeat_byte(0x77));
		let mut mock = ledger_with_account(Address::new([0x0e; 20]));
		mock.expect_submit().returning(move |_, _| Ok(tx_hash));
		let relayer = relayer(mock);
		let params = signed(&wallet(0x21), 1).await;

		let pending = relayer.forward(&wallet(0x22), &params).await.unwrap();
		assert_eq!(pending.tx_hash(), tx_hash);
		let record = relayer.submission_by_tx_hash(&tx_hash).await.unwrap().unwrap();
		assert_eq!(record.digest, params.digest());
		assert_eq!(record.tx_hash, Some(tx_hash));
		assert_eq!(record.status, SubmissionStatus::Pending);
	}

	/// Backend whose every operation fails.
	struct UnavailableStorage;

	#[async_trait::async_trait]
	impl StorageInterface for UnavailableStorage {
		async fn get_bytes(&self, _key: &str) -> Result<Vec<u8>, StorageError> {
			Err(StorageError::Backend("disk unavailable".to_string()))
		}

		async fn set_bytes(
			&self,
			_key: &str,
			_value: Vec<u8>,
			_ttl: Option<std::time::Duration>,
		) -> Result<(), StorageError> {
			Err(StorageError::Backend("disk unavailable".to_string()))
		}

		async fn delete(&self, _key: &str) -> Result<(), StorageError> {
			Err(StorageError::Backend("disk unavailable".to_string()))
		}

		async fn exists(&self, _key: &str) -> Result<bool, StorageError> {
			Err(StorageError::Backend("disk unavailable".to_string()))
		}

		fn config_schema(&self) -> Box<dyn forwarder_types::ConfigSchema> {
			MemoryStorage::new().config_schema()
		}
	}

	fn unavailable_journal() -> Arc<SubmissionJournal> {
		Arc::new(SubmissionJournal::new(Arc::new(StorageService::new(Box::new(
			UnavailableStorage,
		)))))
	}

	#[tokio::test]
	async fn test_nothing_is_sent_without_a_journal_entry() {
		let mut mock = ledger_with_account(Address::new([0x0e; 20]));
		mock.expect_submit().times(0);
		let relayer = RelayerApi::new(
			HUB,
			1,
			Arc::new(LedgerService::new(Box::new(mock), 1)),
			unavailable_journal(),
		);

		let params = signed(&wallet(0x21), 1).await;
		assert!(matches!(
			relayer.forward(&wallet(0x22), &params).await,
			Err(ForwarderError::SubmissionFailure(m)) if m.contains("journal")
		));
	}

	#[tokio::test]
	async fn test_confirmation_survives_journal_outage() {
		let tx_hash = TransactionHash(B256::repeat_byte(0x55));
		let mut mock = MockLedgerInterface::new();
		mock.expect_wait_for_confirmation()
			.returning(|hash, _| {
				Ok(TransactionReceipt {
					hash: *hash,
					block_number: 9,
					success: true,
					logs: Vec::new(),
					contract_address: None,
					revert_data: None,
				})
			});
		let pending = PendingSubmission {
			tx_hash,
			digest: Some(B256::repeat_byte(0x01)),
			tx: Transaction::call(1, Address::new([0x0e; 20]), Bytes::new()),
			ledger: Arc::new(LedgerService::new(Box::new(mock), 1)),
			journal: unavailable_journal(),
		};

		let receipt = pending.confirm().await.unwrap();
		assert_eq!(receipt.hash, tx_hash);
		assert_eq!(receipt.block_number, 9);
	}

	#[tokio::test]
	async fn test_resubmit_unknown_digest() {
		let relayer = relayer(MockLedgerInterface::new());
		assert!(matches!(
			relayer.resubmit(&wallet(0x22), B256::ZERO).await,
			Err(ForwarderError::Validation(_))
		));
	}
}
