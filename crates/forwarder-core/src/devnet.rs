//! Development network bootstrap.
//!
//! Deploys a replay-protection authority, a proxy hub and the example target
//! from the relayer identity. Only ledgers that know the built-in artifacts
//! (the `memory` ledger) can run it.

use alloy_primitives::{Address, Bytes, B256};
use forwarder_account::AccountService;
use forwarder_config::ReplayProtectionConfig;
use forwarder_contracts::artifacts;
use forwarder_contracts::implementations::{msg_sender, multinonce, proxy_hub};
use forwarder_ledger::LedgerService;
use forwarder_types::{ForwarderError, ReplayProtectionKind, Transaction};

use crate::builder::Forwarder;
use crate::clients::ledger_error;

/// Addresses produced by a bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevnetDeployment {
	pub hub: Address,
	pub authority: Address,
	/// `MsgSenderExample` bound to the hub.
	pub example: Address,
	/// Code hash every proxy account is created from.
	pub base_account: B256,
}

async fn deploy(
	ledger: &LedgerService,
	deployer: &AccountService,
	chain_id: u64,
	name: &str,
	init_code: Bytes,
) -> Result<Address, ForwarderError> {
	let hash = ledger
		.deliver(deployer, Transaction::create(chain_id, init_code))
		.await
		.map_err(|e| ForwarderError::SubmissionFailure(e.to_string()))?;
	let receipt = ledger.confirm(&hash).await.map_err(ledger_error)?;
	if !receipt.success {
		return Err(receipt
			.revert_data
			.map(|data| ForwarderError::from_revert_data(&data))
			.unwrap_or_else(|| {
				ForwarderError::SubmissionFailure(format!("{} deployment failed", name))
			}));
	}
	let address = receipt.contract_address.ok_or_else(|| {
		ForwarderError::SubmissionFailure(format!("{} deployment returned no address", name))
	})?;
	tracing::info!(contract = name, address = %address, "Deployed");
	Ok(address)
}

/// Deploys the authority described by `replay`, a hub and the example target.
pub async fn deploy_all(
	ledger: &LedgerService,
	deployer: &AccountService,
	chain_id: u64,
	replay: &ReplayProtectionConfig,
) -> Result<DevnetDeployment, ForwarderError> {
	let authority_args = match replay.strategy {
		ReplayProtectionKind::BitFlip => Bytes::new(),
		ReplayProtectionKind::Multinonce => {
			multinonce::constructor_args(replay.queues, replay.policy)
		},
	};
	let authority = deploy(
		ledger,
		deployer,
		chain_id,
		replay.strategy.as_str(),
		artifacts::authority(replay.strategy).init_code(&authority_args),
	)
	.await?;

	let base = artifacts::proxy_account();
	let hub = deploy(
		ledger,
		deployer,
		chain_id,
		"ProxyHub",
		artifacts::proxy_hub().init_code(&proxy_hub::constructor_args(base.id())),
	)
	.await?;

	let example = deploy(
		ledger,
		deployer,
		chain_id,
		"MsgSenderExample",
		artifacts::msg_sender_example().init_code(&msg_sender::constructor_args(hub)),
	)
	.await?;

	Ok(DevnetDeployment {
		hub,
		authority,
		example,
		base_account: base.code_hash(),
	})
}

/// Deploys everything with the forwarder's own identity and points the
/// forwarder at the result.
pub async fn bootstrap(
	forwarder: Forwarder,
) -> Result<(Forwarder, DevnetDeployment), ForwarderError> {
	let deployment = deploy_all(
		forwarder.ledger(),
		forwarder.account(),
		forwarder.config().forwarder.chain_id,
		&forwarder.config().replay_protection,
	)
	.await?;
	let forwarder = forwarder.with_deployment(deployment.hub, deployment.authority);
	Ok((forwarder, deployment))
}
