//! Common types module for the meta-transaction forwarder.
//!
//! This module defines the data types shared by every forwarder component:
//! signed forward/deploy parameters, replay-protection tokens, the on-ledger
//! ABI surfaces, the error taxonomy and the ledger transaction model.

/// On-ledger interfaces declared with `sol!`.
pub mod abi;
/// Error taxonomy shared by the ledger contracts and the relayer.
pub mod errors;
/// Ledger transaction and receipt types.
pub mod ledger;
/// Signed forward and deployment parameters.
pub mod params;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Replay-protection tokens and strategy selection.
pub mod replay;
/// Secure string type for private keys.
pub mod secret_string;
/// Storage keys and relayer submission records.
pub mod storage;
/// Digest builder, address derivation and formatting helpers.
pub mod utils;
/// Schema checks for implementation tables.
pub mod validation;

pub use errors::{DeploymentFailure, ForwarderError};
pub use ledger::*;
pub use params::*;
pub use registry::ImplementationRegistry;
pub use replay::*;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{
	account_salt, build_create2_address, current_timestamp, deployment_salt, forward_digest,
	truncate_id, without_0x_prefix,
};
pub use validation::*;
