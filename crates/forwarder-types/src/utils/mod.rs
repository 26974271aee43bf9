//! Utility functions shared across the forwarder.
//!
//! The digest builder and the deterministic address derivation live here so
//! the off-ledger handler and the on-ledger contracts use the same code.

pub mod clock;
pub mod create2;
pub mod digest;
pub mod formatting;

pub use clock::current_timestamp;
pub use create2::{account_salt, build_create2_address, deployment_salt};
pub use digest::forward_digest;
pub use formatting::{truncate_id, without_0x_prefix};
