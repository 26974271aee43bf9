//! Core of the meta-transaction forwarder.
//!
//! Owners sign intents offline with the [`MetaTxHandler`]; a relayer carries
//! them to the owner's proxy account through the [`RelayerApi`], paying for
//! the ledger transaction with its own identity. The [`ForwarderBuilder`]
//! wires both to the configured ledger, storage and signing identity.

pub mod builder;
pub mod clients;
pub mod devnet;
pub mod handler;
pub mod journal;
pub mod relayer;

pub use builder::{BuilderError, Forwarder, ForwarderBuilder, ForwarderFactories};
pub use clients::{AuthorityClient, HubClient};
pub use devnet::DevnetDeployment;
pub use handler::MetaTxHandler;
pub use journal::SubmissionJournal;
pub use relayer::{AccountCall, PendingSubmission, RelayerApi};
