//! On-ledger components of the forwarder.

pub mod authority;
pub mod bitflip;
pub mod msg_sender;
pub mod multinonce;
pub mod proxy_account;
pub mod proxy_hub;

pub use authority::{lane_slot, AuthorityContract, ReplayProtection};
pub use bitflip::BitFlip;
pub use msg_sender::MsgSenderExample;
pub use multinonce::Multinonce;
pub use proxy_account::ProxyAccount;
pub use proxy_hub::ProxyHub;
