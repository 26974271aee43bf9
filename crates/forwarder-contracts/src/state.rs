//! World state held by an in-process ledger.
//!
//! Every mutation goes through a setter that records the previous value in a
//! journal. A [`Checkpoint`] is a journal position; reverting to it undoes
//! only the entries written since.

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, B256, U256};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
	pub balance: U256,
	pub nonce: u64,
	pub code: Bytes,
	pub storage: HashMap<B256, B256>,
}

impl AccountState {
	/// An address is taken once it holds code or has sent/created anything.
	pub fn is_occupied(&self) -> bool {
		!self.code.is_empty() || self.nonce > 0
	}
}

/// Undo record for one state change.
#[derive(Debug, Clone, PartialEq, Eq)]
enum JournalEntry {
	AccountCreated(Address),
	BalanceChanged { address: Address, previous: U256 },
	NonceChanged { address: Address, previous: u64 },
	CodeChanged { address: Address, previous: Bytes },
	StorageChanged { address: Address, slot: B256, previous: B256 },
}

/// Journal position returned by [`WorldState::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

#[derive(Debug, Clone, Default)]
pub struct WorldState {
	accounts: HashMap<Address, AccountState>,
	journal: Vec<JournalEntry>,
}

/// Two states are equal when their accounts are; pending undo records don't count.
impl PartialEq for WorldState {
	fn eq(&self, other: &Self) -> bool {
		self.accounts == other.accounts
	}
}

impl Eq for WorldState {}

impl WorldState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn account(&self, address: &Address) -> Option<&AccountState> {
		self.accounts.get(address)
	}

	fn touch(&mut self, address: Address) -> &mut AccountState {
		if !self.accounts.contains_key(&address) {
			self.journal.push(JournalEntry::AccountCreated(address));
		}
		self.accounts.entry(address).or_default()
	}

	pub fn balance(&self, address: &Address) -> U256 {
		self.account(address).map(|a| a.balance).unwrap_or_default()
	}

	pub fn nonce(&self, address: &Address) -> u64 {
		self.account(address).map(|a| a.nonce).unwrap_or_default()
	}

	pub fn code(&self, address: &Address) -> Bytes {
		self.account(address)
			.map(|a| a.code.clone())
			.unwrap_or_default()
	}

	pub fn storage(&self, address: &Address, slot: &B256) -> B256 {
		self.account(address)
			.and_then(|a| a.storage.get(slot).copied())
			.unwrap_or_default()
	}

	pub fn set_balance(&mut self, address: Address, balance: U256) {
		let previous = std::mem::replace(&mut self.touch(address).balance, balance);
		self.journal.push(JournalEntry::BalanceChanged { address, previous });
	}

	pub fn set_nonce(&mut self, address: Address, nonce: u64) {
		let previous = std::mem::replace(&mut self.touch(address).nonce, nonce);
		self.journal.push(JournalEntry::NonceChanged { address, previous });
	}

	pub fn set_code(&mut self, address: Address, code: Bytes) {
		let previous = std::mem::replace(&mut self.touch(address).code, code);
		self.journal.push(JournalEntry::CodeChanged { address, previous });
	}

	/// Writing zero clears the slot.
	pub fn set_storage(&mut self, address: Address, slot: B256, value: B256) {
		let account = self.touch(address);
		let previous = if value.is_zero() {
			account.storage.remove(&slot)
		} else {
			account.storage.insert(slot, value)
		}
		.unwrap_or_default();
		self.journal.push(JournalEntry::StorageChanged {
			address,
			slot,
			previous,
		});
	}

	/// Moves `value` between accounts; `false` when `from` cannot cover it.
	pub fn transfer(&mut self, from: Address, to: Address, value: U256) -> bool {
		if value.is_zero() {
			return true;
		}
		let Some(remaining) = self.balance(&from).checked_sub(value) else {
			return false;
		};
		self.set_balance(from, remaining);
		self.set_balance(to, self.balance(&to).saturating_add(value));
		true
	}

	/// Credits `value` out of thin air; used to fund development accounts.
	pub fn mint(&mut self, to: Address, value: U256) {
		self.set_balance(to, self.balance(&to).saturating_add(value));
	}

	pub fn checkpoint(&self) -> Checkpoint {
		Checkpoint(self.journal.len())
	}

	/// Undoes every change made since `checkpoint`, newest first.
	pub fn revert_to(&mut self, checkpoint: Checkpoint) {
		while self.journal.len() > checkpoint.0 {
			let Some(entry) = self.journal.pop() else {
				break;
			};
			match entry {
				JournalEntry::AccountCreated(address) => {
					self.accounts.remove(&address);
				},
				JournalEntry::BalanceChanged { address, previous } => {
					if let Some(account) = self.accounts.get_mut(&address) {
						account.balance = previous;
					}
				},
				JournalEntry::NonceChanged { address, previous } => {
					if let Some(account) = self.accounts.get_mut(&address) {
						account.nonce = previous;
					}
				},
				JournalEntry::CodeChanged { address, previous } => {
					if let Some(account) = self.accounts.get_mut(&address) {
						account.code = previous;
					}
				},
				JournalEntry::StorageChanged {
					address,
					slot,
					previous,
				} => {
					if let Some(account) = self.accounts.get_mut(&address) {
						if previous.is_zero() {
							account.storage.remove(&slot);
						} else {
							account.storage.insert(slot, previous);
						}
					}
				},
			}
		}
	}

	/// Makes every change so far permanent.
	pub fn commit(&mut self) {
		self.journal.clear();
	}

	pub fn journal_len(&self) -> usize {
		self.journal.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	const A: Address = address!("0x00000000000000000000000000000000000000a1");
	const B: Address = address!("0x00000000000000000000000000000000000000b2");

	#[test]
	fn test_transfer_requires_balance() {
		let mut state = WorldState::new();

		assert!(!state.transfer(A, B, U256::from(1u8)));
		assert!(state.transfer(A, B, U256::ZERO));

		state.mint(A, U256::from(10u8));
		assert!(state.transfer(A, B, U256::from(4u8)));
		assert_eq!(state.balance(&A), U256::from(6u8));
		assert_eq!(state.balance(&B), U256::from(4u8));
	}

	#[test]
	fn test_zero_write_clears_slot() {
		let mut state = WorldState::new();
		state.set_storage(A, B256::ZERO, B256::repeat_byte(1));
		assert_eq!(state.storage(&A, &B256::ZERO), B256::repeat_byte(1));
		state.set_storage(A, B256::ZERO, B256::ZERO);
		assert!(state.account(&A).unwrap().storage.is_empty());
	}

	#[test]
	fn test_revert_undoes_only_changes_after_checkpoint() {
		let mut state = WorldState::new();
		state.mint(A, U256::from(10u8));
		state.set_storage(A, B256::ZERO, B256::repeat_byte(1));
		let outer = state.checkpoint();

		state.set_storage(A, B256::ZERO, B256::repeat_byte(2));
		state.set_storage(A, B256::repeat_byte(9), B256::repeat_byte(3));
		let inner = state.checkpoint();
		assert!(state.transfer(A, B, U256::from(4u8)));
		state.set_nonce(B, 7);
		state.set_code(B, Bytes::from(vec![0xfe]));

		state.revert_to(inner);
		assert_eq!(state.checkpoint(), inner);
		assert!(state.account(&B).is_none());
		assert_eq!(state.balance(&A), U256::from(10u8));
		assert_eq!(state.storage(&A, &B256::ZERO), B256::repeat_byte(2));

		state.revert_to(outer);
		assert_eq!(state.storage(&A, &B256::ZERO), B256::repeat_byte(1));
		assert_eq!(state.storage(&A, &B256::repeat_byte(9)), B256::ZERO);
		assert_eq!(state.balance(&A), U256::from(10u8));
	}

	#[test]
	fn test_commit_drops_undo_records() {
		let mut state = WorldState::new();
		state.mint(A, U256::from(1u8));
		let committed = state.clone();
		state.commit();
		assert_eq!(state.journal_len(), 0);

		let start = state.checkpoint();
		state.revert_to(start);
		assert_eq!(state, committed);
		assert_eq!(state.balance(&A), U256::from(1u8));
	}
}
