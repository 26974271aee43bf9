//! Naming contract between a backend and the TOML that selects it.

/// Implemented by the `Registry` marker of each ledger, account and storage
/// backend.
///
/// `NAME` is the key under `<component>.implementations` that selects the
/// backend, e.g. `[ledger.implementations.memory]`.
pub trait ImplementationRegistry {
	const NAME: &'static str;

	/// Constructor signature shared by every backend of the component.
	type Factory;

	fn factory() -> Self::Factory;
}
