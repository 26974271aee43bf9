//! Name-to-factory lookup for every backend compiled into the binary.
//!
//! The configuration names one or more implementations per component; only
//! those are handed to the builder, and an unknown name fails fast with the
//! list of names that would have worked.

use std::collections::HashMap;
use std::sync::OnceLock;

use forwarder_account::AccountFactory;
use forwarder_config::Config;
use forwarder_core::{Forwarder, ForwarderBuilder, ForwarderFactories};
use forwarder_ledger::LedgerFactory;
use forwarder_storage::StorageFactory;

pub struct FactoryRegistry {
	pub storage: HashMap<&'static str, StorageFactory>,
	pub account: HashMap<&'static str, AccountFactory>,
	pub ledger: HashMap<&'static str, LedgerFactory>,
}

fn catalog<F>(component: &str, entries: Vec<(&'static str, F)>) -> HashMap<&'static str, F> {
	entries
		.into_iter()
		.inspect(|(name, _)| tracing::debug!(component, implementation = %name, "Registered"))
		.collect()
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| FactoryRegistry {
		storage: catalog("storage", forwarder_storage::get_all_implementations()),
		account: catalog("account", forwarder_account::get_all_implementations()),
		ledger: catalog("ledger", forwarder_ledger::get_all_implementations()),
	})
}

/// Factories for the implementations `configured` names.
fn select<F: Copy>(
	component: &str,
	known: &HashMap<&'static str, F>,
	configured: &HashMap<String, toml::Value>,
) -> Result<HashMap<String, F>, String> {
	configured
		.keys()
		.map(|name| match known.get(name.as_str()) {
			Some(factory) => Ok((name.clone(), *factory)),
			None => {
				let mut available: Vec<&str> = known.keys().copied().collect();
				available.sort_unstable();
				Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					component,
					name,
					available.join(", ")
				))
			},
		})
		.collect()
}

pub async fn build_forwarder_from_config(
	config: Config,
) -> Result<Forwarder, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let factories = ForwarderFactories {
		storage_factories: select("storage", &registry.storage, &config.storage.implementations)?,
		account_factories: select("account", &registry.account, &config.account.implementations)?,
		ledger_factories: select("ledger", &registry.ledger, &config.ledger.implementations)?,
	};
	Ok(ForwarderBuilder::new(config).build(factories).await?)
}
