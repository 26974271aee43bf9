//! Command-line front end of the meta-transaction forwarder.
//!
//! Signs intents for an owner, relays signed intents from the configured
//! identity, derives proxy account addresses, and can stand up a local
//! development network on the in-process ledger.

use std::io::Read;
use std::path::PathBuf;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use clap::{Parser, Subcommand};
use forwarder_account::implementations::local::LocalWallet;
use forwarder_account::AccountService;
use forwarder_config::Config;
use forwarder_core::{devnet, Forwarder};
use forwarder_types::abi::IMsgSenderExample;
use forwarder_types::{ForwardParams, TransactionHash};

mod factory_registry;

use factory_registry::build_forwarder_from_config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print the derived and the registered proxy account of an owner
	Address {
		#[arg(long)]
		owner: Address,
	},
	/// Sign a forward with an owner key and print the parameters as JSON
	Sign {
		/// Owner private key (hex)
		#[arg(long, env = "FORWARDER_OWNER_KEY", hide_env_values = true)]
		owner_key: String,
		#[arg(long)]
		target: Address,
		#[arg(long, default_value = "0")]
		value: U256,
		/// Call data (hex)
		#[arg(long, default_value = "0x")]
		data: Bytes,
	},
	/// Relay forward parameters (JSON file, or `-` for stdin) and wait for confirmation
	Relay {
		#[arg(long, default_value = "-")]
		params: String,
	},
	/// Print the journal record of the intent a transaction carried
	Status {
		#[arg(long)]
		tx_hash: B256,
	},
	/// Deploy the contracts on the in-process ledger and run one forward through them
	Devnet,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(path).await?;
	tracing::info!("Loaded configuration [{}]", config.forwarder.id);

	let forwarder = build_forwarder_from_config(config).await?;
	match args.command {
		Command::Address { owner } => address(&forwarder, owner).await,
		Command::Sign {
			owner_key,
			target,
			value,
			data,
		} => sign(&forwarder, &owner_key, target, value, data).await,
		Command::Relay { params } => relay(&forwarder, &params).await,
		Command::Status { tx_hash } => status(&forwarder, TransactionHash(tx_hash)).await,
		Command::Devnet => run_devnet(forwarder).await,
	}
}

async fn address(forwarder: &Forwarder, owner: Address) -> Result<(), Box<dyn std::error::Error>> {
	let relayer = forwarder.relayer()?;
	let derived = relayer.proxy_account_address(owner).await?;
	println!("derived:    {}", derived);
	match relayer.proxy_account(owner).await? {
		Some(account) => println!("registered: {}", account),
		None => println!("registered: none"),
	}
	Ok(())
}

async fn sign(
	forwarder: &Forwarder,
	owner_key: &str,
	target: Address,
	value: U256,
	data: Bytes,
) -> Result<(), Box<dyn std::error::Error>> {
	let owner = AccountService::new(Box::new(LocalWallet::new(owner_key)?));
	let params = forwarder
		.handler()?
		.sign_meta_transaction(&owner, target, value, data)
		.await?;
	println!("{}", serde_json::to_string_pretty(&params)?);
	Ok(())
}

async fn relay(forwarder: &Forwarder, source: &str) -> Result<(), Box<dyn std::error::Error>> {
	let raw = if source == "-" {
		let mut buffer = String::new();
		std::io::stdin().read_to_string(&mut buffer)?;
		buffer
	} else {
		tokio::fs::read_to_string(source).await?
	};
	let params: ForwardParams = serde_json::from_str(&raw)?;

	let relayer = forwarder.relayer()?;
	let pending = relayer.forward(forwarder.account(), &params).await?;
	let tx_hash = pending.tx_hash();
	println!("submitted:  {}", tx_hash);
	let outcome = pending.confirm().await;
	if let Some(record) = relayer.submission_by_tx_hash(&tx_hash).await? {
		println!("journal:    {:?} after {} attempt(s)", record.status, record.attempts);
	}
	let receipt = outcome?;
	println!("confirmed:  block {}", receipt.block_number);
	Ok(())
}

async fn status(
	forwarder: &Forwarder,
	tx_hash: TransactionHash,
) -> Result<(), Box<dyn std::error::Error>> {
	match forwarder.relayer()?.submission_by_tx_hash(&tx_hash).await? {
		Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
		None => println!("no submission recorded for {}", tx_hash),
	}
	Ok(())
}

/// Deploys everything, gives the relayer identity a proxy account and
/// forwards one call to the example target.
async fn run_devnet(forwarder: Forwarder) -> Result<(), Box<dyn std::error::Error>> {
	let (forwarder, deployment) = devnet::bootstrap(forwarder).await?;
	println!("hub:        {}", deployment.hub);
	println!("authority:  {}", deployment.authority);
	println!("example:    {}", deployment.example);

	let owner = forwarder.account();
	let relayer = forwarder.relayer()?;
	relayer
		.create_proxy_account(owner, owner.address())
		.await?
		.confirm()
		.await?;
	let account = relayer
		.proxy_account(owner.address())
		.await?
		.ok_or("proxy account missing after creation")?;
	println!("account:    {}", account);

	let params = forwarder
		.handler()?
		.sign_meta_transaction(
			owner,
			deployment.example,
			U256::ZERO,
			IMsgSenderExample::testCall {}.abi_encode().into(),
		)
		.await?;
	let receipt = relayer.forward(owner, &params).await?.confirm().await?;
	tracing::info!(
		block = receipt.block_number,
		logs = receipt.logs.len(),
		"Self-check forward confirmed"
	);
	println!("forwarded:  {}", receipt.hash);
	Ok(())
}
