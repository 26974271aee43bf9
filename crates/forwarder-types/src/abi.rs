//! On-ledger interfaces shared by the contracts, the relayer and the RPC ledger.

use alloy_sol_types::sol;

sol! {
	/// Registry creating one proxy account per owner.
	interface IProxyHub {
		event ProxyAccountCreated(address indexed owner, address account);

		function createProxyAccount(address owner) external returns (address account);
		function accounts(address owner) external view returns (address account);
		function baseAccount() external view returns (bytes32 codeHash);
	}

	/// Per-owner agent executing signed intents.
	interface IProxyAccount {
		event Forwarded(address indexed target, uint256 value, bytes replayProtection);
		event ContractDeployed(address indexed deployed, bytes replayProtection);

		function initialize(address owner) external;
		function owner() external view returns (address);
		function hub() external view returns (address);
		function forward(
			address target,
			uint256 value,
			bytes data,
			bytes replayProtection,
			address replayProtectionAuthority,
			bytes signature
		) external returns (bytes result);
		function deployContract(
			bytes initCode,
			bytes replayProtection,
			address replayProtectionAuthority,
			bytes signature
		) external returns (address deployed);
		function computeAddress(bytes32 salt, bytes32 codeHash) external view returns (address);
	}

	/// Authority consuming replay-protection tokens.
	interface IReplayProtection {
		function validate(address consumer, address owner, bytes replayProtection) external view returns (bool);
		function updateFor(address owner, bytes replayProtection) external returns (bool);
		function nextToken(address consumer, address owner, uint256 queue) external view returns (bytes);
	}

	/// Revert reasons raised by the forwarder contracts.
	interface IForwarderErrors {
		error InvalidParameters(string reason);
		error UnauthorizedSigner(address expected, address recovered);
		error ReplayProtectionViolation(string reason);
		error DuplicateAccount(address owner);
		error DeploymentFailed(uint8 kind, string reason);
		error ForwardedCallFailed(address target, bytes returnData);
	}

	/// Example target reporting who called it.
	interface IMsgSenderExample {
		event WhoIsSender(address sender);

		function test() external;
		function hub() external view returns (address);
	}
}
