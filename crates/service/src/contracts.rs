//! On-chain call encoding and receipt log extraction
//!
//! The minimal ABI surface the engine touches: ERC-20 approvals, warp-route
//! remote transfers, burn-and-mint deposits, and the settlement-network
//! mint/deposit entry points.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};

use rebalancer_types::TransactionReceipt;

sol! {
	function approve(address spender, uint256 amount) external returns (bool);

	function transferRemote(uint32 destination, bytes32 recipient, uint256 amount)
		external payable returns (bytes32 messageId);

	function depositForBurn(
		uint256 amount,
		uint32 destinationDomain,
		bytes32 mintRecipient,
		address burnToken
	) external returns (uint64 nonce);

	function gatewayMint(bytes attestation, bytes signature) external;

	function deposit(address token, uint256 value) external;

	/// Burn-and-mint bridge dispatch event; the message hash keys attestation
	event MessageSent(bytes message);

	/// Warp-route dispatch event carrying the message identifier
	event DispatchId(bytes32 indexed messageId);
}

/// Topic0 of the burn-bridge `MessageSent` event
pub const MESSAGE_SENT_TOPIC: B256 = <MessageSent as SolEvent>::SIGNATURE_HASH;

/// Topic0 of the warp-route `DispatchId` event
pub const DISPATCH_ID_TOPIC: B256 = <DispatchId as SolEvent>::SIGNATURE_HASH;

/// Left-pad an address into the bytes32 recipient encoding
pub fn address_to_bytes32(address: Address) -> B256 {
	B256::left_padding_from(address.as_slice())
}

pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
	approveCall { spender, amount }.abi_encode().into()
}

pub fn transfer_remote_calldata(destination: u32, recipient: Address, amount: U256) -> Bytes {
	transferRemoteCall {
		destination,
		recipient: address_to_bytes32(recipient),
		amount,
	}
	.abi_encode()
	.into()
}

pub fn deposit_for_burn_calldata(
	amount: U256,
	destination_domain: u32,
	mint_recipient: Address,
	burn_token: Address,
) -> Bytes {
	depositForBurnCall {
		amount,
		destinationDomain: destination_domain,
		mintRecipient: address_to_bytes32(mint_recipient),
		burnToken: burn_token,
	}
	.abi_encode()
	.into()
}

pub fn gateway_mint_calldata(attestation: &Bytes, signature: &Bytes) -> Bytes {
	gatewayMintCall {
		attestation: attestation.clone(),
		signature: signature.clone(),
	}
	.abi_encode()
	.into()
}

pub fn deposit_calldata(token: Address, value: U256) -> Bytes {
	depositCall { token, value }.abi_encode().into()
}

/// Extract the dispatched message body from a `MessageSent` log
///
/// The event data is one ABI-encoded dynamic `bytes` value: a 32-byte
/// offset, a 32-byte length, then the payload.
pub fn extract_message_body(receipt: &TransactionReceipt) -> Option<Bytes> {
	let log = receipt
		.logs
		.iter()
		.find(|log| log.topics.first() == Some(&MessageSent::SIGNATURE_HASH))?;

	let data = log.data.as_ref();
	if data.len() < 64 {
		return None;
	}
	let length = U256::from_be_slice(&data[32..64]);
	let length: usize = length.try_into().ok()?;
	data.get(64..64 + length).map(|body| Bytes::copy_from_slice(body))
}

/// Message hash of a dispatched bridge message
pub fn message_id_from_body(body: &Bytes) -> B256 {
	keccak256(body)
}

/// Extract the message identifier from a `DispatchId` log
pub fn extract_dispatch_id(receipt: &TransactionReceipt) -> Option<B256> {
	receipt.logs.iter().find_map(|log| {
		(log.topics.first() == Some(&DispatchId::SIGNATURE_HASH))
			.then(|| log.topics.get(1).copied())
			.flatten()
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use rebalancer_types::LogEntry;

	fn receipt_with_logs(logs: Vec<LogEntry>) -> TransactionReceipt {
		TransactionReceipt {
			transaction_hash: B256::repeat_byte(1),
			success: true,
			logs,
		}
	}

	#[test]
	fn message_body_round_trips_through_log_encoding() {
		let body = Bytes::from_static(b"settlement message body");
		let mut data = Vec::new();
		data.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
		data.extend_from_slice(&U256::from(body.len() as u64).to_be_bytes::<32>());
		data.extend_from_slice(&body);

		let receipt = receipt_with_logs(vec![LogEntry {
			address: Address::repeat_byte(2),
			topics: vec![MessageSent::SIGNATURE_HASH],
			data: data.into(),
		}]);

		let extracted = extract_message_body(&receipt).unwrap();
		assert_eq!(extracted, body);
		assert_eq!(message_id_from_body(&extracted), keccak256(&body));
	}

	#[test]
	fn missing_dispatch_log_yields_none() {
		let receipt = receipt_with_logs(vec![LogEntry {
			address: Address::repeat_byte(2),
			topics: vec![B256::repeat_byte(0xee)],
			data: Bytes::new(),
		}]);
		assert!(extract_message_body(&receipt).is_none());
		assert!(extract_dispatch_id(&receipt).is_none());
	}

	#[test]
	fn dispatch_id_comes_from_the_indexed_topic() {
		let message_id = B256::repeat_byte(0x42);
		let receipt = receipt_with_logs(vec![LogEntry {
			address: Address::repeat_byte(3),
			topics: vec![DispatchId::SIGNATURE_HASH, message_id],
			data: Bytes::new(),
		}]);
		assert_eq!(extract_dispatch_id(&receipt), Some(message_id));
	}

	#[test]
	fn calldata_starts_with_the_selector() {
		let data = approve_calldata(Address::repeat_byte(9), U256::from(10u64));
		assert_eq!(&data[..4], &approveCall::SELECTOR);

		let data = transfer_remote_calldata(10, Address::repeat_byte(9), U256::from(10u64));
		assert_eq!(&data[..4], &transferRemoteCall::SELECTOR);
	}
}
