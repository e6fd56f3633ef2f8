//! Relay job payloads
//!
//! Continuations cross the queue boundary as data. Every payload here must
//! round-trip through JSON unchanged.

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rebalancer_types::ConfirmationContext;

/// Job name for confirmation watches
pub const CONFIRMATION_WATCH_JOB: &str = "confirmation-watch";

/// Job name for post-transfer unified-balance top-ups
pub const BALANCE_TOP_UP_JOB: &str = "balance-top-up";

/// Dedup key of a confirmation watch; one watch per bridge message
pub fn confirmation_dedup_key(message_id: B256) -> String {
	format!("confirmation-{message_id}")
}

/// Dedup key of a balance top-up, per operation/domain/token
pub fn top_up_dedup_key(domain: u32, token: Address) -> String {
	format!("topup-{domain}-{token}")
}

/// Payload of one confirmation watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationWatchPayload {
	pub context: ConfirmationContext,
	/// When the bridge leg was submitted; the expiry clock starts here
	pub submitted_at: DateTime<Utc>,
}

/// Payload of one unified-balance top-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTopUpPayload {
	pub chain_id: u64,
	/// Settlement-asset token to deposit
	pub token: Address,
	/// Deposit wallet contract of the settlement network
	pub deposit_wallet: Address,
	pub amount_base6: U256,
	pub depositor: Address,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn watch_payload_round_trips() {
		let payload = ConfirmationWatchPayload {
			context: ConfirmationContext::observability_only(
				10,
				B256::repeat_byte(3),
				Address::repeat_byte(4),
			),
			submitted_at: Utc::now(),
		};
		let value = serde_json::to_value(&payload).unwrap();
		let back: ConfirmationWatchPayload = serde_json::from_value(value).unwrap();
		assert_eq!(back, payload);
	}

	#[test]
	fn dedup_keys_embed_identity() {
		let id = B256::repeat_byte(0xab);
		assert!(confirmation_dedup_key(id).contains(&id.to_string()));

		let token = Address::repeat_byte(0xcd);
		let key = top_up_dedup_key(6, token);
		assert!(key.starts_with("topup-6-"));
		assert!(key.contains(&token.to_string()));
	}
}
