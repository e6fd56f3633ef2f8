//! Execution results and partial-failure error semantics
//!
//! Once the bridge leg has been submitted, effects of prior legs are not
//! rolled back; there are no compensating transactions. Failures after
//! submission are reported through the job queue's failure channel, never
//! through the original caller's call stack.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One concrete action to realize a leg on a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
	pub chain_id: u64,
	pub to: Address,
	pub data: Bytes,
	#[serde(default)]
	pub value: U256,
}

impl TransferInstruction {
	pub fn new(chain_id: u64, to: Address, data: impl Into<Bytes>) -> Self {
		Self {
			chain_id,
			to,
			data: data.into(),
			value: U256::ZERO,
		}
	}

	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}
}

/// Minimal receipt log entry needed to locate settlement-dispatch events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
}

/// Outcome of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub transaction_hash: B256,
	pub success: bool,
	pub logs: Vec<LogEntry>,
}

/// What the caller gets back from `execute`: the bridge submission outcome
///
/// `message_id` is present whenever the bridge dispatched a cross-chain
/// message that a confirmation watch was keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
	pub transaction_hash: B256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message_id: Option<B256>,
}

/// Execution-time failures
#[derive(Debug, Error)]
pub enum ExecutionError {
	/// The source swap leg failed; no bridge or destination leg was attempted
	#[error("source swap failed: {reason}")]
	SourceSwapFailed { reason: String },

	/// The bridge leg failed; the source swap's effects are not reversed
	#[error("bridge submission failed: {reason}")]
	BridgeSubmissionFailed { reason: String },

	/// The submission receipt carries no settlement-dispatch log. This is a
	/// protocol-level anomaly, not a transient fault; it is not retried.
	#[error("no settlement message dispatched in transaction {transaction_hash}")]
	NoMessageDispatched { transaction_hash: B256 },

	/// The quote was produced by a different provider than the one executing
	#[error("quote strategy mismatch: this provider executes {expected} quotes")]
	StrategyMismatch { expected: &'static str },

	#[error("wallet operation failed: {0}")]
	Wallet(String),

	#[error("swap adapter error: {0}")]
	Adapter(String),

	#[error("job queue error: {0}")]
	Queue(String),
}
