//! Consumed collaborator contracts
//!
//! These traits are the seams to infrastructure owned elsewhere: swap
//! aggregators, bridge info/attestation services, balance lookups, wallet
//! signing, and the durable job queue. The core is written against these
//! contracts only.

use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::execution::{TransactionReceipt, TransferInstruction};
use crate::routes::SwapLeg;
use crate::tokens::TokenDescriptor;

/// Errors surfaced by network-facing collaborators
#[derive(Debug, Error)]
pub enum AdapterError {
	#[error("http error: {0}")]
	Http(String),

	#[error("invalid response: {0}")]
	InvalidResponse(String),

	#[error("{service} rejected the request: {message}")]
	Rejected { service: String, message: String },
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result of executing one swap leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapExecution {
	pub transaction_hash: B256,
}

/// Uniform facade over an external swap-quote/execute service
///
/// Safe to call concurrently for different token pairs.
#[async_trait]
pub trait SwapAdapter: Send + Sync {
	async fn quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		request_id: Option<&str>,
	) -> AdapterResult<SwapLeg>;

	async fn execute(&self, wallet: Address, leg: &SwapLeg) -> AdapterResult<SwapExecution>;
}

/// One settlement-network domain and its capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
	pub domain: u32,
	pub chain_id: u64,
	pub has_source_capability: bool,
	pub has_destination_capability: bool,
}

/// Bridge metadata lookups; results are cacheable for up to one hour
#[async_trait]
pub trait BridgeInfoService: Send + Sync {
	async fn get_supported_domains(&self) -> AdapterResult<Vec<DomainInfo>>;
}

/// On-chain balance and allowance reads
#[async_trait]
pub trait BalanceQueryService: Send + Sync {
	/// Token balance when `token` is given, native balance otherwise
	async fn get_balance(
		&self,
		chain_id: u64,
		owner: Address,
		token: Option<Address>,
	) -> AdapterResult<U256>;

	/// Every token the owner currently holds on a chain
	async fn get_all_held_tokens(
		&self,
		chain_id: u64,
		owner: Address,
	) -> AdapterResult<Vec<TokenDescriptor>>;

	async fn get_allowance(
		&self,
		chain_id: u64,
		owner: Address,
		token: Address,
		spender: Address,
	) -> AdapterResult<U256>;
}

/// Wallet signing and transaction submission capability
#[async_trait]
pub trait WalletSigningService: Send + Sync {
	async fn get_address(&self, chain_id: u64) -> AdapterResult<Address>;

	/// Sign an EIP-712 typed-data payload
	async fn sign_typed_data(&self, chain_id: u64, payload: &Value) -> AdapterResult<Bytes>;

	async fn send_transaction(&self, instruction: &TransferInstruction) -> AdapterResult<B256>;

	async fn wait_for_receipt(
		&self,
		chain_id: u64,
		transaction_hash: B256,
	) -> AdapterResult<TransactionReceipt>;
}

/// Available unified balance on one domain, in base-6 units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBalance {
	pub domain: u32,
	pub available_base6: U256,
}

/// A signed burn intent ready for attestation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransferIntent {
	/// EIP-712 message body of the burn intent
	pub intent: Value,
	pub signature: Bytes,
}

/// Attestation authorizing one destination mint for a batch of intents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationBundle {
	pub attestation: Bytes,
	pub signature: Bytes,
}

/// Deposit-wallet and minter contracts of one settlement-network domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainContracts {
	pub wallet: Option<Address>,
	pub minter: Option<Address>,
}

/// Settlement-network API: unified balances and batch attestations
#[async_trait]
pub trait UnifiedBalanceService: Send + Sync {
	/// Per-domain available balances for a depositor
	async fn get_unified_balances(&self, depositor: Address)
		-> AdapterResult<Vec<DomainBalance>>;

	/// Contracts registered for a domain; cacheable alongside domain info
	async fn get_domain_contracts(&self, domain: u32) -> AdapterResult<DomainContracts>;

	/// Submit a batch of signed burn intents; one attestation per batch
	async fn create_transfer_attestation(
		&self,
		intents: &[SignedTransferIntent],
	) -> AdapterResult<AttestationBundle>;
}

/// Status of a bridge message confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum AttestationStatus {
	Pending,
	Complete { attestation: Bytes },
	Failed { reason: String },
}

/// Polls the bridge's attestation/message-dispatch service
#[async_trait]
pub trait AttestationClient: Send + Sync {
	async fn fetch(&self, message_id: B256) -> AdapterResult<AttestationStatus>;
}

/// Options for enqueuing a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
	/// Writes with the same key never double-apply
	pub dedup_key: String,
	pub max_attempts: u32,
	/// Base delay between failure retries; grows exponentially
	pub backoff: Duration,
	/// Initial delay before the first run
	pub delay: Duration,
}

impl JobOptions {
	pub fn new(dedup_key: impl Into<String>) -> Self {
		Self {
			dedup_key: dedup_key.into(),
			max_attempts: 1,
			backoff: Duration::from_secs(15),
			delay: Duration::ZERO,
		}
	}

	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;
		self
	}

	pub fn with_backoff(mut self, backoff: Duration) -> Self {
		self.backoff = backoff;
		self
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}
}

/// Terminal record of a finished job, retrievable by dedup key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedJob {
	pub dedup_key: String,
	pub job_name: String,
	pub succeeded: bool,
	/// Handler-reported outcome, or the terminal error message
	pub outcome: Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobQueueError {
	#[error("job queue is full")]
	QueueFull,

	#[error("job queue is shutting down")]
	ShuttingDown,

	#[error("invalid job payload: {0}")]
	InvalidPayload(String),
}

/// Durable, deduplicated job queue with at-least-once delivery
#[async_trait]
pub trait JobQueue: Send + Sync {
	/// Enqueue a job; idempotent under the same dedup key
	async fn enqueue(
		&self,
		job_name: &str,
		payload: Value,
		options: JobOptions,
	) -> Result<(), JobQueueError>;

	/// Look up a previously-completed job by its dedup key
	async fn completed(&self, dedup_key: &str) -> Option<CompletedJob>;

	/// Remove a not-yet-started job; returns whether anything was removed
	async fn cancel(&self, dedup_key: &str) -> bool;
}
