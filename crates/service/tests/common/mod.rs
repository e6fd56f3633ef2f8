//! Shared mocks and fixtures for the scenario suites
#![allow(dead_code)]

use std::sync::Mutex;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;

use rebalancer_service::contracts;
use rebalancer_types::{
	AdapterResult, AttestationBundle, AttestationClient, AttestationStatus, BalanceQueryService,
	BridgeInfoService, CompletedJob, DomainBalance, DomainContracts, DomainInfo, JobOptions,
	JobQueue, JobQueueError, LogEntry, SettlementAssetRegistry, SignedTransferIntent, SwapAdapter,
	SwapExecution, SwapLeg, TokenDescriptor, TransactionReceipt, TransferInstruction,
	UnifiedBalanceService, WalletSigningService,
};

mock! {
	pub Swap {}

	#[async_trait]
	impl SwapAdapter for Swap {
		#[mockall::concretize]
		async fn quote(
			&self,
			token_in: &TokenDescriptor,
			token_out: &TokenDescriptor,
			amount: U256,
			request_id: Option<&str>,
		) -> AdapterResult<SwapLeg>;

		async fn execute(&self, wallet: Address, leg: &SwapLeg) -> AdapterResult<SwapExecution>;
	}
}

mock! {
	pub Wallet {}

	#[async_trait]
	impl WalletSigningService for Wallet {
		async fn get_address(&self, chain_id: u64) -> AdapterResult<Address>;
		async fn sign_typed_data(&self, chain_id: u64, payload: &Value) -> AdapterResult<Bytes>;
		async fn send_transaction(&self, instruction: &TransferInstruction) -> AdapterResult<B256>;
		async fn wait_for_receipt(
			&self,
			chain_id: u64,
			transaction_hash: B256,
		) -> AdapterResult<TransactionReceipt>;
	}
}

mock! {
	pub Balances {}

	#[async_trait]
	impl BalanceQueryService for Balances {
		async fn get_balance(
			&self,
			chain_id: u64,
			owner: Address,
			token: Option<Address>,
		) -> AdapterResult<U256>;
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
}

mock! {
	pub Info {}

	#[async_trait]
	impl BridgeInfoService for Info {
		async fn get_supported_domains(&self) -> AdapterResult<Vec<DomainInfo>>;
	}
}

mock! {
	pub Unified {}

	#[async_trait]
	impl UnifiedBalanceService for Unified {
		async fn get_unified_balances(
			&self,
			depositor: Address,
		) -> AdapterResult<Vec<DomainBalance>>;
		async fn get_domain_contracts(&self, domain: u32) -> AdapterResult<DomainContracts>;
		async fn create_transfer_attestation(
			&self,
			intents: &[SignedTransferIntent],
		) -> AdapterResult<AttestationBundle>;
	}
}

mock! {
	pub Attestations {}

	#[async_trait]
	impl AttestationClient for Attestations {
		async fn fetch(&self, message_id: B256) -> AdapterResult<AttestationStatus>;
	}
}

/// Queue double that records every enqueue without running anything
#[derive(Default)]
pub struct RecordingQueue {
	pub jobs: Mutex<Vec<(String, Value, JobOptions)>>,
}

impl RecordingQueue {
	pub fn job_names(&self) -> Vec<String> {
		self.jobs
			.lock()
			.unwrap()
			.iter()
			.map(|(name, _, _)| name.clone())
			.collect()
	}
}

#[async_trait]
impl JobQueue for RecordingQueue {
	async fn enqueue(
		&self,
		job_name: &str,
		payload: Value,
		options: JobOptions,
	) -> Result<(), JobQueueError> {
		self.jobs
			.lock()
			.unwrap()
			.push((job_name.to_string(), payload, options));
		Ok(())
	}

	async fn completed(&self, _dedup_key: &str) -> Option<CompletedJob> {
		None
	}

	async fn cancel(&self, _dedup_key: &str) -> bool {
		false
	}
}

pub const WALLET: Address = Address::repeat_byte(0x77);

pub fn usdc(chain_id: u64) -> TokenDescriptor {
	let registry = SettlementAssetRegistry::new();
	TokenDescriptor::new(chain_id, registry.settlement_asset(chain_id).unwrap(), 6)
}

pub fn erc20(chain_id: u64, tag: u8, decimals: u8) -> TokenDescriptor {
	TokenDescriptor::new(chain_id, Address::repeat_byte(tag), decimals)
}

pub fn swap_leg(
	token_in: &TokenDescriptor,
	token_out: &TokenDescriptor,
	from_amount: U256,
	to_amount: U256,
	tool: &str,
) -> SwapLeg {
	SwapLeg {
		token_in: token_in.clone(),
		token_out: token_out.clone(),
		from_amount,
		to_amount,
		to_amount_min: to_amount,
		slippage: 0.005,
		tool: tool.to_string(),
	}
}

/// Domains where both chains have full source/destination capability
pub fn full_capability_domains() -> Vec<DomainInfo> {
	vec![
		DomainInfo {
			domain: 0,
			chain_id: 1,
			has_source_capability: true,
			has_destination_capability: true,
		},
		DomainInfo {
			domain: 2,
			chain_id: 10,
			has_source_capability: true,
			has_destination_capability: true,
		},
	]
}

/// A successful receipt carrying a burn-bridge `MessageSent` log
pub fn receipt_with_message(transaction_hash: B256, body: &[u8]) -> TransactionReceipt {
	let mut data = Vec::new();
	data.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
	data.extend_from_slice(&U256::from(body.len() as u64).to_be_bytes::<32>());
	data.extend_from_slice(body);

	TransactionReceipt {
		transaction_hash,
		success: true,
		logs: vec![LogEntry {
			address: Address::repeat_byte(0xb0),
			topics: vec![contracts::MESSAGE_SENT_TOPIC],
			data: data.into(),
		}],
	}
}

/// A successful receipt carrying a warp `DispatchId` log
pub fn receipt_with_dispatch(transaction_hash: B256, message_id: B256) -> TransactionReceipt {
	TransactionReceipt {
		transaction_hash,
		success: true,
		logs: vec![LogEntry {
			address: Address::repeat_byte(0xb1),
			topics: vec![contracts::DISPATCH_ID_TOPIC, message_id],
			data: Bytes::new(),
		}],
	}
}

/// A successful receipt with no interesting logs
pub fn plain_receipt(transaction_hash: B256) -> TransactionReceipt {
	TransactionReceipt {
		transaction_hash,
		success: true,
		logs: Vec::new(),
	}
}
