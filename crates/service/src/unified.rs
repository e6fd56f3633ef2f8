//! Unified-balance settlement transfers
//!
//! Moves the settlement asset itself between chains by drawing on a
//! pre-funded multi-domain balance pool: selects enough per-domain sources
//! to cover the amount fee-aware, signs one burn intent per contributing
//! domain, obtains a single batch attestation, and mints on the destination.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use rebalancer_adapters::TtlCache;
use rebalancer_config::{UnifiedChainSettings, UnifiedFeeSettings, UnifiedSettings};
use rebalancer_types::{
	BalanceSource, BridgeInfoService, DomainBalance, DomainInfo, ExecutionError, JobOptions,
	JobQueue, PlanningError, QuoteBuildError, RouteProvider, RouteQuote, RouteQuoteContext,
	RouteStep, SignedTransferIntent, StepKind, SubmissionReceipt, TokenDescriptor,
	TransferInstruction, UnifiedBalanceService, UnifiedContext, WalletSigningService,
};

use crate::contracts;
use crate::relay::{top_up_dedup_key, BalanceTopUpPayload, BALANCE_TOP_UP_JOB};

/// Supported-domain lookups are cacheable for up to one hour
const DOMAIN_INFO_TTL: Duration = Duration::from_secs(60 * 60);

/// Burn intents stay valid effectively forever; expiry is not load-bearing
const MAX_BLOCK_HEIGHT: u64 = 10_000_000_000;

/// Affine per-domain fee model: `fee(domain, v) = base(domain) + ceil(v*n/d)`
#[derive(Debug, Clone)]
pub struct FeeSchedule {
	numerator: U256,
	denominator: U256,
	base_by_domain: HashMap<u32, U256>,
	fallback_base: U256,
}

impl FeeSchedule {
	pub fn from_settings(settings: &UnifiedFeeSettings) -> Self {
		Self {
			numerator: U256::from(settings.numerator),
			denominator: U256::from(settings.denominator),
			base_by_domain: settings
				.base_by_domain
				.iter()
				.map(|(domain, base)| (*domain, U256::from(*base)))
				.collect(),
			fallback_base: U256::from(settings.fallback_base),
		}
	}

	pub fn base_fee(&self, domain: u32) -> U256 {
		self.base_by_domain
			.get(&domain)
			.copied()
			.unwrap_or(self.fallback_base)
	}

	/// Proportional component, rounded up
	pub fn proportional_fee(&self, value: U256) -> U256 {
		if value.is_zero() {
			return U256::ZERO;
		}
		(value * self.numerator + self.denominator - U256::from(1u8)) / self.denominator
	}

	pub fn fee(&self, domain: u32, value: U256) -> U256 {
		self.base_fee(domain) + self.proportional_fee(value)
	}

	/// Largest `value` with `value + fee(domain, value) <= available`
	///
	/// The fee is affine in `value`, so the bound solves directly:
	/// `value + ceil(value*n/d) <= available - base` collapses to
	/// `value <= (available - base) * d / (d + n)`.
	pub fn max_transferable(&self, domain: u32, available: U256, cap: Option<U256>) -> U256 {
		let base = self.base_fee(domain);
		if available <= base {
			return U256::ZERO;
		}
		let headroom = available - base;
		let value = headroom * self.denominator / (self.denominator + self.numerator);
		match cap {
			Some(cap) if cap < value => cap,
			_ => value,
		}
	}

	/// Fee fraction reported as quote slippage
	pub fn fee_fraction(&self) -> f64 {
		let numerator: u128 = self.numerator.to::<u128>();
		let denominator: u128 = self.denominator.to::<u128>();
		numerator as f64 / denominator as f64
	}
}

pub struct MultiSourceBalanceAggregator {
	unified: Arc<dyn UnifiedBalanceService>,
	info: Arc<dyn BridgeInfoService>,
	wallet: Arc<dyn WalletSigningService>,
	queue: Arc<dyn JobQueue>,
	settings: UnifiedSettings,
	fees: FeeSchedule,
	domains: TtlCache<Vec<DomainInfo>>,
}

impl MultiSourceBalanceAggregator {
	pub fn new(
		unified: Arc<dyn UnifiedBalanceService>,
		info: Arc<dyn BridgeInfoService>,
		wallet: Arc<dyn WalletSigningService>,
		queue: Arc<dyn JobQueue>,
		settings: UnifiedSettings,
	) -> Self {
		let fees = FeeSchedule::from_settings(&settings.fees);
		Self {
			unified,
			info,
			wallet,
			queue,
			settings,
			fees,
			domains: TtlCache::new(),
		}
	}

	pub fn fees(&self) -> &FeeSchedule {
		&self.fees
	}

	fn chain_settings(&self, chain_id: u64) -> Option<&UnifiedChainSettings> {
		self.settings.chains.iter().find(|c| c.chain_id == chain_id)
	}

	async fn supported_domains(&self) -> Result<Vec<DomainInfo>, QuoteBuildError> {
		let info = Arc::clone(&self.info);
		self.domains
			.get_or_refresh("supported-domains", DOMAIN_INFO_TTL, move || async move {
				info.get_supported_domains().await
			})
			.await
			.map_err(|e| QuoteBuildError::RouteBuildError {
				reason: e.to_string(),
			})
	}

	fn validate_tokens(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
	) -> Result<(UnifiedChainSettings, UnifiedChainSettings), QuoteBuildError> {
		if token_in.chain_id == token_out.chain_id {
			return Err(PlanningError::NoRouteForChainPair {
				source_chain_id: token_in.chain_id,
				destination_chain_id: token_out.chain_id,
			}
			.into());
		}
		let source = self
			.chain_settings(token_in.chain_id)
			.ok_or(PlanningError::NoRouteForChainPair {
				source_chain_id: token_in.chain_id,
				destination_chain_id: token_out.chain_id,
			})?
			.clone();
		let destination = self
			.chain_settings(token_out.chain_id)
			.ok_or(PlanningError::NoRouteForChainPair {
				source_chain_id: token_in.chain_id,
				destination_chain_id: token_out.chain_id,
			})?
			.clone();

		// This mechanism moves only the settlement asset itself
		if token_in.address != source.token || token_out.address != destination.token {
			return Err(QuoteBuildError::UnsupportedToken {
				reason: "unified transfers move only the settlement asset".to_string(),
			});
		}
		if token_in.decimals != 6 || token_out.decimals != 6 {
			warn!(
				in_decimals = token_in.decimals,
				out_decimals = token_out.decimals,
				"settlement asset decimals are not 6; check token configuration"
			);
		}
		Ok((source, destination))
	}

	/// Greedy fee-aware source selection: largest balances first, the last
	/// contribution capped so the sum lands exactly on the request
	fn select_sources(
		&self,
		amount: U256,
		balances: &[DomainBalance],
	) -> Result<Vec<BalanceSource>, QuoteBuildError> {
		let mut per_domain: Vec<DomainBalance> = balances.to_vec();
		per_domain.sort_by(|a, b| b.available_base6.cmp(&a.available_base6));

		let mut sources = Vec::new();
		let mut remaining = amount;
		for entry in &per_domain {
			if remaining.is_zero() {
				break;
			}
			if entry.available_base6.is_zero() {
				continue;
			}
			let contribution = self.fees.max_transferable(
				entry.domain,
				entry.available_base6,
				Some(remaining),
			);
			if !contribution.is_zero() {
				sources.push(BalanceSource {
					domain: entry.domain,
					amount_base6: contribution,
				});
				remaining -= contribution;
			}
		}

		if !remaining.is_zero() || sources.is_empty() {
			let available: U256 = balances
				.iter()
				.fold(U256::ZERO, |acc, b| acc + b.available_base6);
			return Err(QuoteBuildError::InsufficientUnifiedBalance {
				requested_base6: amount.to_string(),
				available_base6: available.to_string(),
			});
		}
		Ok(sources)
	}

	fn burn_intent_typed_data(
		&self,
		source: &BalanceSource,
		source_wallet: Address,
		destination_minter: Address,
		source_token: Address,
		destination_token: Address,
		destination_domain: u32,
		depositor: Address,
		recipient: Address,
		salt_seed: &str,
	) -> Value {
		let to_bytes32 =
			|address: Address| format!("{}", contracts::address_to_bytes32(address));
		let max_fee = self.fees.fee(source.domain, source.amount_base6);
		let salt = keccak256(salt_seed.as_bytes());

		json!({
			"types": {
				"EIP712Domain": [
					{ "name": "name", "type": "string" },
					{ "name": "version", "type": "string" },
				],
				"TransferSpec": [
					{ "name": "version", "type": "uint32" },
					{ "name": "sourceDomain", "type": "uint32" },
					{ "name": "destinationDomain", "type": "uint32" },
					{ "name": "sourceContract", "type": "bytes32" },
					{ "name": "destinationContract", "type": "bytes32" },
					{ "name": "sourceToken", "type": "bytes32" },
					{ "name": "destinationToken", "type": "bytes32" },
					{ "name": "sourceDepositor", "type": "bytes32" },
					{ "name": "destinationRecipient", "type": "bytes32" },
					{ "name": "sourceSigner", "type": "bytes32" },
					{ "name": "destinationCaller", "type": "bytes32" },
					{ "name": "value", "type": "uint256" },
					{ "name": "salt", "type": "bytes32" },
					{ "name": "hookData", "type": "bytes" },
				],
				"BurnIntent": [
					{ "name": "maxBlockHeight", "type": "uint256" },
					{ "name": "maxFee", "type": "uint256" },
					{ "name": "spec", "type": "TransferSpec" },
				],
			},
			"domain": { "name": "GatewayWallet", "version": "1" },
			"primaryType": "BurnIntent",
			"message": {
				"maxBlockHeight": MAX_BLOCK_HEIGHT.to_string(),
				"maxFee": max_fee.to_string(),
				"spec": {
					"version": 1,
					"sourceDomain": source.domain,
					"destinationDomain": destination_domain,
					"sourceContract": to_bytes32(source_wallet),
					"destinationContract": to_bytes32(destination_minter),
					"sourceToken": to_bytes32(source_token),
					"destinationToken": to_bytes32(destination_token),
					"sourceDepositor": to_bytes32(depositor),
					"destinationRecipient": to_bytes32(recipient),
					"sourceSigner": to_bytes32(depositor),
					"destinationCaller": to_bytes32(Address::ZERO),
					"value": source.amount_base6.to_string(),
					"salt": format!("{salt}"),
					"hookData": "0x",
				},
			},
		})
	}

	async fn ensure_sufficient_balance(
		&self,
		depositor: Address,
		required: U256,
	) -> Result<Vec<DomainBalance>, QuoteBuildError> {
		let balances = self
			.unified
			.get_unified_balances(depositor)
			.await
			.map_err(|e| QuoteBuildError::RouteBuildError {
				reason: e.to_string(),
			})?;
		let available: U256 = balances
			.iter()
			.fold(U256::ZERO, |acc, b| acc + b.available_base6);
		if available < required {
			return Err(QuoteBuildError::InsufficientUnifiedBalance {
				requested_base6: required.to_string(),
				available_base6: available.to_string(),
			});
		}
		Ok(balances)
	}

	/// Replenish the depositor's unified balance from the recipient's funds.
	/// Fire-and-forget: the transfer already completed, failures only log.
	async fn enqueue_top_up(&self, source: &UnifiedChainSettings, amount: U256, depositor: Address) {
		let deposit_wallet = match self
			.unified
			.get_domain_contracts(source.domain)
			.await
			.ok()
			.and_then(|contracts| contracts.wallet.or(source.wallet))
		{
			Some(wallet) => wallet,
			None => {
				warn!(
					domain = source.domain,
					"skipping top-up enqueue, no deposit wallet known"
				);
				return;
			},
		};

		let payload = BalanceTopUpPayload {
			chain_id: source.chain_id,
			token: source.token,
			deposit_wallet,
			amount_base6: amount,
			depositor,
		};
		let options = JobOptions::new(top_up_dedup_key(source.domain, source.token))
			.with_max_attempts(3)
			.with_backoff(Duration::from_secs(15));

		match serde_json::to_value(&payload) {
			Ok(payload) => {
				if let Err(e) = self.queue.enqueue(BALANCE_TOP_UP_JOB, payload, options).await {
					warn!(error = %e, "failed to enqueue balance top-up");
				}
			},
			Err(e) => warn!(error = %e, "failed to serialize balance top-up payload"),
		}
	}
}

#[async_trait]
impl RouteProvider for MultiSourceBalanceAggregator {
	fn strategy(&self) -> rebalancer_types::Strategy {
		rebalancer_types::Strategy::Unified
	}

	async fn get_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		request_id: Option<&str>,
	) -> Result<RouteQuote, QuoteBuildError> {
		let (source_chain, destination_chain) = self.validate_tokens(token_in, token_out)?;

		let domains = self.supported_domains().await?;
		let source_ok = domains
			.iter()
			.any(|d| d.domain == source_chain.domain && d.has_source_capability);
		let destination_ok = domains
			.iter()
			.any(|d| d.domain == destination_chain.domain && d.has_destination_capability);
		if !source_ok || !destination_ok {
			return Err(PlanningError::NoRouteForChainPair {
				source_chain_id: token_in.chain_id,
				destination_chain_id: token_out.chain_id,
			}
			.into());
		}

		let depositor = self
			.wallet
			.get_address(token_in.chain_id)
			.await
			.map_err(|e| QuoteBuildError::RouteBuildError {
				reason: e.to_string(),
			})?;
		let balances = self.ensure_sufficient_balance(depositor, amount).await?;
		let sources = self.select_sources(amount, &balances)?;

		debug!(
			request_id,
			source_domain = sources[0].domain,
			destination_domain = destination_chain.domain,
			source_count = sources.len(),
			%amount,
			"built unified-balance quote"
		);

		let context = UnifiedContext {
			source_domain: sources[0].domain,
			destination_domain: destination_chain.domain,
			amount_base6: amount,
			sources,
		};
		Ok(RouteQuote::new(
			token_in.clone(),
			token_out.clone(),
			amount,
			amount,
			self.fees.fee_fraction(),
			vec![RouteStep::required(StepKind::Bridge)],
			RouteQuoteContext::Unified(context),
		)
		.with_request_id(request_id.map(str::to_string)))
	}

	async fn execute(
		&self,
		wallet: Address,
		quote: &RouteQuote,
	) -> Result<SubmissionReceipt, ExecutionError> {
		let RouteQuoteContext::Unified(context) = &quote.context else {
			return Err(ExecutionError::StrategyMismatch { expected: "unified" });
		};
		let source_chain = self
			.chain_settings(quote.token_in.chain_id)
			.cloned()
			.ok_or_else(|| ExecutionError::BridgeSubmissionFailed {
				reason: format!("chain {} left the unified config", quote.token_in.chain_id),
			})?;
		let destination_chain = self
			.chain_settings(quote.token_out.chain_id)
			.cloned()
			.ok_or_else(|| ExecutionError::BridgeSubmissionFailed {
				reason: format!("chain {} left the unified config", quote.token_out.chain_id),
			})?;

		let depositor = self
			.wallet
			.get_address(quote.token_in.chain_id)
			.await
			.map_err(|e| ExecutionError::Wallet(e.to_string()))?;

		// Balances may have moved since quoting
		self.ensure_sufficient_balance(depositor, context.amount_base6)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;

		let destination_minter = self
			.unified
			.get_domain_contracts(context.destination_domain)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?
			.minter
			.or(destination_chain.minter)
			.ok_or_else(|| ExecutionError::BridgeSubmissionFailed {
				reason: format!(
					"no minter known for destination domain {}",
					context.destination_domain
				),
			})?;

		// One signed burn intent per contributing domain, each carrying its
		// own max fee; all submitted together as a single batch
		let mut intents = Vec::with_capacity(context.sources.len());
		for source in &context.sources {
			let source_wallet = self
				.unified
				.get_domain_contracts(source.domain)
				.await
				.map_err(|e| ExecutionError::BridgeSubmissionFailed {
					reason: e.to_string(),
				})?
				.wallet
				.ok_or_else(|| ExecutionError::BridgeSubmissionFailed {
					reason: format!("no deposit wallet known for domain {}", source.domain),
				})?;
			let source_token = self
				.settings
				.chains
				.iter()
				.find(|c| c.domain == source.domain)
				.map(|c| c.token)
				.unwrap_or(source_chain.token);

			let salt_seed = format!(
				"{}-{}-{}-{}-{}",
				quote.quote_id,
				depositor,
				source.domain,
				source.amount_base6,
				Utc::now().timestamp_millis(),
			);
			let typed_data = self.burn_intent_typed_data(
				source,
				source_wallet,
				destination_minter,
				source_token,
				destination_chain.token,
				context.destination_domain,
				depositor,
				wallet,
				&salt_seed,
			);
			let signature = self
				.wallet
				.sign_typed_data(quote.token_in.chain_id, &typed_data)
				.await
				.map_err(|e| ExecutionError::Wallet(e.to_string()))?;

			debug!(
				source_domain = source.domain,
				value = %source.amount_base6,
				max_fee = %self.fees.fee(source.domain, source.amount_base6),
				"signed burn intent"
			);
			intents.push(SignedTransferIntent {
				intent: typed_data["message"].clone(),
				signature,
			});
		}

		let attestation = self
			.unified
			.create_transfer_attestation(&intents)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;

		let mint = TransferInstruction::new(
			quote.token_out.chain_id,
			destination_minter,
			contracts::gateway_mint_calldata(&attestation.attestation, &attestation.signature),
		);
		let transaction_hash = self
			.wallet
			.send_transaction(&mint)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;
		let receipt = self
			.wallet
			.wait_for_receipt(quote.token_out.chain_id, transaction_hash)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;
		if !receipt.success {
			return Err(ExecutionError::BridgeSubmissionFailed {
				reason: format!("mint transaction {transaction_hash} reverted"),
			});
		}

		info!(
			quote_id = %quote.quote_id,
			%transaction_hash,
			destination_chain = quote.token_out.chain_id,
			sources = context.sources.len(),
			"minted on destination"
		);

		self.enqueue_top_up(&source_chain, context.amount_base6, depositor)
			.await;

		Ok(SubmissionReceipt {
			transaction_hash,
			message_id: None,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schedule() -> FeeSchedule {
		FeeSchedule::from_settings(&UnifiedFeeSettings::default())
	}

	#[test]
	fn fee_is_base_plus_ceiled_proportion() {
		let fees = schedule();
		// base 10_000 on domain 3, plus ceil(1_000_000 * 5 / 100_000) = 50
		assert_eq!(
			fees.fee(3, U256::from(1_000_000u64)),
			U256::from(10_050u64)
		);
		// proportional part rounds up
		assert_eq!(fees.proportional_fee(U256::from(1u64)), U256::from(1u64));
		// unmapped domains use the fallback base
		assert_eq!(fees.base_fee(999), U256::from(2_000_000u64));
	}

	#[test]
	fn max_transferable_saturates_the_available_balance() {
		let fees = schedule();
		for available in [15_000u64, 100_000, 1_000_000, 123_456_789] {
			let available = U256::from(available);
			let value = fees.max_transferable(3, available, None);
			assert!(value + fees.fee(3, value) <= available);
			let next = value + U256::from(1u8);
			assert!(next + fees.fee(3, next) > available);
		}
	}

	#[test]
	fn max_transferable_is_zero_below_the_base_fee() {
		let fees = schedule();
		assert_eq!(
			fees.max_transferable(3, U256::from(9_999u64), None),
			U256::ZERO
		);
		assert_eq!(fees.max_transferable(3, U256::from(10_000u64), None), U256::ZERO);
	}

	#[test]
	fn max_transferable_honors_the_cap() {
		let fees = schedule();
		let value = fees.max_transferable(3, U256::from(1_000_000u64), Some(U256::from(77u64)));
		assert_eq!(value, U256::from(77u64));
	}
}
