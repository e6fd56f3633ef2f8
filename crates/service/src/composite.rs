//! Composite bridge+swap quote builder
//!
//! Chains hop quotes into one route-level quote: an optional source swap
//! into the settlement asset, the burn-and-mint bridge leg (1:1), and an
//! optional destination swap out of it. Legs are quoted strictly in order;
//! each depends on the previous leg's output amount.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tracing::{debug, warn};

use rebalancer_config::BridgeSettings;
use rebalancer_types::{
	AdapterError, BalanceQueryService, BridgeTransfer, BurnMintContext, ConfirmationContext,
	ExecutionError, PlanningError, QuoteBuildError, RouteProvider, RouteQuote, RouteQuoteContext,
	StepKind, SubmissionReceipt, SwapAdapter, SwapLeg, TokenDescriptor, TokenRole,
	TransferInstruction, WalletSigningService,
};

use crate::contracts;
use crate::planner::RoutePlanner;
use crate::relay::ConfirmationRelay;

/// Compose per-leg slippages into the aggregate route slippage
pub(crate) fn compose_slippage(legs: &[f64]) -> f64 {
	1.0 - legs.iter().fold(1.0, |acc, s| acc * (1.0 - s))
}

fn adapter_to_quote_error(e: AdapterError) -> QuoteBuildError {
	QuoteBuildError::RouteBuildError {
		reason: e.to_string(),
	}
}

pub struct CompositeQuoteBuilder {
	planner: Arc<RoutePlanner>,
	swap: Arc<dyn SwapAdapter>,
	wallet: Arc<dyn WalletSigningService>,
	balances: Arc<dyn BalanceQueryService>,
	relay: Arc<ConfirmationRelay>,
	settings: BridgeSettings,
}

impl CompositeQuoteBuilder {
	pub fn new(
		planner: Arc<RoutePlanner>,
		swap: Arc<dyn SwapAdapter>,
		wallet: Arc<dyn WalletSigningService>,
		balances: Arc<dyn BalanceQueryService>,
		relay: Arc<ConfirmationRelay>,
		settings: BridgeSettings,
	) -> Self {
		Self {
			planner,
			swap,
			wallet,
			balances,
			relay,
			settings,
		}
	}

	/// Settlement-asset descriptor on a chain known to the registry
	fn settlement_token(&self, chain_id: u64) -> Option<TokenDescriptor> {
		self.planner
			.registry()
			.settlement_asset(chain_id)
			.map(|address| {
				TokenDescriptor::new(chain_id, address, 6).with_role(TokenRole::Settlement)
			})
	}

	async fn validate_pair(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
	) -> Result<(), QuoteBuildError> {
		if amount.is_zero() {
			return Err(QuoteBuildError::RouteBuildError {
				reason: "amount must be positive".to_string(),
			});
		}
		if token_in.chain_id == token_out.chain_id {
			return Err(PlanningError::NoRouteForChainPair {
				source_chain_id: token_in.chain_id,
				destination_chain_id: token_out.chain_id,
			}
			.into());
		}
		let supported = self
			.planner
			.supports_chain_pair(token_in.chain_id, token_out.chain_id)
			.await
			.map_err(adapter_to_quote_error)?;
		if !supported {
			return Err(PlanningError::NoRouteForChainPair {
				source_chain_id: token_in.chain_id,
				destination_chain_id: token_out.chain_id,
			}
			.into());
		}
		Ok(())
	}

	/// Submit the burn transaction and return `(tx hash, message id)`
	async fn submit_bridge_leg(
		&self,
		wallet: Address,
		bridge: &BridgeTransfer,
	) -> Result<(B256, B256), ExecutionError> {
		let source_chain = bridge.source_chain_id;
		let messenger = self
			.settings
			.token_messengers
			.get(&source_chain)
			.copied()
			.ok_or_else(|| ExecutionError::BridgeSubmissionFailed {
				reason: format!("no token messenger configured for chain {source_chain}"),
			})?;
		let destination_domain = self
			.settings
			.domains
			.get(&bridge.destination_chain_id)
			.copied()
			.ok_or_else(|| ExecutionError::BridgeSubmissionFailed {
				reason: format!(
					"no bridge domain configured for chain {}",
					bridge.destination_chain_id
				),
			})?;
		let burn_token = self
			.planner
			.registry()
			.settlement_asset(source_chain)
			.ok_or_else(|| ExecutionError::BridgeSubmissionFailed {
				reason: format!("no settlement asset known on chain {source_chain}"),
			})?;

		let allowance = self
			.balances
			.get_allowance(source_chain, wallet, burn_token, messenger)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;
		if allowance < bridge.amount {
			let approve = TransferInstruction::new(
				source_chain,
				burn_token,
				contracts::approve_calldata(messenger, bridge.amount),
			);
			self.send_checked(&approve).await.map_err(|reason| {
				ExecutionError::BridgeSubmissionFailed { reason }
			})?;
		}

		let burn = TransferInstruction::new(
			source_chain,
			messenger,
			contracts::deposit_for_burn_calldata(
				bridge.amount,
				destination_domain,
				wallet,
				burn_token,
			),
		);
		let transaction_hash = self
			.wallet
			.send_transaction(&burn)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;
		let receipt = self
			.wallet
			.wait_for_receipt(source_chain, transaction_hash)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;
		if !receipt.success {
			return Err(ExecutionError::BridgeSubmissionFailed {
				reason: format!("burn transaction {transaction_hash} reverted"),
			});
		}

		let body = contracts::extract_message_body(&receipt)
			.ok_or(ExecutionError::NoMessageDispatched { transaction_hash })?;

		Ok((transaction_hash, contracts::message_id_from_body(&body)))
	}

	async fn send_checked(&self, instruction: &TransferInstruction) -> Result<(), String> {
		let hash = self
			.wallet
			.send_transaction(instruction)
			.await
			.map_err(|e| e.to_string())?;
		let receipt = self
			.wallet
			.wait_for_receipt(instruction.chain_id, hash)
			.await
			.map_err(|e| e.to_string())?;
		if !receipt.success {
			return Err(format!("transaction {hash} reverted"));
		}
		Ok(())
	}

	fn warn_on_excess_slippage(&self, quote: &RouteQuote, context: &BurnMintContext) {
		if quote.slippage <= self.settings.max_slippage {
			return;
		}
		let mut contributions = Vec::new();
		if let Some(leg) = &context.source_swap {
			contributions.push(format!("sourceSwap={:.4}", leg.slippage));
		}
		contributions.push("bridge=0.0000".to_string());
		if let Some(leg) = &context.destination_swap {
			contributions.push(format!("destinationSwap={:.4}", leg.slippage));
		}
		warn!(
			quote_id = %quote.quote_id,
			slippage = quote.slippage,
			threshold = self.settings.max_slippage,
			steps = %contributions.join(","),
			"aggregate slippage exceeds threshold"
		);
	}
}

#[async_trait]
impl RouteProvider for CompositeQuoteBuilder {
	fn strategy(&self) -> rebalancer_types::Strategy {
		rebalancer_types::Strategy::BurnMint
	}

	async fn get_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		request_id: Option<&str>,
	) -> Result<RouteQuote, QuoteBuildError> {
		self.validate_pair(token_in, token_out, amount).await?;

		let steps = self.planner.plan_route(token_in, token_out);
		debug!(
			request_id,
			source_chain = token_in.chain_id,
			destination_chain = token_out.chain_id,
			step_count = steps.len(),
			"planned composite route"
		);

		let mut source_swap: Option<SwapLeg> = None;
		let mut destination_swap: Option<SwapLeg> = None;
		let mut running_amount = amount;

		if steps.iter().any(|s| s.kind == StepKind::SourceSwap) {
			let settlement_in = self.settlement_token(token_in.chain_id).ok_or_else(|| {
				QuoteBuildError::RouteBuildError {
					reason: format!("no settlement asset on chain {}", token_in.chain_id),
				}
			})?;
			let leg = self
				.swap
				.quote(token_in, &settlement_in, running_amount, request_id)
				.await
				.map_err(adapter_to_quote_error)?;
			running_amount = leg.to_amount;
			source_swap = Some(leg);
		}

		// The bridge leg moves settlement units 1:1
		let bridge = BridgeTransfer {
			source_chain_id: token_in.chain_id,
			destination_chain_id: token_out.chain_id,
			amount: running_amount,
		};

		if steps.iter().any(|s| s.kind == StepKind::DestinationSwap) {
			let settlement_out = self.settlement_token(token_out.chain_id).ok_or_else(|| {
				QuoteBuildError::RouteBuildError {
					reason: format!("no settlement asset on chain {}", token_out.chain_id),
				}
			})?;
			let leg = self
				.swap
				.quote(&settlement_out, token_out, running_amount, request_id)
				.await
				.map_err(adapter_to_quote_error)?;
			running_amount = leg.to_amount;
			destination_swap = Some(leg);
		}

		let leg_slippages: Vec<f64> = [&source_swap, &destination_swap]
			.into_iter()
			.flatten()
			.map(|leg| leg.slippage)
			.collect();
		let slippage = compose_slippage(&leg_slippages);

		let context = BurnMintContext {
			source_swap,
			bridge,
			destination_swap,
		};
		let quote = RouteQuote::new(
			token_in.clone(),
			token_out.clone(),
			amount,
			running_amount,
			slippage,
			steps,
			RouteQuoteContext::BurnMint(context.clone()),
		)
		.with_request_id(request_id.map(str::to_string));

		self.warn_on_excess_slippage(&quote, &context);

		Ok(quote)
	}

	async fn execute(
		&self,
		wallet: Address,
		quote: &RouteQuote,
	) -> Result<SubmissionReceipt, ExecutionError> {
		let RouteQuoteContext::BurnMint(context) = &quote.context else {
			return Err(ExecutionError::StrategyMismatch {
				expected: "burn-mint",
			});
		};

		if let Some(leg) = &context.source_swap {
			self.swap
				.execute(wallet, leg)
				.await
				.map_err(|e| ExecutionError::SourceSwapFailed {
					reason: e.to_string(),
				})?;
			debug!(quote_id = %quote.quote_id, "source swap executed");
		}

		let (transaction_hash, message_id) =
			self.submit_bridge_leg(wallet, &context.bridge).await?;

		// The destination swap never runs synchronously: it is parked in the
		// confirmation context and executed when settlement is observed.
		let context = ConfirmationContext {
			destination_chain_id: quote.token_out.chain_id,
			message_id,
			follow_up: context.destination_swap.clone(),
			recipient: wallet,
			request_id: quote.request_id.clone(),
		};
		self.relay
			.submit_watch(context)
			.await
			.map_err(|e| ExecutionError::Queue(e.to_string()))?;

		Ok(SubmissionReceipt {
			transaction_hash,
			message_id: Some(message_id),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slippage_composes_multiplicatively() {
		assert_eq!(compose_slippage(&[]), 0.0);
		assert!((compose_slippage(&[0.01]) - 0.01).abs() < 1e-12);

		// 1 - 0.99 * 0.98 = 0.0298
		let combined = compose_slippage(&[0.01, 0.02]);
		assert!((combined - 0.0298).abs() < 1e-12);

		// Composition never exceeds the sum of parts
		assert!(combined < 0.03);
	}
}
