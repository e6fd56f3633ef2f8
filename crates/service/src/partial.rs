//! Asset-role routing through collateral/synthetic route groups
//!
//! Classifies a requested transfer against the route-group graph: a full
//! path stays inside one group (single 1:1 transfer), a partial path needs
//! one external swap to reach or leave the graph, anything else is
//! unsupported. Partial paths evaluate every locally-held candidate
//! intermediate concurrently and keep the best-yielding one.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use rebalancer_config::WarpSettings;
use rebalancer_types::{
	AdapterError, BalanceQueryService, ConfirmationContext, ExecutionError, GroupMatch,
	PathDirection, PlanningError, QuoteBuildError, RouteProvider, RouteQuote, RouteQuoteContext,
	RouteStep, StepKind, SubmissionReceipt, SwapAdapter, SwapLeg, TokenDescriptor,
	TransferInstruction, WalletSigningService, WarpRouteContext, WarpRouteTable, WarpTransfer,
};

use crate::contracts;
use crate::relay::ConfirmationRelay;

/// Classification of a requested transfer against the route-group graph
#[derive(Debug)]
enum ActionPath {
	Full {
		in_match: GroupMatch,
	},
	IntoGraph {
		out_match: GroupMatch,
	},
	OutOfGraph {
		in_match: GroupMatch,
	},
	Unsupported {
		reason: String,
	},
}

/// One swap to price during candidate evaluation
#[derive(Debug, Clone)]
struct CandidateRequest {
	from: TokenDescriptor,
	to: TokenDescriptor,
	/// The held token under evaluation (one side of the pair)
	candidate: TokenDescriptor,
}

/// One candidate intermediate and its (possibly failed) swap quote
#[derive(Debug)]
pub(crate) struct CandidateEvaluation {
	pub candidate: TokenDescriptor,
	pub leg: Result<SwapLeg, AdapterError>,
}

/// Pure reducer over the fan-out results: strictly-largest amount out wins,
/// ties broken by first-seen order; failed candidates are skipped
pub(crate) fn select_best(evaluations: &[CandidateEvaluation]) -> Option<&SwapLeg> {
	let mut best: Option<&SwapLeg> = None;
	for evaluation in evaluations {
		let Ok(leg) = &evaluation.leg else { continue };
		match best {
			Some(current) if leg.to_amount <= current.to_amount => {},
			_ => best = Some(leg),
		}
	}
	best
}

pub struct PartialPathResolver {
	table: Arc<WarpRouteTable>,
	swap: Arc<dyn SwapAdapter>,
	balances: Arc<dyn BalanceQueryService>,
	wallet: Arc<dyn WalletSigningService>,
	relay: Arc<ConfirmationRelay>,
	settings: WarpSettings,
}

impl PartialPathResolver {
	pub fn new(
		table: Arc<WarpRouteTable>,
		swap: Arc<dyn SwapAdapter>,
		balances: Arc<dyn BalanceQueryService>,
		wallet: Arc<dyn WalletSigningService>,
		relay: Arc<ConfirmationRelay>,
		settings: WarpSettings,
	) -> Self {
		Self {
			table,
			swap,
			balances,
			wallet,
			relay,
			settings,
		}
	}

	fn classify_action(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
	) -> ActionPath {
		let in_match = self.table.classify(token_in);
		let out_match = self.table.classify(token_out);

		match (in_match, out_match) {
			(Some(a), Some(b)) if a.group_index == b.group_index => {
				ActionPath::Full { in_match: a }
			},
			(Some(_), Some(_)) => ActionPath::Unsupported {
				reason: "tokens belong to different route groups".to_string(),
			},
			(Some(in_match), None) => ActionPath::OutOfGraph { in_match },
			(None, Some(out_match)) => ActionPath::IntoGraph { out_match },
			(None, None) => ActionPath::Unsupported {
				reason: "neither token belongs to a route group".to_string(),
			},
		}
	}

	/// Concurrently quote one swap per candidate with per-candidate fault
	/// isolation; a failing candidate is dropped, not fatal
	async fn evaluate_candidates(
		&self,
		requests: Vec<CandidateRequest>,
		amount: U256,
		request_id: Option<&str>,
	) -> Vec<CandidateEvaluation> {
		let request_id = request_id.map(str::to_string);
		let tasks = requests.into_iter().map(|request| {
			let swap = Arc::clone(&self.swap);
			let request_id = request_id.clone();
			tokio::spawn(async move {
				let leg = swap
					.quote(&request.from, &request.to, amount, request_id.as_deref())
					.await;
				CandidateEvaluation {
					candidate: request.candidate,
					leg,
				}
			})
		});

		join_all(tasks)
			.await
			.into_iter()
			.filter_map(|joined| joined.ok())
			.collect()
	}

	fn full_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		in_match: &GroupMatch,
		request_id: Option<&str>,
	) -> RouteQuote {
		let transfer = WarpTransfer {
			source_chain_id: token_in.chain_id,
			destination_chain_id: token_out.chain_id,
			router: in_match.router,
			token: token_in.address,
			is_collateral: in_match.is_collateral,
			amount,
		};
		RouteQuote::new(
			token_in.clone(),
			token_out.clone(),
			amount,
			amount,
			0.0,
			vec![RouteStep::required(StepKind::Bridge)],
			RouteQuoteContext::WarpRoute(WarpRouteContext {
				direction: PathDirection::FullTransfer,
				swap_leg: None,
				transfer,
			}),
		)
		.with_request_id(request_id.map(str::to_string))
	}

	/// Partial path ending at an unrelated token: bridge first, swap last
	async fn out_of_graph_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		in_match: GroupMatch,
		request_id: Option<&str>,
	) -> Result<RouteQuote, QuoteBuildError> {
		let holder = self
			.wallet
			.get_address(token_out.chain_id)
			.await
			.map_err(|e| QuoteBuildError::RouteBuildError {
				reason: e.to_string(),
			})?;
		let held = self
			.balances
			.get_all_held_tokens(token_out.chain_id, holder)
			.await
			.map_err(|e| QuoteBuildError::RouteBuildError {
				reason: e.to_string(),
			})?;

		let requests: Vec<_> = held
			.into_iter()
			.filter(|candidate| !candidate.is_same_token(token_out))
			.map(|candidate| CandidateRequest {
				from: candidate.clone(),
				to: token_out.clone(),
				candidate,
			})
			.collect();
		if requests.is_empty() {
			return Err(QuoteBuildError::NoValidIntermediateFound { candidates: 0 });
		}

		let candidate_count = requests.len();
		let evaluations = self
			.evaluate_candidates(requests, amount, request_id)
			.await;
		for evaluation in &evaluations {
			if let Err(e) = &evaluation.leg {
				warn!(
					candidate = %evaluation.candidate.address,
					chain_id = evaluation.candidate.chain_id,
					error = %e,
					"candidate intermediate dropped"
				);
			}
		}

		let best = select_best(&evaluations)
			.ok_or(QuoteBuildError::NoValidIntermediateFound {
				candidates: candidate_count,
			})?
			.clone();
		debug!(
			request_id,
			candidates = candidate_count,
			best_amount_out = %best.to_amount,
			"selected best-yielding intermediate"
		);

		let transfer = WarpTransfer {
			source_chain_id: token_in.chain_id,
			destination_chain_id: token_out.chain_id,
			router: in_match.router,
			token: token_in.address,
			is_collateral: in_match.is_collateral,
			amount,
		};
		Ok(RouteQuote::new(
			token_in.clone(),
			token_out.clone(),
			amount,
			best.to_amount,
			best.slippage,
			vec![
				RouteStep::required(StepKind::Bridge),
				RouteStep::required(StepKind::DestinationSwap),
			],
			RouteQuoteContext::WarpRoute(WarpRouteContext {
				direction: PathDirection::OutOfGraph,
				swap_leg: Some(best),
				transfer,
			}),
		)
		.with_request_id(request_id.map(str::to_string)))
	}

	/// Partial path starting from an unrelated token: swap first, bridge last
	async fn into_graph_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		out_match: GroupMatch,
		request_id: Option<&str>,
	) -> Result<RouteQuote, QuoteBuildError> {
		let member = self
			.table
			.member_on_chain(out_match.group_index, token_in.chain_id)
			.ok_or(QuoteBuildError::NoCollateralFound {
				chain_id: token_in.chain_id,
			})?;

		let holder = self
			.wallet
			.get_address(token_in.chain_id)
			.await
			.map_err(|e| QuoteBuildError::RouteBuildError {
				reason: e.to_string(),
			})?;
		let held = self
			.balances
			.get_all_held_tokens(token_in.chain_id, holder)
			.await
			.map_err(|e| QuoteBuildError::RouteBuildError {
				reason: e.to_string(),
			})?;

		let requests: Vec<_> = held
			.into_iter()
			.filter(|candidate| !candidate.is_same_token(token_in))
			.map(|candidate| CandidateRequest {
				from: token_in.clone(),
				to: candidate.clone(),
				candidate,
			})
			.collect();
		if requests.is_empty() {
			return Err(QuoteBuildError::NoValidIntermediateFound { candidates: 0 });
		}

		let candidate_count = requests.len();
		let evaluations = self
			.evaluate_candidates(requests, amount, request_id)
			.await;
		for evaluation in &evaluations {
			if let Err(e) = &evaluation.leg {
				warn!(
					candidate = %evaluation.candidate.address,
					chain_id = evaluation.candidate.chain_id,
					error = %e,
					"candidate intermediate dropped"
				);
			}
		}

		let best = select_best(&evaluations)
			.ok_or(QuoteBuildError::NoValidIntermediateFound {
				candidates: candidate_count,
			})?
			.clone();

		// The transfer moves what the swap is guaranteed to produce
		let bridged_amount = best.to_amount_min;
		let is_collateral = self
			.table
			.collateral(out_match.group_index)
			.is_some_and(|c| c.chain_id == member.chain_id && c.address == member.address);

		let transfer = WarpTransfer {
			source_chain_id: token_in.chain_id,
			destination_chain_id: token_out.chain_id,
			router: member.router,
			token: member.address,
			is_collateral,
			amount: bridged_amount,
		};
		Ok(RouteQuote::new(
			token_in.clone(),
			token_out.clone(),
			amount,
			bridged_amount,
			best.slippage,
			vec![
				RouteStep::required(StepKind::SourceSwap),
				RouteStep::required(StepKind::Bridge),
			],
			RouteQuoteContext::WarpRoute(WarpRouteContext {
				direction: PathDirection::IntoGraph,
				swap_leg: Some(best),
				transfer,
			}),
		)
		.with_request_id(request_id.map(str::to_string)))
	}

	/// Submit the remote transfer and return `(tx hash, message id)`
	async fn submit_warp_transfer(
		&self,
		wallet: Address,
		transfer: &WarpTransfer,
	) -> Result<(B256, B256), ExecutionError> {
		let chain_id = transfer.source_chain_id;

		// Collateral entering the graph needs a live allowance for the router
		if transfer.is_collateral {
			let allowance = self
				.balances
				.get_allowance(chain_id, wallet, transfer.token, transfer.router)
				.await
				.map_err(|e| ExecutionError::BridgeSubmissionFailed {
					reason: e.to_string(),
				})?;
			if allowance < transfer.amount {
				let approve = TransferInstruction::new(
					chain_id,
					transfer.token,
					contracts::approve_calldata(transfer.router, transfer.amount),
				);
				self.send_checked(&approve).await.map_err(|reason| {
					ExecutionError::BridgeSubmissionFailed { reason }
				})?;
			}
		}

		let remote = TransferInstruction::new(
			chain_id,
			transfer.router,
			contracts::transfer_remote_calldata(
				transfer.destination_chain_id as u32,
				wallet,
				transfer.amount,
			),
		)
		.with_value(self.settings.gas_payment_wei);

		let transaction_hash = self
			.wallet
			.send_transaction(&remote)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;
		let receipt = self
			.wallet
			.wait_for_receipt(chain_id, transaction_hash)
			.await
			.map_err(|e| ExecutionError::BridgeSubmissionFailed {
				reason: e.to_string(),
			})?;
		if !receipt.success {
			return Err(ExecutionError::BridgeSubmissionFailed {
				reason: format!("remote transfer {transaction_hash} reverted"),
			});
		}

		// A successful submission without the dispatch log is a protocol
		// anomaly; nothing downstream can be watched
		let message_id = contracts::extract_dispatch_id(&receipt)
			.ok_or(ExecutionError::NoMessageDispatched { transaction_hash })?;

		Ok((transaction_hash, message_id))
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
}

#[async_trait]
impl RouteProvider for PartialPathResolver {
	fn strategy(&self) -> rebalancer_types::Strategy {
		rebalancer_types::Strategy::WarpRoute
	}

	async fn get_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		request_id: Option<&str>,
	) -> Result<RouteQuote, QuoteBuildError> {
		match self.classify_action(token_in, token_out) {
			ActionPath::Unsupported { reason } => {
				Err(PlanningError::UnsupportedActionPath { reason }.into())
			},
			ActionPath::Full { in_match } => {
				Ok(self.full_quote(token_in, token_out, amount, &in_match, request_id))
			},
			ActionPath::OutOfGraph { in_match } => {
				self.out_of_graph_quote(token_in, token_out, amount, in_match, request_id)
					.await
			},
			ActionPath::IntoGraph { out_match } => {
				self.into_graph_quote(token_in, token_out, amount, out_match, request_id)
					.await
			},
		}
	}

	async fn execute(
		&self,
		wallet: Address,
		quote: &RouteQuote,
	) -> Result<SubmissionReceipt, ExecutionError> {
		let RouteQuoteContext::WarpRoute(context) = &quote.context else {
			return Err(ExecutionError::StrategyMismatch {
				expected: "warp-route",
			});
		};

		// Swap first when entering the graph; its output funds the transfer
		if context.direction == PathDirection::IntoGraph {
			let leg = context
				.swap_leg
				.as_ref()
				.ok_or(ExecutionError::SourceSwapFailed {
					reason: "partial quote is missing its swap leg".to_string(),
				})?;
			self.swap
				.execute(wallet, leg)
				.await
				.map_err(|e| ExecutionError::SourceSwapFailed {
					reason: e.to_string(),
				})?;
			debug!(quote_id = %quote.quote_id, "graph-entry swap executed");
		}

		let (transaction_hash, message_id) =
			self.submit_warp_transfer(wallet, &context.transfer).await?;

		let follow_up = match context.direction {
			PathDirection::OutOfGraph => context.swap_leg.clone(),
			PathDirection::FullTransfer | PathDirection::IntoGraph => None,
		};
		let watch = ConfirmationContext {
			destination_chain_id: quote.token_out.chain_id,
			message_id,
			follow_up,
			recipient: wallet,
			request_id: quote.request_id.clone(),
		};
		self.relay
			.submit_watch(watch)
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

	fn leg(to_amount: u64, tag: &str) -> SwapLeg {
		let token = TokenDescriptor::new(10, Address::repeat_byte(1), 18);
		SwapLeg {
			token_in: token.clone(),
			token_out: token,
			from_amount: U256::from(100u64),
			to_amount: U256::from(to_amount),
			to_amount_min: U256::from(to_amount),
			slippage: 0.01,
			tool: tag.to_string(),
		}
	}

	fn evaluation(result: Result<SwapLeg, AdapterError>) -> CandidateEvaluation {
		CandidateEvaluation {
			candidate: TokenDescriptor::new(10, Address::repeat_byte(2), 18),
			leg: result,
		}
	}

	#[test]
	fn select_best_keeps_strictly_largest() {
		let evaluations = vec![
			evaluation(Ok(leg(80, "a"))),
			evaluation(Ok(leg(100, "b"))),
			evaluation(Ok(leg(90, "c"))),
		];
		assert_eq!(select_best(&evaluations).unwrap().tool, "b");
	}

	#[test]
	fn select_best_breaks_ties_first_seen() {
		let evaluations = vec![
			evaluation(Ok(leg(100, "first"))),
			evaluation(Ok(leg(100, "second"))),
		];
		assert_eq!(select_best(&evaluations).unwrap().tool, "first");
	}

	#[test]
	fn select_best_skips_failures() {
		let evaluations = vec![
			evaluation(Err(AdapterError::Http("timeout".into()))),
			evaluation(Ok(leg(5, "only"))),
			evaluation(Err(AdapterError::Http("down".into()))),
		];
		assert_eq!(select_best(&evaluations).unwrap().tool, "only");

		let all_failed = vec![evaluation(Err(AdapterError::Http("down".into())))];
		assert!(select_best(&all_failed).is_none());
	}
}
