//! Core route domain model
//!
//! A route is an ordered sequence of legs (swap or bridge hops). Planning
//! produces a [`RouteQuote`]; execution consumes it and never mutates it.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tokens::TokenDescriptor;

pub mod errors;

pub use errors::{PlanningError, QuoteBuildError};

/// Result type for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;

/// Result type for quote-building operations
pub type QuoteResult<T> = Result<T, QuoteBuildError>;

/// Kind of a single hop inside a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
	SourceSwap,
	Bridge,
	DestinationSwap,
}

/// One planned hop of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
	pub kind: StepKind,
	pub required: bool,
}

impl RouteStep {
	pub const fn required(kind: StepKind) -> Self {
		Self {
			kind,
			required: true,
		}
	}
}

/// Identifies which provider produced a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
	/// Single-hop external aggregator swap
	Swap,
	/// Swap legs composed around a burn-and-mint bridge
	BurnMint,
	/// Collateral/synthetic warp transfer, optionally with one swap leg
	WarpRoute,
	/// Unified-balance settlement network transfer
	Unified,
}

impl Strategy {
	pub fn as_str(&self) -> &'static str {
		match self {
			Strategy::Swap => "swap",
			Strategy::BurnMint => "burn-mint",
			Strategy::WarpRoute => "warp-route",
			Strategy::Unified => "unified",
		}
	}
}

/// Sub-quote for one external swap hop, as returned by the swap adapter
///
/// Opaque to callers; consumed by `execute` and by the confirmation relay
/// when the swap runs after an asynchronous bridge settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapLeg {
	pub token_in: TokenDescriptor,
	pub token_out: TokenDescriptor,
	pub from_amount: U256,
	pub to_amount: U256,
	/// Worst-case output the aggregator is willing to guarantee
	pub to_amount_min: U256,
	pub slippage: f64,
	/// Aggregator-reported tool/venue used for this hop
	pub tool: String,
}

/// Bridge hop of a burn-and-mint route; 1:1 in settlement-asset units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransfer {
	pub source_chain_id: u64,
	pub destination_chain_id: u64,
	/// Amount moved, in settlement-asset base units
	pub amount: U256,
}

/// Legs of a swap → bridge → swap composite route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnMintContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_swap: Option<SwapLeg>,
	pub bridge: BridgeTransfer,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub destination_swap: Option<SwapLeg>,
}

/// Which side of the route-group graph a partial path crosses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathDirection {
	/// Both endpoints inside one route group; no swap leg
	FullTransfer,
	/// Swap from an unrelated token into the graph, then bridge
	IntoGraph,
	/// Bridge out of the graph, then swap into the unrelated token
	OutOfGraph,
}

/// Warp transfer hop: lock/unlock or mint/burn through a route group router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpTransfer {
	pub source_chain_id: u64,
	pub destination_chain_id: u64,
	/// Router contract executing `transferRemote` on the source chain
	pub router: Address,
	/// Token leaving the source chain
	pub token: Address,
	/// True when the token is the group collateral (requires allowance)
	pub is_collateral: bool,
	pub amount: U256,
}

/// Legs of a warp-route quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpRouteContext {
	pub direction: PathDirection,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub swap_leg: Option<SwapLeg>,
	pub transfer: WarpTransfer,
}

/// One contributing pool of a unified-balance transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSource {
	pub domain: u32,
	pub amount_base6: U256,
}

/// Legs of a unified-balance quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedContext {
	pub source_domain: u32,
	pub destination_domain: u32,
	/// Total transfer amount in base-6 units; equals the sum of `sources`
	pub amount_base6: U256,
	pub sources: Vec<BalanceSource>,
}

impl UnifiedContext {
	/// Sum of all per-domain contributions
	pub fn sources_total(&self) -> U256 {
		self.sources
			.iter()
			.fold(U256::ZERO, |acc, s| acc + s.amount_base6)
	}
}

/// Per-strategy quote payload, tagged by the strategy that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RouteQuoteContext {
	Swap(SwapLeg),
	BurnMint(BurnMintContext),
	WarpRoute(WarpRouteContext),
	Unified(UnifiedContext),
}

impl RouteQuoteContext {
	pub fn strategy(&self) -> Strategy {
		match self {
			RouteQuoteContext::Swap(_) => Strategy::Swap,
			RouteQuoteContext::BurnMint(_) => Strategy::BurnMint,
			RouteQuoteContext::WarpRoute(_) => Strategy::WarpRoute,
			RouteQuoteContext::Unified(_) => Strategy::Unified,
		}
	}
}

/// Default quote time-to-live before it must be re-planned
const QUOTE_TTL_MINUTES: i64 = 5;

/// The externally visible result of planning one route
///
/// Created by a provider's `get_quote`, consumed by its `execute`, never
/// mutated. Only comparable against quotes for the same token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteQuote {
	pub quote_id: String,
	/// Caller-supplied correlation id threaded through logs and jobs
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<String>,
	pub token_in: TokenDescriptor,
	pub token_out: TokenDescriptor,
	/// Input amount in `token_in` base units
	pub amount_in: U256,
	/// Output amount in `token_out` base units, composing all legs in order
	pub amount_out: U256,
	/// Aggregate slippage fraction in [0, 1]
	pub slippage: f64,
	pub strategy: Strategy,
	pub steps: Vec<RouteStep>,
	pub context: RouteQuoteContext,
	pub created_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

impl RouteQuote {
	pub fn new(
		token_in: TokenDescriptor,
		token_out: TokenDescriptor,
		amount_in: U256,
		amount_out: U256,
		slippage: f64,
		steps: Vec<RouteStep>,
		context: RouteQuoteContext,
	) -> Self {
		let now = Utc::now();
		Self {
			quote_id: Uuid::new_v4().to_string(),
			request_id: None,
			token_in,
			token_out,
			amount_in,
			amount_out,
			slippage,
			strategy: context.strategy(),
			steps,
			context,
			created_at: now,
			expires_at: now + Duration::minutes(QUOTE_TTL_MINUTES),
		}
	}

	pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
		self.request_id = request_id;
		self
	}

	pub fn is_expired(&self) -> bool {
		Utc::now() > self.expires_at
	}

	pub fn has_step(&self, kind: StepKind) -> bool {
		self.steps.iter().any(|s| s.kind == kind)
	}

	/// True when this quote yields strictly more output than `other`
	///
	/// Both quotes must be for the same token pair; comparing across pairs
	/// is a caller bug and is rejected.
	pub fn is_better_than(&self, other: &RouteQuote) -> QuoteResult<bool> {
		if !self.token_in.is_same_token(&other.token_in)
			|| !self.token_out.is_same_token(&other.token_out)
		{
			return Err(QuoteBuildError::RouteBuildError {
				reason: "cannot compare quotes for different token pairs".to_string(),
			});
		}
		Ok(self.amount_out > other.amount_out)
	}
}
