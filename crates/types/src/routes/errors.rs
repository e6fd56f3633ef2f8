//! Planning and quote-building errors

use thiserror::Error;

/// Permanent planning failures; retrying with the same inputs cannot succeed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
	#[error("unsupported action path: {reason}")]
	UnsupportedActionPath { reason: String },

	#[error("no route for chain pair {source_chain_id} -> {destination_chain_id}")]
	NoRouteForChainPair {
		source_chain_id: u64,
		destination_chain_id: u64,
	},
}

/// Failures while assembling a quote; permanent for this input, though the
/// caller may retry later if upstream liquidity changes
#[derive(Debug, Error)]
pub enum QuoteBuildError {
	#[error("failed to build route: {reason}")]
	RouteBuildError { reason: String },

	#[error("no valid intermediate token found among {candidates} candidates")]
	NoValidIntermediateFound { candidates: usize },

	#[error("no collateral held for route group on chain {chain_id}")]
	NoCollateralFound { chain_id: u64 },

	#[error(
		"insufficient unified balance: requested {requested_base6}, available {available_base6}"
	)]
	InsufficientUnifiedBalance {
		requested_base6: String,
		available_base6: String,
	},

	#[error("unsupported token for this provider: {reason}")]
	UnsupportedToken { reason: String },

	#[error(transparent)]
	Planning(#[from] PlanningError),
}
