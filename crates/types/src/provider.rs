//! Provider abstraction over heterogeneous bridge/swap mechanisms

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::execution::{ExecutionError, SubmissionReceipt};
use crate::routes::{QuoteBuildError, RouteQuote, Strategy};
use crate::tokens::TokenDescriptor;

/// Uniform quote/execute surface implemented by every rebalancing provider
///
/// `get_quote` is side-effect free. `execute` consumes a quote produced by
/// the same provider; passing another provider's quote is a caller bug and
/// fails with a typed error rather than misbehaving.
#[async_trait]
pub trait RouteProvider: Send + Sync {
	fn strategy(&self) -> Strategy;

	async fn get_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		request_id: Option<&str>,
	) -> Result<RouteQuote, QuoteBuildError>;

	async fn execute(
		&self,
		wallet: Address,
		quote: &RouteQuote,
	) -> Result<SubmissionReceipt, ExecutionError>;
}
