//! HTTP swap-aggregator adapter
//!
//! Thin facade over an external DEX-aggregator quote/execute API. Quotes are
//! fetched per token pair; execution re-requests the route for the executing
//! wallet and submits the returned transaction through the signing service.

use std::sync::Arc;

use alloy_primitives::{hex, Address, Bytes, U256};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use rebalancer_config::SwapSettings;
use rebalancer_types::{
	AdapterError, AdapterResult, SwapAdapter, SwapExecution, SwapLeg, TokenDescriptor,
	TransferInstruction, WalletSigningService,
};

use crate::client_cache::{adapter_client_cache, ClientCache, ClientConfig};

/// Aggregator quote response, reduced to the fields the engine consumes
#[derive(Debug, Deserialize)]
struct QuoteResponse {
	tool: String,
	estimate: QuoteEstimate,
	#[serde(rename = "transactionRequest")]
	transaction_request: Option<TransactionRequestBody>,
}

#[derive(Debug, Deserialize)]
struct QuoteEstimate {
	#[serde(rename = "toAmount")]
	to_amount: String,
	#[serde(rename = "toAmountMin")]
	to_amount_min: String,
}

#[derive(Debug, Deserialize)]
struct TransactionRequestBody {
	to: Address,
	data: String,
	#[serde(default)]
	value: Option<String>,
}

fn parse_amount(raw: &str, field: &str) -> AdapterResult<U256> {
	let digits = raw.strip_prefix("0x");
	let parsed = match digits {
		Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
		None => U256::from_str_radix(raw, 10),
	};
	parsed.map_err(|_| AdapterError::InvalidResponse(format!("bad {field} amount: {raw}")))
}

/// Swap adapter backed by an aggregator HTTP API
pub struct HttpSwapAdapter {
	settings: SwapSettings,
	cache: ClientCache,
	wallet: Arc<dyn WalletSigningService>,
}

impl HttpSwapAdapter {
	pub fn new(settings: SwapSettings, wallet: Arc<dyn WalletSigningService>) -> Self {
		Self {
			settings,
			cache: adapter_client_cache(),
			wallet,
		}
	}

	pub fn with_cache(
		settings: SwapSettings,
		wallet: Arc<dyn WalletSigningService>,
		cache: ClientCache,
	) -> Self {
		Self {
			settings,
			cache,
			wallet,
		}
	}

	fn client_config(&self) -> ClientConfig {
		ClientConfig::new(self.settings.endpoint.clone(), self.settings.timeout_ms)
			.with_api_key("x-api-key", self.settings.api_key.as_deref())
	}

	async fn fetch_quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		from_address: Address,
	) -> AdapterResult<QuoteResponse> {
		let client = self.cache.get_client(&self.client_config())?;
		let url = format!("{}/quote", self.settings.endpoint);

		let response = client
			.get(&url)
			.query(&[
				("fromChain", token_in.chain_id.to_string()),
				("toChain", token_out.chain_id.to_string()),
				("fromToken", token_in.address.to_string()),
				("toToken", token_out.address.to_string()),
				("fromAmount", amount.to_string()),
				("fromAddress", from_address.to_string()),
			])
			.send()
			.await
			.map_err(|e| AdapterError::Http(e.to_string()))?;

		if !response.status().is_success() {
			let status = response.status();
			let body = response.text().await.unwrap_or_default();
			return Err(AdapterError::Rejected {
				service: "swap-aggregator".to_string(),
				message: format!("{status}: {body}"),
			});
		}

		response
			.json::<QuoteResponse>()
			.await
			.map_err(|e| AdapterError::InvalidResponse(e.to_string()))
	}
}

#[async_trait]
impl SwapAdapter for HttpSwapAdapter {
	async fn quote(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
		amount: U256,
		request_id: Option<&str>,
	) -> AdapterResult<SwapLeg> {
		debug!(
			from_chain = token_in.chain_id,
			to_chain = token_out.chain_id,
			%amount,
			request_id,
			"requesting aggregator quote"
		);

		let from_address = self.wallet.get_address(token_in.chain_id).await?;
		let response = self
			.fetch_quote(token_in, token_out, amount, from_address)
			.await?;

		let to_amount = parse_amount(&response.estimate.to_amount, "toAmount")?;
		let to_amount_min = parse_amount(&response.estimate.to_amount_min, "toAmountMin")?;
		// Guaranteed output relative to the expected output
		let slippage = if to_amount.is_zero() {
			0.0
		} else {
			1.0 - u256_to_f64(to_amount_min) / u256_to_f64(to_amount)
		};

		Ok(SwapLeg {
			token_in: token_in.clone(),
			token_out: token_out.clone(),
			from_amount: amount,
			to_amount,
			to_amount_min,
			slippage,
			tool: response.tool,
		})
	}

	async fn execute(&self, wallet: Address, leg: &SwapLeg) -> AdapterResult<SwapExecution> {
		// Routes go stale quickly; re-request for the executing wallet so the
		// returned transaction is built against current liquidity
		let response = self
			.fetch_quote(&leg.token_in, &leg.token_out, leg.from_amount, wallet)
			.await?;

		let request = response.transaction_request.ok_or_else(|| {
			AdapterError::InvalidResponse("quote carried no transaction request".to_string())
		})?;

		let data = hex::decode(request.data.trim_start_matches("0x"))
			.map_err(|e| AdapterError::InvalidResponse(format!("bad calldata: {e}")))?;
		let value = match request.value.as_deref() {
			Some(raw) => parse_amount(raw, "value")?,
			None => U256::ZERO,
		};

		let instruction =
			TransferInstruction::new(leg.token_in.chain_id, request.to, Bytes::from(data))
				.with_value(value);

		let transaction_hash = self.wallet.send_transaction(&instruction).await?;
		let receipt = self
			.wallet
			.wait_for_receipt(leg.token_in.chain_id, transaction_hash)
			.await?;

		if !receipt.success {
			warn!(%transaction_hash, tool = %leg.tool, "swap transaction reverted");
			return Err(AdapterError::Rejected {
				service: "swap-aggregator".to_string(),
				message: format!("swap transaction {transaction_hash} reverted"),
			});
		}

		Ok(SwapExecution { transaction_hash })
	}
}

fn u256_to_f64(value: U256) -> f64 {
	// Amounts fit u128 in practice; saturate rather than panic if not
	value.try_into().map(|v: u128| v as f64).unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn amounts_parse_from_decimal_and_hex() {
		assert_eq!(
			parse_amount("1000000", "toAmount").unwrap(),
			U256::from(1_000_000u64)
		);
		assert_eq!(parse_amount("0x0f", "value").unwrap(), U256::from(15u64));
		assert!(parse_amount("12x", "toAmount").is_err());
	}

	#[test]
	fn quote_response_deserializes() {
		let raw = serde_json::json!({
			"tool": "paraswap",
			"estimate": { "toAmount": "995000", "toAmountMin": "990000" },
			"transactionRequest": {
				"to": "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae",
				"data": "0xdeadbeef",
				"value": "0x0"
			}
		});
		let parsed: QuoteResponse = serde_json::from_value(raw).unwrap();
		assert_eq!(parsed.tool, "paraswap");
		assert!(parsed.transaction_request.is_some());
	}
}
