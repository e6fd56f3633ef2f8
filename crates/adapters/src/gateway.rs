//! Unified-balance settlement network client
//!
//! HTTP client for the settlement network's info, balance, and attestation
//! endpoints. Implements both the bridge-info and unified-balance contracts;
//! domain info is cacheable by callers for up to one hour.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use rebalancer_config::UnifiedSettings;
use rebalancer_types::{
	AdapterError, AdapterResult, AttestationBundle, BridgeInfoService, DomainBalance,
	DomainContracts, DomainInfo, SignedTransferIntent, UnifiedBalanceService,
};

use crate::client_cache::{adapter_client_cache, ClientCache, ClientConfig};

const SETTLEMENT_SYMBOL: &str = "USDC";

#[derive(Debug, Deserialize)]
struct InfoResponse {
	domains: Vec<InfoDomain>,
}

#[derive(Debug, Deserialize)]
struct InfoDomain {
	domain: u32,
	#[serde(rename = "chainId", default)]
	chain_id: u64,
	#[serde(rename = "walletContract", default)]
	wallet_contract: Option<Address>,
	#[serde(rename = "minterContract", default)]
	minter_contract: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
	balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
	domain: u32,
	/// Decimal string in whole-token units, e.g. "123.45"
	balance: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
	attestation: Bytes,
	signature: Bytes,
}

/// Parse a whole-token decimal string into base-6 units
fn parse_balance_base6(raw: &str) -> AdapterResult<U256> {
	let bad = || AdapterError::InvalidResponse(format!("bad balance string: {raw}"));
	let (whole, frac) = match raw.split_once('.') {
		Some((w, f)) => (w, f),
		None => (raw, ""),
	};
	if frac.len() > 6 || (whole.is_empty() && frac.is_empty()) {
		return Err(bad());
	}
	let whole: U256 = if whole.is_empty() {
		U256::ZERO
	} else {
		U256::from_str_radix(whole, 10).map_err(|_| bad())?
	};
	let frac_padded = format!("{frac:0<6}");
	let frac = U256::from_str_radix(&frac_padded, 10).map_err(|_| bad())?;
	Ok(whole * U256::from(1_000_000u64) + frac)
}

/// HTTP client for the unified-balance settlement network
pub struct GatewayClient {
	settings: UnifiedSettings,
	cache: ClientCache,
}

impl GatewayClient {
	pub fn new(settings: UnifiedSettings) -> Self {
		Self {
			settings,
			cache: adapter_client_cache(),
		}
	}

	pub fn with_cache(settings: UnifiedSettings, cache: ClientCache) -> Self {
		Self { settings, cache }
	}

	fn client(&self) -> AdapterResult<std::sync::Arc<reqwest::Client>> {
		self.cache
			.get_client(&ClientConfig::new(self.settings.api_url.clone(), 30_000))
	}

	async fn get_info(&self) -> AdapterResult<InfoResponse> {
		let client = self.client()?;
		let url = format!("{}/info", self.settings.api_url);
		let response = client
			.get(&url)
			.send()
			.await
			.map_err(|e| AdapterError::Http(e.to_string()))?;

		if !response.status().is_success() {
			return Err(AdapterError::Rejected {
				service: "settlement-network".to_string(),
				message: format!("info lookup failed: {}", response.status()),
			});
		}

		response
			.json::<InfoResponse>()
			.await
			.map_err(|e| AdapterError::InvalidResponse(e.to_string()))
	}

	/// Chain id for a domain, preferring local configuration over the API
	fn chain_id_for(&self, domain: u32, from_api: u64) -> u64 {
		self.settings
			.chains
			.iter()
			.find(|c| c.domain == domain)
			.map(|c| c.chain_id)
			.unwrap_or(from_api)
	}
}

#[async_trait]
impl BridgeInfoService for GatewayClient {
	async fn get_supported_domains(&self) -> AdapterResult<Vec<DomainInfo>> {
		let info = self.get_info().await?;
		debug!(domains = info.domains.len(), "fetched supported domains");

		Ok(info
			.domains
			.into_iter()
			.map(|d| DomainInfo {
				domain: d.domain,
				chain_id: self.chain_id_for(d.domain, d.chain_id),
				has_source_capability: d.wallet_contract.is_some(),
				has_destination_capability: d.minter_contract.is_some(),
			})
			.collect())
	}
}

#[async_trait]
impl UnifiedBalanceService for GatewayClient {
	async fn get_unified_balances(
		&self,
		depositor: Address,
	) -> AdapterResult<Vec<DomainBalance>> {
		let client = self.client()?;
		let url = format!("{}/balances", self.settings.api_url);
		let body = json!({ "token": SETTLEMENT_SYMBOL, "depositor": depositor });

		let response = client
			.post(&url)
			.json(&body)
			.send()
			.await
			.map_err(|e| AdapterError::Http(e.to_string()))?;

		if !response.status().is_success() {
			return Err(AdapterError::Rejected {
				service: "settlement-network".to_string(),
				message: format!("balance lookup failed: {}", response.status()),
			});
		}

		let parsed = response
			.json::<BalancesResponse>()
			.await
			.map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

		parsed
			.balances
			.into_iter()
			.map(|entry| {
				Ok(DomainBalance {
					domain: entry.domain,
					available_base6: parse_balance_base6(&entry.balance)?,
				})
			})
			.collect()
	}

	async fn get_domain_contracts(&self, domain: u32) -> AdapterResult<DomainContracts> {
		// Configured addresses win; the info endpoint fills the gaps
		let configured = self
			.settings
			.chains
			.iter()
			.find(|c| c.domain == domain)
			.map(|c| DomainContracts {
				wallet: c.wallet,
				minter: c.minter,
			})
			.unwrap_or_default();

		if configured.wallet.is_some() && configured.minter.is_some() {
			return Ok(configured);
		}

		let info = self.get_info().await?;
		let from_api = info
			.domains
			.iter()
			.find(|d| d.domain == domain)
			.map(|d| DomainContracts {
				wallet: d.wallet_contract,
				minter: d.minter_contract,
			})
			.unwrap_or_default();

		Ok(DomainContracts {
			wallet: configured.wallet.or(from_api.wallet),
			minter: configured.minter.or(from_api.minter),
		})
	}

	async fn create_transfer_attestation(
		&self,
		intents: &[SignedTransferIntent],
	) -> AdapterResult<AttestationBundle> {
		let client = self.client()?;
		let url = format!("{}/transfer", self.settings.api_url);

		let items: Vec<_> = intents
			.iter()
			.map(|item| json!({ "burnIntent": item.intent, "signature": item.signature }))
			.collect();

		let response = client
			.post(&url)
			.json(&items)
			.send()
			.await
			.map_err(|e| AdapterError::Http(e.to_string()))?;

		if !response.status().is_success() {
			let status = response.status();
			let body = response.text().await.unwrap_or_default();
			return Err(AdapterError::Rejected {
				service: "settlement-network".to_string(),
				message: format!("attestation request failed: {status}: {body}"),
			});
		}

		let parsed = response
			.json::<TransferResponse>()
			.await
			.map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

		Ok(AttestationBundle {
			attestation: parsed.attestation,
			signature: parsed.signature,
		})
	}
}
