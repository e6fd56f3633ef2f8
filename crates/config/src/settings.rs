//! Configuration settings structures

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rebalancer_types::registry::RouteGroup;

/// Main settings for the rebalancing engine
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
	#[serde(default)]
	pub swap: SwapSettings,
	#[serde(default)]
	pub bridge: BridgeSettings,
	#[serde(default)]
	pub warp: WarpSettings,
	#[serde(default)]
	pub unified: UnifiedSettings,
	#[serde(default)]
	pub relay: RelaySettings,
}

/// External swap-aggregator endpoint configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SwapSettings {
	pub endpoint: String,
	/// Optional API key sent as a request header
	#[serde(default)]
	pub api_key: Option<String>,
	pub timeout_ms: u64,
}

impl Default for SwapSettings {
	fn default() -> Self {
		Self {
			endpoint: "https://li.quest/v1".to_string(),
			api_key: None,
			timeout_ms: 30_000,
		}
	}
}

/// Burn-and-mint bridge configuration for the composite provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BridgeSettings {
	/// Token messenger contract per chain (the burn entry point)
	#[serde(default)]
	pub token_messengers: HashMap<u64, Address>,
	/// Bridge domain identifier per chain
	#[serde(default)]
	pub domains: HashMap<u64, u32>,
	/// Attestation service base URL
	pub attestation_url: String,
	/// Aggregate route slippage above which a warning is emitted
	pub max_slippage: f64,
	/// Optional settlement-asset address overrides per chain
	#[serde(default)]
	pub settlement_assets: HashMap<u64, Address>,
}

impl Default for BridgeSettings {
	fn default() -> Self {
		Self {
			token_messengers: HashMap::new(),
			domains: HashMap::new(),
			attestation_url: "https://iris-api.circle.com/v1".to_string(),
			max_slippage: 0.05,
			settlement_assets: HashMap::new(),
		}
	}
}

/// Warp-route (collateral/synthetic) configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WarpSettings {
	#[serde(default)]
	pub routes: Vec<RouteGroup>,
	/// Interchain gas payment attached to each remote transfer, in wei
	#[serde(default)]
	pub gas_payment_wei: U256,
}

/// Fee model of the unified-balance settlement network
///
/// `fee(domain, v) = base(domain) + ceil(v * numerator / denominator)`,
/// all amounts in base-6 units.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UnifiedFeeSettings {
	pub numerator: u64,
	pub denominator: u64,
	#[serde(default)]
	pub base_by_domain: HashMap<u32, u64>,
	/// Base fee applied when a domain has no explicit entry
	pub fallback_base: u64,
}

impl Default for UnifiedFeeSettings {
	fn default() -> Self {
		Self {
			// 0.5 bps
			numerator: 5,
			denominator: 100_000,
			base_by_domain: HashMap::from([
				// Ethereum
				(0, 2_000_000),
				// Avalanche
				(1, 20_000),
				// OP
				(2, 1_500),
				// Arbitrum
				(3, 10_000),
				// Base
				(6, 10_000),
				// Polygon PoS
				(7, 1_500),
			]),
			fallback_base: 2_000_000,
		}
	}
}

/// One chain participating in the unified-balance network
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UnifiedChainSettings {
	pub chain_id: u64,
	pub domain: u32,
	/// Settlement-asset address on this chain
	pub token: Address,
	/// Deposit wallet contract, when known ahead of the info lookup
	#[serde(default)]
	pub wallet: Option<Address>,
	/// Destination minter contract, when known ahead of the info lookup
	#[serde(default)]
	pub minter: Option<Address>,
}

/// Unified-balance settlement network configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UnifiedSettings {
	pub api_url: String,
	#[serde(default)]
	pub chains: Vec<UnifiedChainSettings>,
	#[serde(default)]
	pub fees: UnifiedFeeSettings,
}

impl Default for UnifiedSettings {
	fn default() -> Self {
		Self {
			api_url: "https://gateway-api.circle.com/v1".to_string(),
			chains: Vec::new(),
			fees: UnifiedFeeSettings::default(),
		}
	}
}

/// Confirmation relay and job processor tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelaySettings {
	/// Delay between confirmation polls, in seconds
	pub poll_interval_secs: u64,
	/// Watches older than this are marked expired, in seconds
	pub max_wait_secs: u64,
	/// Retry budget for the follow-up action
	pub follow_up_max_attempts: u32,
	/// Base backoff between follow-up retries, in seconds
	pub follow_up_backoff_secs: u64,
	pub worker_count: usize,
	pub queue_capacity: usize,
}

impl Default for RelaySettings {
	fn default() -> Self {
		Self {
			poll_interval_secs: 30,
			max_wait_secs: 3_600,
			follow_up_max_attempts: 3,
			follow_up_backoff_secs: 15,
			worker_count: 4,
			queue_capacity: 1_000,
		}
	}
}

/// Settings validation failures
#[derive(Debug, Error)]
pub enum ConfigValidationError {
	#[error("invalid slippage threshold {0}; must be within (0, 1]")]
	InvalidSlippage(f64),

	#[error("unified fee denominator must be non-zero")]
	ZeroFeeDenominator,

	#[error("relay worker count must be non-zero")]
	NoWorkers,
}

impl Settings {
	/// Reject configurations that would misbehave at runtime
	pub fn validate(&self) -> Result<(), ConfigValidationError> {
		if !(self.bridge.max_slippage > 0.0 && self.bridge.max_slippage <= 1.0) {
			return Err(ConfigValidationError::InvalidSlippage(
				self.bridge.max_slippage,
			));
		}
		if self.unified.fees.denominator == 0 {
			return Err(ConfigValidationError::ZeroFeeDenominator);
		}
		if self.relay.worker_count == 0 {
			return Err(ConfigValidationError::NoWorkers);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_validate() {
		Settings::default().validate().unwrap();
	}

	#[test]
	fn zero_denominator_is_rejected() {
		let mut settings = Settings::default();
		settings.unified.fees.denominator = 0;
		assert!(matches!(
			settings.validate(),
			Err(ConfigValidationError::ZeroFeeDenominator)
		));
	}

	#[test]
	fn out_of_range_slippage_is_rejected() {
		let mut settings = Settings::default();
		settings.bridge.max_slippage = 1.5;
		assert!(matches!(
			settings.validate(),
			Err(ConfigValidationError::InvalidSlippage(_))
		));
	}

	#[test]
	fn settings_deserialize_from_json() {
		let raw = serde_json::json!({
			"bridge": {
				"attestation_url": "https://iris.example/v1",
				"max_slippage": 0.02,
				"domains": { "1": 0, "8453": 6 }
			},
			"relay": {
				"poll_interval_secs": 10,
				"max_wait_secs": 600,
				"follow_up_max_attempts": 2,
				"follow_up_backoff_secs": 5,
				"worker_count": 2,
				"queue_capacity": 64
			}
		});
		let settings: Settings = serde_json::from_value(raw).unwrap();
		assert_eq!(settings.bridge.domains.get(&8453), Some(&6));
		assert_eq!(settings.relay.worker_count, 2);
		settings.validate().unwrap();
	}
}
