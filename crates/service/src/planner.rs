//! Route planning over the settlement-asset table
//!
//! Decides, per token pair, which hops are structurally required: a source
//! swap when the input is not the bridge's settlement asset, the bridge leg
//! always, and a destination swap when the output is not the settlement
//! asset.

use std::sync::Arc;
use std::time::Duration;

use rebalancer_adapters::TtlCache;
use rebalancer_types::{
	AdapterResult, BridgeInfoService, DomainInfo, RouteStep, SettlementAssetRegistry, StepKind,
	TokenDescriptor,
};

/// Supported-domain lookups are cacheable for up to one hour
const DOMAIN_INFO_TTL: Duration = Duration::from_secs(60 * 60);

pub struct RoutePlanner {
	registry: Arc<SettlementAssetRegistry>,
	info: Arc<dyn BridgeInfoService>,
	domains: TtlCache<Vec<DomainInfo>>,
}

impl RoutePlanner {
	pub fn new(registry: Arc<SettlementAssetRegistry>, info: Arc<dyn BridgeInfoService>) -> Self {
		Self {
			registry,
			info,
			domains: TtlCache::new(),
		}
	}

	pub fn registry(&self) -> &SettlementAssetRegistry {
		&self.registry
	}

	/// Ordered list of required steps for a token pair
	///
	/// Pure over the current settlement-asset table: same inputs and same
	/// table always yield the same steps.
	pub fn plan_route(
		&self,
		token_in: &TokenDescriptor,
		token_out: &TokenDescriptor,
	) -> Vec<RouteStep> {
		let mut steps = Vec::with_capacity(3);

		if !self.registry.is_settlement_asset(token_in) {
			steps.push(RouteStep::required(StepKind::SourceSwap));
		}
		steps.push(RouteStep::required(StepKind::Bridge));
		if !self.registry.is_settlement_asset(token_out) {
			steps.push(RouteStep::required(StepKind::DestinationSwap));
		}

		steps
	}

	/// Whether a chain pair can be routed at all
	///
	/// Both chains must appear in the settlement-asset table and the bridge
	/// must support the source/destination direction. Callers reject the
	/// pair before planning when this returns false.
	pub async fn supports_chain_pair(
		&self,
		source_chain_id: u64,
		destination_chain_id: u64,
	) -> AdapterResult<bool> {
		if !self.registry.supports_chain(source_chain_id)
			|| !self.registry.supports_chain(destination_chain_id)
		{
			return Ok(false);
		}

		let domains = self.supported_domains().await?;
		let source_ok = domains
			.iter()
			.any(|d| d.chain_id == source_chain_id && d.has_source_capability);
		let destination_ok = domains
			.iter()
			.any(|d| d.chain_id == destination_chain_id && d.has_destination_capability);

		Ok(source_ok && destination_ok)
	}

	async fn supported_domains(&self) -> AdapterResult<Vec<DomainInfo>> {
		let info = Arc::clone(&self.info);
		self.domains
			.get_or_refresh("supported-domains", DOMAIN_INFO_TTL, move || async move {
				info.get_supported_domains().await
			})
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::Address;
	use async_trait::async_trait;
	use rebalancer_types::AdapterError;

	struct StaticInfo(Vec<DomainInfo>);

	#[async_trait]
	impl BridgeInfoService for StaticInfo {
		async fn get_supported_domains(&self) -> AdapterResult<Vec<DomainInfo>> {
			Ok(self.0.clone())
		}
	}

	struct FailingInfo;

	#[async_trait]
	impl BridgeInfoService for FailingInfo {
		async fn get_supported_domains(&self) -> AdapterResult<Vec<DomainInfo>> {
			Err(AdapterError::Http("info service down".into()))
		}
	}

	fn planner_with_domains(domains: Vec<DomainInfo>) -> RoutePlanner {
		RoutePlanner::new(
			Arc::new(SettlementAssetRegistry::new()),
			Arc::new(StaticInfo(domains)),
		)
	}

	fn usdc(chain_id: u64) -> TokenDescriptor {
		let registry = SettlementAssetRegistry::new();
		TokenDescriptor::new(chain_id, registry.settlement_asset(chain_id).unwrap(), 6)
	}

	fn other_token(chain_id: u64) -> TokenDescriptor {
		TokenDescriptor::new(chain_id, Address::repeat_byte(0xaa), 18)
	}

	fn kinds(steps: &[RouteStep]) -> Vec<StepKind> {
		steps.iter().map(|s| s.kind).collect()
	}

	#[test]
	fn settlement_to_settlement_is_bridge_only() {
		let planner = planner_with_domains(vec![]);
		let steps = planner.plan_route(&usdc(1), &usdc(10));
		assert_eq!(kinds(&steps), vec![StepKind::Bridge]);
		assert!(steps.iter().all(|s| s.required));
	}

	#[test]
	fn non_settlement_endpoints_add_swaps() {
		let planner = planner_with_domains(vec![]);

		let steps = planner.plan_route(&other_token(1), &usdc(10));
		assert_eq!(kinds(&steps), vec![StepKind::SourceSwap, StepKind::Bridge]);

		let steps = planner.plan_route(&usdc(1), &other_token(10));
		assert_eq!(kinds(&steps), vec![StepKind::Bridge, StepKind::DestinationSwap]);

		let steps = planner.plan_route(&other_token(1), &other_token(10));
		assert_eq!(
			kinds(&steps),
			vec![StepKind::SourceSwap, StepKind::Bridge, StepKind::DestinationSwap]
		);
	}

	#[test]
	fn planning_is_idempotent() {
		let planner = planner_with_domains(vec![]);
		let first = planner.plan_route(&other_token(1), &usdc(10));
		let second = planner.plan_route(&other_token(1), &usdc(10));
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn chain_pair_requires_both_lookups() {
		let planner = planner_with_domains(vec![
			DomainInfo {
				domain: 0,
				chain_id: 1,
				has_source_capability: true,
				has_destination_capability: true,
			},
			DomainInfo {
				domain: 2,
				chain_id: 10,
				has_source_capability: false,
				has_destination_capability: true,
			},
		]);

		assert!(planner.supports_chain_pair(1, 10).await.unwrap());
		// Chain 10 cannot act as a source
		assert!(!planner.supports_chain_pair(10, 1).await.unwrap());
		// Chain 555 is not in the settlement-asset table
		assert!(!planner.supports_chain_pair(1, 555).await.unwrap());
	}

	#[tokio::test]
	async fn registry_miss_short_circuits_before_the_network() {
		let planner = RoutePlanner::new(
			Arc::new(SettlementAssetRegistry::new()),
			Arc::new(FailingInfo),
		);
		// Unknown chains never reach the failing info service
		assert!(!planner.supports_chain_pair(555, 556).await.unwrap());
		// Known chains do, and the failure propagates
		assert!(planner.supports_chain_pair(1, 10).await.is_err());
	}
}
