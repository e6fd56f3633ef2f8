//! Process-wide lookup tables, swapped atomically on configuration refresh
//!
//! Both registries are read on every plan/classify call and mutated rarely.
//! Updates replace the whole table in one atomic store so a concurrent
//! reader never observes a partially-updated table.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{address, Address};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::tokens::TokenDescriptor;

/// Canonical settlement-asset (native USDC) addresses per chain
fn default_settlement_assets() -> HashMap<u64, Address> {
	HashMap::from([
		// Ethereum
		(1, address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")),
		// Optimism
		(10, address!("0b2c639c533813f4aa9d7837caf62653d097ff85")),
		// Polygon PoS
		(137, address!("3c499c542cef5e3811e1192ce70d8cc03d5c3359")),
		// Base
		(8453, address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913")),
		// Arbitrum
		(42161, address!("af88d065e77c8cc2239327c5edb3a432268e5831")),
		// Avalanche
		(43114, address!("b97ef9ef8734c71904d8002f8b6bc66dd9c48a6e")),
	])
}

/// Settlement-asset address table keyed by chain id
///
/// `swap` and `reset_to_default` are the only mutators; both replace the
/// table atomically.
#[derive(Debug)]
pub struct SettlementAssetRegistry {
	table: ArcSwap<HashMap<u64, Address>>,
}

impl SettlementAssetRegistry {
	pub fn new() -> Self {
		Self {
			table: ArcSwap::from_pointee(default_settlement_assets()),
		}
	}

	pub fn with_table(table: HashMap<u64, Address>) -> Self {
		Self {
			table: ArcSwap::from_pointee(table),
		}
	}

	/// Replace the whole table atomically
	pub fn swap(&self, table: HashMap<u64, Address>) {
		self.table.store(Arc::new(table));
	}

	/// Restore the built-in table; used for test isolation
	pub fn reset_to_default(&self) {
		self.table.store(Arc::new(default_settlement_assets()));
	}

	pub fn settlement_asset(&self, chain_id: u64) -> Option<Address> {
		self.table.load().get(&chain_id).copied()
	}

	/// True when `token` is the settlement asset on its own chain
	pub fn is_settlement_asset(&self, token: &TokenDescriptor) -> bool {
		self.settlement_asset(token.chain_id) == Some(token.address)
	}

	pub fn supports_chain(&self, chain_id: u64) -> bool {
		self.table.load().contains_key(&chain_id)
	}
}

impl Default for SettlementAssetRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// One token entry of a route group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupToken {
	pub chain_id: u64,
	pub address: Address,
	/// Router contract executing remote transfers for this entry
	pub router: Address,
}

/// One collateral and the synthetics interchangeable with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteGroup {
	pub collateral: GroupToken,
	pub synthetics: Vec<GroupToken>,
}

impl RouteGroup {
	/// Find the group member matching a token, if any
	pub fn member(&self, chain_id: u64, address: Address) -> Option<GroupMember<'_>> {
		if self.collateral.chain_id == chain_id && self.collateral.address == address {
			return Some(GroupMember {
				token: &self.collateral,
				is_collateral: true,
			});
		}
		self.synthetics
			.iter()
			.find(|t| t.chain_id == chain_id && t.address == address)
			.map(|token| GroupMember {
				token,
				is_collateral: false,
			})
	}
}

/// A matched member inside a route group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember<'a> {
	pub token: &'a GroupToken,
	pub is_collateral: bool,
}

/// Result of classifying one token against the route-group table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMatch {
	pub group_index: usize,
	pub is_collateral: bool,
	pub router: Address,
}

/// Route-group table for warp-style collateral/synthetic bridging
#[derive(Debug)]
pub struct WarpRouteTable {
	groups: ArcSwap<Vec<RouteGroup>>,
}

impl WarpRouteTable {
	pub fn new(groups: Vec<RouteGroup>) -> Self {
		Self {
			groups: ArcSwap::from_pointee(groups),
		}
	}

	pub fn empty() -> Self {
		Self::new(Vec::new())
	}

	/// Replace the whole table atomically
	pub fn swap(&self, groups: Vec<RouteGroup>) {
		self.groups.store(Arc::new(groups));
	}

	/// Drop all groups; used for test isolation
	pub fn reset_to_default(&self) {
		self.groups.store(Arc::new(Vec::new()));
	}

	pub fn classify(&self, token: &TokenDescriptor) -> Option<GroupMatch> {
		let groups = self.groups.load();
		groups.iter().enumerate().find_map(|(group_index, group)| {
			group
				.member(token.chain_id, token.address)
				.map(|member| GroupMatch {
					group_index,
					is_collateral: member.is_collateral,
					router: member.token.router,
				})
		})
	}

	/// The collateral entry of a group, by index
	pub fn collateral(&self, group_index: usize) -> Option<GroupToken> {
		self.groups
			.load()
			.get(group_index)
			.map(|g| g.collateral.clone())
	}

	/// The group member on a specific chain, by group index
	pub fn member_on_chain(&self, group_index: usize, chain_id: u64) -> Option<GroupToken> {
		let groups = self.groups.load();
		let group = groups.get(group_index)?;
		if group.collateral.chain_id == chain_id {
			return Some(group.collateral.clone());
		}
		group
			.synthetics
			.iter()
			.find(|t| t.chain_id == chain_id)
			.cloned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn usdc(chain_id: u64) -> TokenDescriptor {
		let registry = SettlementAssetRegistry::new();
		TokenDescriptor::new(chain_id, registry.settlement_asset(chain_id).unwrap(), 6)
	}

	#[test]
	fn default_table_identifies_settlement_assets() {
		let registry = SettlementAssetRegistry::new();
		assert!(registry.is_settlement_asset(&usdc(1)));
		assert!(registry.is_settlement_asset(&usdc(8453)));

		let not_usdc = TokenDescriptor::new(1, Address::repeat_byte(0xaa), 18);
		assert!(!registry.is_settlement_asset(&not_usdc));
	}

	#[test]
	fn swap_replaces_whole_table() {
		let registry = SettlementAssetRegistry::new();
		let custom = Address::repeat_byte(0x11);
		registry.swap(HashMap::from([(777, custom)]));

		assert_eq!(registry.settlement_asset(777), Some(custom));
		assert_eq!(registry.settlement_asset(1), None);

		registry.reset_to_default();
		assert!(registry.supports_chain(1));
		assert!(!registry.supports_chain(777));
	}

	#[test]
	fn classify_distinguishes_collateral_and_synthetic() {
		let collateral = GroupToken {
			chain_id: 1,
			address: Address::repeat_byte(0x01),
			router: Address::repeat_byte(0x0a),
		};
		let synthetic = GroupToken {
			chain_id: 10,
			address: Address::repeat_byte(0x02),
			router: Address::repeat_byte(0x0b),
		};
		let table = WarpRouteTable::new(vec![RouteGroup {
			collateral: collateral.clone(),
			synthetics: vec![synthetic.clone()],
		}]);

		let hit = table
			.classify(&TokenDescriptor::new(1, collateral.address, 6))
			.unwrap();
		assert!(hit.is_collateral);
		assert_eq!(hit.group_index, 0);

		let hit = table
			.classify(&TokenDescriptor::new(10, synthetic.address, 6))
			.unwrap();
		assert!(!hit.is_collateral);
		assert_eq!(hit.router, synthetic.router);

		assert!(table
			.classify(&TokenDescriptor::new(1, Address::repeat_byte(0xff), 6))
			.is_none());
	}
}
