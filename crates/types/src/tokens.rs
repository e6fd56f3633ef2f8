//! Token identification shared across providers

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Protocol-specific role a token plays inside a bridging mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
	/// Backing asset locked on the origin side of a warp route
	Collateral,
	/// Minted representation of a collateral on a remote chain
	Synthetic,
	/// The asset a bridge natively moves (e.g. native USDC for burn/mint)
	Settlement,
}

/// Identifies one token on one chain
///
/// Immutable; created per call. Two descriptors are the same token iff both
/// chain id and address match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
	pub chain_id: u64,
	pub address: Address,
	pub decimals: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<TokenRole>,
}

impl TokenDescriptor {
	pub fn new(chain_id: u64, address: Address, decimals: u8) -> Self {
		Self {
			chain_id,
			address,
			decimals,
			role: None,
		}
	}

	pub fn with_role(mut self, role: TokenRole) -> Self {
		self.role = Some(role);
		self
	}

	/// True when `other` is the same token on the same chain
	pub fn is_same_token(&self, other: &TokenDescriptor) -> bool {
		self.chain_id == other.chain_id && self.address == other.address
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	#[test]
	fn same_token_requires_chain_and_address() {
		let usdc = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
		let a = TokenDescriptor::new(1, usdc, 6);
		let b = TokenDescriptor::new(1, usdc, 6).with_role(TokenRole::Settlement);
		let c = TokenDescriptor::new(10, usdc, 6);

		assert!(a.is_same_token(&b));
		assert!(!a.is_same_token(&c));
	}
}
