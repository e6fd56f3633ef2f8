//! Rebalancer Adapters
//!
//! Network-facing implementations of the collaborator contracts: the swap
//! aggregator, the unified-balance settlement network, and the bridge
//! attestation service, plus the shared HTTP client and value caches.

pub mod attestation;
pub mod client_cache;
pub mod gateway;
pub mod swap;
pub mod ttl_cache;

pub use attestation::HttpAttestationClient;
pub use client_cache::{adapter_client_cache, ClientCache, ClientConfig};
pub use gateway::GatewayClient;
pub use swap::HttpSwapAdapter;
pub use ttl_cache::TtlCache;
