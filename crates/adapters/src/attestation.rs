//! Bridge attestation polling client
//!
//! Polls the bridge's attestation API for a message hash. The confirmation
//! relay drives this on its own schedule; this client is a single lookup.

use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rebalancer_types::{AdapterError, AdapterResult, AttestationClient, AttestationStatus};

use crate::client_cache::{adapter_client_cache, ClientCache, ClientConfig};

#[derive(Debug, Deserialize)]
struct AttestationResponse {
	status: String,
	#[serde(default)]
	attestation: Option<Bytes>,
}

/// HTTP attestation client for burn-and-mint bridge messages
pub struct HttpAttestationClient {
	base_url: String,
	cache: ClientCache,
}

impl HttpAttestationClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			cache: adapter_client_cache(),
		}
	}

	pub fn with_cache(base_url: impl Into<String>, cache: ClientCache) -> Self {
		Self {
			base_url: base_url.into(),
			cache,
		}
	}
}

#[async_trait]
impl AttestationClient for HttpAttestationClient {
	async fn fetch(&self, message_id: B256) -> AdapterResult<AttestationStatus> {
		let client = self
			.cache
			.get_client(&ClientConfig::new(self.base_url.clone(), 15_000))?;
		let url = format!("{}/attestations/{message_id}", self.base_url);

		let response = client
			.get(&url)
			.send()
			.await
			.map_err(|e| AdapterError::Http(e.to_string()))?;

		// The service answers 404 until it has observed the message
		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Ok(AttestationStatus::Pending);
		}
		if !response.status().is_success() {
			return Err(AdapterError::Rejected {
				service: "attestation".to_string(),
				message: format!("lookup failed: {}", response.status()),
			});
		}

		let parsed = response
			.json::<AttestationResponse>()
			.await
			.map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

		debug!(%message_id, status = %parsed.status, "attestation status");

		match parsed.status.as_str() {
			"complete" => match parsed.attestation {
				Some(attestation) => Ok(AttestationStatus::Complete { attestation }),
				None => Err(AdapterError::InvalidResponse(
					"complete attestation without payload".to_string(),
				)),
			},
			"failed" => Ok(AttestationStatus::Failed {
				reason: "bridge reported message as failed".to_string(),
			}),
			_ => Ok(AttestationStatus::Pending),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn response_statuses_deserialize() {
		let complete: AttestationResponse = serde_json::from_value(serde_json::json!({
			"status": "complete",
			"attestation": "0xbeef"
		}))
		.unwrap();
		assert_eq!(complete.status, "complete");
		assert!(complete.attestation.is_some());

		let pending: AttestationResponse = serde_json::from_value(serde_json::json!({
			"status": "pending_confirmations"
		}))
		.unwrap();
		assert!(pending.attestation.is_none());
	}
}
