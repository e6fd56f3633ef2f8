//! Relay job handling: confirmation watches and balance top-ups

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use rebalancer_config::RelaySettings;
use rebalancer_types::{
	AttestationClient, AttestationStatus, ConfirmationError, SwapAdapter, TransferInstruction,
	WalletSigningService, WatchState,
};

use crate::contracts;
use crate::relay::jobs::{
	BalanceTopUpPayload, ConfirmationWatchPayload, BALANCE_TOP_UP_JOB, CONFIRMATION_WATCH_JOB,
};
use crate::relay::processor::{JobAttempt, JobHandler, JobOutcome};

/// Shared map of watch states, keyed by bridge message id
pub type WatchOutcomes = DashMap<B256, WatchState>;

/// Handles all relay job kinds
pub struct RelayHandler {
	attestation: Arc<dyn AttestationClient>,
	swap: Arc<dyn SwapAdapter>,
	wallet: Arc<dyn WalletSigningService>,
	settings: RelaySettings,
	outcomes: Arc<WatchOutcomes>,
}

impl RelayHandler {
	pub fn new(
		attestation: Arc<dyn AttestationClient>,
		swap: Arc<dyn SwapAdapter>,
		wallet: Arc<dyn WalletSigningService>,
		settings: RelaySettings,
		outcomes: Arc<WatchOutcomes>,
	) -> Self {
		Self {
			attestation,
			swap,
			wallet,
			settings,
			outcomes,
		}
	}

	fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.settings.poll_interval_secs)
	}

	async fn handle_watch(&self, payload: &Value, attempt: JobAttempt) -> JobOutcome {
		let payload: ConfirmationWatchPayload = match serde_json::from_value(payload.clone()) {
			Ok(payload) => payload,
			Err(e) => return JobOutcome::Failed(format!("malformed watch payload: {e}")),
		};
		let context = payload.context;
		let message_id = context.message_id;

		let waited_secs = (Utc::now() - payload.submitted_at).num_seconds().max(0) as u64;
		if waited_secs > self.settings.max_wait_secs {
			warn!(%message_id, waited_secs, "confirmation watch expired");
			self.outcomes.insert(message_id, WatchState::Expired);
			return JobOutcome::Failed(
				ConfirmationError::Expired {
					message_id,
					waited_secs,
				}
				.to_string(),
			);
		}

		let status = match self.attestation.fetch(message_id).await {
			Ok(status) => status,
			Err(e) => {
				// Transient lookup trouble; keep polling until expiry
				debug!(%message_id, error = %e, "attestation lookup failed, will re-poll");
				return JobOutcome::Reschedule {
					after: self.poll_interval(),
				};
			},
		};

		match status {
			AttestationStatus::Pending => JobOutcome::Reschedule {
				after: self.poll_interval(),
			},
			AttestationStatus::Failed { reason } => {
				warn!(%message_id, %reason, "bridge reported message failure");
				self.outcomes
					.insert(message_id, WatchState::Failed { reason: reason.clone() });
				JobOutcome::Failed(reason)
			},
			AttestationStatus::Complete { .. } => match &context.follow_up {
				None => {
					info!(%message_id, "bridge leg confirmed, no follow-up");
					self.outcomes.insert(message_id, WatchState::Confirmed);
					JobOutcome::Done(json!({ "state": "confirmed" }))
				},
				Some(leg) => match self.swap.execute(context.recipient, leg).await {
					Ok(execution) => {
						info!(
							%message_id,
							transaction_hash = %execution.transaction_hash,
							"follow-up swap executed"
						);
						self.outcomes.insert(message_id, WatchState::ActionTriggered);
						JobOutcome::Done(json!({
							"state": "actionTriggered",
							"transactionHash": execution.transaction_hash,
						}))
					},
					Err(e) => {
						let reason = e.to_string();
						if attempt.is_last {
							self.outcomes.insert(
								message_id,
								WatchState::FollowUpFailed {
									reason: reason.clone(),
								},
							);
						}
						JobOutcome::Retry {
							reason: ConfirmationError::FollowUpFailed {
								attempts: attempt.number + 1,
								reason,
							}
							.to_string(),
						}
					},
				},
			},
		}
	}

	/// Replenish the unified balance from the recipient's on-chain funds.
	/// Best-effort: the transfer that triggered this already completed.
	async fn handle_top_up(&self, payload: &Value) -> JobOutcome {
		let payload: BalanceTopUpPayload = match serde_json::from_value(payload.clone()) {
			Ok(payload) => payload,
			Err(e) => return JobOutcome::Failed(format!("malformed top-up payload: {e}")),
		};

		let approve = TransferInstruction::new(
			payload.chain_id,
			payload.token,
			contracts::approve_calldata(payload.deposit_wallet, payload.amount_base6),
		);
		let deposit = TransferInstruction::new(
			payload.chain_id,
			payload.deposit_wallet,
			contracts::deposit_calldata(payload.token, payload.amount_base6),
		);

		for instruction in [approve, deposit] {
			let hash = match self.wallet.send_transaction(&instruction).await {
				Ok(hash) => hash,
				Err(e) => {
					warn!(chain_id = payload.chain_id, error = %e, "top-up submission failed");
					return JobOutcome::Failed(e.to_string());
				},
			};
			match self.wallet.wait_for_receipt(payload.chain_id, hash).await {
				Ok(receipt) if receipt.success => {},
				Ok(_) => {
					warn!(chain_id = payload.chain_id, %hash, "top-up transaction reverted");
					return JobOutcome::Failed(format!("top-up transaction {hash} reverted"));
				},
				Err(e) => {
					warn!(chain_id = payload.chain_id, error = %e, "top-up receipt lookup failed");
					return JobOutcome::Failed(e.to_string());
				},
			}
		}

		debug!(
			chain_id = payload.chain_id,
			amount = %payload.amount_base6,
			"unified balance topped up"
		);
		JobOutcome::Done(json!({ "state": "toppedUp" }))
	}
}

#[async_trait]
impl JobHandler for RelayHandler {
	async fn handle(&self, name: &str, payload: &Value, attempt: JobAttempt) -> JobOutcome {
		match name {
			CONFIRMATION_WATCH_JOB => self.handle_watch(payload, attempt).await,
			BALANCE_TOP_UP_JOB => self.handle_top_up(payload).await,
			other => JobOutcome::Failed(format!("unknown job name: {other}")),
		}
	}
}
