//! Deferred-continuation data for asynchronous bridge settlement
//!
//! A bridge leg settles seconds to tens of minutes after submission. The
//! continuation that must run on settlement is carried as data (not captured
//! code) so it can cross the job-queue boundary safely.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routes::SwapLeg;

/// Everything a deferred continuation needs once confirmation arrives
///
/// Created at submission time, persisted in the job queue, consumed exactly
/// once when the external confirmation is observed, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationContext {
	pub destination_chain_id: u64,
	/// Bridge-issued message identifier; also the watch dedup key
	pub message_id: B256,
	/// Pending destination swap, absent when the watch is observability-only
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub follow_up: Option<SwapLeg>,
	/// Wallet that receives the settled funds
	pub recipient: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<String>,
}

impl ConfirmationContext {
	pub fn observability_only(
		destination_chain_id: u64,
		message_id: B256,
		recipient: Address,
	) -> Self {
		Self {
			destination_chain_id,
			message_id,
			follow_up: None,
			recipient,
			request_id: None,
		}
	}
}

/// Terminal and intermediate states of one confirmation watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum WatchState {
	/// Bridge leg submitted; waiting on the external confirmation
	Submitted,
	/// Confirmed with no follow-up action; observability-only terminal state
	Confirmed,
	/// Confirmed and the follow-up action completed
	ActionTriggered,
	/// Follow-up exhausted its retry budget
	FollowUpFailed { reason: String },
	/// The bridge reported the message as failed
	Failed { reason: String },
	/// Confirmation did not arrive within the configured maximum wait
	Expired,
}

impl WatchState {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, WatchState::Submitted)
	}
}

/// Confirmation-stage failures, surfaced asynchronously via the job queue
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
	#[error("confirmation watch for message {message_id} expired after {waited_secs}s")]
	Expired { message_id: B256, waited_secs: u64 },

	#[error("follow-up action failed after {attempts} attempts: {reason}")]
	FollowUpFailed { attempts: u32, reason: String },
}
