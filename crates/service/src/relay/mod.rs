//! Asynchronous confirmation relay
//!
//! After a bridge leg is submitted, a durable, deduplicated watch job polls
//! the external confirmation and, on arrival, triggers the dependent
//! follow-up action. State machine per watch:
//! `Submitted -> {Confirmed | ActionTriggered | FollowUpFailed | Failed | Expired}`.

use std::sync::Arc;

use alloy_primitives::B256;
use chrono::Utc;
use tracing::debug;

use rebalancer_config::RelaySettings;
use rebalancer_types::{
	AttestationClient, ConfirmationContext, JobOptions, JobQueue, JobQueueError, SwapAdapter,
	WalletSigningService, WatchState,
};

pub mod handler;
pub mod jobs;
pub mod processor;

pub use handler::{RelayHandler, WatchOutcomes};
pub use jobs::{
	confirmation_dedup_key, top_up_dedup_key, BalanceTopUpPayload, ConfirmationWatchPayload,
	BALANCE_TOP_UP_JOB, CONFIRMATION_WATCH_JOB,
};
pub use processor::{JobAttempt, JobHandler, JobOutcome, JobProcessor, ProcessorConfig};

/// Facade over the watch lifecycle: submit, observe, cancel
pub struct ConfirmationRelay {
	queue: Arc<dyn JobQueue>,
	outcomes: Arc<WatchOutcomes>,
	settings: RelaySettings,
	// Kept alive for the lifetime of the relay
	_processor: Option<Arc<JobProcessor>>,
}

impl ConfirmationRelay {
	/// Start a relay with its own in-process job processor
	pub fn start(
		attestation: Arc<dyn AttestationClient>,
		swap: Arc<dyn SwapAdapter>,
		wallet: Arc<dyn WalletSigningService>,
		settings: RelaySettings,
	) -> Arc<Self> {
		let outcomes: Arc<WatchOutcomes> = Arc::new(WatchOutcomes::new());
		let handler = Arc::new(RelayHandler::new(
			attestation,
			swap,
			wallet,
			settings.clone(),
			Arc::clone(&outcomes),
		));
		let processor = Arc::new(JobProcessor::new(
			handler,
			ProcessorConfig {
				worker_count: settings.worker_count,
				queue_capacity: settings.queue_capacity,
			},
		));

		Arc::new(Self {
			queue: Arc::clone(&processor) as Arc<dyn JobQueue>,
			outcomes,
			settings,
			_processor: Some(processor),
		})
	}

	/// Build a relay over an externally owned queue (tests, shared queues)
	pub fn with_queue(
		queue: Arc<dyn JobQueue>,
		outcomes: Arc<WatchOutcomes>,
		settings: RelaySettings,
	) -> Arc<Self> {
		Arc::new(Self {
			queue,
			outcomes,
			settings,
			_processor: None,
		})
	}

	/// The queue shared with other deferred work (e.g. balance top-ups)
	pub fn queue(&self) -> Arc<dyn JobQueue> {
		Arc::clone(&self.queue)
	}

	/// Persist a deduplicated watch for a submitted bridge leg
	///
	/// Re-submission attempts with the same message id never create
	/// duplicate watches.
	pub async fn submit_watch(&self, context: ConfirmationContext) -> Result<(), JobQueueError> {
		let message_id = context.message_id;
		debug!(
			%message_id,
			has_follow_up = context.follow_up.is_some(),
			"submitting confirmation watch"
		);

		// A duplicate submission must not clobber a state the first watch
		// already reached
		self.outcomes
			.entry(message_id)
			.or_insert(WatchState::Submitted);

		let payload = ConfirmationWatchPayload {
			context,
			submitted_at: Utc::now(),
		};
		let options = JobOptions::new(confirmation_dedup_key(message_id))
			.with_max_attempts(self.settings.follow_up_max_attempts)
			.with_backoff(std::time::Duration::from_secs(
				self.settings.follow_up_backoff_secs,
			))
			.with_delay(std::time::Duration::from_secs(
				self.settings.poll_interval_secs,
			));

		self.queue
			.enqueue(
				CONFIRMATION_WATCH_JOB,
				rebalancer_types::serde_json::to_value(&payload)
					.map_err(|e| JobQueueError::InvalidPayload(e.to_string()))?,
				options,
			)
			.await
	}

	/// Current state of a watch, if one was submitted this process lifetime
	pub fn watch_state(&self, message_id: B256) -> Option<WatchState> {
		self.outcomes.get(&message_id).map(|state| state.clone())
	}

	/// Cancel a watch prior to confirmation; a follow-up already executing
	/// runs to its terminal outcome regardless
	pub async fn cancel_watch(&self, message_id: B256) -> bool {
		let cancelled = self.queue.cancel(&confirmation_dedup_key(message_id)).await;
		if cancelled {
			self.outcomes.remove(&message_id);
		}
		cancelled
	}
}
