//! Confirmation relay lifecycle against mocked attestation and swap services

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{Duration as ChronoDuration, Utc};
use common::*;

use rebalancer_config::RelaySettings;
use rebalancer_service::relay::{
	confirmation_dedup_key, ConfirmationRelay, ConfirmationWatchPayload, JobAttempt, JobOutcome,
	RelayHandler, WatchOutcomes, CONFIRMATION_WATCH_JOB,
};
use rebalancer_service::JobHandler;
use rebalancer_types::{
	AdapterError, AttestationStatus, ConfirmationContext, SwapExecution, WatchState,
};

fn fast_settings() -> RelaySettings {
	RelaySettings {
		poll_interval_secs: 0,
		max_wait_secs: 3_600,
		follow_up_max_attempts: 3,
		follow_up_backoff_secs: 0,
		worker_count: 2,
		queue_capacity: 64,
	}
}

fn watch_context(message_id: B256, follow_up: bool) -> ConfirmationContext {
	ConfirmationContext {
		destination_chain_id: 10,
		message_id,
		follow_up: follow_up.then(|| {
			swap_leg(
				&usdc(10),
				&erc20(10, 0xa2, 18),
				U256::from(1_000_000u64),
				U256::from(995_000u64),
				"dex",
			)
		}),
		recipient: WALLET,
		request_id: None,
	}
}

async fn wait_for_terminal(relay: &ConfirmationRelay, message_id: B256) -> WatchState {
	for _ in 0..400 {
		if let Some(state) = relay.watch_state(message_id) {
			if state.is_terminal() {
				return state;
			}
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("watch never reached a terminal state");
}

#[tokio::test]
async fn watch_without_follow_up_ends_confirmed() {
	let message_id = B256::repeat_byte(0x01);

	let calls = Arc::new(AtomicU32::new(0));
	let calls_in_mock = Arc::clone(&calls);
	let mut attestation = MockAttestations::new();
	attestation.expect_fetch().returning(move |_| {
		// Pending on the first poll, complete afterwards
		if calls_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
			Ok(AttestationStatus::Pending)
		} else {
			Ok(AttestationStatus::Complete {
				attestation: Bytes::from_static(b"proof"),
			})
		}
	});

	let mut swap = MockSwap::new();
	swap.expect_execute().times(0);

	let relay = ConfirmationRelay::start(
		Arc::new(attestation),
		Arc::new(swap),
		Arc::new(MockWallet::new()),
		fast_settings(),
	);
	relay
		.submit_watch(watch_context(message_id, false))
		.await
		.unwrap();

	assert_eq!(wait_for_terminal(&relay, message_id).await, WatchState::Confirmed);
	assert!(calls.load(Ordering::SeqCst) >= 2);

	let completed = relay
		.queue()
		.completed(&confirmation_dedup_key(message_id))
		.await
		.unwrap();
	assert!(completed.succeeded);
}

#[tokio::test]
async fn confirmed_watch_triggers_follow_up_swap() {
	let message_id = B256::repeat_byte(0x02);

	let mut attestation = MockAttestations::new();
	attestation.expect_fetch().returning(|_| {
		Ok(AttestationStatus::Complete {
			attestation: Bytes::from_static(b"proof"),
		})
	});

	let mut swap = MockSwap::new();
	swap.expect_execute()
		.times(1)
		.withf(|wallet, leg| *wallet == WALLET && leg.tool == "dex")
		.returning(|_, _| {
			Ok(SwapExecution {
				transaction_hash: B256::repeat_byte(0xfe),
			})
		});

	let relay = ConfirmationRelay::start(
		Arc::new(attestation),
		Arc::new(swap),
		Arc::new(MockWallet::new()),
		fast_settings(),
	);
	relay
		.submit_watch(watch_context(message_id, true))
		.await
		.unwrap();

	assert_eq!(
		wait_for_terminal(&relay, message_id).await,
		WatchState::ActionTriggered
	);
}

#[tokio::test]
async fn follow_up_failures_retry_then_become_terminal() {
	let message_id = B256::repeat_byte(0x03);

	let mut attestation = MockAttestations::new();
	attestation.expect_fetch().returning(|_| {
		Ok(AttestationStatus::Complete {
			attestation: Bytes::from_static(b"proof"),
		})
	});

	let mut swap = MockSwap::new();
	swap.expect_execute()
		.times(3)
		.returning(|_, _| Err(AdapterError::Http("swap venue down".into())));

	let relay = ConfirmationRelay::start(
		Arc::new(attestation),
		Arc::new(swap),
		Arc::new(MockWallet::new()),
		fast_settings(),
	);
	relay
		.submit_watch(watch_context(message_id, true))
		.await
		.unwrap();

	let state = wait_for_terminal(&relay, message_id).await;
	assert!(matches!(state, WatchState::FollowUpFailed { .. }));

	let completed = relay
		.queue()
		.completed(&confirmation_dedup_key(message_id))
		.await
		.unwrap();
	assert!(!completed.succeeded);
}

#[tokio::test]
async fn bridge_reported_failure_is_terminal() {
	let message_id = B256::repeat_byte(0x04);

	let mut attestation = MockAttestations::new();
	attestation.expect_fetch().returning(|_| {
		Ok(AttestationStatus::Failed {
			reason: "message reverted on source".into(),
		})
	});

	let relay = ConfirmationRelay::start(
		Arc::new(attestation),
		Arc::new(MockSwap::new()),
		Arc::new(MockWallet::new()),
		fast_settings(),
	);
	relay
		.submit_watch(watch_context(message_id, false))
		.await
		.unwrap();

	let state = wait_for_terminal(&relay, message_id).await;
	assert!(matches!(state, WatchState::Failed { .. }));
}

#[tokio::test]
async fn duplicate_watch_submissions_are_deduplicated() {
	let message_id = B256::repeat_byte(0x05);

	let mut attestation = MockAttestations::new();
	attestation.expect_fetch().times(1).returning(|_| {
		Ok(AttestationStatus::Complete {
			attestation: Bytes::from_static(b"proof"),
		})
	});

	let relay = ConfirmationRelay::start(
		Arc::new(attestation),
		Arc::new(MockSwap::new()),
		Arc::new(MockWallet::new()),
		fast_settings(),
	);
	for _ in 0..3 {
		relay
			.submit_watch(watch_context(message_id, false))
			.await
			.unwrap();
	}

	assert_eq!(wait_for_terminal(&relay, message_id).await, WatchState::Confirmed);
	// Give any stray duplicate a chance to run before the mock verifies
	tokio::time::sleep(Duration::from_millis(50)).await;
}

// Expiry is checked before each poll; a stale watch is marked expired and
// reported through the failure channel, handled here directly for determinism.
#[tokio::test]
async fn stale_watch_expires() {
	let message_id = B256::repeat_byte(0x06);

	let mut attestation = MockAttestations::new();
	attestation.expect_fetch().times(0);

	let outcomes = Arc::new(WatchOutcomes::new());
	let handler = RelayHandler::new(
		Arc::new(attestation),
		Arc::new(MockSwap::new()),
		Arc::new(MockWallet::new()),
		RelaySettings {
			max_wait_secs: 600,
			..fast_settings()
		},
		Arc::clone(&outcomes),
	);

	let payload = ConfirmationWatchPayload {
		context: watch_context(message_id, true),
		submitted_at: Utc::now() - ChronoDuration::seconds(700),
	};
	let outcome = handler
		.handle(
			CONFIRMATION_WATCH_JOB,
			&serde_json::to_value(&payload).unwrap(),
			JobAttempt {
				number: 0,
				is_last: false,
			},
		)
		.await;

	assert!(matches!(outcome, JobOutcome::Failed(_)));
	assert_eq!(
		outcomes.get(&message_id).map(|s| s.clone()),
		Some(WatchState::Expired)
	);
}

#[tokio::test]
async fn cancelled_watch_never_runs() {
	let message_id = B256::repeat_byte(0x07);

	let mut attestation = MockAttestations::new();
	attestation.expect_fetch().times(0);

	let relay = ConfirmationRelay::start(
		Arc::new(attestation),
		Arc::new(MockSwap::new()),
		Arc::new(MockWallet::new()),
		RelaySettings {
			// First poll far enough out that the cancel lands first
			poll_interval_secs: 2,
			..fast_settings()
		},
	);
	relay
		.submit_watch(watch_context(message_id, false))
		.await
		.unwrap();

	assert!(relay.cancel_watch(message_id).await);
	assert_eq!(relay.watch_state(message_id), None);
	tokio::time::sleep(Duration::from_millis(100)).await;
}
