//! Background job processor backing the queue contract
//!
//! A worker pool over an mpsc queue with deduplication, delayed submission,
//! self-rescheduling polls, and bounded exponential retry. Terminal results
//! are kept in a completed-job index retrievable by dedup key; failures
//! surface there and through logs, never through a caller's call stack.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use rebalancer_types::{CompletedJob, JobOptions, JobQueue, JobQueueError};

/// Configuration for the job processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
	pub worker_count: usize,
	pub queue_capacity: usize,
}

impl Default for ProcessorConfig {
	fn default() -> Self {
		Self {
			worker_count: 4,
			queue_capacity: 1_000,
		}
	}
}

/// Attempt counter handed to the handler
#[derive(Debug, Clone, Copy)]
pub struct JobAttempt {
	/// Zero-based attempt number
	pub number: u32,
	/// True when a `Retry` outcome would exhaust the attempt budget
	pub is_last: bool,
}

/// What the handler decided about one job run
#[derive(Debug)]
pub enum JobOutcome {
	/// Terminal success; the value lands in the completed index
	Done(Value),
	/// Not done yet; run again after the delay without consuming an attempt
	Reschedule { after: Duration },
	/// Transient failure; consumes an attempt, retried with backoff
	Retry { reason: String },
	/// Terminal failure; no retries
	Failed(String),
}

/// Handles one job run; implementations own all job-type dispatch
#[async_trait]
pub trait JobHandler: Send + Sync {
	async fn handle(&self, name: &str, payload: &Value, attempt: JobAttempt) -> JobOutcome;
}

#[derive(Debug, Clone)]
struct JobRequest {
	name: String,
	payload: Value,
	options: JobOptions,
	attempt: u32,
}

/// In-process implementation of the [`JobQueue`] contract
pub struct JobProcessor {
	sender: mpsc::Sender<JobRequest>,
	active: Arc<DashSet<String>>,
	cancelled: Arc<DashSet<String>>,
	completed: Arc<DashMap<String, CompletedJob>>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobProcessor {
	pub fn new(handler: Arc<dyn JobHandler>, config: ProcessorConfig) -> Self {
		let (sender, receiver) = mpsc::channel::<JobRequest>(config.queue_capacity);
		let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

		let active = Arc::new(DashSet::new());
		let cancelled = Arc::new(DashSet::new());
		let completed = Arc::new(DashMap::new());

		let mut workers = Vec::with_capacity(config.worker_count);
		for worker_id in 0..config.worker_count {
			let handler = Arc::clone(&handler);
			let receiver = Arc::clone(&receiver);
			let active = Arc::clone(&active);
			let cancelled = Arc::clone(&cancelled);
			let completed = Arc::clone(&completed);
			let sender = sender.clone();

			workers.push(tokio::spawn(async move {
				Self::worker_loop(
					worker_id, handler, receiver, active, cancelled, completed, sender,
				)
				.await;
			}));
		}

		Self {
			sender,
			active,
			cancelled,
			completed,
			workers: Mutex::new(workers),
		}
	}

	async fn worker_loop(
		worker_id: usize,
		handler: Arc<dyn JobHandler>,
		receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<JobRequest>>>,
		active: Arc<DashSet<String>>,
		cancelled: Arc<DashSet<String>>,
		completed: Arc<DashMap<String, CompletedJob>>,
		sender: mpsc::Sender<JobRequest>,
	) {
		loop {
			let request = {
				let mut receiver = receiver.lock().await;
				receiver.recv().await
			};
			let Some(request) = request else {
				debug!(worker_id, "job channel closed, worker exiting");
				break;
			};

			let key = request.options.dedup_key.clone();
			if cancelled.remove(&key).is_some() {
				active.remove(&key);
				debug!(worker_id, dedup_key = %key, "job cancelled before run");
				continue;
			}

			let max_attempts = request.options.max_attempts.max(1);
			let attempt = JobAttempt {
				number: request.attempt,
				is_last: request.attempt + 1 >= max_attempts,
			};

			let outcome = handler
				.handle(&request.name, &request.payload, attempt)
				.await;

			match outcome {
				JobOutcome::Done(outcome) => {
					debug!(worker_id, job = %request.name, dedup_key = %key, "job completed");
					completed.insert(
						key.clone(),
						CompletedJob {
							dedup_key: key.clone(),
							job_name: request.name,
							succeeded: true,
							outcome,
						},
					);
					active.remove(&key);
				},
				JobOutcome::Reschedule { after } => {
					// Same attempt number: polling is not a failure
					let sender = sender.clone();
					tokio::spawn(async move {
						tokio::time::sleep(after).await;
						if sender.send(request).await.is_err() {
							warn!("processor shut down with a rescheduled job in flight");
						}
					});
				},
				JobOutcome::Retry { reason } => {
					let next_attempt = request.attempt + 1;
					if next_attempt >= max_attempts {
						error!(
							job = %request.name,
							dedup_key = %key,
							attempts = max_attempts,
							%reason,
							"job failed terminally after exhausting retries"
						);
						completed.insert(
							key.clone(),
							CompletedJob {
								dedup_key: key.clone(),
								job_name: request.name,
								succeeded: false,
								outcome: Value::String(reason),
							},
						);
						active.remove(&key);
					} else {
						let delay = request.options.backoff * 2u32.pow(request.attempt);
						warn!(
							job = %request.name,
							dedup_key = %key,
							attempt = next_attempt,
							delay_ms = delay.as_millis() as u64,
							%reason,
							"job failed, retrying with backoff"
						);
						let retry = JobRequest {
							attempt: next_attempt,
							..request
						};
						let sender = sender.clone();
						tokio::spawn(async move {
							tokio::time::sleep(delay).await;
							if sender.send(retry).await.is_err() {
								warn!("processor shut down with a retry in flight");
							}
						});
					}
				},
				JobOutcome::Failed(message) => {
					error!(job = %request.name, dedup_key = %key, %message, "job failed terminally");
					completed.insert(
						key.clone(),
						CompletedJob {
							dedup_key: key.clone(),
							job_name: request.name,
							succeeded: false,
							outcome: Value::String(message),
						},
					);
					active.remove(&key);
				},
			}
		}
	}

	/// Abort all workers; queued jobs are dropped
	pub fn shutdown(&self) {
		let mut workers = self.workers.lock().expect("worker list poisoned");
		for worker in workers.drain(..) {
			worker.abort();
		}
	}
}

#[async_trait]
impl JobQueue for JobProcessor {
	async fn enqueue(
		&self,
		job_name: &str,
		payload: Value,
		options: JobOptions,
	) -> Result<(), JobQueueError> {
		let key = options.dedup_key.clone();

		if self.completed.contains_key(&key) {
			debug!(dedup_key = %key, "job already completed, skipping enqueue");
			return Ok(());
		}
		if !self.active.insert(key.clone()) {
			debug!(dedup_key = %key, "duplicate enqueue suppressed");
			return Ok(());
		}

		let delay = options.delay;
		let request = JobRequest {
			name: job_name.to_string(),
			payload,
			options,
			attempt: 0,
		};

		if delay > Duration::ZERO {
			let sender = self.sender.clone();
			tokio::spawn(async move {
				tokio::time::sleep(delay).await;
				if sender.send(request).await.is_err() {
					warn!("processor shut down with a delayed job in flight");
				}
			});
			return Ok(());
		}

		self.sender.try_send(request).map_err(|e| {
			self.active.remove(&key);
			match e {
				mpsc::error::TrySendError::Full(_) => JobQueueError::QueueFull,
				mpsc::error::TrySendError::Closed(_) => JobQueueError::ShuttingDown,
			}
		})
	}

	async fn completed(&self, dedup_key: &str) -> Option<CompletedJob> {
		self.completed.get(dedup_key).map(|entry| entry.clone())
	}

	async fn cancel(&self, dedup_key: &str) -> bool {
		if self.active.contains(dedup_key) {
			self.cancelled.insert(dedup_key.to_string());
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct CountingHandler {
		runs: AtomicU32,
		fail_first: u32,
	}

	#[async_trait]
	impl JobHandler for CountingHandler {
		async fn handle(&self, _name: &str, _payload: &Value, _attempt: JobAttempt) -> JobOutcome {
			let run = self.runs.fetch_add(1, Ordering::SeqCst);
			if run < self.fail_first {
				JobOutcome::Retry {
					reason: "transient".to_string(),
				}
			} else {
				JobOutcome::Done(Value::from(run))
			}
		}
	}

	fn processor(fail_first: u32) -> (JobProcessor, Arc<CountingHandler>) {
		let handler = Arc::new(CountingHandler {
			runs: AtomicU32::new(0),
			fail_first,
		});
		let processor = JobProcessor::new(handler.clone(), ProcessorConfig::default());
		(processor, handler)
	}

	fn options(key: &str) -> JobOptions {
		JobOptions::new(key)
			.with_max_attempts(3)
			.with_backoff(Duration::from_millis(5))
	}

	async fn wait_for_completed(processor: &JobProcessor, key: &str) -> CompletedJob {
		for _ in 0..200 {
			if let Some(done) = processor.completed(key).await {
				return done;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("job {key} never completed");
	}

	#[tokio::test]
	async fn duplicate_enqueues_run_once() {
		let (processor, handler) = processor(0);
		for _ in 0..5 {
			processor
				.enqueue("job", Value::Null, options("dup"))
				.await
				.unwrap();
		}

		let done = wait_for_completed(&processor, "dup").await;
		assert!(done.succeeded);
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(handler.runs.load(Ordering::SeqCst), 1);

		// Re-enqueue after completion is also a no-op
		processor
			.enqueue("job", Value::Null, options("dup"))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn transient_failures_retry_until_success() {
		let (processor, handler) = processor(2);
		processor
			.enqueue("job", Value::Null, options("retry"))
			.await
			.unwrap();

		let done = wait_for_completed(&processor, "retry").await;
		assert!(done.succeeded);
		assert_eq!(handler.runs.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn exhausted_retries_fail_terminally() {
		let (processor, handler) = processor(10);
		processor
			.enqueue("job", Value::Null, options("exhaust"))
			.await
			.unwrap();

		let done = wait_for_completed(&processor, "exhaust").await;
		assert!(!done.succeeded);
		assert_eq!(done.outcome, Value::String("transient".to_string()));
		assert_eq!(handler.runs.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn cancel_removes_delayed_jobs() {
		let (processor, handler) = processor(0);
		let opts = options("cancel").with_delay(Duration::from_millis(30));
		processor.enqueue("job", Value::Null, opts).await.unwrap();

		assert!(processor.cancel("cancel").await);
		tokio::time::sleep(Duration::from_millis(80)).await;
		assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
		assert!(processor.completed("cancel").await.is_none());

		// Nothing left to cancel
		assert!(!processor.cancel("cancel").await);
	}
}
