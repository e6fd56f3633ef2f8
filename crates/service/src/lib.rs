//! Rebalancer Service
//!
//! The core of the rebalancing engine: route planning, composite and
//! partial-path quote building, unified-balance transfers, and the
//! asynchronous confirmation relay.

pub mod composite;
pub mod contracts;
pub mod partial;
pub mod planner;
pub mod relay;
pub mod unified;

pub use composite::CompositeQuoteBuilder;
pub use partial::PartialPathResolver;
pub use planner::RoutePlanner;
pub use relay::{
	ConfirmationRelay, JobAttempt, JobHandler, JobOutcome, JobProcessor, ProcessorConfig,
	RelayHandler, WatchOutcomes,
};
pub use unified::{FeeSchedule, MultiSourceBalanceAggregator};
