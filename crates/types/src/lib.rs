//! Rebalancer Types
//!
//! Shared domain models, error taxonomy, and collaborator contracts for the
//! cross-chain rebalancing engine. This crate performs no I/O.

pub mod confirmation;
pub mod execution;
pub mod provider;
pub mod registry;
pub mod routes;
pub mod tokens;
pub mod traits;

// Re-export chrono and serde_json for convenience
pub use chrono;
pub use serde_json;

pub use tokens::{TokenDescriptor, TokenRole};

pub use routes::{
	BalanceSource, BridgeTransfer, BurnMintContext, PathDirection, PlanningError, PlanningResult,
	QuoteBuildError, QuoteResult, RouteQuote, RouteQuoteContext, RouteStep, StepKind, Strategy,
	SwapLeg, UnifiedContext, WarpRouteContext, WarpTransfer,
};

pub use execution::{
	ExecutionError, LogEntry, SubmissionReceipt, TransactionReceipt, TransferInstruction,
};

pub use confirmation::{ConfirmationContext, ConfirmationError, WatchState};

pub use registry::{GroupMatch, GroupToken, RouteGroup, SettlementAssetRegistry, WarpRouteTable};

pub use traits::{
	AdapterError, AdapterResult, AttestationBundle, AttestationClient, AttestationStatus,
	BalanceQueryService, BridgeInfoService, CompletedJob, DomainBalance, DomainContracts,
	DomainInfo, JobOptions,
	JobQueue, JobQueueError, SignedTransferIntent, SwapAdapter, SwapExecution,
	UnifiedBalanceService, WalletSigningService,
};

pub use provider::RouteProvider;
