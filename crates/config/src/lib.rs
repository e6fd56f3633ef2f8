//! Rebalancer Configuration
//!
//! Settings structures and file/environment loading for the rebalancing
//! engine.

pub mod loader;
pub mod settings;

pub use loader::{load_config, ConfigLoadError};
pub use settings::{
	BridgeSettings, ConfigValidationError, RelaySettings, Settings, SwapSettings,
	UnifiedChainSettings, UnifiedFeeSettings, UnifiedSettings, WarpSettings,
};
