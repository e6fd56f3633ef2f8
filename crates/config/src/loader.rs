//! Configuration loading utilities

use crate::settings::{ConfigValidationError, Settings};
use config::{Config, ConfigError, Environment, File};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
	#[error(transparent)]
	Source(#[from] ConfigError),

	#[error(transparent)]
	Validation(#[from] ConfigValidationError),
}

/// Load settings from `config/config.{toml,json,yaml}` with `REBALANCER_*`
/// environment overrides, falling back to defaults for absent sections
pub fn load_config() -> Result<Settings, ConfigLoadError> {
	let source = Config::builder()
		.add_source(File::with_name("config/config").required(false))
		.add_source(Environment::with_prefix("REBALANCER").separator("__"))
		.build()?;

	let settings: Settings = source.try_deserialize()?;
	settings.validate()?;
	Ok(settings)
}
