use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    Config, ExcitementPolicy, ExcludedRace, LeverageConfig, PaceConfig, PointsScale, RunConfig, SmoothingConfig,
    TrendConfig, TrendFitKind,
};

/// Default file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "maranello.toml";

/// Prefix for environment overrides, e.g. `MARANELLO__LEVERAGE__SCALE_FACTOR=2.0`.
pub const ENV_PREFIX: &str = "MARANELLO";

/// Loads the application configuration.
///
/// Sources are layered: built-in defaults, then the TOML file (required only when a
/// path is passed explicitly), then `MARANELLO__*` environment variables. The result
/// is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let builder = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    tracing::debug!(?config, "Configuration loaded.");
    Ok(config)
}

/// Parses configuration from an in-memory TOML document, without environment overrides.
pub fn config_from_toml(contents: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(contents, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}
