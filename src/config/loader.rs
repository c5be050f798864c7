//! Configuration Loader
//!
//! Layers an optional TOML file and `CONDUIT__` environment variables over
//! the built-in defaults using the `config` crate. Nested keys use a double
//! underscore, e.g. `CONDUIT__STAGE__QUEUE_CAPACITY=64`.

use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::{debug, info};

use super::ConduitConfig;
use crate::error::Result;

const ENV_PREFIX: &str = "CONDUIT";
const ENV_SEPARATOR: &str = "__";

impl ConduitConfig {
    /// Load and validate configuration from `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;

        info!(
            config_file = ?path.map(|p| p.display().to_string()),
            queue_capacity = config.stage.queue_capacity,
            worker_count = config.stage.worker_count,
            retry_policy = ?config.retry.policy,
            "⚙️ CONFIG: Configuration loaded"
        );
        Ok(config)
    }

    /// Load without validation, for tools that report problems themselves
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&ConduitConfig::default())?);

        if let Some(path) = path {
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Parse configuration from a TOML string, with no environment overrides
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ConduitConfig = Config::builder()
            .add_source(Config::try_from(&ConduitConfig::default())?)
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
