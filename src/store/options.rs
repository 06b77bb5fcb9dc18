//! Vector store configuration
//!
//! Options can be built in code, parsed from TOML, or loaded from a config
//! file with `VECSTORE_*` environment overrides:
//!
//! ```toml
//! batch_size = 256
//! max_elements = 100000
//! vector_byte_size = 512
//! enable_replace_vacant = true
//! initial_reserve = "lazy"
//! ```

use super::slot::INVALID_LOCATION;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default slots per batch
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Default upper bound on live + tombstoned locations
pub const DEFAULT_MAX_ELEMENTS: usize = 100_000;

/// Environment prefix for option overrides
pub const ENV_PREFIX: &str = "VECSTORE";

/// How much storage `initialize` provisions up front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialReserve {
    /// Allocate batches covering `max_elements` immediately
    #[default]
    Eager,
    /// Allocate nothing; batches are added as locations are handed out
    Lazy,
}

/// Vector store options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Slots per growth unit
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Hard limit on live + tombstoned locations
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
    /// Bytes per vector, must be set by the caller
    #[serde(default)]
    pub vector_byte_size: usize,
    /// Whether new vectors may take over deleted locations
    #[serde(default = "default_true")]
    pub enable_replace_vacant: bool,
    #[serde(default)]
    pub initial_reserve: InitialReserve,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_elements() -> usize {
    DEFAULT_MAX_ELEMENTS
}

fn default_true() -> bool {
    true
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_elements: DEFAULT_MAX_ELEMENTS,
            vector_byte_size: 0,
            enable_replace_vacant: true,
            initial_reserve: InitialReserve::Eager,
        }
    }
}

impl StoreOptions {
    /// Default options for vectors of `vector_byte_size` bytes
    pub fn new(vector_byte_size: usize) -> Self {
        Self {
            vector_byte_size,
            ..Self::default()
        }
    }

    /// Load options from a file (format by extension), then apply
    /// `VECSTORE_*` environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| {
                Error::Config(format!("Failed to load {}: {}", path.display(), e))
            })?;

        let options: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid options in {}: {}", path.display(), e)))?;

        options.validate()?;
        Ok(options)
    }

    /// Parse options from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let options: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("Invalid TOML options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize options: {}", e)))
    }

    /// Check that the options describe a usable store
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be > 0".to_string()));
        }
        if self.vector_byte_size == 0 {
            return Err(Error::InvalidArgument(
                "vector_byte_size must be > 0".to_string(),
            ));
        }
        if self.max_elements > INVALID_LOCATION as usize {
            return Err(Error::InvalidArgument(format!(
                "max_elements {} exceeds the location range {}",
                self.max_elements, INVALID_LOCATION
            )));
        }
        if self.batch_size.checked_mul(self.vector_byte_size).is_none() {
            return Err(Error::InvalidArgument(format!(
                "batch of {} x {} bytes overflows",
                self.batch_size, self.vector_byte_size
            )));
        }
        Ok(())
    }
}
