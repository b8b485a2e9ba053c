//! Engine configuration loading from config.toml
//!
//! Every section is optional; missing keys take the defaults below. Values are checked
//! after parsing so a bad file fails at startup instead of skewing fee or discount math.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level engine settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mile_discount: MileDiscountConfig,
    pub fees: FeeConfig,
    pub batch: BatchConfig,
}

/// Mile (sibling/volume) discount parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MileDiscountConfig {
    /// Miles a household must exceed before any discount applies (the `K` in
    /// `(total_miles - K) * unit_value`)
    pub threshold: i64,
    /// Discount granted per mile above the threshold
    pub unit_value: i64,
}

impl Default for MileDiscountConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            unit_value: 500,
        }
    }
}

/// Fee resolution parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Classes per month assumed when a ticket proration does not say
    pub default_classes_per_month: u32,
    /// Suffixes tried, in order, for `{course_code}_{suffix}` enrollment products
    pub enrollment_code_suffixes: Vec<String>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_classes_per_month: 4,
            enrollment_code_suffixes: vec!["1".to_string(), "2".to_string()],
        }
    }
}

/// Batch recomputation parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on failure details returned to the caller
    pub max_failure_details: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_failure_details: 20,
        }
    }
}

impl EngineConfig {
    /// Rejects settings the engine cannot compute with.
    pub fn validate(&self) -> Result<()> {
        if self.mile_discount.threshold < 0 {
            return Err(Error::Config {
                message: "mile_discount.threshold must not be negative".to_string(),
            });
        }
        if self.mile_discount.unit_value < 0 {
            return Err(Error::Config {
                message: "mile_discount.unit_value must not be negative".to_string(),
            });
        }
        if self.fees.default_classes_per_month == 0 {
            return Err(Error::Config {
                message: "fees.default_classes_per_month must be at least 1".to_string(),
            });
        }
        if self.batch.max_failure_details == 0 {
            return Err(Error::Config {
                message: "batch.max_failure_details must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Parses and validates engine settings from TOML text.
pub fn parse_config(contents: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads engine configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML syntax is invalid, or a value
/// fails validation.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads the configuration named by `ENGINE_CONFIG` (default `./config.toml`).
///
/// A missing file is not an error: the engine runs on defaults.
pub fn load_default_config() -> Result<EngineConfig> {
    let path = std::env::var("ENGINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if !Path::new(&path).exists() {
        tracing::info!("No engine config at {path}, using defaults");
        return Ok(EngineConfig::default());
    }
    load_config(path)
}
