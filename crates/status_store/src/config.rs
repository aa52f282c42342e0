//! Declarative fleet configuration (spec §6 "Configuration (input)").
//!
//! `spec.md` treats the configuration *loader* as an external collaborator
//! (it names XML specifically) and leaves the concrete shape unspecified
//! beyond the field list. Per `SPEC_FULL.md` §1.3, this crate supplies the
//! in-memory config types plus a `toml`-based loader as the testable stand-in
//! a from-scratch Rust service would actually ship; the real XML front end
//! (or whatever format production picks) stays an external collaborator that
//! produces one of these `ServiceConfig` values.

use std::path::PathBuf;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::attribute::Interpolation;
use crate::error::{EngineError, EngineResult};
use crate::store::TierConfig;

/// One attribute declared under a device in configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub method: AttributeMethod,
    /// Poll period in milliseconds. Required when `method = poll`.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Required when `method = event`.
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default = "default_interpolation")]
    pub interpolation: Interpolation,
    /// Precision for numeric attributes; ignored for non-numeric ones.
    /// `None` means the attribute is not numeric.
    #[serde(default)]
    pub precision: Option<BigDecimal>,
}

fn default_interpolation() -> Interpolation {
    Interpolation::Last
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMethod {
    Poll,
    Event,
}

impl AttributeConfig {
    /// Builds the `CollectionMethod` + `AttributeKind` pair this attribute
    /// needs, validating the method-specific fields spec §6 requires
    /// (`delay_ms` for POLL, `event_type` for EVENT).
    pub(crate) fn collection_method(&self) -> EngineResult<crate::attribute::CollectionMethod> {
        match self.method {
            AttributeMethod::Poll => {
                let delay_ms = self.delay_ms.ok_or_else(|| {
                    EngineError::Config(format!("attribute '{}': poll method requires delay_ms", self.name))
                })?;
                Ok(crate::attribute::CollectionMethod::Poll { delay_ms })
            }
            AttributeMethod::Event => {
                let event_type = self.event_type.clone().ok_or_else(|| {
                    EngineError::Config(format!("attribute '{}': event method requires event_type", self.name))
                })?;
                Ok(crate::attribute::CollectionMethod::Event { event_type })
            }
        }
    }
}

/// One device entry, grouping the attributes collected from it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub attributes: Vec<AttributeConfig>,
}

/// Service-level settings plus the device/attribute fleet (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub devices: Vec<DeviceConfig>,
    pub persistent_root: PathBuf,
    #[serde(default = "default_persist_threshold")]
    pub persist_threshold: u64,
    #[serde(default = "default_update_threshold")]
    pub update_threshold: u64,
    /// Spec §1 Non-goals: "no deletion of persisted data except on explicit
    /// restart-time purge". When set, `EngineBuilder::build` purges every
    /// attribute's persistent record before the engine starts.
    #[serde(default)]
    pub purge_on_start: bool,
}

fn default_persist_threshold() -> u64 {
    TierConfig::DEFAULT.persist_threshold
}

fn default_update_threshold() -> u64 {
    TierConfig::DEFAULT.update_threshold
}

impl ServiceConfig {
    pub fn tier_config(&self) -> TierConfig {
        TierConfig {
            persist_threshold: self.persist_threshold,
            update_threshold: self.update_threshold,
        }
    }

    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|err| EngineError::Config(err.to_string()))
    }

    pub fn load(path: &std::path::Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| EngineError::Config(format!("reading '{}': {err}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
