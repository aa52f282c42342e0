//! Builds an [`Engine`] from a [`ServiceConfig`] and a
//! [`CompositeClientFactory`] (spec §4.4 "Build/startup").

use std::sync::Arc;
use std::time::Duration;

use crate::attribute::{Attribute, AttributeKind};
use crate::config::ServiceConfig;
use crate::device_client::{AttributeClass, CompositeClientFactory, DeviceClient};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::persistent_sink::PersistentSink;
use crate::store::TierConfig;

/// Assembles clients, attributes, and stores from configuration into a
/// running [`Engine`] (spec §4.4 steps 1-4).
pub struct EngineBuilder {
    config: ServiceConfig,
    sink: Arc<dyn PersistentSink>,
    clients: CompositeClientFactory,
    read_timeout: Duration,
}

/// The outcome of a build: the engine plus whatever was skipped along the
/// way, so a caller can decide whether a partial fleet is acceptable
/// (spec §4.4 tolerates per-device and per-attribute build failures without
/// aborting the whole build).
pub struct BuildReport {
    pub engine: Engine,
    /// Devices whose client construction failed (spec §7 `ClientUnavailable`).
    pub skipped_devices: Vec<(String, EngineError)>,
    /// Attributes that could not be resolved on their device (spec §7
    /// `AttributeUnknown`), or whose config was malformed.
    pub failed_attributes: Vec<(String, EngineError)>,
    /// Event subscriptions that failed to register.
    pub failed_subscriptions: Vec<(String, EngineError)>,
}

impl EngineBuilder {
    pub fn new(config: ServiceConfig, sink: Arc<dyn PersistentSink>, clients: CompositeClientFactory) -> Self {
        Self {
            config,
            sink,
            clients,
            read_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Builds the engine. Per spec §4.4: a device whose client can't be
    /// constructed (not registered in the factory) is skipped entirely; an
    /// attribute whose type can't be resolved is appended to
    /// `failed_attributes` and skipped. Dense integer ids are assigned in
    /// encounter order; the thread pool is sized to the number of polled
    /// attributes that made it through.
    pub fn build(self) -> Result<BuildReport, EngineError> {
        let tier_config = self.config.tier_config();
        let mut entries = Vec::new();
        let mut skipped_devices = Vec::new();
        let mut failed_attributes = Vec::new();
        let mut next_id = 0u64;

        let (fatal_tx, fatal_rx) = crossbeam::channel::unbounded();

        for device in &self.config.devices {
            let client = match self.clients.resolve(&device.name) {
                Ok(client) => client,
                Err(err) => {
                    status_log::warn!("device '{}' client unavailable, skipping: {err}", device.name);
                    skipped_devices.push((device.name.clone(), err));
                    continue;
                }
            };

            for attribute_config in &device.attributes {
                match build_attribute(
                    &device.name,
                    attribute_config,
                    &client,
                    Arc::clone(&self.sink),
                    tier_config,
                    fatal_tx.clone(),
                ) {
                    Ok(attribute) => {
                        let id = next_id;
                        next_id += 1;
                        entries.push((Arc::clone(&client), attribute, id));
                    }
                    Err(err) => {
                        let full_name = format!("{}/{}", device.name, attribute_config.name);
                        status_log::warn!("attribute '{full_name}' unresolvable, skipping: {err}");
                        failed_attributes.push((full_name, err));
                    }
                }
            }
        }

        if self.config.purge_on_start {
            for (_, attribute, _) in &entries {
                if let Err(err) = self.sink.purge(&attribute.full_name()) {
                    status_log::error!("restart-time purge of '{}' failed: {err}", attribute.full_name());
                }
            }
        }

        let engine = Engine::new(entries, self.read_timeout, fatal_rx);
        let failed_subscriptions = engine.wire_event_subscriptions();

        Ok(BuildReport {
            engine,
            skipped_devices,
            failed_attributes,
            failed_subscriptions,
        })
    }
}

fn build_attribute(
    device_name: &str,
    config: &crate::config::AttributeConfig,
    client: &Arc<dyn DeviceClient>,
    sink: Arc<dyn PersistentSink>,
    tier_config: TierConfig,
    fatal_errors: crossbeam::channel::Sender<EngineError>,
) -> Result<Attribute, EngineError> {
    let method = config.collection_method()?;
    let class = client.get_attribute_class(&config.name)?;

    let kind = match (class, &config.precision) {
        (AttributeClass::Numeric, Some(precision)) => AttributeKind::numeric(precision.clone()),
        (AttributeClass::Numeric, None) => {
            return Err(EngineError::Config(format!(
                "attribute '{device_name}/{}' is numeric but declares no precision",
                config.name
            )))
        }
        (AttributeClass::Boolean, _) => AttributeKind::Boolean,
        (AttributeClass::Text, _) => AttributeKind::Text,
        (AttributeClass::Array, _) => AttributeKind::Array,
    };

    Ok(Attribute::new(
        device_name,
        config.name.clone(),
        config.alias.clone(),
        config.interpolation,
        method,
        kind,
        sink,
        tier_config,
        fatal_errors,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributeConfig, AttributeMethod as Method, DeviceConfig};
    use crate::device_client::{RawReading, StaticClient};
    use crate::persistent_sink::MemorySink;
    use crate::value::DynValue;
    use bigdecimal::BigDecimal;
    use std::path::PathBuf;
    use std::str::FromStr;

    fn config_with_one_poll_attribute() -> ServiceConfig {
        ServiceConfig {
            devices: vec![DeviceConfig {
                name: "rack-1".to_owned(),
                attributes: vec![AttributeConfig {
                    name: "temperature".to_owned(),
                    alias: None,
                    method: Method::Poll,
                    delay_ms: Some(50),
                    event_type: None,
                    interpolation: crate::attribute::Interpolation::Last,
                    precision: Some(BigDecimal::from_str("0.1").unwrap()),
                }],
            }],
            persistent_root: PathBuf::from("/tmp/status-server-test"),
            persist_threshold: TierConfig::DEFAULT.persist_threshold,
            update_threshold: TierConfig::DEFAULT.update_threshold,
            purge_on_start: false,
        }
    }

    #[test]
    fn builds_an_engine_with_one_attribute() {
        let mut clients = CompositeClientFactory::new();
        clients.register(
            "rack-1",
            Arc::new(StaticClient::new().with_reading(
                "temperature",
                AttributeClass::Numeric,
                RawReading::ok(DynValue::Number(BigDecimal::from_str("21.5").unwrap())),
            )) as Arc<dyn DeviceClient>,
        );

        let report = EngineBuilder::new(config_with_one_poll_attribute(), Arc::new(MemorySink::new()), clients)
            .build()
            .unwrap();

        assert!(report.skipped_devices.is_empty());
        assert!(report.failed_attributes.is_empty());
        assert_eq!(report.engine.status(), "IDLE");
    }

    #[test]
    fn unknown_device_is_skipped_not_fatal() {
        let clients = CompositeClientFactory::new();
        let report = EngineBuilder::new(config_with_one_poll_attribute(), Arc::new(MemorySink::new()), clients)
            .build()
            .unwrap();

        assert_eq!(report.skipped_devices.len(), 1);
        assert!(report.failed_attributes.is_empty());
    }

    #[test]
    fn unresolvable_attribute_is_recorded_not_fatal() {
        let mut clients = CompositeClientFactory::new();
        // registered, but with no reading for "temperature" -> class lookup fails
        clients.register("rack-1", Arc::new(StaticClient::new()) as Arc<dyn DeviceClient>);

        let report = EngineBuilder::new(config_with_one_poll_attribute(), Arc::new(MemorySink::new()), clients)
            .build()
            .unwrap();

        assert!(report.skipped_devices.is_empty());
        assert_eq!(report.failed_attributes.len(), 1);
    }
}
