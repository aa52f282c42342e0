//! The transport boundary to remote measurement devices (spec §4.4 step 1,
//! §6 "DeviceClient (consumed)"). The core only ever calls through this
//! trait; how a device is actually reached (fieldbus, RPC, simulator) is an
//! external collaborator's concern, mirrored here the way `PersistentSink`
//! isolates the storage backend in `persistent_sink.rs`.

use std::sync::Arc;

use ahash::HashMap;
use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::value::DynValue;

/// The shape of values a device reports for one attribute, resolved once at
/// build time (spec §4.4 step 2, "resolve attribute types via client").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeClass {
    Numeric,
    Boolean,
    Text,
    Array,
}

/// A single raw reading as handed back by a device, before it becomes an
/// `AttributeValue` (the engine stamps `read_ts`/`write_ts`/`source_id`).
#[derive(Clone, Debug, PartialEq)]
pub struct RawReading {
    pub value: Option<DynValue>,
    pub quality_ok: bool,
}

impl RawReading {
    pub fn ok(value: DynValue) -> Self {
        Self {
            value: Some(value),
            quality_ok: true,
        }
    }

    pub fn null() -> Self {
        Self {
            value: None,
            quality_ok: true,
        }
    }
}

/// A callback a [`DeviceClient`] invokes for each event-driven reading it
/// pushes (spec §4.4's event-driven collection path).
pub type EventSink = Box<dyn Fn(&str, RawReading) + Send + Sync>;

/// External device transport abstraction (spec §6). One implementation per
/// device, resolved by name through a [`CompositeClientFactory`].
pub trait DeviceClient: Send + Sync {
    /// Resolves the value shape this device reports for `attribute_name`.
    /// Returns [`EngineError::AttributeUnknown`] if the device has no such
    /// attribute.
    fn get_attribute_class(&self, attribute_name: &str) -> EngineResult<AttributeClass>;

    /// Synchronously samples `attribute_name` (the poll path).
    fn read(&self, attribute_name: &str) -> EngineResult<RawReading>;

    /// Registers `sink` to be invoked whenever this device pushes a new
    /// reading for `attribute_name` (the event path). Implementations that
    /// don't support push delivery should return
    /// [`EngineError::ClientUnavailable`].
    fn subscribe(&self, attribute_name: &str, sink: EventSink) -> EngineResult<()>;
}

/// A reference client over a fixed, in-process table of readings — useful
/// for tests and for devices whose values genuinely don't change.
pub struct StaticClient {
    readings: RwLock<HashMap<String, (AttributeClass, RawReading)>>,
}

impl StaticClient {
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(HashMap::default()),
        }
    }

    pub fn with_reading(self, attribute_name: impl Into<String>, class: AttributeClass, reading: RawReading) -> Self {
        self.readings.write().insert(attribute_name.into(), (class, reading));
        self
    }
}

impl Default for StaticClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClient for StaticClient {
    fn get_attribute_class(&self, attribute_name: &str) -> EngineResult<AttributeClass> {
        self.readings
            .read()
            .get(attribute_name)
            .map(|(class, _)| *class)
            .ok_or_else(|| EngineError::AttributeUnknown(attribute_name.to_owned()))
    }

    fn read(&self, attribute_name: &str) -> EngineResult<RawReading> {
        self.readings
            .read()
            .get(attribute_name)
            .map(|(_, reading)| reading.clone())
            .ok_or_else(|| EngineError::AttributeUnknown(attribute_name.to_owned()))
    }

    fn subscribe(&self, attribute_name: &str, _sink: EventSink) -> EngineResult<()> {
        Err(EngineError::ClientUnavailable {
            device: "static".to_owned(),
            reason: format!("'{attribute_name}' has no push delivery on a static client"),
        })
    }
}

/// A reference client whose readings step through a pre-recorded script on
/// each `read` call, holding at the last entry once exhausted. Useful for
/// exercising the precision filter and interpolation against a known
/// sequence (spec §8 scenarios S1/S5) without standing up a real device.
pub struct ScriptedClient {
    class: AttributeClass,
    script: Vec<RawReading>,
    cursor: parking_lot::Mutex<usize>,
}

impl ScriptedClient {
    pub fn new(class: AttributeClass, script: Vec<RawReading>) -> Self {
        Self {
            class,
            script,
            cursor: parking_lot::Mutex::new(0),
        }
    }
}

impl DeviceClient for ScriptedClient {
    fn get_attribute_class(&self, _attribute_name: &str) -> EngineResult<AttributeClass> {
        Ok(self.class)
    }

    fn read(&self, _attribute_name: &str) -> EngineResult<RawReading> {
        let mut cursor = self.cursor.lock();
        let reading = self
            .script
            .get(*cursor)
            .or_else(|| self.script.last())
            .cloned()
            .ok_or_else(|| EngineError::Read {
                attribute: "scripted".to_owned(),
                reason: "script is empty".to_owned(),
            })?;
        if *cursor < self.script.len() {
            *cursor += 1;
        }
        Ok(reading)
    }

    fn subscribe(&self, attribute_name: &str, _sink: EventSink) -> EngineResult<()> {
        Err(EngineError::ClientUnavailable {
            device: "scripted".to_owned(),
            reason: format!("'{attribute_name}' has no push delivery on a scripted client"),
        })
    }
}

/// Resolves a device name to its [`DeviceClient`] (spec §4.4 step 1,
/// "composite client factory"). Devices absent from the factory, or whose
/// client construction fails, are skipped by `EngineBuilder` rather than
/// aborting the whole build (spec §4.4's partial-failure tolerance).
#[derive(Default)]
pub struct CompositeClientFactory {
    clients: HashMap<String, Arc<dyn DeviceClient>>,
}

impl CompositeClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, device_name: impl Into<String>, client: Arc<dyn DeviceClient>) {
        self.clients.insert(device_name.into(), client);
    }

    pub fn resolve(&self, device_name: &str) -> EngineResult<Arc<dyn DeviceClient>> {
        self.clients
            .get(device_name)
            .cloned()
            .ok_or_else(|| EngineError::ClientUnavailable {
                device: device_name.to_owned(),
                reason: "no client registered for this device".to_owned(),
            })
    }
}
