//! The attribute storage and ingestion engine for the status-collection
//! service.
//!
//! This crate is the hard engineering core described in the service's
//! design: a per-attribute tiered value store, a precision-aware acceptance
//! filter for numeric streams, engine-level scheduling of polled and
//! event-driven attribute collection, and the concurrency contract that
//! lets readers query while writers append.
//!
//! * See [`ValueStore`] for the tiered storage structure.
//! * See [`Attribute`] for the acceptance filter in front of a `ValueStore`.
//! * See [`Engine`] and [`EngineBuilder`] for wiring clients, attributes,
//!   and stores together and driving the sampling scheduler.
//!
//! Device transport, persistence medium, and configuration-file parsing are
//! external collaborators: this crate only defines the trait boundaries
//! ([`DeviceClient`], [`PersistentSink`]) and a couple of reference
//! implementations used by its own tests.

mod attribute;
mod config;
mod device_client;
mod engine;
mod engine_builder;
mod error;
mod interpolation;
mod persistent_sink;
mod store;
mod timestamp;
mod value;

pub use attribute::{Attribute, AttributeKind, CollectionMethod, Interpolation};
pub use config::{AttributeConfig, AttributeMethod, DeviceConfig, ServiceConfig};
pub use device_client::{
    AttributeClass, CompositeClientFactory, DeviceClient, EventSink, RawReading, ScriptedClient,
    StaticClient,
};
pub use engine::{CollectionMode, Engine, EngineMetrics, EngineState};
pub use engine_builder::{BuildReport, EngineBuilder};
pub use error::{EngineError, EngineResult};
pub use persistent_sink::{MemorySink, PersistentSink, Record};
pub use store::{TierConfig, ValueStore};
pub use timestamp::Timestamp;
pub use value::{AttributeValue, DynValue, Quality};
