//! The engine: owns every [`Attribute`], drives the sampling scheduler, and
//! answers snapshot/range/interpolation queries (spec §4.4).
//!
//! Scheduling mirrors the teacher's `re_smart_channel`/worker-pool idiom
//! (bounded `crossbeam::channel` handing jobs to a fixed pool of OS
//! threads) rather than an async runtime, per spec §5's "parallel threads,
//! cooperative nowhere" scheduling model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::attribute::{Attribute, CollectionMethod};
use crate::device_client::DeviceClient;
use crate::error::EngineError;
use crate::timestamp::Timestamp;
use crate::value::{AttributeValue, DynValue, Quality};

/// The two collection modes named in spec §4.4's state diagram. The spec
/// does not distinguish their scheduling behavior beyond the state name;
/// both drive identical per-attribute tasks here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionMode {
    LightPoll,
    HeavyDuty,
}

/// Engine lifecycle (spec §4.4's state machine). `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninit,
    Idle,
    Collecting(CollectionMode),
    Stopped,
}

impl EngineState {
    /// The name external callers see from `status()` (spec §6).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninit => "UNINIT",
            Self::Idle => "IDLE",
            Self::Collecting(CollectionMode::LightPoll) => "LIGHT_POLL",
            Self::Collecting(CollectionMode::HeavyDuty) => "HEAVY_DUTY",
            Self::Stopped => "STOPPED",
        }
    }
}

/// Counters for the engine-level behaviors spec §4.4/§5/§8 call out by name
/// (overruns, per-attribute read failures, dropped events while idle) but
/// don't require an external metrics exporter for (`SPEC_FULL.md` §2).
#[derive(Default)]
pub struct EngineMetrics {
    /// A tick was skipped because the previous tick for that attribute
    /// hadn't finished yet (spec §4.4's "later tick is dropped").
    pub overruns: AtomicU64,
    /// An event arrived while the engine was not COLLECTING (spec §4.4).
    pub dropped_events_idle: AtomicU64,
}

/// An attribute plus the bits the scheduler needs that don't belong on
/// `Attribute` itself: which device/client produced it, and whether a tick
/// is currently in flight (for overrun detection).
struct AttributeEntry {
    attribute: Attribute,
    client: Arc<dyn DeviceClient>,
    in_flight: AtomicBool,
    read_failures: AtomicU64,
    source_id: u64,
}

/// Handles for a running collection cycle, torn down by `stop_collect`/
/// `shutdown`.
struct RunningCollection {
    pool_tx: Sender<Job>,
    pool_workers: Vec<std::thread::JoinHandle<()>>,
    tickers: Vec<std::thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

type Job = Box<dyn FnOnce() + Send>;

struct Shared {
    attributes: Vec<Arc<AttributeEntry>>,
    polled_idx: Vec<usize>,
    event_idx: Vec<usize>,
    state: RwLock<EngineState>,
    use_aliases: AtomicBool,
    metrics: EngineMetrics,
    read_timeout: Duration,
    running: Mutex<Option<RunningCollection>>,
    /// Engine-invariant violations surfaced from a `ValueStore`'s eviction
    /// path (spec §7: fatal for the engine). `EngineBuilder` wires every
    /// attribute's `ValueStore` to the same sender; `take_fatal_errors`
    /// drains them for a caller (e.g. the RPC surface, or a supervisor
    /// loop) to act on.
    fatal_errors: Receiver<EngineError>,
}

/// Owns every [`Attribute`] and their stores, and drives sampling.
///
/// Cheaply cloneable (an `Arc` around its shared state), so event callbacks
/// registered with a [`DeviceClient`] can hold their own handle without
/// borrowing the `Engine` itself.
#[derive(Clone)]
pub struct Engine(Arc<Shared>);

/// Bounded join: wait up to `timeout` for `handle` to finish: join happens
/// on a helper thread so a hung worker doesn't block the caller past the
/// window (spec §5: "threads still running past the join are abandoned
/// with a warning").
fn join_with_timeout(handle: std::thread::JoinHandle<()>, timeout: Duration, what: &str) {
    let (tx, rx) = crossbeam::channel::bounded(1);
    std::thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    if rx.recv_timeout(timeout).is_err() {
        status_log::warn!("{what} did not stop within {timeout:?}, abandoning it");
    }
}

impl Engine {
    pub(crate) fn new(
        entries: Vec<(Arc<dyn DeviceClient>, Attribute, u64)>,
        read_timeout: Duration,
        fatal_errors: Receiver<EngineError>,
    ) -> Self {
        let mut attributes = Vec::with_capacity(entries.len());
        let mut polled_idx = Vec::new();
        let mut event_idx = Vec::new();

        for (idx, (client, attribute, source_id)) in entries.into_iter().enumerate() {
            match attribute.method {
                CollectionMethod::Poll { .. } => polled_idx.push(idx),
                CollectionMethod::Event { .. } => event_idx.push(idx),
            }
            attributes.push(Arc::new(AttributeEntry {
                attribute,
                client,
                in_flight: AtomicBool::new(false),
                read_failures: AtomicU64::new(0),
                source_id,
            }));
        }

        Self(Arc::new(Shared {
            attributes,
            polled_idx,
            event_idx,
            state: RwLock::new(EngineState::Idle),
            use_aliases: AtomicBool::new(false),
            metrics: EngineMetrics::default(),
            read_timeout,
            running: Mutex::new(None),
            fatal_errors,
        }))
    }

    pub fn status(&self) -> &'static str {
        self.0.state.read().name()
    }

    pub fn state(&self) -> EngineState {
        *self.0.state.read()
    }

    pub fn set_use_aliases(&self, use_aliases: bool) {
        self.0.use_aliases.store(use_aliases, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.0.metrics
    }

    /// Drains any engine-invariant violations reported by a `ValueStore`'s
    /// eviction path since the last call (spec §7).
    pub fn take_fatal_errors(&self) -> Vec<EngineError> {
        self.0.fatal_errors.try_iter().collect()
    }

    fn display_name(&self, entry: &AttributeEntry) -> String {
        entry.attribute.display_name(self.0.use_aliases.load(Ordering::Relaxed))
    }

    /// `IDLE --start(mode)--> COLLECTING`. Spawns the worker pool (sized to
    /// the number of polled attributes, spec §4.4) and one periodic ticker
    /// thread per polled attribute. No-op (returns `false`) unless the
    /// engine is currently `IDLE`.
    pub fn start_collect(&self, mode: CollectionMode) -> bool {
        {
            let mut state = self.0.state.write();
            if *state != EngineState::Idle {
                return false;
            }
            *state = EngineState::Collecting(mode);
        }
        status_log::info!("engine starting collection in {mode:?} mode");

        let pool_size = self.0.polled_idx.len().max(if self.0.event_idx.is_empty() { 0 } else { 1 });
        let (pool_tx, pool_rx) = crossbeam::channel::unbounded::<Job>();
        let pool_workers = (0..pool_size)
            .map(|_| {
                let pool_rx: Receiver<Job> = pool_rx.clone();
                std::thread::spawn(move || {
                    while let Ok(job) = pool_rx.recv() {
                        job();
                    }
                })
            })
            .collect();

        let shutdown = Arc::new(AtomicBool::new(false));
        let tickers = self
            .0
            .polled_idx
            .iter()
            .map(|&idx| self.spawn_ticker(idx, pool_tx.clone(), Arc::clone(&shutdown)))
            .collect();

        *self.0.running.lock() = Some(RunningCollection {
            pool_tx,
            pool_workers,
            tickers,
            shutdown,
        });

        true
    }

    fn spawn_ticker(
        &self,
        idx: usize,
        pool_tx: Sender<Job>,
        shutdown: Arc<AtomicBool>,
    ) -> std::thread::JoinHandle<()> {
        let entry = Arc::clone(&self.0.attributes[idx]);
        let shared = Arc::clone(&self.0);
        let CollectionMethod::Poll { delay_ms } = entry.attribute.method.clone() else {
            unreachable!("spawn_ticker only called for polled attributes");
        };
        std::thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(delay_ms));
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }

                if entry
                    .in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_err()
                {
                    // the previous tick for this attribute hadn't finished:
                    // drop this one rather than queueing (spec §4.4).
                    shared.metrics.overruns.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let entry = Arc::clone(&entry);
                let shared = Arc::clone(&shared);
                let _ = pool_tx.send(Box::new(move || {
                    sample_once(&shared, &entry);
                    entry.in_flight.store(false, Ordering::Release);
                }));
            }
        })
    }

    /// `COLLECTING --stop--> IDLE`. Stops the ticker threads and drains the
    /// worker pool. No-op (returns `false`) unless currently `COLLECTING`.
    pub fn stop_collect(&self) -> bool {
        {
            let mut state = self.0.state.write();
            if !matches!(*state, EngineState::Collecting(_)) {
                return false;
            }
            *state = EngineState::Idle;
        }
        status_log::info!("engine stopping collection");
        self.teardown_running();
        true
    }

    fn teardown_running(&self) {
        let Some(running) = self.0.running.lock().take() else {
            return;
        };
        running.shutdown.store(true, Ordering::Relaxed);
        for ticker in running.tickers {
            join_with_timeout(ticker, Duration::from_secs(5), "a sampling ticker");
        }
        drop(running.pool_tx);
        for worker in running.pool_workers {
            join_with_timeout(worker, Duration::from_secs(5), "a scheduler worker");
        }
    }

    /// `any --shutdown--> STOPPED` (terminal).
    pub fn shutdown(&self) {
        *self.0.state.write() = EngineState::Stopped;
        status_log::info!("engine shutting down");
        self.teardown_running();
    }

    /// `getLatestSnapshot()` (spec §4.4): lock-free, O(|attributes|).
    pub fn get_latest_snapshot(&self) -> HashMap<String, AttributeValue<DynValue>> {
        self.0
            .attributes
            .iter()
            .filter_map(|entry| entry.attribute.store.get_last().map(|v| (self.display_name(entry), v)))
            .collect()
    }

    /// `getDataRange(t0, t1)` (spec §4.4): per attribute, the in-memory
    /// window since `t0`, filtered to `read_ts <= t1`.
    pub fn get_data_range(&self, t0: Timestamp, t1: Timestamp) -> HashMap<String, Vec<AttributeValue<DynValue>>> {
        self.0
            .attributes
            .iter()
            .map(|entry| {
                let values = entry
                    .attribute
                    .store
                    .get_in_memory_since(t0)
                    .into_iter()
                    .filter(|v| v.read_ts <= t1)
                    .collect();
                (self.display_name(entry), values)
            })
            .collect()
    }

    /// `getSnapshotAt(t)` (spec §4.4): per attribute, the interpolated
    /// value at `t` per its configured [`crate::attribute::Interpolation`].
    pub fn get_snapshot_at(&self, t: Timestamp) -> HashMap<String, AttributeValue<DynValue>> {
        self.0
            .attributes
            .iter()
            .filter_map(|entry| entry.attribute.resolve_at(t).map(|v| (self.display_name(entry), v)))
            .collect()
    }

    /// `get_data_range(t0_ms, t1_ms)` (spec §6): the external control
    /// surface deals in unix-epoch milliseconds, converted once at the
    /// boundary into the finer-resolution [`Timestamp`] the engine and its
    /// stores use internally.
    pub fn get_data_range_ms(&self, t0_ms: i64, t1_ms: i64) -> HashMap<String, Vec<AttributeValue<DynValue>>> {
        self.get_data_range(Timestamp::from_millis(t0_ms), Timestamp::from_millis(t1_ms))
    }

    /// `get_snapshot_at(t_ms)` (spec §6): millisecond-denominated external
    /// counterpart to [`Engine::get_snapshot_at`].
    pub fn get_snapshot_at_ms(&self, t_ms: i64) -> HashMap<String, AttributeValue<DynValue>> {
        self.get_snapshot_at(Timestamp::from_millis(t_ms))
    }

    /// Registers an event callback for every event-driven attribute,
    /// wiring `DeviceClient::subscribe` straight through to the sampling
    /// path. Called once at build time; the callback itself gates on
    /// engine state so stop/start don't need to re-subscribe (spec §4.4:
    /// "events arriving in IDLE are dropped with a counter increment").
    pub(crate) fn wire_event_subscriptions(&self) -> Vec<(String, EngineError)> {
        let mut failures = Vec::new();
        for &idx in &self.0.event_idx {
            let entry = Arc::clone(&self.0.attributes[idx]);
            let shared = Arc::clone(&self.0);
            let attribute_name = entry.attribute.attribute_name.clone();
            let full_name = entry.attribute.full_name();

            let client = Arc::clone(&entry.client);
            let result = client.subscribe(
                &attribute_name,
                Box::new(move |_name, reading| {
                    let state_is_collecting = matches!(*shared.state.read(), EngineState::Collecting(_));
                    if !state_is_collecting {
                        shared.metrics.dropped_events_idle.fetch_add(1, Ordering::Relaxed);
                        return;
                    }

                    let running = shared.running.lock();
                    let Some(running) = running.as_ref() else {
                        shared.metrics.dropped_events_idle.fetch_add(1, Ordering::Relaxed);
                        return;
                    };
                    let entry = Arc::clone(&entry);
                    let shared_for_job = Arc::clone(&shared);
                    let _ = running.pool_tx.send(Box::new(move || {
                        let now = Timestamp::now();
                        let value = AttributeValue::new(
                            now,
                            now,
                            reading.value,
                            if reading.quality_ok { Quality::Valid } else { Quality::Invalid },
                            entry.source_id,
                        );
                        accept_value(&shared_for_job, &entry, value);
                    }));
                }),
            );
            if let Err(err) = result {
                failures.push((full_name, err));
            }
        }
        failures
    }
}

/// Performs one poll tick for `entry`: reads from its client (under a
/// timeout), builds an `AttributeValue`, and offers it to the attribute.
fn sample_once(shared: &Shared, entry: &AttributeEntry) {
    let reading = read_with_timeout(&entry.client, &entry.attribute.attribute_name, shared.read_timeout);
    match reading {
        Ok(reading) => {
            let now = Timestamp::now();
            let value = AttributeValue::new(
                now,
                now,
                reading.value,
                if reading.quality_ok { Quality::Valid } else { Quality::Invalid },
                entry.source_id,
            );
            accept_value(shared, entry, value);
        }
        Err(err) => {
            entry.read_failures.fetch_add(1, Ordering::Relaxed);
            status_log::warn!("read of '{}' failed: {err}", entry.attribute.full_name());
        }
    }
}

fn accept_value(_shared: &Shared, entry: &AttributeEntry, value: AttributeValue<DynValue>) {
    entry.attribute.add(value);
}

/// Runs `client.read` on a helper thread and bounds the wait, since
/// `DeviceClient::read` is a synchronous call this crate doesn't otherwise
/// control the internals of (spec §5: "device reads must have a configured
/// per-call timeout").
fn read_with_timeout(
    client: &Arc<dyn DeviceClient>,
    attribute_name: &str,
    timeout: Duration,
) -> crate::error::EngineResult<crate::device_client::RawReading> {
    let (tx, rx) = crossbeam::channel::bounded(1);
    let client = Arc::clone(client);
    let attribute_name = attribute_name.to_owned();
    std::thread::spawn(move || {
        let result = client.read(&attribute_name);
        let _ = tx.send(result);
    });
    rx.recv_timeout(timeout).unwrap_or_else(|_| {
        Err(EngineError::Read {
            attribute: attribute_name.clone(),
            reason: format!("no response within {timeout:?}"),
        })
    })
}
