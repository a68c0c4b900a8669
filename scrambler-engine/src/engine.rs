use std::{fmt, sync::Arc, time::Instant};

use bytes::Bytes;
use tokio::{
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    decision::Decider,
    driver::{BandwidthDriver, DeliveryDriver},
    scheduler::Scheduler,
    Action, ConfigError, ConfigStore, EngineHandle, EngineOptions, ImpairmentConfig, IngestError,
    Metrics, MetricsSnapshot, Outbound, SharedRng, Verdict,
};
use scrambler_common::{Clock, SystemClock};
use scrambler_wire::DeltaEvent;

/// The impairment engine. Cheap to clone; all clones share the same state.
///
/// ```no_run
/// # use bytes::Bytes;
/// # use scrambler_engine::{Engine, EngineOptions, ImpairmentConfig, Outbound, OutboundError};
/// struct Stdout;
///
/// impl Outbound for Stdout {
///     fn send(&self, key: &str, payload: Bytes) -> Result<(), OutboundError> {
///         println!("{key}: {payload:?}");
///         Ok(())
///     }
/// }
///
/// # async fn run() {
/// let engine = Engine::with_options(Stdout, EngineOptions::default().seed(42));
/// engine.set_config(ImpairmentConfig { fixed_latency_ms: 200, ..Default::default() }).unwrap();
///
/// let handle = engine.start();
/// let raw = br#"{"id":"veh-1","deltaLat":0.0,"deltaLong":0.0,"timestamp":0,"newEntity":true}"#;
/// engine.ingest(Bytes::from_static(raw)).unwrap();
///
/// handle.shutdown().await;
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    state: Arc<EngineState>,
}

struct EngineState {
    options: EngineOptions,
    config: ConfigStore,
    metrics: Metrics,
    decider: Decider,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.state.options)
            .field("config", &self.state.config)
            .field("metrics", &self.state.metrics)
            .field("scheduler", &self.state.scheduler)
            .field("clock", &self.state.clock)
            .finish()
    }
}

impl Engine {
    /// Creates an engine with the default [`EngineOptions`].
    pub fn new<O: Outbound>(outbound: O) -> Self {
        Self::with_options(outbound, EngineOptions::default())
    }

    /// Creates an engine with the given options, driven by the system clock.
    pub fn with_options<O: Outbound>(outbound: O, options: EngineOptions) -> Self {
        Self::with_clock(outbound, options, SystemClock)
    }

    /// Creates an engine that reads time from `clock`.
    pub fn with_clock<O: Outbound, C: Clock>(
        outbound: O,
        options: EngineOptions,
        clock: C,
    ) -> Self {
        let rng = Arc::new(SharedRng::from_seed(options.seed));

        let initial = match options.initial_config.validate() {
            Ok(()) => options.initial_config.clone(),
            Err(e) => {
                warn!(err = %e, "Invalid initial impairment config, using defaults");
                ImpairmentConfig::default()
            }
        };

        let state = EngineState {
            config: ConfigStore::new(initial),
            metrics: Metrics::new(options.latency_samples),
            decider: Decider::new(Arc::clone(&rng)),
            scheduler: Scheduler::new(Arc::new(outbound), rng, options.throttle_retry),
            clock: Arc::new(clock),
            options,
        };

        Self { state: Arc::new(state) }
    }

    /// Decodes and processes one inbound payload.
    ///
    /// Malformed payloads are rejected before classification and never touch the counters.
    pub fn ingest(&self, payload: Bytes) -> Result<Verdict, IngestError> {
        let event = DeltaEvent::from_json(&payload)?;
        Ok(self.process(event, payload))
    }

    /// Classifies and routes an already decoded event. `payload` is its serialized form, which
    /// is forwarded unchanged unless the event gets corrupted.
    pub fn process(&self, event: DeltaEvent, payload: Bytes) -> Verdict {
        let config = self.state.config.get();
        let now = self.state.clock.now();

        let action = self.state.decider.decide(&config, &self.state.metrics, event, payload, now);
        let verdict = action.verdict();
        self.route(action, &config, now);

        verdict
    }

    /// Classifies an event against the current config without routing it. Counters are still
    /// updated.
    pub fn decide(&self, event: DeltaEvent, payload: Bytes) -> Action {
        let config = self.state.config.get();
        let now = self.state.clock.now();
        self.state.decider.decide(&config, &self.state.metrics, event, payload, now)
    }

    /// Routes a decided action: immediate messages are sent, delayed ones enter the delay
    /// queue and reordered ones the reorder buffer.
    pub fn dispatch(&self, action: Action) {
        let config = self.state.config.get();
        self.route(action, &config, self.state.clock.now());
    }

    fn route(&self, action: Action, config: &ImpairmentConfig, now: Instant) {
        let scheduler = &self.state.scheduler;
        match action {
            Action::Drop => {}
            Action::Immediate(msg) => scheduler.try_send(msg, config, &self.state.metrics, now),
            Action::Delay(msg) => scheduler.admit(msg, config, &self.state.metrics),
            Action::Reorder(msg) => scheduler.buffer_reorder(msg),
        }
    }

    /// Runs one delivery pass. Normally called by the delivery driver every tick interval.
    /// Returns `false` if a pass was already in progress.
    pub fn tick(&self) -> bool {
        let config = self.state.config.get();
        let now = self.state.clock.now();
        self.state.scheduler.tick(&config, &self.state.metrics, now)
    }

    /// Starts a new bandwidth window. Normally called by the bandwidth driver once per window.
    pub fn reset_bandwidth_window(&self) {
        self.state.scheduler.reset_window();
    }

    /// Returns the current config snapshot.
    pub fn config(&self) -> Arc<ImpairmentConfig> {
        self.state.config.get()
    }

    /// Replaces the config wholesale and returns the applied snapshot. Decisions already in
    /// flight finish under the snapshot they loaded.
    pub fn set_config(
        &self,
        config: ImpairmentConfig,
    ) -> Result<Arc<ImpairmentConfig>, ConfigError> {
        self.state.config.set(config)
    }

    /// Restores the default config.
    pub fn reset_config(&self) -> Arc<ImpairmentConfig> {
        self.state.config.reset()
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        let scheduler = &self.state.scheduler;
        self.state.metrics.snapshot(scheduler.queue.len(), scheduler.limiter.current())
    }

    /// Number of messages waiting in the delay queue.
    pub fn queue_depth(&self) -> usize {
        self.state.scheduler.queue.len()
    }

    /// Number of messages waiting in the reorder buffer.
    pub fn reorder_pending(&self) -> usize {
        self.state.scheduler.reorder.len()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.state.options
    }

    /// Spawns the delivery and bandwidth drivers on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) -> EngineHandle {
        let options = &self.state.options;
        let mut tasks = JoinSet::new();

        let mut delivery = time::interval_at(
            time::Instant::now() + options.tick_interval,
            options.tick_interval,
        );
        delivery.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tasks.spawn(DeliveryDriver::new(self.clone(), delivery));

        let mut window = time::interval_at(
            time::Instant::now() + options.bandwidth_window,
            options.bandwidth_window,
        );
        window.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tasks.spawn(BandwidthDriver::new(self.clone(), window));

        info!(
            tick = ?options.tick_interval,
            window = ?options.bandwidth_window,
            "Impairment engine started"
        );

        EngineHandle::new(self.clone(), tasks)
    }

    /// Discards everything still pending in both queues.
    pub(crate) fn discard_pending(&self) -> usize {
        let discarded = self.state.scheduler.discard_pending();
        debug!(discarded, "Discarded pending messages");
        discarded
    }
}
