//! Engine assembly
//!
//! [`TrafficEngine`] builds the whole pipeline from a [`TrafficConfig`]:
//!
//! ```text
//!  enqueue_inbound ──► incoming queue ──► incoming CallSimulator ─┐
//!                                                                 ├─► cdr queue ──► CdrRecorder ──► CdrSink
//!  enqueue_outbound ─► outgoing queue ──► outgoing CallSimulator ─┘
//! ```
//!
//! Every component gets its own [`StatsReporter`]; all reporters share one
//! cancellation token that [`TrafficEngine::shutdown`] fires.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::call::{CallRequest, CallSimulator};
use crate::cdr::{CallDetailRecord, CdrRecorder, CdrSink, LogSink};
use crate::config::{DirectionConfig, TrafficConfig};
use crate::error::Result;
use crate::pool::{JobSender, WorkerPool};
use crate::stats::StatsReporter;

/// Snapshot of every component's stats line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    #[serde(rename = "cdrs")]
    pub cdrs: String,
    #[serde(rename = "cdr queue")]
    pub cdr_queue: String,
    #[serde(rename = "incoming queue")]
    pub incoming_queue: String,
    #[serde(rename = "outgoing queue")]
    pub outgoing_queue: String,
    #[serde(rename = "incoming calls")]
    pub incoming_calls: String,
    #[serde(rename = "outgoing calls")]
    pub outgoing_calls: String,
}

/// The running simulation: two call stages feeding one CDR stage
pub struct TrafficEngine {
    config: TrafficConfig,
    cdr_recorder: Arc<CdrRecorder>,
    cdr_queue: Arc<WorkerPool<CallDetailRecord>>,
    incoming_calls: Arc<CallSimulator>,
    incoming_queue: Arc<WorkerPool<CallRequest>>,
    outgoing_calls: Arc<CallSimulator>,
    outgoing_queue: Arc<WorkerPool<CallRequest>>,
    reporters: parking_lot::Mutex<Vec<StatsReporter>>,
    cancel: CancellationToken,
}

impl TrafficEngine {
    /// Validate `config` and start every stage with the logging CDR sink.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: TrafficConfig) -> Result<Self> {
        Self::start_with_sink(config, Arc::new(LogSink))
    }

    pub fn start_with_sink(config: TrafficConfig, sink: Arc<dyn CdrSink>) -> Result<Self> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let interval = config.stats_interval();
        let mut reporters = Vec::with_capacity(6);

        let cdr_recorder = Arc::new(CdrRecorder::with_sink(sink));
        reporters.push(StatsReporter::spawn("cdrs", cdr_recorder.clone(), interval, cancel.clone()));

        let cdr_queue: Arc<WorkerPool<CallDetailRecord>> = Arc::new(WorkerPool::new(
            config.cdr.name.clone(),
            config.cdr.workers,
            cdr_recorder.clone(),
        )?);
        reporters.push(StatsReporter::spawn("cdr queue", cdr_queue.clone(), interval, cancel.clone()));

        let (incoming_calls, incoming_queue) = Self::start_direction(
            &config,
            &config.incoming,
            config.seed,
            cdr_queue.sender(),
        )?;
        reporters.push(StatsReporter::spawn("incoming calls", incoming_calls.clone(), interval, cancel.clone()));
        reporters.push(StatsReporter::spawn("incoming queue", incoming_queue.clone(), interval, cancel.clone()));

        let (outgoing_calls, outgoing_queue) = Self::start_direction(
            &config,
            &config.outgoing,
            config.seed.map(|seed| seed.wrapping_add(1)),
            cdr_queue.sender(),
        )?;
        reporters.push(StatsReporter::spawn("outgoing calls", outgoing_calls.clone(), interval, cancel.clone()));
        reporters.push(StatsReporter::spawn("outgoing queue", outgoing_queue.clone(), interval, cancel.clone()));

        info!(
            "Traffic engine started: {} {} workers, {} {} workers, {} {} workers, time multiplier {}",
            config.incoming.workers,
            config.incoming.name,
            config.outgoing.workers,
            config.outgoing.name,
            config.cdr.workers,
            config.cdr.name,
            config.time_multiplier
        );

        Ok(Self {
            config,
            cdr_recorder,
            cdr_queue,
            incoming_calls,
            incoming_queue,
            outgoing_calls,
            outgoing_queue,
            reporters: parking_lot::Mutex::new(reporters),
            cancel,
        })
    }

    fn start_direction(
        config: &TrafficConfig,
        direction: &DirectionConfig,
        seed: Option<u64>,
        cdr_queue: JobSender<CallDetailRecord>,
    ) -> Result<(Arc<CallSimulator>, Arc<WorkerPool<CallRequest>>)> {
        let mut simulator = CallSimulator::new(
            direction.name.clone(),
            config.time_multiplier,
            direction.outcomes.clone(),
            cdr_queue,
        )?;
        if let Some(seed) = seed {
            simulator = simulator.with_seed(seed);
        }
        let simulator = Arc::new(simulator);

        let queue: Arc<WorkerPool<CallRequest>> = Arc::new(WorkerPool::new(
            direction.name.clone(),
            direction.workers,
            simulator.clone(),
        )?);
        Ok((simulator, queue))
    }

    /// Queue an inbound call; returns without waiting for a worker
    pub fn enqueue_inbound(&self, request: CallRequest) -> Result<()> {
        self.incoming_queue.put(request)
    }

    /// Queue an outbound call; returns without waiting for a worker
    pub fn enqueue_outbound(&self, request: CallRequest) -> Result<()> {
        self.outgoing_queue.put(request)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cdrs: self.cdr_recorder.stats(),
            cdr_queue: self.cdr_queue.stats(),
            incoming_queue: self.incoming_queue.stats(),
            outgoing_queue: self.outgoing_queue.stats(),
            incoming_calls: self.incoming_calls.stats(),
            outgoing_calls: self.outgoing_calls.stats(),
        }
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    pub fn cdr_recorder(&self) -> &Arc<CdrRecorder> {
        &self.cdr_recorder
    }

    pub fn cdr_queue(&self) -> &Arc<WorkerPool<CallDetailRecord>> {
        &self.cdr_queue
    }

    pub fn incoming_calls(&self) -> &Arc<CallSimulator> {
        &self.incoming_calls
    }

    pub fn incoming_queue(&self) -> &Arc<WorkerPool<CallRequest>> {
        &self.incoming_queue
    }

    pub fn outgoing_calls(&self) -> &Arc<CallSimulator> {
        &self.outgoing_calls
    }

    pub fn outgoing_queue(&self) -> &Arc<WorkerPool<CallRequest>> {
        &self.outgoing_queue
    }

    /// Snapshots logged so far, per reporter name
    pub fn stats_emissions(&self) -> Vec<(String, u64)> {
        self.reporters
            .lock()
            .iter()
            .map(|r| (r.name().to_string(), r.emitted()))
            .collect()
    }

    /// Stop reporters, then the call stages, then the CDR stage.
    ///
    /// Both call stages stop taking jobs at once; calls in progress finish and
    /// queue their CDRs before the CDR stage stops. Anything still queued is
    /// dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let reporters: Vec<_> = std::mem::take(&mut *self.reporters.lock());
        for reporter in reporters {
            reporter.join().await;
        }

        self.incoming_queue.close();
        self.outgoing_queue.close();
        self.incoming_queue.shutdown().await;
        self.outgoing_queue.shutdown().await;
        self.cdr_queue.shutdown().await;

        info!("Traffic engine stopped: {}", self.cdr_recorder.stats());
    }
}
