//! # rvoip-traffic-core
//!
//! Synthetic telephony traffic for stress-testing call handling integrations
//! without placing real calls.
//!
//! Calls are pushed onto an incoming or outgoing [`WorkerPool`]. Each worker hands
//! the request to a [`CallSimulator`], which picks a weighted outcome
//! (answered, no answer, phone off, not delivered), holds the worker for a
//! time-scaled call duration and queues a [`CallDetailRecord`] on the CDR pool,
//! whose workers pass it to the [`CdrRecorder`]. Every component logs its stats
//! line through a [`StatsReporter`] whenever it changes.
//!
//! ```rust,no_run
//! use rvoip_traffic_core::{CallRequest, TrafficConfig, TrafficEngine};
//!
//! # async fn example() -> rvoip_traffic_core::Result<()> {
//! let engine = TrafficEngine::start(TrafficConfig::default())?;
//! engine.enqueue_inbound(CallRequest::new())?;
//! engine.enqueue_outbound(CallRequest::outbound(
//!     "+15550100",
//!     "http://ivr.local/app.vxml",
//!     "http://ivr.local/cdr",
//! ))?;
//! println!("{:?}", engine.stats());
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod cdr;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod outcome;
pub mod pool;
pub mod stats;

pub use call::{CallRequest, CallSimulator};
pub use cdr::{CallDetailRecord, CdrRecorder, CdrSink, LogSink};
pub use config::{CdrConfig, DirectionConfig, TrafficConfig};
pub use engine::{EngineStats, TrafficEngine};
pub use error::{Result, TrafficError};
pub use outcome::{OutcomeTable, OutcomeType, Pick};
pub use pool::{JobHandler, JobSender, WorkerPool};
pub use stats::{StatsReporter, StatsSource};
