//! Call detail records
//!
//! The [`CdrRecorder`] gives every record a process-wide monotonic id and hands it
//! to a [`CdrSink`]. The default [`LogSink`] stands in for the billing system and
//! only logs the record.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::pool::JobHandler;
use crate::stats::StatsSource;

/// Record of one resolved simulated call, rendered as `"<outcome>-<sequence>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallDetailRecord {
    /// Outcome name, e.g. `"no answer"`
    pub outcome: String,
    /// Per-outcome sequence number, starting at 1
    pub sequence: u64,
}

impl CallDetailRecord {
    pub fn new(outcome: impl Into<String>, sequence: u64) -> Self {
        Self {
            outcome: outcome.into(),
            sequence,
        }
    }
}

impl fmt::Display for CallDetailRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.outcome, self.sequence)
    }
}

/// Downstream consumer of recorded CDRs
///
/// Implementations talking to a real billing system may fail; the error is
/// returned from [`CdrRecorder::send`] so the caller can retry.
#[async_trait]
pub trait CdrSink: Send + Sync {
    async fn deliver(&self, cdr_id: u64, cdr: &CallDetailRecord) -> Result<()>;
}

/// Sink that only logs each record
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl CdrSink for LogSink {
    async fn deliver(&self, cdr_id: u64, cdr: &CallDetailRecord) -> Result<()> {
        debug!("Sending cdr id {}: {}", cdr_id, cdr);
        Ok(())
    }
}

/// Assigns ids to CDRs and forwards them to a sink
pub struct CdrRecorder {
    count: Mutex<u64>,
    sink: Arc<dyn CdrSink>,
}

impl CdrRecorder {
    /// Recorder backed by [`LogSink`]
    pub fn new() -> Self {
        Self::with_sink(Arc::new(LogSink))
    }

    pub fn with_sink(sink: Arc<dyn CdrSink>) -> Self {
        debug!("Created the call detail record recorder");
        Self {
            count: Mutex::new(0),
            sink,
        }
    }

    /// Assign the next id to `cdr` and deliver it, returning the id.
    ///
    /// The id is consumed even when delivery fails.
    pub async fn send(&self, cdr: &CallDetailRecord) -> Result<u64> {
        let cdr_id = {
            let mut count = self.count.lock();
            *count += 1;
            *count
        };
        self.sink.deliver(cdr_id, cdr).await?;
        Ok(cdr_id)
    }

    /// Number of ids handed out so far
    pub fn count(&self) -> u64 {
        *self.count.lock()
    }

    pub fn stats(&self) -> String {
        format!("cdr: {}", self.count())
    }
}

impl Default for CdrRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSource for CdrRecorder {
    fn stats(&self) -> String {
        CdrRecorder::stats(self)
    }
}

#[async_trait]
impl JobHandler<CallDetailRecord> for CdrRecorder {
    async fn handle(&self, cdr: CallDetailRecord) -> Result<()> {
        self.send(&cdr).await.map(|_| ())
    }
}
