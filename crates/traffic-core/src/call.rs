//! Simulated calls
//!
//! A [`CallSimulator`] resolves one call per invocation: it draws an outcome and a
//! hold time from its [`OutcomeTable`], bumps the per-outcome counter, holds the
//! worker for the time-scaled duration and pushes the resulting
//! [`CallDetailRecord`] onto the CDR queue.
//!
//! The hold is an `await` on a tokio timer inside the pool worker, so a pool of
//! `n` workers never has more than `n` calls in progress. When calls arrive faster
//! than `n / average hold time` they back up in the pool's queue.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cdr::CallDetailRecord;
use crate::error::{Result, TrafficError};
use crate::outcome::{OutcomeTable, OutcomeType};
use crate::pool::{JobHandler, JobSender};
use crate::stats::StatsSource;

/// Number dialed by an outbound call
pub const PHONE_NUMBER: &str = "phone-number";
/// VoiceXML document the outbound call would run
pub const VXML_URL: &str = "vxml-url";
/// Where the outbound call's CDR would be posted
pub const CDR_URL: &str = "cdr-url";

/// Keys an outbound request must carry
pub const OUTBOUND_KEYS: [&str; 3] = [PHONE_NUMBER, VXML_URL, CDR_URL];

/// Opaque call request payload
///
/// The simulator passes it through untouched; only the front end looks inside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallRequest {
    params: HashMap<String, String>,
}

impl CallRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: HashMap<String, String>) -> Self {
        Self { params }
    }

    pub fn outbound(
        phone_number: impl Into<String>,
        vxml_url: impl Into<String>,
        cdr_url: impl Into<String>,
    ) -> Self {
        Self::new()
            .with(PHONE_NUMBER, phone_number)
            .with(VXML_URL, vxml_url)
            .with(CDR_URL, cdr_url)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Outbound keys that are absent or empty, in declaration order
    pub fn missing_outbound_keys(&self) -> Vec<&'static str> {
        OUTBOUND_KEYS
            .iter()
            .copied()
            .filter(|key| self.get(key).map_or(true, str::is_empty))
            .collect()
    }
}

/// Wall-clock time for `duration_ms` of simulated time, or `None` when it
/// does not fit a [`Duration`]
pub fn scaled_hold(duration_ms: u64, time_multiplier: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(duration_ms as f64 / 1000.0 / time_multiplier).ok()
}

/// Resolves simulated calls for one direction
pub struct CallSimulator {
    direction: String,
    time_multiplier: f64,
    table: OutcomeTable,
    counts: Mutex<Vec<u64>>,
    rng: Mutex<StdRng>,
    cdr_queue: JobSender<CallDetailRecord>,
}

impl CallSimulator {
    /// Build a simulator whose outcome likelihoods must sum to 100.
    ///
    /// `time_multiplier` divides every simulated hold time.
    pub fn new(
        direction: impl Into<String>,
        time_multiplier: f64,
        outcomes: Vec<OutcomeType>,
        cdr_queue: JobSender<CallDetailRecord>,
    ) -> Result<Self> {
        let direction = direction.into();
        if !(time_multiplier.is_finite() && time_multiplier > 0.0) {
            return Err(TrafficError::config(format!(
                "Time multiplier for '{}' calls must be positive, got {}",
                direction, time_multiplier
            )));
        }

        let table = OutcomeTable::new(outcomes)?;
        let longest = table.longest_duration_ms();
        if scaled_hold(longest, time_multiplier).is_none() {
            return Err(TrafficError::config(format!(
                "Time multiplier {} stretches the longest '{}' call ({}ms) past the timer range",
                time_multiplier, direction, longest
            )));
        }
        let counts = Mutex::new(vec![0; table.len()]);

        debug!("Created '{}' call simulator", direction);

        Ok(Self {
            direction,
            time_multiplier,
            table,
            counts,
            rng: Mutex::new(StdRng::from_entropy()),
            cdr_queue,
        })
    }

    /// Make outcome and hold time draws reproducible
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn direction(&self) -> &str {
        &self.direction
    }

    pub fn outcomes(&self) -> &[OutcomeType] {
        self.table.outcomes()
    }

    /// Wall-clock hold for a simulated duration
    pub fn hold_time(&self, duration_ms: u64) -> Result<Duration> {
        scaled_hold(duration_ms, self.time_multiplier).ok_or_else(|| {
            TrafficError::Handler(format!(
                "{}ms scaled by {} does not fit a timer",
                duration_ms, self.time_multiplier
            ))
        })
    }

    /// Resolve one call and queue its CDR.
    ///
    /// The counter update and the CDR enqueue are separate steps: if the enqueue
    /// fails the call stays counted and the error is returned.
    pub async fn call(&self, request: &CallRequest) -> Result<CallDetailRecord> {
        let pick = {
            let mut rng = self.rng.lock();
            self.table.pick(&mut *rng)
        };
        // Resolved before counting so a bad hold never leaves a sequence gap.
        let hold = self.hold_time(pick.duration_ms)?;

        let sequence = {
            let mut counts = self.counts.lock();
            counts[pick.index] += 1;
            counts[pick.index]
        };

        tokio::time::sleep(hold).await;

        let outcome = &self.table.outcomes()[pick.index];
        let cdr = CallDetailRecord::new(outcome.name.clone(), sequence);
        debug!(
            "The '{}' call simulator made the following call: {} (request {:?})",
            self.direction,
            cdr,
            request.params()
        );
        self.cdr_queue.put(cdr.clone())?;
        Ok(cdr)
    }

    /// Point-in-time copy of the per-outcome counters
    pub fn counts(&self) -> Vec<u64> {
        self.counts.lock().clone()
    }

    pub fn total(&self) -> u64 {
        self.counts.lock().iter().sum()
    }

    /// `"<direction>-call: <total>"` followed by each outcome's share once any
    /// call was made. Counters are copied under the lock first, so the total and
    /// the percentages always agree.
    pub fn stats(&self) -> String {
        let counts = self.counts();
        let total: u64 = counts.iter().sum();

        let mut message = format!("{}-call: {}", self.direction, total);
        if total > 0 {
            for (outcome, count) in self.table.outcomes().iter().zip(&counts) {
                message.push_str(&format!(
                    ", {}({:.2}%)",
                    outcome.name,
                    100.0 * *count as f64 / total as f64
                ));
            }
        }
        message
    }
}

impl StatsSource for CallSimulator {
    fn stats(&self) -> String {
        CallSimulator::stats(self)
    }
}

#[async_trait]
impl JobHandler<CallRequest> for CallSimulator {
    async fn handle(&self, request: CallRequest) -> Result<()> {
        self.call(&request).await.map(|_| ())
    }
}
