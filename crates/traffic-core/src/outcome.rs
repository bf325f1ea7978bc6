//! Weighted call outcomes
//!
//! An [`OutcomeTable`] turns a list of integer likelihoods into a flat selection
//! list where outcome `i` appears `likelihood_i` times. Picking uniformly from that
//! list reproduces the declared percentages exactly, and each pick is O(1).

use std::ops::Range;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrafficError};

/// Sum every outcome table must add up to
pub const TOTAL_LIKELIHOOD: u32 = 100;

/// One terminal result of a simulated call attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeType {
    /// Name used in stats and CDRs, e.g. `"no answer"`
    pub name: String,
    /// Integer percentage of calls ending with this outcome
    pub likelihood: u32,
    /// Shortest simulated hold time, inclusive
    pub min_duration_ms: u64,
    /// Longest simulated hold time, exclusive
    pub max_duration_ms: u64,
}

impl OutcomeType {
    pub fn new(
        name: impl Into<String>,
        likelihood: u32,
        min_duration_ms: u64,
        max_duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            likelihood,
            min_duration_ms,
            max_duration_ms,
        }
    }

    /// The call was answered
    pub fn success() -> Self {
        Self::new("success", 40, 100 * 1000, 140 * 1000)
    }

    /// The callee never picked up
    pub fn no_answer() -> Self {
        Self::new("no answer", 30, 10 * 1000, 30 * 1000)
    }

    /// The handset was switched off
    pub fn phone_off() -> Self {
        Self::new("phone off", 15, 500, 2 * 1000)
    }

    /// The network could not deliver the call
    pub fn not_delivered() -> Self {
        Self::new("not delivered", 15, 500, 1000)
    }

    /// Default outcome set used by both call directions
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::success(),
            Self::no_answer(),
            Self::phone_off(),
            Self::not_delivered(),
        ]
    }

    fn duration_range(&self) -> Range<u64> {
        self.min_duration_ms..self.max_duration_ms
    }

    /// Draw a hold time from `[min_duration_ms, max_duration_ms)`.
    ///
    /// A degenerate range (`min == max`) always yields `min`.
    pub fn random_duration<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.min_duration_ms >= self.max_duration_ms {
            return self.min_duration_ms;
        }
        rng.gen_range(self.duration_range())
    }
}

/// Result of one draw from an [`OutcomeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    /// Index into the table's outcome list
    pub index: usize,
    /// Simulated hold time in milliseconds
    pub duration_ms: u64,
}

/// Outcome list plus its flattened selection list
#[derive(Debug, Clone)]
pub struct OutcomeTable {
    outcomes: Vec<OutcomeType>,
    selection: Vec<usize>,
}

impl OutcomeTable {
    /// Build a table, failing unless the likelihoods sum to exactly 100
    /// and every duration range is well formed.
    pub fn new(outcomes: Vec<OutcomeType>) -> Result<Self> {
        // Widened so oversized likelihoods cannot wrap back to 100.
        let sum: u64 = outcomes.iter().map(|o| u64::from(o.likelihood)).sum();
        if sum != u64::from(TOTAL_LIKELIHOOD) {
            return Err(TrafficError::config(format!(
                "The sum of all likelihoods should be {} but is {}",
                TOTAL_LIKELIHOOD, sum
            )));
        }

        if let Some(bad) = outcomes
            .iter()
            .find(|o| o.min_duration_ms > o.max_duration_ms)
        {
            return Err(TrafficError::config(format!(
                "Outcome '{}' has min duration {}ms greater than max duration {}ms",
                bad.name, bad.min_duration_ms, bad.max_duration_ms
            )));
        }

        let selection = outcomes
            .iter()
            .enumerate()
            .flat_map(|(i, o)| std::iter::repeat(i).take(o.likelihood as usize))
            .collect();

        Ok(Self { outcomes, selection })
    }

    pub fn outcomes(&self) -> &[OutcomeType] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Upper duration bound across all outcomes
    pub fn longest_duration_ms(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| o.max_duration_ms)
            .max()
            .unwrap_or(0)
    }

    pub fn get(&self, index: usize) -> Option<&OutcomeType> {
        self.outcomes.get(index)
    }

    /// Pick an outcome and a hold time for it
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Pick {
        // Non-empty: the likelihoods sum to 100.
        let index = self.selection[rng.gen_range(0..self.selection.len())];
        let duration_ms = self.outcomes[index].random_duration(rng);
        Pick { index, duration_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table(likelihoods: &[u32]) -> Result<OutcomeTable> {
        OutcomeTable::new(
            likelihoods
                .iter()
                .enumerate()
                .map(|(i, l)| OutcomeType::new(format!("o{}", i), *l, 10, 20))
                .collect(),
        )
    }

    #[test]
    fn test_likelihoods_must_sum_to_100() {
        assert!(table(&[40, 30, 15, 15]).is_ok());
        assert!(table(&[100]).is_ok());

        let err = table(&[40, 30, 15, 14]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("99"));

        let err = table(&[40, 30, 15, 16]).unwrap_err();
        assert!(err.to_string().contains("101"));

        assert!(table(&[]).is_err());
    }

    #[test]
    fn test_oversized_likelihoods_rejected() {
        let err = table(&[u32::MAX, 101]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("4294967396"));

        assert!(table(&[u32::MAX]).is_err());
    }

    #[test]
    fn test_longest_duration() {
        let table = OutcomeTable::new(OutcomeType::defaults()).unwrap();
        assert_eq!(table.longest_duration_ms(), 140_000);
    }

    #[test]
    fn test_inverted_duration_range_rejected() {
        let err = OutcomeTable::new(vec![OutcomeType::new("broken", 100, 20, 10)]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_selection_list_replicates_likelihoods() {
        let table = OutcomeTable::new(OutcomeType::defaults()).unwrap();
        assert_eq!(table.selection.len(), 100);
        assert_eq!(table.selection.iter().filter(|&&i| i == 0).count(), 40);
        assert_eq!(table.selection.iter().filter(|&&i| i == 1).count(), 30);
        assert_eq!(table.selection.iter().filter(|&&i| i == 3).count(), 15);
    }

    #[test]
    fn test_zero_likelihood_outcome_never_picked() {
        let table = OutcomeTable::new(vec![
            OutcomeType::new("never", 0, 1, 2),
            OutcomeType::new("always", 100, 1, 2),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert_eq!(table.pick(&mut rng).index, 1);
        }
    }

    #[test]
    fn test_durations_stay_in_range() {
        let table = OutcomeTable::new(OutcomeType::defaults()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10_000 {
            let pick = table.pick(&mut rng);
            let outcome = table.get(pick.index).unwrap();
            assert!(pick.duration_ms >= outcome.min_duration_ms);
            assert!(pick.duration_ms < outcome.max_duration_ms);
        }
    }

    #[test]
    fn test_degenerate_duration_range() {
        let outcome = OutcomeType::new("fixed", 100, 250, 250);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(outcome.random_duration(&mut rng), 250);
    }

    #[test]
    fn test_seeded_picks_are_reproducible() {
        let table = OutcomeTable::new(OutcomeType::defaults()).unwrap();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let first: Vec<Pick> = (0..500).map(|_| table.pick(&mut a)).collect();
        let second: Vec<Pick> = (0..500).map(|_| table.pick(&mut b)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_observed_frequencies_match_likelihoods() {
        let table = OutcomeTable::new(OutcomeType::defaults()).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let draws = 100_000;
        let mut counts = vec![0u64; table.len()];
        for _ in 0..draws {
            counts[table.pick(&mut rng).index] += 1;
        }

        for (outcome, count) in table.outcomes().iter().zip(&counts) {
            let observed = 100.0 * *count as f64 / draws as f64;
            let declared = outcome.likelihood as f64;
            assert!(
                (observed - declared).abs() <= 2.0,
                "{} observed {:.2}% but declared {}%",
                outcome.name,
                observed,
                declared
            );
        }
    }
}
