//! Time-debounced collection of calibration observations.

use chesscal_core::Observation;
use log::info;

/// Why an offered observation was not kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Too little time elapsed since the last accepted observation.
    Debounced,
    /// The target count is already reached.
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Rejected(RejectReason),
}

/// Holds at most `target_count` observations, each accepted strictly more
/// than `min_interval` seconds after the previous one.
#[derive(Clone, Debug)]
pub struct DebouncedAccumulator {
    observations: Vec<Observation>,
    last_accepted: Option<f64>,
    target_count: usize,
    min_interval: f64,
}

impl DebouncedAccumulator {
    pub fn new(target_count: usize, min_interval: f64) -> Self {
        Self {
            observations: Vec::with_capacity(target_count),
            last_accepted: None,
            target_count,
            min_interval,
        }
    }

    /// Offer an observation captured at `now` (seconds).
    ///
    /// The first observation is never debounced.
    pub fn offer(&mut self, observation: Observation, now: f64) -> Offer {
        if self.is_full() {
            return Offer::Rejected(RejectReason::Full);
        }
        if let Some(last) = self.last_accepted {
            if now - last <= self.min_interval {
                return Offer::Rejected(RejectReason::Debounced);
            }
        }
        self.observations.push(observation);
        self.last_accepted = Some(now);
        info!(
            "collected {} of {} chessboard observations",
            self.observations.len(),
            self.target_count
        );
        Offer::Accepted
    }

    pub fn is_full(&self) -> bool {
        self.observations.len() >= self.target_count
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    pub fn last_accepted(&self) -> Option<f64> {
        self.last_accepted
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Drop everything collected so far.
    pub fn clear(&mut self) {
        self.observations.clear();
        self.last_accepted = None;
    }
}
