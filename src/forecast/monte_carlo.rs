//! Bootstrap-resampling throughput simulation.
//!
//! No distributional assumptions: each trial draws daily throughputs
//! uniformly, with replacement, from the observed sample set. One observed
//! day is enough to produce a (crude) signal; zero samples produce a
//! flagged zero-confidence result instead of an error.

use rand::Rng;

/// Trials per simulation.
pub const DEFAULT_RUNS: u32 = 1000;

/// Trial cap for completion forecasts, so a scope that the observed
/// throughput can never finish still terminates.
pub const MAX_TRIAL_DAYS: u32 = 730;

/// Outcome of a sprint-confidence simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SprintConfidence {
    /// Percentage of trials that finished the remaining scope in time.
    pub confidence_pct: f64,
    /// Set when there was no historical throughput to sample from; callers
    /// should suppress display rather than show a misleading zero.
    pub has_insufficient_data: bool,
    pub sample_count: usize,
    pub run_count: u32,
}

/// Estimates the probability of completing `remaining_scope` tickets within
/// `working_days`, given observed daily completed-ticket counts.
///
/// Each of `runs` trials sums `working_days` independent draws and counts
/// success when the sum reaches the scope.
pub fn sprint_confidence(
    samples: &[f64],
    remaining_scope: f64,
    working_days: u32,
    runs: u32,
    rng: &mut impl Rng,
) -> SprintConfidence {
    if samples.is_empty() {
        return SprintConfidence {
            confidence_pct: 0.0,
            has_insufficient_data: true,
            sample_count: 0,
            run_count: 0,
        };
    }

    let mut successes = 0u32;
    for _ in 0..runs {
        let mut total = 0.0;
        for _ in 0..working_days {
            total += samples[rng.gen_range(0..samples.len())];
            if total >= remaining_scope {
                break;
            }
        }
        if total >= remaining_scope {
            successes += 1;
        }
    }

    SprintConfidence {
        confidence_pct: f64::from(successes) / f64::from(runs) * 100.0,
        has_insufficient_data: false,
        sample_count: samples.len(),
        run_count: runs,
    }
}

/// Simulates working days needed to finish `remaining_scope`, one entry per
/// trial, each capped at [`MAX_TRIAL_DAYS`].
///
/// Empty when there are no samples.
pub fn completion_trials(
    samples: &[f64],
    remaining_scope: f64,
    runs: u32,
    rng: &mut impl Rng,
) -> Vec<u32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut trials = Vec::with_capacity(runs as usize);
    for _ in 0..runs {
        let mut total = 0.0;
        let mut days = 0u32;
        while total < remaining_scope && days < MAX_TRIAL_DAYS {
            total += samples[rng.gen_range(0..samples.len())];
            days += 1;
        }
        trials.push(days);
    }
    trials
}
