//! Tunables for a recognition run.

use attend_core::DEFAULT_TOLERANCE;
use attend_video::DEFAULT_FRAME_INTERVAL;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

const MAX_DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum Euclidean distance for a positive match (inclusive).
    pub tolerance: f64,
    /// Default sampling interval for callers that do not pick one per run.
    pub frame_interval: usize,
    /// Extraction workers, each with its own extractor.
    pub workers: usize,
    /// Bounded work queue length; `None` means twice the worker count.
    pub queue_capacity: Option<usize>,
    /// Stop sampling after this many frames.
    pub max_sampled_frames: Option<usize>,
    /// Stop sampling once this much wall-clock time has passed.
    pub time_budget_secs: Option<f64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            frame_interval: DEFAULT_FRAME_INTERVAL.get(),
            workers: default_workers(),
            queue_capacity: None,
            max_sampled_frames: None,
            time_budget_secs: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

impl EngineOptions {
    /// `frame_interval` as a sampler interval; `None` when it is zero.
    pub fn frame_interval(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.frame_interval)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers * 2).max(1)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Reject values that would make a run meaningless or panic.
    pub fn validate(&self) -> Result<(), String> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            ));
        }
        if self.frame_interval == 0 {
            return Err("frame_interval must be at least 1".into());
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".into());
        }
        if self.queue_capacity == Some(0) {
            return Err("queue_capacity must be at least 1".into());
        }
        if let Some(secs) = self.time_budget_secs {
            if !secs.is_finite() || secs < 0.0 {
                return Err(format!(
                    "time_budget_secs must be a non-negative number, got {secs}"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = EngineOptions::default();
        assert_eq!(opts.tolerance, 0.5);
        assert_eq!(opts.frame_interval(), Some(DEFAULT_FRAME_INTERVAL));
        assert!((1..=4).contains(&opts.workers));
        assert_eq!(opts.queue_capacity(), opts.workers * 2);
        assert!(opts.max_sampled_frames.is_none());
        assert!(opts.time_budget().is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let opts: EngineOptions =
            toml::from_str("frame_interval = 15\ntime_budget_secs = 2.5").unwrap();
        assert_eq!(opts.frame_interval, 15);
        assert_eq!(opts.tolerance, 0.5);
        assert_eq!(opts.time_budget(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_validation() {
        let bad = [
            EngineOptions { tolerance: -0.1, ..Default::default() },
            EngineOptions { tolerance: f64::NAN, ..Default::default() },
            EngineOptions { frame_interval: 0, ..Default::default() },
            EngineOptions { workers: 0, ..Default::default() },
            EngineOptions { queue_capacity: Some(0), ..Default::default() },
            EngineOptions { time_budget_secs: Some(f64::INFINITY), ..Default::default() },
        ];
        for opts in bad {
            assert!(opts.validate().is_err(), "{opts:?} should be rejected");
        }
        assert!(EngineOptions { tolerance: 0.0, ..Default::default() }.validate().is_ok());
    }
}
