//! Silence intervals and the per-track analysis result built from them.

/// A contiguous span of near-zero amplitude, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
}

impl SilenceInterval {
    #[inline]
    pub fn new(start: f64, end: f64) -> Self {
        SilenceInterval { start, end }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Output of a single detection run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub intervals: Vec<SilenceInterval>,
    pub duration: f64,
}

/// Silences found at the two sensitivities.
///
/// Both sets are ordered by start time and non-overlapping, as delivered by
/// the detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SilenceProfile {
    /// Silences longer than the minimum silence, tight noise floor.
    pub short: Vec<SilenceInterval>,
    /// Silences longer than the maximum normal silence, coarse noise floor.
    pub long: Vec<SilenceInterval>,
}

/// Everything the classifier and planner know about a track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub profile: SilenceProfile,
    /// Taken from the short-profile run.
    pub duration: f64,
}

impl Analysis {
    pub fn new(short: Detection, long: Detection) -> Self {
        Analysis {
            duration: short.duration,
            profile: SilenceProfile {
                short: short.intervals,
                long: long.intervals,
            },
        }
    }

    /// Zero duration means detection failed and nothing can be trusted.
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.duration <= 0.0
    }
}
