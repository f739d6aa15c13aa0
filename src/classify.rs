//! Boundary defect classification.
//!
//! Every predicate is a pure function of a track's [`Analysis`] and the
//! [`Tolerances`] in force. A degraded analysis (no intervals, zero duration)
//! always reads as truncated on both ends.

use crate::Tolerances;
use crate::silence::Analysis;
use strum_macros::Display;

pub fn truncated_at_start(analysis: &Analysis, tolerances: &Tolerances) -> bool {
    match analysis.profile.short.first() {
        None => true,
        Some(first) => first.start >= tolerances.max_overlapping,
    }
}

pub fn truncated_at_end(analysis: &Analysis, tolerances: &Tolerances) -> bool {
    match analysis.profile.short.last() {
        None => true,
        Some(last) => analysis.duration - last.end >= tolerances.max_overlapping,
    }
}

/// Audio before the first silence, but not so much that content is missing.
/// Gaps within `tolerance` of the boundary count as touching it.
pub fn overlaps_at_start(analysis: &Analysis, tolerances: &Tolerances) -> bool {
    analysis.profile.short.first().is_some_and(|first| {
        tolerances.tolerance < first.start && first.start < tolerances.max_overlapping
    })
}

pub fn overlaps_at_end(analysis: &Analysis, tolerances: &Tolerances) -> bool {
    analysis.profile.short.last().is_some_and(|last| {
        let tail = analysis.duration - last.end;
        tolerances.tolerance < tail && tail < tolerances.max_overlapping
    })
}

pub fn huge_silence_at_start(analysis: &Analysis, tolerances: &Tolerances) -> bool {
    analysis
        .profile
        .long
        .first()
        .is_some_and(|first| first.start < tolerances.max_overlapping)
}

pub fn huge_silence_at_end(analysis: &Analysis, tolerances: &Tolerances) -> bool {
    analysis
        .profile
        .long
        .last()
        .is_some_and(|last| analysis.duration - last.end < tolerances.max_overlapping)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Boundary {
    #[strum(serialize = "start")]
    Start,
    #[strum(serialize = "end")]
    End,
}

/// What is wrong with one end of a track. Truncation hides anything else
/// found at the same end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BoundaryDefect {
    #[strum(serialize = "ok")]
    Healthy,
    #[strum(serialize = "truncated")]
    Truncated,
    #[strum(serialize = "overlap")]
    Overlap,
    #[strum(serialize = "huge silence")]
    HugeSilence,
    #[strum(serialize = "overlap + huge silence")]
    OverlapAndHugeSilence,
}

impl BoundaryDefect {
    fn from_flags(truncated: bool, overlap: bool, huge: bool) -> Self {
        match (truncated, overlap, huge) {
            (true, _, _) => BoundaryDefect::Truncated,
            (false, true, true) => BoundaryDefect::OverlapAndHugeSilence,
            (false, true, false) => BoundaryDefect::Overlap,
            (false, false, true) => BoundaryDefect::HugeSilence,
            (false, false, false) => BoundaryDefect::Healthy,
        }
    }

    #[inline]
    pub fn is_fixable(self) -> bool {
        matches!(
            self,
            BoundaryDefect::Overlap
                | BoundaryDefect::HugeSilence
                | BoundaryDefect::OverlapAndHugeSilence
        )
    }
}

/// Whole-track outcome used for problem counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Verdict {
    Healthy,
    Fixable,
    NonFixable,
}

/// Per-boundary display and joint verdict, computed together once.
///
/// The two views can disagree on purpose: a track with an overlap at the
/// start and truncation at the end shows `overlap` for its start, yet counts
/// as a single non-fixable problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub start: BoundaryDefect,
    pub end: BoundaryDefect,
    pub verdict: Verdict,
}

impl Classification {
    pub fn boundary(&self, boundary: Boundary) -> BoundaryDefect {
        match boundary {
            Boundary::Start => self.start,
            Boundary::End => self.end,
        }
    }
}

pub fn classify(analysis: &Analysis, tolerances: &Tolerances) -> Classification {
    let start = BoundaryDefect::from_flags(
        truncated_at_start(analysis, tolerances),
        overlaps_at_start(analysis, tolerances),
        huge_silence_at_start(analysis, tolerances),
    );
    let end = BoundaryDefect::from_flags(
        truncated_at_end(analysis, tolerances),
        overlaps_at_end(analysis, tolerances),
        huge_silence_at_end(analysis, tolerances),
    );

    let verdict = if start == BoundaryDefect::Truncated || end == BoundaryDefect::Truncated {
        Verdict::NonFixable
    } else if start.is_fixable() || end.is_fixable() {
        Verdict::Fixable
    } else {
        Verdict::Healthy
    };

    Classification {
        start,
        end,
        verdict,
    }
}

/// Tally of verdicts over a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProblemCounts {
    pub healthy: usize,
    pub fixable: usize,
    pub non_fixable: usize,
}

impl ProblemCounts {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Healthy => self.healthy += 1,
            Verdict::Fixable => self.fixable += 1,
            Verdict::NonFixable => self.non_fixable += 1,
        }
    }

    #[inline]
    pub fn problems(&self) -> usize {
        self.fixable + self.non_fixable
    }
}
