//! Parallel silence analysis of a whole collection.
//!
//! A fixed-size rayon pool drains one work list holding an exclusive handle
//! on every track. Each worker runs the short then the long detection for its
//! track and writes the result before picking up the next one.

use crate::collection::{Collection, TrackState};
use crate::detect::{DetectionProfile, SilenceDetector};
use crate::error::Error;
use crate::silence::{Analysis, Detection};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Outcome of an analysis pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    /// Tracks that reached `Analyzed`.
    pub analyzed: usize,
    /// Analyzed tracks whose detection failed and were given an empty profile.
    pub degraded: usize,
    /// Tracks left `Pending` because the pass was cancelled.
    pub skipped: usize,
}

pub struct Scheduler<'a> {
    detector: &'a dyn SilenceDetector,
    pool: rayon::ThreadPool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(detector: &'a dyn SilenceDetector, workers: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("analysis-{i}"))
            .build()?;
        Ok(Scheduler {
            detector,
            pool,
            cancel: None,
        })
    }

    /// Checked between tracks. Tracks not yet started when it is set stay
    /// pending; tracks in flight finish normally.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Analyze every pending track, returning once all of them are done.
    pub fn analyze(&self, collection: &mut Collection, progress: &ProgressBar) -> AnalysisSummary {
        let tracks: Vec<_> = collection
            .tracks_mut()
            .into_iter()
            .filter(|track| track.state() == TrackState::Pending)
            .collect();
        progress.set_length(tracks.len() as u64);
        info!(
            "Analyzing {} tracks with {} ({} workers)",
            tracks.len(),
            self.detector.name(),
            self.pool.current_num_threads()
        );

        let analyzed = AtomicUsize::new(0);
        let degraded = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);

        self.pool.install(|| {
            tracks.into_par_iter().for_each(|track| {
                if self.is_cancelled() {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                track.begin_analysis();
                let analysis = self.analyze_file(&track.path);
                if analysis.is_degraded() {
                    degraded.fetch_add(1, Ordering::Relaxed);
                }
                track.complete_analysis(analysis);
                analyzed.fetch_add(1, Ordering::Relaxed);
                progress.inc(1);
            })
        });

        AnalysisSummary {
            analyzed: analyzed.into_inner(),
            degraded: degraded.into_inner(),
            skipped: skipped.into_inner(),
        }
    }

    /// Both detection runs for one file. Failures degrade, never propagate.
    pub fn analyze_file(&self, path: &Path) -> Analysis {
        let short = match self.detector.detect(path, DetectionProfile::Short) {
            Ok(detection) => detection,
            Err(e) => {
                warn!("Silence detection failed for {:?}: {}", path, e);
                return Analysis::default();
            }
        };
        let long = match self.detector.detect(path, DetectionProfile::Long) {
            Ok(detection) => detection,
            Err(e) => {
                warn!("Long silence detection failed for {:?}: {}", path, e);
                Detection::default()
            }
        };
        debug!(
            "{:?}: {:.2}s, {} short / {} long silences",
            path.file_name().unwrap_or_default(),
            short.duration,
            short.intervals.len(),
            long.intervals.len()
        );
        Analysis::new(short, long)
    }
}
