/// Module for boundary defect classification
pub mod classify;
/// Module for the artist/album/track tree
pub mod collection;
/// Module for silence detection backends
pub mod detect;
/// Module for error handling
pub mod error;
/// Module for moving files into a canonical layout
pub mod organize;
/// Module for trim planning and in-place repair
pub mod repair;
/// Module for the parallel analysis pass
pub mod schedule;
/// Module for silence intervals and analysis results
pub mod silence;

use crate::classify::{Classification, ProblemCounts, Verdict, classify};
use crate::collection::{Collection, MetadataReader};
use crate::detect::{FfmpegDetector, SilenceDetector};
use crate::error::Error;
use crate::organize::{OrganizeSummary, organize};
use crate::repair::{FfmpegTrimmer, RepairSummary, Repairer, Trimmer};
use crate::schedule::{AnalysisSummary, Scheduler};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use strum_macros::Display;

/// Represents supported audio file formats
#[derive(Debug, PartialEq, Display)]
#[strum(serialize_all = "camelCase")]
pub enum AudioFormats {
    Wav,
    Mp3,
    Flac,
    Ogg,
    M4a,
    Aac,
    Opus,
}

impl AudioFormats {
    /// Creates an AudioFormats enum from a file path based on its extension
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "wav" => Self::Wav,
                "mp3" => Self::Mp3,
                "flac" => Self::Flac,
                "ogg" => Self::Ogg,
                "m4a" => Self::M4a,
                "aac" => Self::Aac,
                "opus" => Self::Opus,
                _ => return None,
            },
        )
    }
}

/// Numeric thresholds shared by detection, classification and planning.
/// All values are seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Slack when comparing against the track boundaries
    pub tolerance: f64,
    /// Largest boundary margin that still counts as plausible
    pub max_overlapping: f64,
    /// Longest normal silence; also how much lead-in/out a trim keeps
    pub max_silence: f64,
    /// Shortest silence worth reporting
    pub min_silence: f64,
    /// How far into a silence a trim cuts
    pub silence_tolerance: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            tolerance: 0.01,
            max_overlapping: 10.0,
            max_silence: 2.0,
            min_silence: 0.6,
            silence_tolerance: 0.4,
        }
    }
}

/// Configuration options for an audit run
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Root of the music collection
    pub input_dir: PathBuf,
    /// Trim fixable tracks in place after analysis
    pub fix: bool,
    /// Move files into Artist/Album/NN Title.ext afterwards
    pub sort: bool,
    /// Size of the worker pool for analysis and repair
    pub workers: usize,
    /// Media tool used for detection and trimming
    pub ffmpeg: PathBuf,
    /// Draw progress bars on the terminal
    pub show_progress: bool,
    pub tolerances: Tolerances,
}

impl Default for AuditOptions {
    fn default() -> Self {
        AuditOptions {
            input_dir: PathBuf::from("."),
            fix: false,
            sort: false,
            workers: 10,
            ffmpeg: PathBuf::from("ffmpeg"),
            show_progress: true,
            tolerances: Tolerances::default(),
        }
    }
}

impl AuditOptions {
    /// Detector running `ffmpeg` with these options' thresholds
    pub fn ffmpeg_detector(&self) -> FfmpegDetector {
        FfmpegDetector::new(&self.ffmpeg, self.tolerances)
    }

    /// Trimmer running `ffmpeg`
    pub fn ffmpeg_trimmer(&self) -> FfmpegTrimmer {
        FfmpegTrimmer::new(&self.ffmpeg)
    }
}

/// Classification of one track, with the names needed to report it.
#[derive(Debug, Clone)]
pub struct TrackReport {
    pub artist: String,
    pub album: String,
    pub track: String,
    pub path: PathBuf,
    pub classification: Classification,
}

/// Everything an audit run found and did.
#[derive(Debug, Default)]
pub struct AuditSummary {
    pub analysis: AnalysisSummary,
    pub counts: ProblemCounts,
    pub problems: Vec<TrackReport>,
    pub repair: Option<RepairSummary>,
    pub organize: Option<OrganizeSummary>,
}

fn progress_bar(show: bool, message: &'static str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}").expect("Internal Error: Failed to set progress bar style")
        .progress_chars("#>-"));
    pb.set_message(message);
    pb
}

/// Classify every analyzed track once, returning the problem tracks and the
/// verdict tally built from the same classifications.
pub fn classify_collection(
    collection: &Collection,
    tolerances: &Tolerances,
) -> (Vec<TrackReport>, ProblemCounts) {
    let mut counts = ProblemCounts::default();
    let mut problems = Vec::new();

    for (artist, album, track) in collection.entries() {
        let Some(analysis) = track.analysis() else {
            continue;
        };
        let classification = classify(analysis, tolerances);
        counts.record(classification.verdict);
        if classification.verdict != Verdict::Healthy {
            problems.push(TrackReport {
                artist: artist.name.clone(),
                album: album.name.clone(),
                track: track.name.clone(),
                path: track.path.clone(),
                classification,
            });
        }
    }
    (problems, counts)
}

fn log_problems(problems: &[TrackReport]) {
    for report in problems {
        let c = &report.classification;
        warn!(
            "{} / {} / {}: start {}, end {} ({})",
            report.artist, report.album, report.track, c.start, c.end, c.verdict
        );
    }
}

/// Validates audit options for correctness
fn validate_options(options: &AuditOptions) -> Result<(), Error> {
    if !options.input_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Input path is not a valid directory: {:?}",
            options.input_dir
        )));
    }
    if options.workers == 0 {
        return Err(Error::InvalidOptions(
            "Worker count must be at least 1".to_string(),
        ));
    }
    let t = &options.tolerances;
    if t.min_silence <= t.tolerance || t.max_silence <= t.min_silence {
        return Err(Error::InvalidOptions(format!(
            "Silence thresholds must satisfy tolerance < min_silence < max_silence: {:?}",
            t
        )));
    }
    Ok(())
}

/// Scan, analyze and classify a collection, then optionally repair and sort it
pub fn audit_folder(
    options: &AuditOptions,
    detector: &dyn SilenceDetector,
    trimmer: &dyn Trimmer,
    reader: &dyn MetadataReader,
) -> Result<AuditSummary, Error> {
    validate_options(options)?;

    info!("Discovering audio files in {:?}...", options.input_dir);
    let mut collection = Collection::scan(&options.input_dir, reader)?;
    let (artists, albums, tracks) = collection.stats();
    info!(
        "Found {} artists, {} albums, {} tracks.",
        artists, albums, tracks
    );
    if collection.is_empty() {
        return Ok(AuditSummary::default());
    }

    let scheduler = Scheduler::new(detector, options.workers)?;
    let pb = progress_bar(options.show_progress, "Analyzing tracks");
    let analysis = scheduler.analyze(&mut collection, &pb);
    pb.finish_with_message("Analysis done");
    if analysis.degraded > 0 {
        warn!(
            "{} tracks could not be analyzed and are reported as truncated.",
            analysis.degraded
        );
    }

    let (problems, counts) = classify_collection(&collection, &options.tolerances);
    log_problems(&problems);
    info!(
        "{} problems found: {} fixable, {} not fixable.",
        counts.problems(),
        counts.fixable,
        counts.non_fixable
    );

    let repair = if options.fix && counts.fixable > 0 {
        let repairer = Repairer::new(trimmer, options.tolerances, options.workers)?;
        let pb = progress_bar(options.show_progress, "Trimming tracks");
        let summary = repairer.repair_all(&mut collection, &pb);
        pb.finish_with_message("Trimming done");
        Some(summary)
    } else {
        None
    };

    let organize = options
        .sort
        .then(|| organize(&options.input_dir, &mut collection));

    Ok(AuditSummary {
        analysis,
        counts,
        problems,
        repair,
        organize,
    })
}

/// Scan a collection and only move its files into the canonical layout
pub fn organize_folder(
    input_dir: impl AsRef<Path>,
    reader: &dyn MetadataReader,
) -> Result<OrganizeSummary, Error> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Input path is not a valid directory: {:?}",
            input_dir
        )));
    }
    let mut collection = Collection::scan(input_dir, reader)?;
    Ok(organize(input_dir, &mut collection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_are_matched_case_insensitively() {
        assert_eq!(AudioFormats::from_path("a/B.FLAC"), Some(AudioFormats::Flac));
        assert_eq!(AudioFormats::from_path("cover.jpg"), None);
        assert_eq!(AudioFormats::Mp3.to_string(), "mp3");
    }

    #[test]
    fn default_options_are_valid_for_an_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let options = AuditOptions {
            input_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(validate_options(&options).is_ok());
        assert_eq!(options.workers, 10);
    }

    #[test]
    fn ffmpeg_collaborators_follow_the_options() {
        let options = AuditOptions {
            ffmpeg: PathBuf::from("/opt/ffmpeg/bin/ffmpeg"),
            tolerances: Tolerances {
                min_silence: 1.0,
                ..Tolerances::default()
            },
            ..Default::default()
        };
        let detector = options.ffmpeg_detector();
        assert_eq!(detector.program(), Path::new("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(detector.tolerances(), &options.tolerances);
        assert_eq!(options.ffmpeg_trimmer().program(), Path::new("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn zero_workers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = AuditOptions {
            input_dir: dir.path().to_path_buf(),
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_options(&options),
            Err(Error::InvalidOptions(_))
        ));
    }

    #[test]
    fn missing_input_dir_is_rejected() {
        let options = AuditOptions {
            input_dir: PathBuf::from("/no/such/music"),
            ..Default::default()
        };
        assert!(validate_options(&options).is_err());
    }
}
