//! Trim planning and in-place lossless repair.

use crate::Tolerances;
use crate::classify::{
    Verdict, classify, huge_silence_at_end, huge_silence_at_start, overlaps_at_end,
    overlaps_at_start,
};
use crate::collection::{Collection, Track};
use crate::error::{Error, TrimError};
use crate::silence::Analysis;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Portion of a track to keep, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl TrimWindow {
    #[inline]
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Compute the window to keep for a fixable track.
///
/// Returns `None` for anything that is not fixable, when nothing would be
/// cut, or when the window would be empty or leave `[0, duration]`.
pub fn plan_trim(analysis: &Analysis, tolerances: &Tolerances) -> Option<TrimWindow> {
    if classify(analysis, tolerances).verdict != Verdict::Fixable {
        return None;
    }
    let profile = &analysis.profile;
    let duration = analysis.duration;

    let mut start: f64 = 0.0;
    if overlaps_at_start(analysis, tolerances) {
        if let Some(first) = profile.short.first() {
            start = first.start + tolerances.silence_tolerance;
        }
    }
    if huge_silence_at_start(analysis, tolerances) {
        if let Some(first) = profile.long.first() {
            start = start.max(first.end - tolerances.max_silence);
        }
    }

    let mut end = duration;
    if overlaps_at_end(analysis, tolerances) {
        if let Some(last) = profile.short.last() {
            end = last.end - tolerances.silence_tolerance;
        }
    }
    if huge_silence_at_end(analysis, tolerances) {
        if let Some(last) = profile.long.last() {
            end = end.min(last.start + tolerances.max_silence);
        }
    }

    if start == 0.0 && end == duration {
        return None;
    }
    if !(0.0 <= start && start < end && end <= duration) {
        warn!(
            "Discarding trim window [{:.3}, {:.3}] outside [0, {:.3}]",
            start, end, duration
        );
        return None;
    }
    Some(TrimWindow { start, end })
}

/// Backend that copies `window` of `input` into `output` without re-encoding.
pub trait Trimmer: Send + Sync {
    fn trim(&self, input: &Path, output: &Path, window: TrimWindow) -> Result<(), TrimError>;
}

/// Stream-copy trim through ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTrimmer {
    program: PathBuf,
}

impl FfmpegTrimmer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        FfmpegTrimmer {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_args(input: &Path, output: &Path, window: TrimWindow) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-ss",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(format!("{:.3}", window.start).into());
        args.push("-t".into());
        args.push(format!("{:.3}", window.length()).into());
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        for arg in ["-map", "0", "-c", "copy"] {
            args.push(arg.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl Trimmer for FfmpegTrimmer {
    fn trim(&self, input: &Path, output: &Path, window: TrimWindow) -> Result<(), TrimError> {
        let args = Self::build_args(input, output, window);
        debug!("{} {:?}", self.program.display(), args);
        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| TrimError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        if !result.status.success() {
            return Err(TrimError::ExitStatus {
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Sibling scratch file `<original>.tmp.<ext>`.
pub fn temp_path(original: &Path) -> PathBuf {
    let mut name = original.as_os_str().to_owned();
    name.push(".tmp");
    if let Some(ext) = original.extension() {
        name.push(".");
        name.push(ext);
    }
    PathBuf::from(name)
}

fn discard(temp: &Path) {
    if temp.exists() {
        if let Err(e) = fs::remove_file(temp) {
            warn!("Cannot remove scratch file {:?}: {}", temp, e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RepairOutcome {
    /// The file was replaced by its trimmed copy.
    Trimmed(TrimWindow),
    /// Healthy, truncated, or nothing to cut.
    Unchanged,
    /// No analysis attached to the track.
    NotAnalyzed,
}

/// Trim one track in place.
///
/// The trimmed copy is written next to the original and only renamed over it
/// once the trimmer has succeeded, so the original name never shows a partial
/// file.
pub fn repair_track(
    track: &Track,
    trimmer: &dyn Trimmer,
    tolerances: &Tolerances,
) -> Result<RepairOutcome, Error> {
    let Some(analysis) = track.analysis() else {
        return Ok(RepairOutcome::NotAnalyzed);
    };
    if classify(analysis, tolerances).verdict != Verdict::Fixable {
        return Ok(RepairOutcome::Unchanged);
    }
    let Some(window) = plan_trim(analysis, tolerances) else {
        return Ok(RepairOutcome::Unchanged);
    };

    let original = track.path.clone();
    let temp = temp_path(&original);
    debug!(
        "Trimming {:?} to [{:.3}, {:.3}] of {:.3}s",
        original, window.start, window.end, analysis.duration
    );

    let trimmed = trimmer.trim(&original, &temp, window).and_then(|()| {
        if temp.is_file() {
            Ok(())
        } else {
            Err(TrimError::MissingOutput)
        }
    });
    if let Err(source) = trimmed {
        discard(&temp);
        return Err(Error::Trim {
            path: original,
            source,
        });
    }

    // rename replaces the destination atomically
    if let Err(source) = fs::rename(&temp, &original) {
        discard(&temp);
        return Err(Error::Io {
            path: original,
            source,
        });
    }
    Ok(RepairOutcome::Trimmed(window))
}

/// Outcome of a repair pass.
#[derive(Debug, Default)]
pub struct RepairSummary {
    pub processed: usize,
    pub trimmed: usize,
    pub errors: Vec<Error>,
}

pub struct Repairer<'a> {
    trimmer: &'a dyn Trimmer,
    tolerances: Tolerances,
    pool: rayon::ThreadPool,
}

impl<'a> Repairer<'a> {
    pub fn new(trimmer: &'a dyn Trimmer, tolerances: Tolerances, workers: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("repair-{i}"))
            .build()?;
        Ok(Repairer {
            trimmer,
            tolerances,
            pool,
        })
    }

    /// Trim every fixable track. Per-file failures are logged and collected;
    /// the pass always runs to completion.
    pub fn repair_all(&self, collection: &mut Collection, progress: &ProgressBar) -> RepairSummary {
        let tracks = collection.tracks_mut();
        progress.set_length(tracks.len() as u64);

        let results: Vec<Result<RepairOutcome, Error>> = self.pool.install(|| {
            tracks
                .into_par_iter()
                .progress_with(progress.clone())
                .map(|track| repair_track(track, self.trimmer, &self.tolerances))
                .collect()
        });

        let mut summary = RepairSummary::default();
        for result in results {
            summary.processed += 1;
            match result {
                Ok(RepairOutcome::Trimmed(_)) => summary.trimmed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!("Error: {}", e);
                    summary.errors.push(e);
                }
            }
        }
        info!(
            "Repair complete. {} tracks trimmed, {} failed.",
            summary.trimmed,
            summary.errors.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::TrackTags;
    use crate::silence::{SilenceInterval, SilenceProfile};

    fn analysis(short: &[(f64, f64)], long: &[(f64, f64)], duration: f64) -> Analysis {
        let to_intervals = |raw: &[(f64, f64)]| {
            raw.iter()
                .map(|&(start, end)| SilenceInterval::new(start, end))
                .collect()
        };
        Analysis {
            profile: SilenceProfile {
                short: to_intervals(short),
                long: to_intervals(long),
            },
            duration,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn overlap_at_start_cuts_into_the_first_silence() {
        let a = analysis(&[(0.3, 1.0), (199.5, 200.0)], &[], 200.0);
        let window = plan_trim(&a, &Tolerances::default()).unwrap();
        assert!(close(window.start, 0.7));
        assert_eq!(window.end, 200.0);
    }

    #[test]
    fn huge_silence_keeps_max_silence_of_lead_in() {
        let a = analysis(&[(0.0, 5.0), (299.5, 300.0)], &[(0.0, 5.0)], 300.0);
        let window = plan_trim(&a, &Tolerances::default()).unwrap();
        assert!(close(window.start, 3.0));
        assert_eq!(window.end, 300.0);
    }

    #[test]
    fn both_ends_are_planned_together() {
        let a = analysis(
            &[(1.0, 2.0), (250.0, 258.0)],
            &[(250.0, 258.0)],
            260.0,
        );
        let window = plan_trim(&a, &Tolerances::default()).unwrap();
        assert!(close(window.start, 1.4));
        // overlap gives 257.6, huge silence lowers it to 252.0
        assert!(close(window.end, 252.0));
        assert!(window.start <= window.end);
    }

    #[test]
    fn truncated_and_healthy_tracks_are_never_planned() {
        let tolerances = Tolerances::default();
        assert!(plan_trim(&analysis(&[], &[], 180.0), &tolerances).is_none());
        assert!(plan_trim(&Analysis::default(), &tolerances).is_none());
        assert!(plan_trim(&analysis(&[(0.0, 0.8), (199.0, 200.0)], &[], 200.0), &tolerances).is_none());
    }

    #[test]
    fn silence_ending_just_short_of_duration_is_not_trimmed_again() {
        let a = analysis(&[(0.0, 0.8), (199.0, 199.995)], &[], 200.0);
        assert!(plan_trim(&a, &Tolerances::default()).is_none());
    }

    #[test]
    fn inverted_window_is_rejected() {
        // Overlap at both ends of a single short silence.
        let a = analysis(&[(1.0, 1.2)], &[], 3.0);
        assert_eq!(classify(&a, &Tolerances::default()).verdict, Verdict::Fixable);
        assert!(plan_trim(&a, &Tolerances::default()).is_none());
    }

    #[test]
    fn temp_path_keeps_the_extension_last() {
        assert_eq!(
            temp_path(Path::new("/m/01 Song.mp3")),
            PathBuf::from("/m/01 Song.mp3.tmp.mp3")
        );
    }

    #[test]
    fn trim_arguments_stream_copy() {
        let args = FfmpegTrimmer::build_args(
            Path::new("in.flac"),
            Path::new("out.flac"),
            TrimWindow { start: 0.7, end: 200.0 },
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let joined = args.join(" ");
        assert!(joined.contains("-ss 0.700 -t 199.300 -i in.flac"));
        assert!(joined.ends_with("-c copy out.flac"));
    }

    struct CopyTrimmer;

    impl Trimmer for CopyTrimmer {
        fn trim(&self, input: &Path, output: &Path, _window: TrimWindow) -> Result<(), TrimError> {
            let mut data = fs::read(input)?;
            data.extend_from_slice(b"-trimmed");
            fs::write(output, data)?;
            Ok(())
        }
    }

    struct FailingTrimmer;

    impl Trimmer for FailingTrimmer {
        fn trim(&self, _input: &Path, output: &Path, _window: TrimWindow) -> Result<(), TrimError> {
            fs::write(output, b"partial")?;
            Err(TrimError::MissingOutput)
        }
    }

    fn analyzed_track(path: &Path, a: Analysis) -> Track {
        let mut track = Track::new("Song", path, 1, 1);
        track.begin_analysis();
        track.complete_analysis(a);
        track
    }

    #[test]
    fn successful_trim_replaces_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        fs::write(&path, b"audio").unwrap();
        let mut track = analyzed_track(&path, analysis(&[(0.3, 1.0), (199.5, 200.0)], &[], 200.0));

        let outcome = repair_track(&mut track, &CopyTrimmer, &Tolerances::default()).unwrap();
        assert!(matches!(outcome, RepairOutcome::Trimmed(_)));
        assert_eq!(fs::read(&path).unwrap(), b"audio-trimmed");
        assert!(!temp_path(&path).exists());
        assert_eq!(track.path, path);
    }

    #[test]
    fn failed_trim_leaves_the_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.flac");
        fs::write(&path, b"audio").unwrap();
        let mut track = analyzed_track(&path, analysis(&[(0.3, 1.0), (199.5, 200.0)], &[], 200.0));

        let result = repair_track(&mut track, &FailingTrimmer, &Tolerances::default());
        assert!(matches!(result, Err(Error::Trim { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"audio");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn unanalyzed_and_truncated_tracks_are_left_alone() {
        let mut pending = Track::new("p", "/nowhere.mp3", 1, 1);
        assert_eq!(
            repair_track(&mut pending, &FailingTrimmer, &Tolerances::default()).unwrap(),
            RepairOutcome::NotAnalyzed
        );
        let mut truncated = analyzed_track(Path::new("/nowhere.mp3"), analysis(&[], &[], 180.0));
        assert_eq!(
            repair_track(&mut truncated, &FailingTrimmer, &Tolerances::default()).unwrap(),
            RepairOutcome::Unchanged
        );
    }

    #[test]
    fn repair_pass_counts_every_track_and_continues_after_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut collection = Collection::new();
        for (i, name) in ["a.mp3", "b.mp3", "c.mp3"].iter().enumerate() {
            let path = dir.path().join(name);
            fs::write(&path, b"audio").unwrap();
            collection.insert(
                TrackTags {
                    artist: "X".to_string(),
                    album: "Y".to_string(),
                    title: name.to_string(),
                    disk: 1,
                    track: i as u32 + 1,
                },
                path,
            );
        }
        // a: fixable, b: healthy, c: fixable but its file vanished
        for track in collection.tracks_mut() {
            let a = if track.name == "b.mp3" {
                analysis(&[(0.0, 0.8), (199.2, 200.0)], &[], 200.0)
            } else {
                analysis(&[(0.3, 1.0), (199.5, 200.0)], &[], 200.0)
            };
            track.begin_analysis();
            track.complete_analysis(a);
        }
        fs::remove_file(dir.path().join("c.mp3")).unwrap();

        let repairer = Repairer::new(&CopyTrimmer, Tolerances::default(), 3).unwrap();
        let progress = ProgressBar::hidden();
        let summary = repairer.repair_all(&mut collection, &progress);

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.trimmed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(progress.position(), 3);
        assert_eq!(fs::read(dir.path().join("a.mp3")).unwrap(), b"audio-trimmed");
        assert_eq!(fs::read(dir.path().join("b.mp3")).unwrap(), b"audio");
    }
}
