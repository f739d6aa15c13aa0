//! Silence detection through an external media tool.
//!
//! The detector is a trait so the classifier, scheduler and planner can be
//! exercised with canned intervals; [`FfmpegDetector`] is the real backend and
//! scrapes the `silencedetect` filter's diagnostics from stderr.

use crate::Tolerances;
use crate::error::DetectionError;
use crate::silence::{Detection, SilenceInterval};
use log::debug;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use strum_macros::Display;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d+):(\d+(?:\.\d+)?),\s*start:\s*(-?\d+(?:\.\d+)?)")
        .expect("duration regex")
});
static SILENCE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"silence_start:\s*(-?\d+(?:\.\d+)?(?:e-?\d+)?)").expect("start regex"));
static SILENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_end:\s*(-?\d+(?:\.\d+)?(?:e-?\d+)?)\s*\|\s*silence_duration:\s*(-?\d+(?:\.\d+)?)")
        .expect("end regex")
});

/// Which of the two fixed sensitivities to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DetectionProfile {
    /// Tight noise floor, finds small gaps.
    Short,
    /// Coarse noise floor, finds abnormal dead air.
    Long,
}

impl DetectionProfile {
    /// Noise floor handed to the filter.
    pub fn noise_threshold(self) -> &'static str {
        match self {
            DetectionProfile::Short => "-60dB",
            DetectionProfile::Long => "-50dB",
        }
    }

    /// Silences shorter than this are dropped unless they touch a boundary.
    pub fn minimum_duration(self, tolerances: &Tolerances) -> f64 {
        match self {
            DetectionProfile::Short => tolerances.min_silence - tolerances.tolerance,
            DetectionProfile::Long => tolerances.max_silence + tolerances.tolerance,
        }
    }
}

/// Backend that reports the silences and total duration of a file.
pub trait SilenceDetector: Send + Sync {
    /// Detect significant silences in `path` at the given sensitivity.
    fn detect(&self, path: &Path, profile: DetectionProfile) -> Result<Detection, DetectionError>;

    /// Get the name of this detector (for logging)
    fn name(&self) -> &'static str;
}

/// Runs `ffmpeg -af silencedetect` and parses its log output.
#[derive(Debug, Clone)]
pub struct FfmpegDetector {
    program: PathBuf,
    tolerances: Tolerances,
}

impl FfmpegDetector {
    pub fn new(program: impl Into<PathBuf>, tolerances: Tolerances) -> Self {
        FfmpegDetector {
            program: program.into(),
            tolerances,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    fn build_args(&self, path: &Path, profile: DetectionProfile) -> Vec<String> {
        let filter = format!(
            "silencedetect=noise={}:d={:.3}",
            profile.noise_threshold(),
            profile.minimum_duration(&self.tolerances)
        );
        vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-sn".to_string(),
            "-af".to_string(),
            filter,
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ]
    }
}

impl SilenceDetector for FfmpegDetector {
    fn detect(&self, path: &Path, profile: DetectionProfile) -> Result<Detection, DetectionError> {
        let args = self.build_args(path, profile);
        debug!("{} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| DetectionError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(DetectionError::ExitStatus(output.status));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let raw = parse_silencedetect(&stderr)?;
        Ok(Detection {
            intervals: retain_significant(
                raw.intervals,
                raw.duration,
                profile.minimum_duration(&self.tolerances),
                self.tolerances.tolerance,
            ),
            duration: raw.duration,
        })
    }

    fn name(&self) -> &'static str {
        "ffmpeg-silencedetect"
    }
}

fn parse_number(text: &str) -> Result<f64, DetectionError> {
    text.parse::<f64>()
        .map_err(|_| DetectionError::Malformed(text.to_string()))
}

/// Parse the total duration from a `Duration: HH:MM:SS.ff, start: S` line.
pub fn parse_duration(text: &str) -> Result<f64, DetectionError> {
    let caps = DURATION_RE.captures(text).ok_or(DetectionError::Duration)?;
    let hours = parse_number(&caps[1])?;
    let minutes = parse_number(&caps[2])?;
    let seconds = parse_number(&caps[3])?;
    let offset = parse_number(&caps[4])?;
    let duration = hours * 3600.0 + minutes * 60.0 + seconds - offset;
    if duration > 0.0 {
        Ok(duration)
    } else {
        Err(DetectionError::Duration)
    }
}

/// Parse every silence interval and the duration out of the filter log.
///
/// Intervals are returned unfiltered, in the order they were reported. A
/// `silence_start` that never receives its `silence_end` runs to the end of
/// the track.
pub fn parse_silencedetect(text: &str) -> Result<Detection, DetectionError> {
    let duration = parse_duration(text)?;
    let mut intervals = Vec::new();
    let mut open: Option<f64> = None;

    for line in text.lines() {
        if let Some(caps) = SILENCE_START_RE.captures(line) {
            open = Some(parse_number(&caps[1])?.max(0.0));
        } else if let Some(caps) = SILENCE_END_RE.captures(line) {
            let end = parse_number(&caps[1])?;
            let start = match open.take() {
                Some(start) => start,
                None => (end - parse_number(&caps[2])?).max(0.0),
            };
            intervals.push(SilenceInterval::new(start, end.max(start)));
        }
    }
    if let Some(start) = open {
        intervals.push(SilenceInterval::new(start, duration.max(start)));
    }

    Ok(Detection {
        intervals,
        duration,
    })
}

/// Keep the silences that matter for classification.
///
/// Anything longer than `min_duration` stays, and so does anything touching
/// either end of the track however short it is.
pub fn retain_significant(
    intervals: Vec<SilenceInterval>,
    duration: f64,
    min_duration: f64,
    tolerance: f64,
) -> Vec<SilenceInterval> {
    intervals
        .into_iter()
        .filter(|interval| {
            interval.length() > min_duration
                || interval.start <= tolerance
                || duration - interval.end <= tolerance
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
Input #0, mp3, from 'track.mp3':
  Duration: 00:03:20.05, start: 0.025057, bitrate: 320 kb/s
  Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 320 kb/s
[silencedetect @ 0x55d5c8a0] silence_start: 0
[silencedetect @ 0x55d5c8a0] silence_end: 0.712 | silence_duration: 0.712
[silencedetect @ 0x55d5c8a0] silence_start: 95.5
[silencedetect @ 0x55d5c8a0] silence_end: 95.7 | silence_duration: 0.2
[silencedetect @ 0x55d5c8a0] silence_start: 198.1
size=N/A time=00:03:20.02 bitrate=N/A speed= 512x
";

    #[test]
    fn parses_duration_minus_start_offset() {
        let duration = parse_duration(LOG).unwrap();
        assert!((duration - (200.05 - 0.025057)).abs() < 1e-9);
    }

    #[test]
    fn parses_intervals_and_closes_trailing_silence() {
        let detection = parse_silencedetect(LOG).unwrap();
        assert_eq!(detection.intervals.len(), 3);
        assert_eq!(detection.intervals[0], SilenceInterval::new(0.0, 0.712));
        assert_eq!(detection.intervals[1], SilenceInterval::new(95.5, 95.7));
        let last = detection.intervals[2];
        assert_eq!(last.start, 198.1);
        assert_eq!(last.end, detection.duration);
    }

    #[test]
    fn missing_duration_is_an_error() {
        let text = "[silencedetect @ 0x1] silence_start: 1.0\n";
        assert!(matches!(
            parse_silencedetect(text),
            Err(DetectionError::Duration)
        ));
    }

    #[test]
    fn unavailable_duration_is_an_error() {
        let text = "  Duration: N/A, start: 0.000000, bitrate: N/A\n";
        assert!(parse_duration(text).is_err());
    }

    #[test]
    fn retains_long_and_boundary_silences_only() {
        let intervals = vec![
            SilenceInterval::new(0.0, 0.1),
            SilenceInterval::new(50.0, 50.3),
            SilenceInterval::new(90.0, 91.0),
            SilenceInterval::new(199.8, 199.995),
        ];
        let kept = retain_significant(intervals, 200.0, 0.59, 0.01);
        assert_eq!(
            kept,
            vec![
                SilenceInterval::new(0.0, 0.1),
                SilenceInterval::new(90.0, 91.0),
                SilenceInterval::new(199.8, 199.995),
            ]
        );
    }

    #[test]
    fn profile_thresholds_follow_tolerances() {
        let tolerances = Tolerances::default();
        assert!((DetectionProfile::Short.minimum_duration(&tolerances) - 0.59).abs() < 1e-12);
        assert!((DetectionProfile::Long.minimum_duration(&tolerances) - 2.01).abs() < 1e-12);
        assert_eq!(DetectionProfile::Short.to_string(), "short");
    }

    #[test]
    fn filter_arguments_carry_profile_parameters() {
        let detector = FfmpegDetector::new("ffmpeg", Tolerances::default());
        let args = detector.build_args(Path::new("a.flac"), DetectionProfile::Long);
        assert!(args.contains(&"silencedetect=noise=-50dB:d=2.010".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn missing_binary_fails_without_panicking() {
        let detector = FfmpegDetector::new("/nonexistent/ffmpeg-binary", Tolerances::default());
        let result = detector.detect(Path::new("a.mp3"), DetectionProfile::Short);
        assert!(matches!(result, Err(DetectionError::Spawn { .. })));
    }
}
