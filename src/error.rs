use std::path::PathBuf;

use symphonia::core::errors::Error as SymphoniaError;

#[derive(thiserror::Error, Debug)]
pub enum DetectionError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Silence detection exited with {0}")]
    ExitStatus(std::process::ExitStatus),
    #[error("No parseable duration in detection output")]
    Duration,
    #[error("Malformed value {0:?} in detection output")]
    Malformed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum TrimError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Trim exited with {status}: {stderr}")]
    ExitStatus {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Trim produced no output file")]
    MissingOutput,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing {0} tag")]
    MissingTag(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Cannot read collection root {path}: {source}")]
    Enumeration {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Trim failed for {path}: {source}")]
    Trim {
        path: PathBuf,
        #[source]
        source: TrimError,
    },
    #[error("I/O error while replacing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
