use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use rip_audit::collection::SymphoniaTagReader;
use rip_audit::{AuditOptions, Tolerances, audit_folder, organize_folder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// music folder, default to the current directory
    folder: Option<PathBuf>,

    /// trim tracks with fixable silence or overlap in place
    #[arg(short, long)]
    fix: bool,

    /// move files into Artist/Album/NN Title.ext afterwards
    #[arg(short, long)]
    sort: bool,

    /// number of parallel workers
    #[arg(short, long, default_value_t = 10)]
    workers: usize,

    /// ffmpeg binary used for detection and trimming
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// sort the collection without analyzing it
    Sort {
        /// music folder, default to the current directory
        folder: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_filters("symphonia=error")
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    let reader = SymphoniaTagReader;

    if let Some(Commands::Sort { folder }) = cli.command {
        let folder = folder.unwrap_or_else(|| PathBuf::from("."));
        let summary = organize_folder(&folder, &reader)?;
        if summary.failed > 0 {
            error!("{} files could not be moved.", summary.failed);
        }
        return Ok(());
    }

    let options = AuditOptions {
        input_dir: cli.folder.unwrap_or_else(|| PathBuf::from(".")),
        fix: cli.fix,
        sort: cli.sort,
        workers: cli.workers,
        ffmpeg: cli.ffmpeg,
        show_progress: true,
        tolerances: Tolerances::default(),
    };

    info!("Starting audit with options:");
    info!("  Input Directory: {:?}", options.input_dir);
    info!("  Fix: {}", options.fix);
    info!("  Sort: {}", options.sort);
    info!("  Workers: {}", options.workers);
    info!("---");

    let detector = options.ffmpeg_detector();
    let trimmer = options.ffmpeg_trimmer();

    match audit_folder(&options, &detector, &trimmer, &reader) {
        Ok(summary) => {
            println!(
                "{} problems: {} fixable, {} not fixable ({} healthy tracks)",
                summary.counts.problems(),
                summary.counts.fixable,
                summary.counts.non_fixable,
                summary.counts.healthy
            );
            if let Some(repair) = &summary.repair {
                println!(
                    "{} tracks trimmed, {} errors",
                    repair.trimmed,
                    repair.errors.len()
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Audit failed: {}", e);
            Err(e)?
        }
    }
}
