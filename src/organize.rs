//! Move files into `Artist/Album/[DD - ]TT Title.ext`.

use crate::collection::Collection;
use log::{debug, error, info};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static WRONG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\?%*:|"<>]+"#).expect("path escape regex"));

/// Replace runs of characters that are unsafe in file names with `-`.
pub fn escape(name: &str) -> String {
    WRONG_CHARS.replace_all(name, "-").into_owned()
}

/// File name for a track; the disk prefix only appears on multi-disk albums.
pub fn file_name(title: &str, disk: u32, track: u32, multi_disk: bool, ext: Option<&str>) -> String {
    let mut name = String::new();
    if multi_disk {
        name.push_str(&format!("{:02} - ", disk));
    }
    name.push_str(&format!("{:02} {}", track, escape(title)));
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrganizeSummary {
    pub moved: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Move every track under `root` into its canonical place.
///
/// Track paths are updated after each successful rename. Existing files are
/// never overwritten. Failures are logged per file and do not stop the pass.
pub fn organize(root: impl AsRef<Path>, collection: &mut Collection) -> OrganizeSummary {
    let root = root.as_ref();
    let mut summary = OrganizeSummary::default();

    for (artist, album) in collection.albums_mut() {
        let folder = root.join(escape(artist)).join(escape(&album.name));
        if let Err(e) = fs::create_dir_all(&folder) {
            error!("Cannot create {:?}: {}", folder, e);
            summary.failed += album.tracks().count();
            continue;
        }
        let multi_disk = album.disk_count() > 1;

        for track in album.tracks_mut() {
            let ext = track
                .path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase());
            let target: PathBuf = folder.join(file_name(
                &track.name,
                track.disk_number,
                track.track_number,
                multi_disk,
                ext.as_deref(),
            ));
            if target == track.path {
                summary.unchanged += 1;
                continue;
            }
            if target.exists() {
                error!("Cannot move {:?}: {:?} already exists", track.path, target);
                summary.failed += 1;
                continue;
            }
            match fs::rename(&track.path, &target) {
                Ok(()) => {
                    debug!("Moved {:?} -> {:?}", track.path, target);
                    track.path = target;
                    summary.moved += 1;
                }
                Err(e) => {
                    error!("Cannot move {:?} to {:?}: {}", track.path, target, e);
                    summary.failed += 1;
                }
            }
        }
    }

    info!(
        "Sorted collection: {} moved, {} already in place, {} failed.",
        summary.moved, summary.unchanged, summary.failed
    );
    summary
}
