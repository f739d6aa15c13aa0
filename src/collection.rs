//! The artist → album → disk/track tree built from file tags.
//!
//! Children are owned by their parent; nothing points back up. Code that
//! needs the artist or album of a track walks the tree with
//! [`Collection::entries`].

use crate::AudioFormats;
use crate::error::{Error, MetadataError};
use crate::silence::Analysis;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag};
use symphonia::core::probe::Hint;
use walkdir::WalkDir;

/// Tag values needed to place a file in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub disk: u32,
    pub track: u32,
}

/// Reads [`TrackTags`] from an audio file.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TrackTags, MetadataError>;
}

/// Tag reader backed by symphonia's probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaTagReader;

impl MetadataReader for SymphoniaTagReader {
    fn read(&self, path: &Path) -> Result<TrackTags, MetadataError> {
        let file = fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let mut probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;

        // Tags may sit in front of the container (ID3v2) or inside it.
        let mut tags: Vec<Tag> = Vec::new();
        if let Some(metadata) = probed.metadata.get() {
            if let Some(revision) = metadata.current() {
                tags.extend(revision.tags().iter().cloned());
            }
        }
        let container = probed.format.metadata();
        if let Some(revision) = container.current() {
            tags.extend(revision.tags().iter().cloned());
        }

        Ok(tags_from(&tags))
    }
}

fn find_tag(tags: &[Tag], key: StandardTagKey) -> Option<String> {
    tags.iter()
        .find(|tag| tag.std_key == Some(key))
        .map(|tag| tag.value.to_string())
}

/// Parses "3" or "3/12".
fn parse_position(value: Option<String>) -> u32 {
    value
        .as_deref()
        .and_then(|v| v.split('/').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Missing names become empty strings so the file is still audited.
fn tags_from(tags: &[Tag]) -> TrackTags {
    let artist = find_tag(tags, StandardTagKey::Artist)
        .or_else(|| find_tag(tags, StandardTagKey::AlbumArtist))
        .unwrap_or_default();
    let album = find_tag(tags, StandardTagKey::Album).unwrap_or_default();
    let title = find_tag(tags, StandardTagKey::TrackTitle).unwrap_or_default();

    TrackTags {
        artist: primary_artist(&artist),
        album: album.trim().to_string(),
        title: title.trim().to_string(),
        disk: parse_position(find_tag(tags, StandardTagKey::DiscNumber)),
        track: parse_position(find_tag(tags, StandardTagKey::TrackNumber)),
    }
}

/// First of a comma-separated artist list.
pub fn primary_artist(raw: &str) -> String {
    raw.split(',').next().unwrap_or_default().trim().to_string()
}

/// Lookup key for artist, album and track names.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Where a track is in its analysis lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    #[default]
    Pending,
    InFlight,
    Analyzed,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub path: PathBuf,
    pub disk_number: u32,
    pub track_number: u32,
    state: TrackState,
    analysis: Option<Analysis>,
}

impl Track {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, disk: u32, track: u32) -> Self {
        Track {
            name: name.into(),
            path: path.into(),
            disk_number: disk,
            track_number: track,
            state: TrackState::Pending,
            analysis: None,
        }
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[inline]
    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub(crate) fn begin_analysis(&mut self) {
        debug_assert_eq!(self.state, TrackState::Pending);
        self.state = TrackState::InFlight;
    }

    /// Stores the analysis. Only the first call has any effect.
    pub(crate) fn complete_analysis(&mut self, analysis: Analysis) {
        if self.analysis.is_none() {
            self.analysis = Some(analysis);
            self.state = TrackState::Analyzed;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Album {
    pub name: String,
    tracks: BTreeMap<(u32, u32), Track>,
    by_name: HashMap<String, (u32, u32)>,
}

impl Album {
    fn new(name: impl Into<String>) -> Self {
        Album {
            name: name.into(),
            tracks: BTreeMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Tracks ordered by (disk, track).
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    pub fn track(&self, disk: u32, track: u32) -> Option<&Track> {
        self.tracks.get(&(disk, track))
    }

    pub fn track_by_name(&self, name: &str) -> Option<&Track> {
        self.by_name
            .get(&normalize(name))
            .and_then(|key| self.tracks.get(key))
    }

    pub fn disk_count(&self) -> usize {
        self.tracks
            .keys()
            .map(|(disk, _)| *disk)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

#[derive(Debug, Clone)]
pub struct Artist {
    pub name: String,
    albums: BTreeMap<String, Album>,
}

impl Artist {
    pub fn albums(&self) -> impl Iterator<Item = &Album> {
        self.albums.values()
    }

    pub fn album(&self, name: &str) -> Option<&Album> {
        self.albums.get(&normalize(name))
    }
}

/// Every tagged audio file under a root folder.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    artists: BTreeMap<String, Artist>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `root` and read the tags of every supported file.
    ///
    /// Only an unreadable root is fatal. Files whose tags cannot be read are
    /// logged and left out.
    pub fn scan(root: impl AsRef<Path>, reader: &dyn MetadataReader) -> Result<Self, Error> {
        let root = root.as_ref();
        let mut collection = Collection::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(Error::Enumeration {
                        path: root.to_path_buf(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || AudioFormats::from_path(entry.path()).is_none() {
                continue;
            }

            match reader.read(entry.path()) {
                Ok(tags) => {
                    debug!("Tagged {:?}: {:?}", entry.path(), tags);
                    collection.insert(tags, entry.path());
                }
                Err(e) => warn!("Cannot read tags of {:?}: {}", entry.path(), e),
            }
        }
        Ok(collection)
    }

    /// Place a file in the tree. A later file with the same (disk, track)
    /// position replaces the earlier one.
    pub fn insert(&mut self, tags: TrackTags, path: impl Into<PathBuf>) {
        let artist = self
            .artists
            .entry(normalize(&tags.artist))
            .or_insert_with(|| Artist {
                name: tags.artist.clone(),
                albums: BTreeMap::new(),
            });
        let album = artist
            .albums
            .entry(normalize(&tags.album))
            .or_insert_with(|| Album::new(tags.album.clone()));

        let key = (tags.disk, tags.track);
        if let Some(previous) = album.tracks.get(&key) {
            warn!(
                "{:?} takes disk {} track {} from {:?}",
                tags.title, tags.disk, tags.track, previous.path
            );
            album.by_name.remove(&normalize(&previous.name));
        }
        album.by_name.insert(normalize(&tags.title), key);
        album
            .tracks
            .insert(key, Track::new(tags.title, path, tags.disk, tags.track));
    }

    pub fn artists(&self) -> impl Iterator<Item = &Artist> {
        self.artists.values()
    }

    pub fn artist(&self, name: &str) -> Option<&Artist> {
        self.artists.get(&normalize(name))
    }

    /// Every track together with its artist and album.
    pub fn entries(&self) -> impl Iterator<Item = (&Artist, &Album, &Track)> {
        self.artists.values().flat_map(|artist| {
            artist
                .albums
                .values()
                .flat_map(move |album| album.tracks().map(move |track| (artist, album, track)))
        })
    }

    /// Exclusive handles on every track, for handing out to workers.
    pub fn tracks_mut(&mut self) -> Vec<&mut Track> {
        self.artists
            .values_mut()
            .flat_map(|artist| artist.albums.values_mut())
            .flat_map(|album| album.tracks.values_mut())
            .collect()
    }

    /// Exclusive handles on every album, paired with its artist's name.
    pub(crate) fn albums_mut(&mut self) -> Vec<(&str, &mut Album)> {
        self.artists
            .values_mut()
            .flat_map(|artist| {
                let Artist { name, albums } = artist;
                let name: &str = name;
                albums.values_mut().map(move |album| (name, album))
            })
            .collect()
    }

    /// (artists, albums, tracks)
    pub fn stats(&self) -> (usize, usize, usize) {
        let artists = self.artists.len();
        let albums = self.artists.values().map(|a| a.albums.len()).sum();
        let tracks = self
            .artists
            .values()
            .flat_map(|a| a.albums.values())
            .map(|album| album.tracks.len())
            .sum();
        (artists, albums, tracks)
    }

    pub fn is_empty(&self) -> bool {
        self.artists.is_empty()
    }
}
