//! # Cache Module
//!
//! On-disk audio cache keyed by video id.
//!
//! The cache directory is flat: every download lands as
//! `<title>_<videoID>.mp3`. The id is fixed-width, so a bare filename is
//! enough to recover both the id and the title:
//!
//! ```text
//! MySong_dQw4w9WgXcQ.mp3
//! └─┬──┘│└────┬────┘└┬─┘
//!  title │  video id  extension
//!        separator
//! ```
//!
//! [`CacheIndex`] is the in-memory view of that directory and the only
//! de-duplication mechanism against re-downloading the same video. It is
//! written exclusively by [`CacheWriter`], which runs on the cache stage;
//! everyone else only reads.

pub mod writer;

use dashmap::DashMap;
use std::path::{Path, PathBuf};

use crate::error::FilenameError;
use crate::sources::{is_video_id, VIDEO_ID_LEN};

pub use writer::CacheWriter;

pub const CACHE_EXTENSION: &str = ".mp3";
const SEPARATOR: char = '_';

/// One cached download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub video_id: String,
    pub title: String,
    pub filename: String,
}

/// Splits a cache filename into title and video id.
///
/// The last 11 characters before `.mp3` are the id and the character before
/// them must be `_`; everything in front of that is the title (which may itself
/// contain `_`).
pub fn parse_cached_filename(filename: &str) -> Result<CachedFile, FilenameError> {
    let stem = filename
        .strip_suffix(CACHE_EXTENSION)
        .ok_or_else(|| FilenameError::NotMp3(filename.to_string()))?;

    if stem.len() < VIDEO_ID_LEN + 1 {
        return Err(FilenameError::TooShort(filename.to_string()));
    }

    let split = stem.len() - VIDEO_ID_LEN;
    if !stem.is_char_boundary(split) {
        return Err(FilenameError::InvalidVideoId(filename.to_string()));
    }

    let (head, video_id) = stem.split_at(split);
    if !is_video_id(video_id) {
        return Err(FilenameError::InvalidVideoId(filename.to_string()));
    }

    let title = head
        .strip_suffix(SEPARATOR)
        .ok_or_else(|| FilenameError::MissingSeparator(filename.to_string()))?;

    Ok(CachedFile {
        video_id: video_id.to_string(),
        title: title.to_string(),
        filename: filename.to_string(),
    })
}

/// The filename a download of `video_id` titled `title` is stored under.
pub fn cached_filename(title: &str, video_id: &str) -> String {
    format!("{}{}{}{}", title, SEPARATOR, video_id, CACHE_EXTENSION)
}

/// Which video ids already have a local file.
#[derive(Debug)]
pub struct CacheIndex {
    dir: PathBuf,
    entries: DashMap<String, CachedFile>,
}

impl CacheIndex {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            entries: DashMap::new(),
        }
    }

    pub fn lookup(&self, video_id: &str) -> Option<CachedFile> {
        self.entries.get(video_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.entries.contains_key(video_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file: &CachedFile) -> PathBuf {
        self.dir.join(&file.filename)
    }

    /// Inserts or overwrites the entry for `file.video_id`. Writer only.
    pub(crate) fn insert(&self, file: CachedFile) -> Option<CachedFile> {
        self.entries.insert(file.video_id.clone(), file)
    }
}
