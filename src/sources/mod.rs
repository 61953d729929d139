//! # Sources
//!
//! Turning user input into something the pipeline can fetch or play:
//!
//! - [`extract_video_id`] reads the 11-char video id out of a link
//! - [`select_audio_format`] picks the audio-only stream to download
//! - [`MetadataResolver`], [`Downloader`] and [`TagReader`] are the seams to
//!   yt-dlp and the tag reader; production impls live in [`ytdlp`] and [`local`]

pub mod local;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::model::{DownloadJob, MediaFormat, MediaInfo};

pub use local::{LocalLibrary, SymphoniaTagReader};
pub use ytdlp::{CommandDownloader, YtDlpResolver};

/// Length of a canonical video id.
pub const VIDEO_ID_LEN: usize = 11;

/// Opus audio, preferred.
pub const PREFERRED_AUDIO_FORMAT: &str = "251";
/// m4a audio, always offered.
pub const FALLBACK_AUDIO_FORMAT: &str = "140";

/// Link markers in the order they are tried. The id is the 11 chars after the marker.
const VIDEO_ID_MARKERS: [&str; 3] = ["?v=", "&v=", ".be/"];

const REMOTE_HOSTS: [&str; 5] = [
    "www.youtube.com",
    "youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Remote metadata lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<MediaInfo>;
}

/// Fetches a job's chosen format into the cache directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, job: &DownloadJob) -> Result<()>;
}

/// Reads the title tag of a local audio file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TagReader: Send + Sync {
    async fn title(&self, path: &Path) -> Result<Option<String>>;
}

/// Extracts the video id from a link.
///
/// Markers are tried in order (`?v=`, `&v=`, `.be/`); the first one found
/// past the start of the string decides. It must be followed by 11 id
/// characters (`A-Z a-z 0-9 _ -`), otherwise there is no id.
pub fn extract_video_id(url: &str) -> Option<String> {
    let (position, marker) = VIDEO_ID_MARKERS.iter().find_map(|marker| {
        url.find(marker)
            .filter(|position| *position > 0)
            .map(|position| (position, *marker))
    })?;

    let candidate = url.get(position + marker.len()..)?.get(..VIDEO_ID_LEN)?;
    is_video_id(candidate).then(|| candidate.to_string())
}

pub fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Picks the audio format to download: `251` when offered, `140` otherwise.
pub fn select_audio_format(formats: &[MediaFormat]) -> &'static str {
    if formats.iter().any(|f| f.format_id == PREFERRED_AUDIO_FORMAT) {
        PREFERRED_AUDIO_FORMAT
    } else {
        FALLBACK_AUDIO_FORMAT
    }
}

/// Whether the `play` argument should go through the remote pipeline.
pub fn is_remote_link(input: &str) -> bool {
    match url::Url::parse(input) {
        Ok(parsed) => {
            parsed.scheme() == "https"
                && parsed
                    .host_str()
                    .map(|host| REMOTE_HOSTS.contains(&host))
                    .unwrap_or(false)
        }
        Err(_) => false,
    }
}
