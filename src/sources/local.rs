use anyhow::Result;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use tracing::debug;

use super::TagReader;

/// Extensions tried, in order, when a name is given without one.
const AUDIO_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// Reads title tags with symphonia's probe, on the blocking pool.
#[derive(Debug, Default)]
pub struct SymphoniaTagReader;

impl SymphoniaTagReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TagReader for SymphoniaTagReader {
    async fn title(&self, path: &Path) -> Result<Option<String>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_title(&path)).await?
    }
}

fn read_title(path: &Path) -> Result<Option<String>> {
    let file = std::fs::File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    // Container-level tags (ID3v2 for mp3) first, then the format reader's own
    if let Some(metadata) = probed.metadata.get() {
        if let Some(title) = metadata.current().and_then(title_of) {
            return Ok(Some(title));
        }
    }

    let metadata = probed.format.metadata();
    let title = metadata.current().and_then(title_of);
    debug!("🏷️ Tag de {}: {:?}", path.display(), title);
    Ok(title)
}

fn title_of(revision: &MetadataRevision) -> Option<String> {
    revision
        .tags()
        .iter()
        .find(|tag| matches!(tag.std_key, Some(StandardTagKey::TrackTitle)))
        .map(|tag| tag.value.to_string())
        .filter(|title| !title.trim().is_empty())
}

/// The music and sound-effect folders local plays are looked up in.
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    music_dir: PathBuf,
    sfx_dir: PathBuf,
}

impl LocalLibrary {
    pub fn new(music_dir: PathBuf, sfx_dir: PathBuf) -> Self {
        Self { music_dir, sfx_dir }
    }

    pub async fn find_music(&self, name: &str) -> Option<PathBuf> {
        find_in(&self.music_dir, name).await
    }

    pub async fn find_sound_effect(&self, name: &str) -> Option<PathBuf> {
        find_in(&self.sfx_dir, name).await
    }
}

/// Looks for `<dir>/<name>.mp3`, then `.wav`; a name that already carries one
/// of those extensions is tried as-is. Names that would leave `dir` never match.
async fn find_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let name = name.trim();
    if name.is_empty() || !stays_inside(Path::new(name)) {
        return None;
    }

    let has_audio_extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    let mut candidates = Vec::new();
    if has_audio_extension {
        candidates.push(dir.join(name));
    }
    candidates.extend(
        AUDIO_EXTENSIONS
            .iter()
            .map(|extension| dir.join(format!("{}.{}", name, extension))),
    );

    for candidate in candidates {
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Some(candidate);
        }
    }
    None
}

fn stays_inside(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Title for a local file without a usable tag.
pub fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
