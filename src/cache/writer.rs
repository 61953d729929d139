use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{parse_cached_filename, CacheIndex, CachedFile, CACHE_EXTENSION};
use crate::error::PipelineError;
use crate::model::{DownloadJob, Track, TrackKind};

/// Sole writer of the [`CacheIndex`].
///
/// Owned by the cache stage loop; every index mutation goes through here.
pub struct CacheWriter {
    index: Arc<CacheIndex>,
}

impl CacheWriter {
    pub fn new(index: Arc<CacheIndex>) -> Self {
        Self { index }
    }

    fn dir(&self) -> &Path {
        self.index.dir()
    }

    /// Indexes every well-formed `.mp3` already in the cache directory.
    ///
    /// A missing directory is not an error: the cache just starts empty.
    pub async fn warm_up(&self) -> usize {
        let files = match list_cached(self.dir()).await {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "📁 El directorio de caché {} no existe, se omite la carga",
                    self.dir().display()
                );
                return 0;
            }
            Err(e) => {
                error!("❌ No se pudo leer el caché {}: {}", self.dir().display(), e);
                return 0;
            }
        };

        let count = files.len();
        for file in files {
            self.index.insert(file);
        }
        info!("💾 Caché cargado: {} canciones", count);
        count
    }

    /// Finds the file a finished download produced and indexes it.
    ///
    /// yt-dlp sanitises titles, so the file is located by its id suffix
    /// rather than by a predicted name.
    pub async fn reconcile(&self, job: DownloadJob) -> Result<Track, PipelineError> {
        let files = list_cached(self.dir()).await.map_err(|e| {
            error!("❌ No se pudo leer el caché {}: {}", self.dir().display(), e);
            PipelineError::CacheReconcile(job.video_id.clone())
        })?;

        let file = files
            .into_iter()
            .find(|file| file.video_id == job.video_id)
            .ok_or_else(|| {
                error!(
                    video_id = %job.video_id,
                    "❌ Descarga exitosa pero no hay archivo en caché"
                );
                PipelineError::CacheReconcile(job.video_id.clone())
            })?;

        let path = self.index.path_of(&file);
        let title = file.title.clone();
        if self.index.insert(file).is_some() {
            debug!(video_id = %job.video_id, "♻️ Entrada de caché reemplazada");
        }

        Ok(Track::new(title, path, TrackKind::Music, job.requester))
    }
}

async fn list_cached(dir: &Path) -> io::Result<Vec<CachedFile>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(CACHE_EXTENSION) {
            continue;
        }
        match parse_cached_filename(&name) {
            Ok(file) => files.push(file),
            Err(e) => debug!("Ignorando archivo de caché: {}", e),
        }
    }

    Ok(files)
}
