//! # Pipeline
//!
//! Request path from a chat command to a playing track:
//!
//! ```text
//! submit_remote ─┬─ cache hit ───────────────────────────────┐
//!                └─> resolution ─> download ─> cache ─> playback ─> session
//! submit_local / submit_sound_effect ────────────────────────┘
//! ```
//!
//! Each arrow is an unbounded queue with a single consumer loop. Failures are
//! local to one request: the item is dropped, the requester notified, and a
//! [`PipelineEvent::Dropped`] published.

mod events;
mod notice;
mod stages;

pub use events::{PipelineEvent, Stage};
pub use notice::{Notice, Notifier};

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{
    Control, ControlOutcome, LoopMode, SessionRegistry, SessionSettings, VoiceGate, VoiceOutput,
};
use crate::cache::{CacheIndex, CacheWriter};
use crate::config::Config;
use crate::error::{AccessError, ControlError, PipelineError};
use crate::model::{ResolutionRequest, SessionRef, Track, TrackKind};
use crate::sources::{
    extract_video_id, local::fallback_title, Downloader, LocalLibrary, MetadataResolver, TagReader,
};
use stages::{
    run_stage, CacheStage, DownloadStage, Handoff, Outbox, PlaybackStage, ResolutionStage,
    StageContext, Terminal,
};

const EVENT_CAPACITY: usize = 256;

/// External collaborators the pipeline drives.
pub struct Collaborators {
    pub resolver: Arc<dyn MetadataResolver>,
    pub downloader: Arc<dyn Downloader>,
    pub tag_reader: Arc<dyn TagReader>,
    pub output: Arc<dyn VoiceOutput>,
    pub gate: Arc<dyn VoiceGate>,
    pub notifier: Arc<dyn Notifier>,
}

/// Front door for play requests and session controls.
///
/// Owns the cache index, the stage loops and the guild → session map.
pub struct PipelineCoordinator {
    cache: Arc<CacheIndex>,
    library: LocalLibrary,
    tag_reader: Arc<dyn TagReader>,
    gate: Arc<dyn VoiceGate>,
    ctx: StageContext,
    sessions: Arc<SessionRegistry>,
    resolution: Outbox<ResolutionRequest>,
    playback: Outbox<Track>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineCoordinator {
    /// Scans the cache directory, then spawns the four stage loops.
    pub async fn start(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            resolver,
            downloader,
            tag_reader,
            output,
            gate,
            notifier,
        } = collaborators;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let ctx = StageContext {
            notifier: notifier.clone(),
            events: events.clone(),
        };
        let cancel = CancellationToken::new();

        let cache = Arc::new(CacheIndex::new(config.cache_dir.clone()));
        let writer = CacheWriter::new(cache.clone());
        writer.warm_up().await;

        let sessions = Arc::new(SessionRegistry::new(
            SessionSettings {
                default_volume: config.default_volume,
                volume_step: config.volume_step,
            },
            output,
            notifier.clone(),
            cancel.clone(),
        ));

        let (resolution, resolution_rx) = Outbox::channel(Stage::Resolution, events.clone());
        let (download, download_rx) = Outbox::channel(Stage::Download, events.clone());
        let (caching, cache_rx) = Outbox::channel(Stage::Cache, events.clone());
        let (playback, playback_rx) = Outbox::channel(Stage::Playback, events.clone());

        let tasks = vec![
            tokio::spawn(run_stage(
                ResolutionStage {
                    resolver,
                    notifier: notifier.clone(),
                },
                resolution_rx,
                download,
                ctx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(run_stage(
                DownloadStage { downloader },
                download_rx,
                caching,
                ctx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(run_stage(
                CacheStage { writer },
                cache_rx,
                playback.clone(),
                ctx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(run_stage(
                PlaybackStage {
                    sessions: sessions.clone(),
                },
                playback_rx,
                Terminal,
                ctx.clone(),
                cancel.clone(),
            )),
        ];

        info!("🎛️ Pipeline iniciado con {} canciones en caché", cache.len());

        Self {
            cache,
            library: LocalLibrary::new(config.music_dir.clone(), config.sfx_dir.clone()),
            tag_reader,
            gate,
            ctx,
            sessions,
            resolution,
            playback,
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    /// Queues a remote link. Cached videos skip straight to playback.
    pub async fn submit_remote(&self, requester: SessionRef, url: &str) {
        if let Err(e) = self.gate.ensure_joined(&requester).await {
            return self.reject(&requester, e.into()).await;
        }

        let Some(video_id) = extract_video_id(url) else {
            return self
                .reject(&requester, PipelineError::InvalidLink(url.to_string()))
                .await;
        };

        if let Some(file) = self.cache.lookup(&video_id) {
            debug!(video_id = %video_id, "⚡ Cache hit");
            let _ = self.ctx.events.send(PipelineEvent::CacheHit {
                video_id: video_id.clone(),
            });
            let track = Track::new(
                file.title.clone(),
                self.cache.path_of(&file),
                TrackKind::Music,
                requester,
            );
            return self.submit(&self.playback, requester, track).await;
        }

        self.submit(
            &self.resolution,
            requester,
            ResolutionRequest {
                requester,
                url: url.to_string(),
                video_id,
            },
        )
        .await;
    }

    /// Queues a file from the music folder by name.
    pub async fn submit_local(&self, requester: SessionRef, name: &str) {
        if let Err(e) = self.gate.ensure_joined(&requester).await {
            return self.reject(&requester, e.into()).await;
        }

        let Some(path) = self.library.find_music(name).await else {
            return self
                .reject(&requester, PipelineError::LocalFileNotFound(name.to_string()))
                .await;
        };

        let title = self.local_title(&path).await;
        self.submit(
            &self.playback,
            requester,
            Track::new(title, path, TrackKind::Music, requester),
        )
        .await;
    }

    /// Queues a sound effect by name. Sound effects never loop.
    pub async fn submit_sound_effect(&self, requester: SessionRef, name: &str) {
        if let Err(e) = self.gate.ensure_joined(&requester).await {
            return self.reject(&requester, e.into()).await;
        }

        let Some(path) = self.library.find_sound_effect(name).await else {
            return self
                .reject(&requester, PipelineError::SoundEffectNotFound(name.to_string()))
                .await;
        };

        let title = self.local_title(&path).await;
        self.submit(
            &self.playback,
            requester,
            Track::new(title, path, TrackKind::SoundEffect, requester),
        )
        .await;
    }

    pub async fn pause(&self, requester: SessionRef) -> Result<ControlOutcome, ControlError> {
        self.guarded(requester, Control::Pause).await
    }

    pub async fn resume(&self, requester: SessionRef) -> Result<ControlOutcome, ControlError> {
        self.guarded(requester, Control::Resume).await
    }

    pub async fn skip(&self, requester: SessionRef) -> Result<ControlOutcome, ControlError> {
        self.guarded(requester, Control::Skip).await
    }

    pub async fn set_loop(
        &self,
        requester: SessionRef,
        mode: LoopMode,
    ) -> Result<ControlOutcome, ControlError> {
        self.guarded(requester, Control::SetLoop(mode)).await
    }

    /// Ramps the session volume to `percent`; returns once the ramp is done.
    pub async fn set_volume(
        &self,
        requester: SessionRef,
        percent: u32,
    ) -> Result<ControlOutcome, ControlError> {
        self.gate.check_same_channel(&requester).await?;
        let target = u8::try_from(percent)
            .ok()
            .filter(|p| *p <= crate::audio::volume::MAX_VOLUME_PERCENT)
            .ok_or(ControlError::VolumeOutOfRange(percent))?;
        self.sessions
            .control(requester.guild_id, Control::SetVolume(target))
            .await
    }

    /// Current session volume in percent.
    pub async fn volume(&self, requester: SessionRef) -> Result<ControlOutcome, ControlError> {
        self.guarded(requester, Control::Volume).await
    }

    /// Ends the session and leaves voice. Without a session the bot still leaves.
    pub async fn stop(&self, requester: SessionRef) -> Result<ControlOutcome, ControlError> {
        self.gate.check_same_channel(&requester).await?;

        if !self.sessions.has_session(requester.guild_id) {
            self.sessions.leave(requester.guild_id).await;
            return Ok(ControlOutcome::Stopped);
        }
        self.sessions
            .control(requester.guild_id, Control::Stop)
            .await
    }

    /// Joins or moves to the requester's voice channel.
    pub async fn join(&self, requester: SessionRef) -> Result<(), AccessError> {
        self.gate.join(&requester).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.ctx.events.subscribe()
    }

    pub fn cache(&self) -> &Arc<CacheIndex> {
        &self.cache
    }

    pub fn library(&self) -> &LocalLibrary {
        &self.library
    }

    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.sessions.has_session(guild_id)
    }

    /// Text channel the guild's session was started from, if one is active.
    pub fn session_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions.text_channel(guild_id)
    }

    /// Stops every stage loop and session, waiting for them to exit.
    pub async fn shutdown(&self) {
        info!("⚠️ Deteniendo pipeline...");
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        futures::future::join_all(tasks).await;
        self.sessions.shutdown().await;

        info!("✅ Pipeline detenido");
    }

    async fn guarded(
        &self,
        requester: SessionRef,
        control: Control,
    ) -> Result<ControlOutcome, ControlError> {
        self.gate.check_same_channel(&requester).await?;
        self.sessions.control(requester.guild_id, control).await
    }

    async fn local_title(&self, path: &Path) -> String {
        match self.tag_reader.title(path).await {
            Ok(Some(title)) => title,
            Ok(None) => fallback_title(path),
            Err(e) => {
                warn!("⚠️ No se pudieron leer las etiquetas de {}: {:#}", path.display(), e);
                fallback_title(path)
            }
        }
    }

    /// Queues a submission; a closed queue means the pipeline stopped.
    async fn submit<T: Send>(&self, outbox: &Outbox<T>, requester: SessionRef, item: T) {
        if outbox.hand_off(item).is_err() {
            self.reject(&requester, PipelineError::ShuttingDown).await;
        }
    }

    async fn reject(&self, requester: &SessionRef, error: PipelineError) {
        self.ctx.drop_item(Stage::Submission, requester, error).await;
    }
}
