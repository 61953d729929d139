//! Songbird-backed voice output and membership checks.

use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::File,
    tracks::{Track as SongbirdTrack, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::output::{TrackEndNotifier, VoiceGate, VoiceOutput};
use crate::error::{AccessError, OutputError};
use crate::model::{SessionRef, Track};

pub struct SongbirdOutput {
    manager: Arc<Songbird>,
    current_tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdOutput {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            current_tracks: DashMap::new(),
        }
    }

    fn with_track<F>(&self, guild_id: GuildId, action: F) -> Result<(), OutputError>
    where
        F: FnOnce(&TrackHandle) -> songbird::tracks::TrackResult<()>,
    {
        let track = self
            .current_tracks
            .get(&guild_id)
            .ok_or(OutputError::NotConnected)?;
        action(track.value()).map_err(|e| OutputError::Track(e.to_string()))
    }
}

#[async_trait]
impl VoiceOutput for SongbirdOutput {
    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        volume: f32,
        on_end: TrackEndNotifier,
    ) -> Result<(), OutputError> {
        let call = self.manager.get(guild_id).ok_or(OutputError::NotConnected)?;

        let input = File::new(track.locator().clone());
        let handle = {
            let mut call = call.lock().await;
            call.play_only(SongbirdTrack::from(input).volume(volume))
        };

        // Un track que falla al decodificar no emite End
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackEndHandler {
                        notifier: on_end.clone(),
                    },
                )
                .map_err(|e| OutputError::Track(e.to_string()))?;
        }

        self.current_tracks.insert(guild_id, handle);
        Ok(())
    }

    async fn set_volume(&self, guild_id: GuildId, volume: f32) -> Result<(), OutputError> {
        self.with_track(guild_id, |track| track.set_volume(volume))
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), OutputError> {
        self.with_track(guild_id, TrackHandle::pause)
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), OutputError> {
        self.with_track(guild_id, TrackHandle::play)
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), OutputError> {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            let _ = track.stop();
        }
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), OutputError> {
        self.current_tracks.remove(&guild_id);
        self.manager.remove(guild_id).await.map_err(|e| {
            debug!("No había conexión de voz en guild {}: {}", guild_id, e);
            OutputError::NotConnected
        })?;
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}

/// Handler para cuando termina una canción
struct TrackEndHandler {
    notifier: TrackEndNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Track terminado, avisando a la sesión");
        self.notifier.notify();
        None
    }
}

pub struct SongbirdGate {
    manager: Arc<Songbird>,
}

impl SongbirdGate {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }

    async fn bot_channel(&self, guild_id: GuildId) -> Option<songbird::id::ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel();
        channel
    }

    async fn connect(&self, guild_id: GuildId, channel: ChannelId) -> Result<(), AccessError> {
        match self.manager.join(guild_id, channel).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(AccessError::JoinFailed)
            }
        }
    }
}

#[async_trait]
impl VoiceGate for SongbirdGate {
    async fn ensure_joined(&self, requester: &SessionRef) -> Result<(), AccessError> {
        let wanted = requester.voice_channel.ok_or(AccessError::NotInVoiceChannel)?;

        match self.bot_channel(requester.guild_id).await {
            Some(current) if current == songbird::id::ChannelId::from(wanted) => Ok(()),
            Some(_) => {
                warn!(user = %requester.user_id, "🚫 Petición desde otro canal de voz");
                Err(AccessError::WrongChannel)
            }
            None => self.connect(requester.guild_id, wanted).await,
        }
    }

    async fn check_same_channel(&self, requester: &SessionRef) -> Result<(), AccessError> {
        let wanted = requester.voice_channel.ok_or(AccessError::NotInVoiceChannel)?;

        match self.bot_channel(requester.guild_id).await {
            Some(current) if current == songbird::id::ChannelId::from(wanted) => Ok(()),
            Some(_) => Err(AccessError::WrongChannel),
            None => Err(AccessError::BotNotConnected),
        }
    }

    async fn join(&self, requester: &SessionRef) -> Result<(), AccessError> {
        let wanted = requester.voice_channel.ok_or(AccessError::NotInVoiceChannel)?;
        self.connect(requester.guild_id, wanted).await
    }
}
