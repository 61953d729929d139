use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::model::{Track, TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Replay the finished track.
    Song,
    /// Re-append the finished track to the tail.
    Playlist,
}

impl FromStr for LoopMode {
    type Err = ();

    fn from_str(option: &str) -> Result<Self, Self::Err> {
        match option.trim().to_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "song" => Ok(LoopMode::Song),
            "playlist" | "queue" | "q" => Ok(LoopMode::Playlist),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Off => write!(f, "off"),
            LoopMode::Song => write!(f, "song"),
            LoopMode::Playlist => write!(f, "playlist"),
        }
    }
}

/// Ordered tracks of one session plus the one currently playing.
///
/// Pure state: the sequencer decides when to call [`advance`](Self::advance)
/// and what to do with the result. Sound effects are never repeated by a
/// loop mode.
#[derive(Debug, Default)]
pub struct SessionQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final de la cola
    pub fn push(&mut self, track: Track) {
        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
    }

    /// Moves the head into `current` when nothing is active.
    pub fn start(&mut self) -> Option<&Track> {
        if self.current.is_none() {
            self.current = self.items.pop_front();
        }
        self.current.as_ref()
    }

    /// The active track ended on its own.
    pub fn advance(&mut self) -> Option<&Track> {
        self.finish(true)
    }

    /// The active track was skipped: song loop does not hold it.
    pub fn skip(&mut self) -> Option<&Track> {
        self.finish(false)
    }

    /// Discards the active track without looping it (it could not be played).
    pub fn drop_current(&mut self) -> Option<&Track> {
        if let Some(dropped) = self.current.take() {
            debug!("🗑️ Descartado: {}", dropped.title());
        }
        self.current = self.items.pop_front();
        self.current.as_ref()
    }

    fn finish(&mut self, honour_song_loop: bool) -> Option<&Track> {
        if let Some(finished) = self.current.take() {
            let loops = finished.kind() == TrackKind::Music;
            match self.loop_mode {
                LoopMode::Song if honour_song_loop && loops => {
                    debug!("🔂 Repitiendo track: {}", finished.title());
                    self.current = Some(finished);
                    return self.current.as_ref();
                }
                LoopMode::Playlist if loops => {
                    debug!("🔁 Track agregado al final por loop de cola: {}", finished.title());
                    self.items.push_back(finished);
                }
                _ => {}
            }
        }

        self.current = self.items.pop_front();
        if self.current.is_none() {
            info!("📭 Cola vacía, no hay siguiente track");
        }
        self.current.as_ref()
    }

    /// Limpia la cola y el track actual
    pub fn clear(&mut self) {
        self.items.clear();
        self.current = None;
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    /// Active track first, then the pending ones in play order.
    pub fn tracks(&self) -> Vec<&Track> {
        self.current.iter().chain(self.items.iter()).collect()
    }

    pub fn pending(&self) -> usize {
        self.items.len()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::Song => info!("🔂 Repetir canción activado"),
            LoopMode::Playlist => info!("🔁 Repetir cola activado"),
        }
    }
}
