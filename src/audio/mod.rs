//! # Audio Module
//!
//! Per-guild playback for the bot.
//!
//! ### [`sequencer`] - Playback Sessions
//! - One actor task per guild owning its queue, loop mode and volume
//! - Track-end events carry a generation so stale ends are ignored
//!
//! ### [`queue`] - Queue State
//! - Ordered tracks plus the active one, with song/playlist loop modes
//!
//! ### [`output`] / [`voice`] - Voice Backend
//! - The [`VoiceOutput`] and [`VoiceGate`] seams and their Songbird implementation

pub mod output;
pub mod queue;
pub mod sequencer;
pub mod voice;
pub mod volume;

pub use output::{TrackEndNotifier, VoiceGate, VoiceOutput};
pub use queue::{LoopMode, SessionQueue};
pub use sequencer::{Control, ControlOutcome, PlaybackState, SessionRegistry, SessionSettings};
pub use voice::{SongbirdGate, SongbirdOutput};
