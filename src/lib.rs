//! # Tapedeck
//!
//! Audio core of a Discord bot: play requests for YouTube links, local files
//! and sound effects go through a staged download pipeline backed by an
//! on-disk cache, and play in request order on one session per guild.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod sources;

pub use config::Config;
pub use pipeline::{Collaborators, PipelineCoordinator};
