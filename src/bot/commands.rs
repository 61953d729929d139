//! Prefix commands and the replies to session controls.

use crate::audio::{ControlOutcome, LoopMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    SoundEffect(String),
    Volume,
    SetVolume(u32),
    Join,
    Skip,
    Loop(LoopMode),
    Pause,
    Resume,
    Stop,
    /// Known command, unusable arguments: reply with the text.
    Usage(&'static str),
}

impl Command {
    /// Parses `<prefix><name> [args]`. Anything else is not a command.
    pub fn parse(prefix: &str, content: &str) -> Option<Command> {
        let body = content.trim().strip_prefix(prefix)?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "p" | "play" if args.is_empty() => {
                Command::Usage("I need a Youtube link or file path to play.")
            }
            "p" | "play" => Command::Play(args.to_string()),
            "s" | "sfx" if args.is_empty() => Command::Usage("Which sound effect?"),
            "s" | "sfx" => Command::SoundEffect(args.to_string()),
            "v" | "vol" | "volume" if args.is_empty() => Command::Volume,
            "v" | "vol" | "volume" => match args.parse::<u32>() {
                Ok(percent) => Command::SetVolume(percent),
                Err(_) => Command::Usage("Please enter a number ranging from 0 to 100."),
            },
            "j" | "join" => Command::Join,
            "skip" | "next" => Command::Skip,
            "loop" => match args.parse::<LoopMode>() {
                Ok(mode) => Command::Loop(mode),
                Err(()) => Command::Usage("Loop options are: off, song, playlist."),
            },
            "pause" => Command::Pause,
            "resume" | "res" | "cont" | "continue" => Command::Resume,
            "stop" | "leave" | "l" => Command::Stop,
            _ => return None,
        };
        Some(command)
    }
}

/// Chat reply for a successful session control.
pub fn outcome_message(outcome: &ControlOutcome) -> String {
    match outcome {
        ControlOutcome::Paused => "Paused. :pause_button:".to_string(),
        ControlOutcome::Resumed => "Resuming. :arrow_forward:".to_string(),
        ControlOutcome::Skipped { next: Some(title) } => format!("Skipped. Up next: {}", title),
        ControlOutcome::Skipped { next: None } => "Skipped. The queue is empty now.".to_string(),
        ControlOutcome::LoopSet(LoopMode::Off) => "Looping is off.".to_string(),
        ControlOutcome::LoopSet(LoopMode::Song) => "Looping the current song. :repeat_one:".to_string(),
        ControlOutcome::LoopSet(LoopMode::Playlist) => "Looping the queue. :repeat:".to_string(),
        ControlOutcome::VolumeChanged { from, to } => {
            format!("Changed the volume from {}% to {}%.", from, to)
        }
        ControlOutcome::Volume(percent) => format!("The volume is at {}%.", percent),
        ControlOutcome::Stopped => "Bye! :wave:".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_aliases() {
        assert_eq!(
            Command::parse("!", "!p https://youtu.be/dQw4w9WgXcQ"),
            Some(Command::Play("https://youtu.be/dQw4w9WgXcQ".into()))
        );
        assert_eq!(
            Command::parse("!", "!sfx  airhorn "),
            Some(Command::SoundEffect("airhorn".into()))
        );
        assert_eq!(Command::parse("!", "!next"), Some(Command::Skip));
        assert_eq!(Command::parse("!", "!cont"), Some(Command::Resume));
        assert_eq!(Command::parse("!", "!l"), Some(Command::Stop));
        assert_eq!(Command::parse("!", "!J"), Some(Command::Join));
    }

    #[test]
    fn test_volume_query_and_set() {
        assert_eq!(Command::parse("!", "!vol"), Some(Command::Volume));
        assert_eq!(Command::parse("!", "!v 40"), Some(Command::SetVolume(40)));
        assert_eq!(Command::parse("!", "!volume 140"), Some(Command::SetVolume(140)));
        assert!(matches!(
            Command::parse("!", "!volume loud"),
            Some(Command::Usage(_))
        ));
    }

    #[test]
    fn test_loop_modes() {
        assert_eq!(
            Command::parse("!", "!loop q"),
            Some(Command::Loop(LoopMode::Playlist))
        );
        assert_eq!(
            Command::parse("!", "!loop off"),
            Some(Command::Loop(LoopMode::Off))
        );
        assert!(matches!(Command::parse("!", "!loop"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_non_commands() {
        assert_eq!(Command::parse("!", "airhorn"), None);
        assert_eq!(Command::parse("!", "!dance"), None);
        assert_eq!(Command::parse("$", "!play x"), None);
        assert!(matches!(Command::parse("!", "!play"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(
            outcome_message(&ControlOutcome::VolumeChanged { from: 70, to: 40 }),
            "Changed the volume from 70% to 40%."
        );
        assert_eq!(
            outcome_message(&ControlOutcome::Skipped {
                next: Some("B".into())
            }),
            "Skipped. Up next: B"
        );
    }
}
