use crate::config::Config;
use rodio::OutputStreamBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackSoundType {
    Start,
    Stop,
    Match,
}

/// Short sounds played on session transitions
pub struct AudioFeedback {
    paths: HashMap<FeedbackSoundType, PathBuf>,
}

impl AudioFeedback {
    pub fn new(paths: HashMap<FeedbackSoundType, PathBuf>) -> Self {
        Self { paths }
    }

    pub fn from_config(config: &Config) -> Self {
        if !config.audio_feedback {
            return Self::new(HashMap::new());
        }

        Self::new(HashMap::from([
            (FeedbackSoundType::Start, PathBuf::from(&config.start_sound_path)),
            (FeedbackSoundType::Stop, PathBuf::from(&config.stop_sound_path)),
            (FeedbackSoundType::Match, PathBuf::from(&config.match_sound_path)),
        ]))
    }

    /// Play in the background; the caller never waits for the sound to end
    pub fn play(&self, sound_type: FeedbackSoundType) {
        if let Some(path) = self.paths.get(&sound_type).cloned() {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = play_sound_blocking(&path) {
                    tracing::warn!("Failed to play sound {}: {}", path.display(), e);
                }
            });
        }
    }
}

fn play_sound_blocking(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(path)
        .or_else(|_| File::open(PathBuf::from("assets").join(path)))
        .or_else(|_| File::open(PathBuf::from("/usr/share/qr2wa/assets").join(path)))?;

    let stream_handle = OutputStreamBuilder::open_default_stream()?;
    let sink = rodio::play(stream_handle.mixer(), BufReader::new(file))?;
    sink.sleep_until_end();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_feedback_has_no_sounds() {
        let feedback = AudioFeedback::from_config(&Config::default());
        assert!(feedback.paths.is_empty());
    }

    #[test]
    fn test_enabled_feedback_maps_every_sound() {
        let config = Config {
            audio_feedback: true,
            ..Config::default()
        };
        let feedback = AudioFeedback::from_config(&config);

        assert_eq!(
            feedback.paths.get(&FeedbackSoundType::Match),
            Some(&PathBuf::from("match.opus"))
        );
        assert_eq!(feedback.paths.len(), 3);
    }
}
