//! Audio clip references and the player seam.

use crate::error::{PrevisitError, Result};
use crate::playback::state::{ClipId, Signal};
use base64::Engine;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Where a clip's bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioRef {
    /// Decoded `data:` URI payload.
    Inline { mime: String, bytes: Vec<u8> },
    /// Absolute or server-relative URL.
    Remote(String),
}

impl AudioRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let Some(rest) = reference.strip_prefix("data:") else {
            if reference.is_empty() {
                return Err(PrevisitError::AudioSource {
                    message: "empty audio reference".to_string(),
                });
            }
            return Ok(AudioRef::Remote(reference.to_string()));
        };

        let (header, payload) = rest.split_once(',').ok_or_else(|| PrevisitError::AudioSource {
            message: "data URI without payload".to_string(),
        })?;
        let Some(mime) = header.strip_suffix(";base64") else {
            return Err(PrevisitError::AudioSource {
                message: format!("unsupported data URI encoding '{header}'"),
            });
        };
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| PrevisitError::AudioSource {
                message: format!("invalid base64 audio: {e}"),
            })?;

        Ok(AudioRef::Inline {
            mime: if mime.is_empty() {
                "application/octet-stream".to_string()
            } else {
                mime.to_string()
            },
            bytes,
        })
    }

    pub fn describe(&self) -> String {
        match self {
            AudioRef::Inline { mime, bytes } => format!("{mime}, {} bytes", bytes.len()),
            AudioRef::Remote(url) => url.clone(),
        }
    }
}

/// Reports the outcome of one clip back to the playback driver.
#[derive(Debug, Clone)]
pub struct AudioNotifier {
    clip: ClipId,
    tx: mpsc::UnboundedSender<Signal>,
}

impl AudioNotifier {
    pub fn new(clip: ClipId, tx: mpsc::UnboundedSender<Signal>) -> Self {
        Self { clip, tx }
    }

    pub fn clip(&self) -> ClipId {
        self.clip
    }

    pub fn ended(&self) {
        self.send(Signal::AudioEnded(self.clip));
    }

    pub fn errored(&self, reason: impl Into<String>) {
        self.send(Signal::AudioErrored {
            clip: self.clip,
            reason: reason.into(),
        });
    }

    fn send(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!("playback driver gone; clip {:?} outcome dropped", self.clip);
        }
    }
}

/// Plays one clip at a time.
///
/// `play` must return promptly; the outcome is reported through the
/// notifier. `stop` must be idempotent and must suppress the stopped clip's
/// notification where it can (a late one is harmless, the sequencer ignores
/// stale clips).
pub trait AudioPlayer: Send {
    fn play(&mut self, audio: AudioRef, notifier: AudioNotifier) -> Result<()>;

    fn stop(&mut self);

    fn is_playing(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Player for builds or setups without an output device.
#[derive(Debug, Default)]
pub struct NullAudioPlayer;

impl AudioPlayer for NullAudioPlayer {
    fn play(&mut self, _audio: AudioRef, _notifier: AudioNotifier) -> Result<()> {
        Err(PrevisitError::AudioPlayback {
            message: "no audio backend available".to_string(),
        })
    }

    fn stop(&mut self) {}

    fn is_playing(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// What a [`MockAudioPlayer`] observed.
#[derive(Debug, Default, Clone)]
pub struct MockAudioLog {
    pub played: Vec<AudioRef>,
    pub stops: usize,
    /// Plays that started while another clip was still playing.
    pub overlaps: usize,
    playing: Option<ClipId>,
}

/// Mock audio player for testing
///
/// Clips "play" for a fixed duration on the tokio clock, so tests with a
/// paused clock stay deterministic.
#[derive(Debug, Clone)]
pub struct MockAudioPlayer {
    duration: Duration,
    fail_start: bool,
    fail_playback: bool,
    log: Arc<Mutex<MockAudioLog>>,
    task: Option<Arc<JoinHandle<()>>>,
}

impl Default for MockAudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAudioPlayer {
    pub fn new() -> Self {
        Self {
            duration: Duration::from_millis(2500),
            fail_start: false,
            fail_playback: false,
            log: Arc::new(Mutex::new(MockAudioLog::default())),
            task: None,
        }
    }

    /// How long each clip plays before reporting its end.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// `play` itself fails.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Clips start but report a playback error instead of ending.
    pub fn with_playback_failure(mut self) -> Self {
        self.fail_playback = true;
        self
    }

    /// Shared handle to the observation log.
    pub fn log(&self) -> Arc<Mutex<MockAudioLog>> {
        Arc::clone(&self.log)
    }
}

impl AudioPlayer for MockAudioPlayer {
    fn play(&mut self, audio: AudioRef, notifier: AudioNotifier) -> Result<()> {
        if self.fail_start {
            return Err(PrevisitError::AudioPlayback {
                message: "mock audio start failure".to_string(),
            });
        }

        let clip = notifier.clip();
        if let Ok(mut log) = self.log.lock() {
            if log.playing.is_some() {
                log.overlaps += 1;
            }
            log.playing = Some(clip);
            log.played.push(audio);
        }

        let log = Arc::clone(&self.log);
        let duration = self.duration;
        let fail = self.fail_playback;
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Ok(mut log) = log.lock()
                && log.playing == Some(clip)
            {
                log.playing = None;
            }
            if fail {
                notifier.errored("mock playback failure");
            } else {
                notifier.ended();
            }
        });
        self.task = Some(Arc::new(task));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Ok(mut log) = self.log.lock() {
            log.stops += 1;
            log.playing = None;
        }
    }

    fn is_playing(&self) -> bool {
        self.log.lock().map(|log| log.playing.is_some()).unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mpeg_data_uri() {
        let audio = AudioRef::parse("data:audio/mpeg;base64,SUQz").unwrap();
        assert_eq!(
            audio,
            AudioRef::Inline {
                mime: "audio/mpeg".to_string(),
                bytes: b"ID3".to_vec()
            }
        );
    }

    #[test]
    fn test_parse_wav_data_uri_with_line_breaks() {
        let audio = AudioRef::parse("data:audio/wav;base64,UklG\nRg==").unwrap();
        let AudioRef::Inline { mime, bytes } = audio else {
            panic!("expected inline audio");
        };
        assert_eq!(mime, "audio/wav");
        assert_eq!(bytes, b"RIFF");
    }

    #[test]
    fn test_parse_url_reference() {
        assert_eq!(
            AudioRef::parse("/audio/q1.mp3").unwrap(),
            AudioRef::Remote("/audio/q1.mp3".to_string())
        );
    }

    #[test]
    fn test_reject_non_base64_data_uri() {
        assert!(AudioRef::parse("data:audio/mpeg,plain").is_err());
    }

    #[test]
    fn test_describe_names_source() {
        let inline = AudioRef::parse("data:audio/mpeg;base64,SUQz").unwrap();
        assert_eq!(inline.describe(), "audio/mpeg, 3 bytes");
        let remote = AudioRef::parse("/audio/q1.mp3").unwrap();
        assert_eq!(remote.describe(), "/audio/q1.mp3");
    }

    #[test]
    fn test_reject_bad_base64() {
        assert!(AudioRef::parse("data:audio/mpeg;base64,@@@").is_err());
    }

    #[test]
    fn test_reject_empty_reference() {
        assert!(AudioRef::parse("   ").is_err());
    }

    #[test]
    fn test_null_player_refuses_to_play() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut player = NullAudioPlayer;
        let audio = AudioRef::Remote("x".to_string());
        assert!(player.play(audio, AudioNotifier::new(ClipId(1), tx)).is_err());
        assert!(!player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_player_reports_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = MockAudioPlayer::new().with_duration(Duration::from_millis(500));
        let audio = AudioRef::Remote("clip".to_string());
        player.play(audio, AudioNotifier::new(ClipId(7), tx)).unwrap();
        assert!(player.is_playing());

        assert_eq!(rx.recv().await, Some(Signal::AudioEnded(ClipId(7))));
        assert!(!player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_player_stop_suppresses_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = MockAudioPlayer::new();
        let audio = AudioRef::Remote("clip".to_string());
        player.play(audio, AudioNotifier::new(ClipId(1), tx)).unwrap();
        player.stop();
        player.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(player.log().lock().unwrap().stops, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_player_playback_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = MockAudioPlayer::new().with_playback_failure();
        let audio = AudioRef::Remote("clip".to_string());
        player.play(audio, AudioNotifier::new(ClipId(3), tx)).unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(Signal::AudioErrored { clip: ClipId(3), .. })
        ));
    }
}
