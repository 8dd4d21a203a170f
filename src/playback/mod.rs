//! Paced, strictly sequential release of conversation events.
//!
//! [`state`] is the synchronous sequencer; [`driver`] runs it on a task and
//! applies its effects to an [`AudioPlayer`] and a [`PlaybackSink`].

pub mod audio;
#[cfg(feature = "audio-playback")]
pub mod device;
pub mod driver;
#[cfg(feature = "audio-playback")]
pub mod rodio_player;
pub mod sink;
pub mod state;
pub mod transcript;

pub use audio::{AudioNotifier, AudioPlayer, AudioRef, MockAudioPlayer, NullAudioPlayer};
pub use driver::{
    PlaybackControls, PlaybackDriver, PlaybackHandle, PlaybackOutcome, PlaybackStatus,
};
#[cfg(feature = "audio-playback")]
pub use rodio_player::RodioPlayer;
pub use sink::{CollectorSink, PlaybackRecord, PlaybackSink, TerminalSink};
pub use state::{ClipId, Effect, PlaybackSettings, Sequencer, SequencerState, Signal, TimerId};
pub use transcript::Transcript;
