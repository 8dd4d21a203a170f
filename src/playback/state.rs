//! Playback sequencer: the queue, pacing and completion state machine.
//!
//! The sequencer is pure. Signals go in, effects come out; the async driver
//! owns the actual timer and audio handles. Exactly one released event is
//! paced at a time, and the next one is released only when that pacing
//! resolves (audio end, audio error, or timer expiry).

use crate::config::Pace;
use crate::playback::transcript::Transcript;
use crate::stream::ConversationEvent;
use std::collections::VecDeque;
use std::time::Duration;

/// Identifies one audio clip start. Completions for other clips are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipId(pub u64);

/// Identifies one timer start. Expiries of other timers are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// User-adjustable playback settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub audio_enabled: bool,
    pub pace: Pace,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            audio_enabled: crate::defaults::AUDIO_ENABLED,
            pace: Pace::default(),
        }
    }
}

/// Inputs to the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    FrameArrived(ConversationEvent),
    /// The end marker was received; the channel is closed.
    StreamEnded,
    /// The channel broke before the end marker. No reconnect follows.
    StreamFailed(String),
    AudioEnded(ClipId),
    AudioErrored { clip: ClipId, reason: String },
    TimerFired(TimerId),
    SetAudioEnabled(bool),
    ToggleAudio,
    /// Switch between the fast and slow presets. Ignored while audio is on.
    TogglePace,
    Teardown,
}

/// Outputs of the sequencer, applied by the driver in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Display(ConversationEvent),
    StopAudio,
    PlayAudio { clip: ClipId, audio: String },
    StartTimer { timer: TimerId, after: Duration },
    CancelTimer,
    SettingsChanged(PlaybackSettings),
    Completed,
    Stalled(String),
}

/// Observable sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Nothing in flight; waiting for frames.
    Idle,
    AwaitingAudio,
    AwaitingTimer,
    /// The channel is closed but an event is still being paced.
    Draining,
    Complete,
    /// The channel failed and everything received has been played.
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingAudio(ClipId),
    AwaitingTimer(TimerId),
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamStatus {
    Open,
    Ended,
    Failed(String),
    TornDown,
}

/// Pure playback state machine: releases one queued event at a time and
/// reports what the driver must do next as [`Effect`]s.
#[derive(Debug)]
pub struct Sequencer {
    queue: VecDeque<ConversationEvent>,
    transcript: Transcript,
    phase: Phase,
    stream: StreamStatus,
    settings: PlaybackSettings,
    next_id: u64,
}

impl Sequencer {
    pub fn new(settings: PlaybackSettings) -> Self {
        Self {
            queue: VecDeque::new(),
            transcript: Transcript::default(),
            phase: Phase::Idle,
            stream: StreamStatus::Open,
            settings,
            next_id: 0,
        }
    }

    pub fn settings(&self) -> PlaybackSettings {
        self.settings
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    /// Events received but not yet released.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// True only once the queue drained after the end marker was observed.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn is_torn_down(&self) -> bool {
        self.stream == StreamStatus::TornDown
    }

    pub fn state(&self) -> SequencerState {
        match (&self.phase, &self.stream) {
            (Phase::Complete, _) => SequencerState::Complete,
            (Phase::Idle, StreamStatus::Failed(_)) => SequencerState::Stalled,
            (Phase::Idle, _) => SequencerState::Idle,
            (_, StreamStatus::Ended | StreamStatus::Failed(_)) => SequencerState::Draining,
            (Phase::AwaitingAudio(_), _) => SequencerState::AwaitingAudio,
            (Phase::AwaitingTimer(_), _) => SequencerState::AwaitingTimer,
        }
    }

    /// Apply one signal and return the effects it causes.
    pub fn handle(&mut self, signal: Signal) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.is_torn_down() {
            tracing::debug!("sequencer torn down, dropping {signal:?}");
            return effects;
        }

        match signal {
            Signal::FrameArrived(event) => {
                if self.stream != StreamStatus::Open {
                    tracing::warn!("frame arrived after the channel closed; dropped");
                    return effects;
                }
                self.queue.push_back(event);
                if self.phase == Phase::Idle {
                    self.dequeue_and_display(&mut effects);
                }
            }
            Signal::StreamEnded => {
                if self.stream != StreamStatus::Open {
                    return effects;
                }
                self.stream = StreamStatus::Ended;
                if self.phase == Phase::Idle {
                    self.dequeue_and_display(&mut effects);
                }
            }
            Signal::StreamFailed(reason) => {
                if self.stream != StreamStatus::Open {
                    return effects;
                }
                tracing::warn!("conversation stream failed: {reason}");
                self.stream = StreamStatus::Failed(reason.clone());
                if self.phase == Phase::Idle {
                    effects.push(Effect::Stalled(reason));
                }
            }
            Signal::AudioEnded(clip) => {
                if self.phase == Phase::AwaitingAudio(clip) {
                    self.dequeue_and_display(&mut effects);
                } else {
                    tracing::debug!("stale audio end for {clip:?}");
                }
            }
            Signal::AudioErrored { clip, reason } => {
                if self.phase == Phase::AwaitingAudio(clip) {
                    tracing::warn!("audio playback failed, continuing: {reason}");
                    self.dequeue_and_display(&mut effects);
                } else {
                    tracing::debug!("stale audio error for {clip:?}: {reason}");
                }
            }
            Signal::TimerFired(timer) => {
                if self.phase == Phase::AwaitingTimer(timer) {
                    self.dequeue_and_display(&mut effects);
                } else {
                    tracing::debug!("stale timer {timer:?}");
                }
            }
            Signal::SetAudioEnabled(enabled) => self.set_audio_enabled(enabled, &mut effects),
            Signal::ToggleAudio => {
                let enabled = !self.settings.audio_enabled;
                self.set_audio_enabled(enabled, &mut effects);
            }
            Signal::TogglePace => {
                if self.settings.audio_enabled {
                    tracing::debug!("pace is only adjustable while audio is off");
                } else {
                    self.settings.pace = self.settings.pace.toggled();
                    effects.push(Effect::SettingsChanged(self.settings));
                }
            }
            Signal::Teardown => effects.extend(self.teardown()),
        }
        effects
    }

    /// Cancel pacing, stop audio and drop everything. Safe to call repeatedly.
    pub fn teardown(&mut self) -> Vec<Effect> {
        self.queue.clear();
        self.transcript.clear();
        self.phase = Phase::Idle;
        self.stream = StreamStatus::TornDown;
        vec![Effect::CancelTimer, Effect::StopAudio]
    }

    /// Release the head of the queue, or settle completion when it is empty.
    fn dequeue_and_display(&mut self, effects: &mut Vec<Effect>) {
        if matches!(self.phase, Phase::AwaitingTimer(_)) {
            effects.push(Effect::CancelTimer);
        }
        self.phase = Phase::Idle;

        let Some(event) = self.queue.pop_front() else {
            match &self.stream {
                StreamStatus::Ended => {
                    self.phase = Phase::Complete;
                    tracing::debug!("queue drained after end marker; complete");
                    effects.push(Effect::Completed);
                }
                StreamStatus::Failed(reason) => effects.push(Effect::Stalled(reason.clone())),
                StreamStatus::Open | StreamStatus::TornDown => {}
            }
            return;
        };

        self.transcript.push(event.clone());
        let audio = event.audio().map(str::to_string);
        effects.push(Effect::Display(event));

        match audio {
            Some(audio) if self.settings.audio_enabled => {
                let clip = ClipId(self.next_id());
                effects.push(Effect::StopAudio);
                effects.push(Effect::PlayAudio { clip, audio });
                self.phase = Phase::AwaitingAudio(clip);
            }
            _ => self.start_timer(effects),
        }
    }

    fn start_timer(&mut self, effects: &mut Vec<Effect>) {
        let timer = TimerId(self.next_id());
        effects.push(Effect::StartTimer {
            timer,
            after: self.settings.pace.interval(),
        });
        self.phase = Phase::AwaitingTimer(timer);
    }

    fn set_audio_enabled(&mut self, enabled: bool, effects: &mut Vec<Effect>) {
        if self.settings.audio_enabled == enabled {
            return;
        }
        self.settings.audio_enabled = enabled;
        effects.push(Effect::SettingsChanged(self.settings));

        // The current message stays displayed; it is timer-paced from here on.
        if !enabled && matches!(self.phase, Phase::AwaitingAudio(_)) {
            effects.push(Effect::StopAudio);
            self.start_timer(effects);
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
