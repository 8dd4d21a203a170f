//! Async shell around the sequencer.
//!
//! One task owns the sequencer, the pacing timer, the audio player, the
//! report tracker and the sink. Every input (frames, audio outcomes, user
//! controls) arrives on one unbounded channel, so signals are handled
//! strictly one at a time and no state is shared across tasks.

use crate::error::{PrevisitError, Result};
use crate::playback::audio::{AudioNotifier, AudioPlayer, AudioRef};
use crate::playback::sink::PlaybackSink;
use crate::playback::state::{Effect, PlaybackSettings, Sequencer, Signal, TimerId};
use crate::playback::transcript::Transcript;
use crate::report::ReportTracker;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;

/// How a playback run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Every event was played after the end marker arrived.
    Complete,
    /// The channel failed; everything received was played.
    Stalled(String),
    /// Torn down before completion.
    TornDown,
}

/// Final state handed back by [`PlaybackHandle::finished`].
#[derive(Debug)]
pub struct PlaybackOutcome {
    pub status: PlaybackStatus,
    pub transcript: Transcript,
    pub report: ReportTracker,
}

impl PlaybackOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == PlaybackStatus::Complete
    }
}

struct PendingTimer {
    id: TimerId,
    sleep: Pin<Box<Sleep>>,
}

async fn expire(timer: &mut Option<PendingTimer>) -> TimerId {
    match timer {
        Some(pending) => {
            pending.sleep.as_mut().await;
            pending.id
        }
        None => std::future::pending().await,
    }
}

/// Drives one [`Sequencer`] against real time, audio and a sink.
pub struct PlaybackDriver {
    sequencer: Sequencer,
    tracker: ReportTracker,
    audio: Box<dyn AudioPlayer>,
    sink: Box<dyn PlaybackSink>,
    timer: Option<PendingTimer>,
}

impl PlaybackDriver {
    pub fn new(
        settings: PlaybackSettings,
        audio: Box<dyn AudioPlayer>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        Self {
            sequencer: Sequencer::new(settings),
            tracker: ReportTracker::new(),
            audio,
            sink,
            timer: None,
        }
    }

    /// Run on a new task.
    pub fn spawn(self) -> PlaybackHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let notify = tx.clone();
        let task = tokio::spawn(self.run(rx, notify));
        PlaybackHandle {
            signals: tx,
            task: Some(task),
        }
    }

    /// Process signals until playback completes, stalls or is torn down.
    pub async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<Signal>,
        notify: mpsc::UnboundedSender<Signal>,
    ) -> PlaybackOutcome {
        tracing::debug!(
            "playback started (audio: {}, sink: {})",
            self.audio.name(),
            self.sink.name()
        );
        let status = loop {
            let signal = tokio::select! {
                signal = signals.recv() => signal.unwrap_or(Signal::Teardown),
                id = expire(&mut self.timer) => Signal::TimerFired(id),
            };
            if matches!(signal, Signal::TimerFired(_)) {
                self.timer = None;
            }

            let teardown = matches!(signal, Signal::Teardown);
            let effects = self.sequencer.handle(signal);
            if let Some(status) = self.apply(effects, &notify) {
                break status;
            }
            if teardown {
                break PlaybackStatus::TornDown;
            }
        };

        self.timer = None;
        self.audio.stop();
        tracing::debug!("playback finished: {status:?}");

        PlaybackOutcome {
            status,
            transcript: self.sequencer.into_transcript(),
            report: self.tracker,
        }
    }

    fn apply(
        &mut self,
        effects: Vec<Effect>,
        notify: &mpsc::UnboundedSender<Signal>,
    ) -> Option<PlaybackStatus> {
        let mut status = None;
        for effect in effects {
            match effect {
                Effect::Display(event) => {
                    self.sink.on_message(&event, self.sequencer.transcript());
                    if self.tracker.observe(&event)
                        && let Some(view) = self.tracker.view()
                    {
                        self.sink.on_report(&view, &self.tracker);
                    }
                }
                Effect::StopAudio => self.audio.stop(),
                Effect::PlayAudio { clip, audio } => {
                    let notifier = AudioNotifier::new(clip, notify.clone());
                    let started = AudioRef::parse(&audio).and_then(|audio| {
                        tracing::debug!("clip {}: {}", clip.0, audio.describe());
                        self.audio.play(audio, notifier.clone())
                    });
                    if let Err(e) = started {
                        notifier.errored(e.to_string());
                    }
                }
                Effect::StartTimer { timer, after } => {
                    self.timer = Some(PendingTimer {
                        id: timer,
                        sleep: Box::pin(tokio::time::sleep(after)),
                    });
                }
                Effect::CancelTimer => self.timer = None,
                Effect::SettingsChanged(settings) => self.sink.on_settings(settings),
                Effect::Completed => {
                    self.sink.on_complete(self.sequencer.transcript());
                    status = Some(PlaybackStatus::Complete);
                }
                Effect::Stalled(reason) => {
                    self.sink.on_stalled(&reason);
                    status = Some(PlaybackStatus::Stalled(reason));
                }
            }
        }
        status
    }
}

/// User-facing controls for a running playback.
#[derive(Debug, Clone)]
pub struct PlaybackControls {
    tx: mpsc::UnboundedSender<Signal>,
}

impl PlaybackControls {
    pub fn set_audio_enabled(&self, enabled: bool) -> bool {
        self.send(Signal::SetAudioEnabled(enabled))
    }

    pub fn toggle_audio(&self) -> bool {
        self.send(Signal::ToggleAudio)
    }

    /// Only honored while audio is off.
    pub fn toggle_pace(&self) -> bool {
        self.send(Signal::TogglePace)
    }

    pub fn teardown(&self) -> bool {
        self.send(Signal::Teardown)
    }

    /// Returns false once playback has finished.
    fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Handle to a spawned [`PlaybackDriver`]. Dropping it tears playback down.
#[derive(Debug)]
pub struct PlaybackHandle {
    signals: mpsc::UnboundedSender<Signal>,
    task: Option<JoinHandle<PlaybackOutcome>>,
}

impl PlaybackHandle {
    /// Sender for frame and stream signals.
    pub fn signals(&self) -> mpsc::UnboundedSender<Signal> {
        self.signals.clone()
    }

    pub fn controls(&self) -> PlaybackControls {
        PlaybackControls {
            tx: self.signals.clone(),
        }
    }

    /// Ask the driver to tear down. Safe to call any number of times.
    pub fn teardown(&self) {
        if self.signals.send(Signal::Teardown).is_err() {
            tracing::debug!("playback already finished");
        }
    }

    /// Wait for playback to end. Cancel-safe; call again after cancellation.
    pub async fn finished(&mut self) -> Result<PlaybackOutcome> {
        let task = self
            .task
            .as_mut()
            .ok_or_else(|| PrevisitError::Other("playback outcome already taken".to_string()))?;
        let outcome = task
            .await
            .map_err(|e| PrevisitError::Other(format!("playback task failed: {e}")))?;
        self.task = None;
        Ok(outcome)
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        // The driver holds its own sender for audio outcomes, so the channel
        // never closes on its own.
        if self.task.is_some() {
            let _ = self.signals.send(Signal::Teardown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pace;
    use crate::playback::audio::MockAudioPlayer;
    use crate::playback::sink::{CollectorSink, PlaybackRecord};
    use crate::stream::{ConversationEvent, Speaker};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    const CLIP: &str = "data:audio/mpeg;base64,SUQz";

    fn settings(audio_enabled: bool) -> PlaybackSettings {
        PlaybackSettings {
            audio_enabled,
            pace: Pace::Fast,
        }
    }

    fn event(speaker: Speaker, text: &str) -> ConversationEvent {
        ConversationEvent::new(speaker, text)
    }

    fn voiced(speaker: Speaker, text: &str) -> ConversationEvent {
        ConversationEvent::new(speaker, text).with_audio(CLIP)
    }

    fn start(
        settings: PlaybackSettings,
        audio: MockAudioPlayer,
    ) -> (PlaybackHandle, CollectorSink) {
        let sink = CollectorSink::new();
        let handle =
            PlaybackDriver::new(settings, Box::new(audio), Box::new(sink.clone())).spawn();
        (handle, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn plays_scripted_interview_with_timer_pacing() {
        let (mut handle, sink) = start(settings(false), MockAudioPlayer::new());
        let signals = handle.signals();
        let began = Instant::now();

        let script = vec![
            event(Speaker::Interviewer, "Hello"),
            event(Speaker::Report, "# R1"),
            event(Speaker::Patient, "Hi"),
            event(Speaker::Report, "# R2"),
        ];
        for e in &script {
            signals.send(Signal::FrameArrived(e.clone())).unwrap();
        }
        signals.send(Signal::StreamEnded).unwrap();

        let outcome = handle.finished().await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.transcript.messages(), &script[..]);
        assert_eq!(began.elapsed(), Duration::from_millis(4000));

        assert_eq!(sink.messages(), script);
        assert_eq!(
            sink.reports(),
            vec![
                "<h1>R1</h1>\n".to_string(),
                "<h1><span class=\"remove\">R1</span><span class=\"add\">R2</span></h1>\n"
                    .to_string(),
            ]
        );
        assert_eq!(sink.records().last(), Some(&PlaybackRecord::Complete));
        assert_eq!(outcome.report.current(), Some("<h1>R2</h1>\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn audio_paces_voiced_events_one_at_a_time() {
        let audio = MockAudioPlayer::new().with_duration(Duration::from_millis(2500));
        let log = audio.log();
        let (mut handle, _sink) = start(settings(true), audio);
        let signals = handle.signals();
        let began = Instant::now();

        signals
            .send(Signal::FrameArrived(voiced(Speaker::Interviewer, "How are you?")))
            .unwrap();
        signals
            .send(Signal::FrameArrived(voiced(Speaker::Patient, "Tired.")))
            .unwrap();
        signals.send(Signal::StreamEnded).unwrap();

        let outcome = handle.finished().await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(began.elapsed(), Duration::from_millis(5000));

        let log = log.lock().unwrap();
        assert_eq!(log.played.len(), 2);
        assert_eq!(log.overlaps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn audio_off_mid_clip_switches_to_timer() {
        let audio = MockAudioPlayer::new().with_duration(Duration::from_secs(10));
        let log = audio.log();
        let (mut handle, sink) = start(settings(true), audio);
        let signals = handle.signals();
        let began = Instant::now();

        signals
            .send(Signal::FrameArrived(voiced(Speaker::Interviewer, "q")))
            .unwrap();
        signals
            .send(Signal::FrameArrived(voiced(Speaker::Patient, "a")))
            .unwrap();
        signals.send(Signal::StreamEnded).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(handle.controls().set_audio_enabled(false));

        let outcome = handle.finished().await.unwrap();
        assert!(outcome.is_complete());
        // 0.5 s of audio, then two timer-paced seconds
        assert_eq!(began.elapsed(), Duration::from_millis(2500));

        let log = log.lock().unwrap();
        assert_eq!(log.played.len(), 1, "second event must not play audio");
        assert!(log.stops >= 1);
        assert_eq!(
            sink.messages().iter().filter(|e| e.text == "q").count(),
            1,
            "stopped message is not replayed"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn audio_failure_counts_as_completion() {
        let (mut handle, sink) = start(settings(true), MockAudioPlayer::new().with_start_failure());
        let signals = handle.signals();
        let began = Instant::now();

        signals
            .send(Signal::FrameArrived(voiced(Speaker::Interviewer, "q")))
            .unwrap();
        signals
            .send(Signal::FrameArrived(voiced(Speaker::Patient, "a")))
            .unwrap();
        signals.send(Signal::StreamEnded).unwrap();

        let outcome = handle.finished().await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(began.elapsed(), Duration::ZERO);
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_audio_counts_as_completion() {
        let (mut handle, _sink) = start(settings(true), MockAudioPlayer::new());
        let signals = handle.signals();

        let broken = event(Speaker::Interviewer, "q").with_audio("data:audio/mpeg;base64,@@");
        signals.send(Signal::FrameArrived(broken)).unwrap();
        signals.send(Signal::StreamEnded).unwrap();

        assert!(handle.finished().await.unwrap().is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_stalls() {
        let (mut handle, sink) = start(settings(false), MockAudioPlayer::new());
        let signals = handle.signals();

        signals
            .send(Signal::FrameArrived(event(Speaker::Interviewer, "Hello")))
            .unwrap();
        signals
            .send(Signal::StreamFailed("connection reset".to_string()))
            .unwrap();

        let outcome = handle.finished().await.unwrap();
        assert_eq!(
            outcome.status,
            PlaybackStatus::Stalled("connection reset".to_string())
        );
        assert_eq!(outcome.transcript.len(), 1);
        assert!(!sink.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_audio_and_is_idempotent() {
        let audio = MockAudioPlayer::new().with_duration(Duration::from_secs(30));
        let log = audio.log();
        let (mut handle, sink) = start(settings(true), audio);
        let signals = handle.signals();

        signals
            .send(Signal::FrameArrived(voiced(Speaker::Interviewer, "q")))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        handle.teardown();
        handle.teardown();
        let outcome = handle.finished().await.unwrap();

        assert_eq!(outcome.status, PlaybackStatus::TornDown);
        assert!(outcome.transcript.is_empty());
        assert!(!log.lock().unwrap().played.is_empty());
        assert!(log.lock().unwrap().stops >= 1);
        assert!(!sink.is_complete());

        // after the driver is gone, further teardown requests are no-ops
        handle.teardown();
        assert!(!handle.controls().toggle_audio());
        assert!(handle.finished().await.is_err());
    }

    struct DropFlagSink(Arc<AtomicBool>);

    impl PlaybackSink for DropFlagSink {
        fn on_message(&mut self, _event: &ConversationEvent, _transcript: &Transcript) {}
    }

    impl Drop for DropFlagSink {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_driver() {
        let dropped = Arc::new(AtomicBool::new(false));
        let audio = MockAudioPlayer::new().with_duration(Duration::from_secs(30));
        let log = audio.log();
        let handle = PlaybackDriver::new(
            settings(true),
            Box::new(audio),
            Box::new(DropFlagSink(dropped.clone())),
        )
        .spawn();
        // an outside sender (like the ingestor's) keeps the channel open
        let signals = handle.signals();
        signals
            .send(Signal::FrameArrived(voiced(Speaker::Interviewer, "q")))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(dropped.load(Ordering::SeqCst), "driver task still running");
        assert!(log.lock().unwrap().stops >= 1);
        assert!(signals.send(Signal::ToggleAudio).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn pace_toggle_changes_timer_interval() {
        let (mut handle, sink) = start(settings(false), MockAudioPlayer::new());
        let signals = handle.signals();
        let began = Instant::now();

        handle.controls().toggle_pace();
        signals
            .send(Signal::FrameArrived(event(Speaker::Interviewer, "Hello")))
            .unwrap();
        signals.send(Signal::StreamEnded).unwrap();

        assert!(handle.finished().await.unwrap().is_complete());
        assert_eq!(began.elapsed(), Duration::from_millis(3000));
        assert!(sink.records().contains(&PlaybackRecord::Settings(PlaybackSettings {
            audio_enabled: false,
            pace: Pace::Slow,
        })));
    }
}
