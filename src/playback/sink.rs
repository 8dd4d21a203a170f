use crate::output;
use crate::playback::state::PlaybackSettings;
use crate::playback::transcript::Transcript;
use crate::report::ReportTracker;
use crate::stream::ConversationEvent;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Pluggable presentation for playback.
/// Receives released messages, report revisions and lifecycle changes.
pub trait PlaybackSink: Send + 'static {
    /// A message was released. `transcript` already contains it.
    fn on_message(&mut self, event: &ConversationEvent, transcript: &Transcript);

    /// The report changed. `view` is the annotated HTML for the report pane.
    fn on_report(&mut self, _view: &str, _tracker: &ReportTracker) {}

    fn on_settings(&mut self, _settings: PlaybackSettings) {}

    /// The queue drained after the end marker.
    fn on_complete(&mut self, _transcript: &Transcript) {}

    /// The channel broke; nothing more will arrive.
    fn on_stalled(&mut self, _reason: &str) {}

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Everything a [`CollectorSink`] saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackRecord {
    Message(ConversationEvent),
    Report(String),
    Settings(PlaybackSettings),
    Complete,
    Stalled(String),
}

/// Collects playback output for tests and headless use.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    records: Arc<Mutex<Vec<PlaybackRecord>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PlaybackRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<ConversationEvent> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                PlaybackRecord::Message(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn reports(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                PlaybackRecord::Report(view) => Some(view),
                _ => None,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.records().contains(&PlaybackRecord::Complete)
    }

    fn record(&self, record: PlaybackRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

impl PlaybackSink for CollectorSink {
    fn on_message(&mut self, event: &ConversationEvent, _transcript: &Transcript) {
        self.record(PlaybackRecord::Message(event.clone()));
    }

    fn on_report(&mut self, view: &str, _tracker: &ReportTracker) {
        self.record(PlaybackRecord::Report(view.to_string()));
    }

    fn on_settings(&mut self, settings: PlaybackSettings) {
        self.record(PlaybackRecord::Settings(settings));
    }

    fn on_complete(&mut self, _transcript: &Transcript) {
        self.record(PlaybackRecord::Complete);
    }

    fn on_stalled(&mut self, reason: &str) {
        self.record(PlaybackRecord::Stalled(reason.to_string()));
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Interactive terminal: chat on stdout, report pane redrawn on each revision.
pub struct TerminalSink {
    show_thinking: bool,
    show_reports: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            show_thinking: true,
            show_reports: true,
        }
    }

    pub fn with_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    pub fn with_reports(mut self, show: bool) -> Self {
        self.show_reports = show;
        self
    }

    /// Whether a released message gets a chat line.
    fn shows(&self, event: &ConversationEvent) -> bool {
        !event.is_report()
            && (self.show_thinking || event.speaker != crate::stream::Speaker::InterviewerThinking)
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSink for TerminalSink {
    fn on_message(&mut self, event: &ConversationEvent, transcript: &Transcript) {
        if !self.shows(event) {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{}", output::render_message(event)).is_err() {
            return;
        }
        if transcript.follows_latest() && stdout.flush().is_err() {
            tracing::debug!("stdout closed");
        }
    }

    fn on_report(&mut self, view: &str, tracker: &ReportTracker) {
        if !self.show_reports {
            return;
        }
        println!("\n{}\n", output::render_report(view, tracker.revisions()));
    }

    fn on_settings(&mut self, settings: PlaybackSettings) {
        eprintln!("{}", output::render_settings(settings));
    }

    fn on_complete(&mut self, transcript: &Transcript) {
        eprintln!(
            "{}",
            output::render_status(
                &format!(
                    "Interview complete ({} messages).",
                    transcript.chat_messages().count()
                ),
                true
            )
        );
    }

    fn on_stalled(&mut self, reason: &str) {
        eprintln!(
            "{}",
            output::render_status(&format!("Interview stalled: {reason}"), false)
        );
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}
