//! Wire format of the conversation stream.
//!
//! Each SSE `data:` payload is one JSON object: either a conversation event
//! `{"speaker": ..., "text": ..., "audio": ...}` or the end marker
//! `{"event": "end"}`.

use crate::error::{PrevisitError, Result};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Interviewer,
    /// The interviewer's reasoning before a question.
    #[serde(alias = "interviewer thinking")]
    InterviewerThinking,
    Patient,
    /// Full report-so-far as markdown.
    Report,
}

impl Speaker {
    pub fn label(self) -> &'static str {
        match self {
            Speaker::Interviewer => "Interviewer",
            Speaker::InterviewerThinking => "Interviewer (thinking)",
            Speaker::Patient => "Patient",
            Speaker::Report => "Report",
        }
    }

    pub fn is_report(self) -> bool {
        matches!(self, Speaker::Report)
    }
}

/// One released unit of the interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub speaker: Speaker,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl ConversationEvent {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: impl Into<String>) -> Self {
        self.audio = Some(audio.into());
        self
    }

    /// Audio reference, if present and non-empty.
    pub fn audio(&self) -> Option<&str> {
        self.audio.as_deref().filter(|a| !a.trim().is_empty())
    }

    pub fn is_report(&self) -> bool {
        self.speaker.is_report()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded `data:` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(ConversationEvent),
    End,
}

#[derive(Deserialize)]
struct Marker {
    event: String,
}

/// Parse one frame payload.
///
/// Anything that is not valid JSON, not the end marker, and not a
/// well-formed conversation event is a protocol error.
pub fn parse_frame(data: &str) -> Result<StreamFrame> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| PrevisitError::StreamProtocol {
            message: format!("invalid JSON ({e}): {}", preview(data)),
        })?;

    if value.get("speaker").is_none()
        && let Ok(marker) = Marker::deserialize(&value)
    {
        return if marker.event == "end" {
            Ok(StreamFrame::End)
        } else {
            Err(PrevisitError::StreamProtocol {
                message: format!("unknown control event '{}'", marker.event),
            })
        };
    }

    ConversationEvent::deserialize(&value)
        .map(StreamFrame::Event)
        .map_err(|e| PrevisitError::StreamProtocol {
            message: format!("{e}: {}", preview(data)),
        })
}

fn preview(data: &str) -> String {
    const MAX: usize = 80;
    match data.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &data[..idx]),
        None => data.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interviewer_event() {
        let frame =
            parse_frame(r#"{"speaker":"interviewer","text":"Hello","audio":null}"#).unwrap();
        assert_eq!(
            frame,
            StreamFrame::Event(ConversationEvent::new(Speaker::Interviewer, "Hello"))
        );
    }

    #[test]
    fn test_parse_event_with_audio() {
        let frame = parse_frame(
            r#"{"speaker":"patient","text":"Hi","audio":"data:audio/mpeg;base64,AAAA"}"#,
        )
        .unwrap();
        let StreamFrame::Event(event) = frame else {
            panic!("expected event");
        };
        assert_eq!(event.audio(), Some("data:audio/mpeg;base64,AAAA"));
    }

    #[test]
    fn test_missing_audio_field_means_no_audio() {
        let frame = parse_frame(r##"{"speaker":"report","text":"# R1"}"##).unwrap();
        let StreamFrame::Event(event) = frame else {
            panic!("expected event");
        };
        assert!(event.is_report());
        assert_eq!(event.audio(), None);
    }

    #[test]
    fn test_empty_audio_means_no_audio() {
        let event = ConversationEvent::new(Speaker::Patient, "Hi").with_audio("");
        assert_eq!(event.audio(), None);
    }

    #[test]
    fn test_thinking_speaker_accepts_both_spellings() {
        for raw in ["interviewer thinking", "interviewer_thinking"] {
            let json = format!(r#"{{"speaker":"{raw}","text":"hmm"}}"#);
            let StreamFrame::Event(event) = parse_frame(&json).unwrap() else {
                panic!("expected event");
            };
            assert_eq!(event.speaker, Speaker::InterviewerThinking, "for {raw}");
        }
    }

    #[test]
    fn test_parse_end_marker() {
        assert_eq!(parse_frame(r#"{"event":"end"}"#).unwrap(), StreamFrame::End);
    }

    #[test]
    fn test_unknown_control_event_is_error() {
        assert!(parse_frame(r#"{"event":"pause"}"#).is_err());
    }

    #[test]
    fn test_backend_error_text_is_malformed() {
        let err = parse_frame("Error: upstream model unavailable").unwrap_err();
        assert!(matches!(err, PrevisitError::StreamProtocol { .. }));
    }

    #[test]
    fn test_unknown_speaker_is_malformed() {
        assert!(parse_frame(r#"{"speaker":"nurse","text":"hi"}"#).is_err());
    }

    #[test]
    fn test_missing_text_is_malformed() {
        assert!(parse_frame(r#"{"speaker":"patient"}"#).is_err());
    }

    #[test]
    fn test_serialized_speaker_is_snake_case() {
        let json = ConversationEvent::new(Speaker::InterviewerThinking, "x")
            .to_json()
            .unwrap();
        assert!(json.contains("\"interviewer_thinking\""), "got {json}");
        assert!(!json.contains("audio"), "absent audio is omitted: {json}");
    }

    #[test]
    fn test_preview_truncates_long_payloads() {
        let long = "x".repeat(200);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.len(), 83);
    }
}
