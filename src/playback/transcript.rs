//! Append-only list of released messages.

use crate::stream::ConversationEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<ConversationEvent>,
}

impl Transcript {
    pub fn push(&mut self, event: ConversationEvent) {
        self.messages.push(event);
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[ConversationEvent] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConversationEvent> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn latest(&self) -> Option<&ConversationEvent> {
        self.messages.last()
    }

    /// The chat pane: every released message except report revisions.
    pub fn chat_messages(&self) -> impl Iterator<Item = &ConversationEvent> {
        self.messages.iter().filter(|e| !e.is_report())
    }

    /// Whether the chat pane should follow the newest message.
    ///
    /// A report revision lands in the report pane, so the chat stays put.
    pub fn follows_latest(&self) -> bool {
        self.latest().is_some_and(|e| !e.is_report())
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a ConversationEvent;
    type IntoIter = std::slice::Iter<'a, ConversationEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Speaker;

    fn transcript(events: &[(Speaker, &str)]) -> Transcript {
        let mut t = Transcript::default();
        for (speaker, text) in events {
            t.push(ConversationEvent::new(*speaker, *text));
        }
        t
    }

    #[test]
    fn chat_excludes_reports() {
        let t = transcript(&[
            (Speaker::Interviewer, "Hello"),
            (Speaker::Report, "# R1"),
            (Speaker::Patient, "Hi"),
        ]);
        let chat: Vec<&str> = t.chat_messages().map(|e| e.text.as_str()).collect();
        assert_eq!(chat, vec!["Hello", "Hi"]);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn follows_latest_unless_report() {
        assert!(!Transcript::default().follows_latest());
        assert!(transcript(&[(Speaker::Patient, "Hi")]).follows_latest());
        assert!(!transcript(&[(Speaker::Patient, "Hi"), (Speaker::Report, "# R")]).follows_latest());
        assert!(
            transcript(&[(Speaker::InterviewerThinking, "hmm")]).follows_latest(),
            "thinking is shown in the chat pane"
        );
    }
}
