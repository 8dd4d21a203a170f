//! Previous/current report revisions.

use crate::report::diff::compute_diff;
use crate::report::markdown::render_markdown;
use crate::stream::ConversationEvent;

/// Tracks the last two distinct rendered revisions of the report.
///
/// Each `report` event carries the whole report so far; a revision is
/// recorded only when the rendered HTML actually changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportTracker {
    previous: Option<String>,
    current: Option<String>,
    revisions: usize,
}

impl ReportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one released event in. Returns true if the report changed.
    pub fn observe(&mut self, event: &ConversationEvent) -> bool {
        if !event.is_report() {
            return false;
        }
        self.update_html(render_markdown(&event.text))
    }

    /// Catch up with a displayed sequence using its most recent report.
    pub fn sync(&mut self, displayed: &[ConversationEvent]) -> bool {
        displayed
            .iter()
            .rev()
            .find(|e| e.is_report())
            .is_some_and(|latest| self.observe(latest))
    }

    pub fn update_html(&mut self, html: String) -> bool {
        if self.current.as_deref() == Some(html.as_str()) {
            return false;
        }
        self.previous = self.current.take().filter(|p| !p.trim().is_empty());
        self.current = Some(html);
        self.revisions += 1;
        true
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Latest rendered revision, unannotated. This is what gets evaluated.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Distinct revisions seen so far.
    pub fn revisions(&self) -> usize {
        self.revisions
    }

    /// What the report pane shows: the diff against the previous revision
    /// when there is one, the current revision as-is otherwise.
    pub fn view(&self) -> Option<String> {
        let current = self.current.as_deref()?;
        Some(match self.previous.as_deref() {
            Some(previous) => compute_diff(previous, current),
            None => current.to_string(),
        })
    }
}
