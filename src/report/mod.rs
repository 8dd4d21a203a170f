//! Report pane: markdown rendering, revision tracking and the revision diff.

pub mod diff;
pub mod markdown;
pub mod tracker;

pub use diff::{Token, compute_diff, tokenize};
pub use markdown::render_markdown;
pub use tracker::ReportTracker;
