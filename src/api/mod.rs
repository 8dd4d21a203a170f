//! Backend HTTP surface: push channel, report evaluation and static catalog.

pub mod client;
pub mod evaluation;

pub use client::ApiClient;
pub use evaluation::{ReportEvaluator, evaluate_or_message, strip_html_fence};
