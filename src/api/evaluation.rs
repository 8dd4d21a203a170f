//! End-of-interview report evaluation.
//!
//! The request is independent of playback pacing. A failure is never retried
//! and is shown to the user as [`defaults::EVALUATION_ERROR_MESSAGE`].

use crate::api::client::ApiClient;
use crate::defaults;
use crate::error::Result;
use async_trait::async_trait;

/// Something that can grade a rendered report against the true condition.
#[async_trait]
pub trait ReportEvaluator: Send + Sync {
    /// Returns evaluation HTML with any code fence already removed.
    async fn evaluate(&self, report_html: &str, condition: &str) -> Result<String>;
}

#[async_trait]
impl ReportEvaluator for ApiClient {
    async fn evaluate(&self, report_html: &str, condition: &str) -> Result<String> {
        let raw = self.evaluate_report(report_html, condition).await?;
        Ok(strip_html_fence(&raw))
    }
}

/// Remove a surrounding ```` ```html ... ``` ```` fence, if present.
pub fn strip_html_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix(defaults::HTML_FENCE_OPEN) else {
        return trimmed.to_string();
    };
    let body = body.strip_suffix(defaults::HTML_FENCE_CLOSE).unwrap_or(body);
    body.trim().to_string()
}

/// Evaluate, falling back to the user-facing error message on any failure.
pub async fn evaluate_or_message(
    evaluator: &dyn ReportEvaluator,
    report_html: &str,
    condition: &str,
) -> String {
    match evaluator.evaluate(report_html, condition).await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!("report evaluation failed: {e}");
            defaults::EVALUATION_ERROR_MESSAGE.to_string()
        }
    }
}

/// Evaluator returning a canned answer or failure, for tests.
#[derive(Debug, Clone, Default)]
pub struct MockEvaluator {
    response: Option<String>,
    requests: std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

impl MockEvaluator {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            ..Self::default()
        }
    }

    pub fn with_failure() -> Self {
        Self::default()
    }

    /// `(report, condition)` pairs received so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportEvaluator for MockEvaluator {
    async fn evaluate(&self, report_html: &str, condition: &str) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((report_html.to_string(), condition.to_string()));
        }
        match &self.response {
            Some(response) => Ok(strip_html_fence(response)),
            None => Err(crate::error::PrevisitError::Request {
                endpoint: defaults::EVALUATE_PATH.to_string(),
                message: "mock failure".to_string(),
            }),
        }
    }
}
