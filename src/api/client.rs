//! HTTP client for the demo backend.

use crate::catalog::Catalog;
use crate::defaults;
use crate::error::{PrevisitError, Result};
use crate::session::SessionParams;
use serde::{Deserialize, Serialize};
use url::Url;

/// Handle to one backend. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct EvaluationRequest<'a> {
    report: &'a str,
    condition: &'a str,
}

#[derive(Deserialize)]
struct EvaluationResponse {
    evaluation: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base = Url::parse(trimmed).map_err(|e| PrevisitError::InvalidUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(PrevisitError::InvalidUrl {
                url: base_url.to_string(),
                message: format!("unsupported scheme '{}'", base.scheme()),
            });
        }
        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a server path, keeping any path prefix of the base.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| PrevisitError::InvalidUrl {
            url: joined.clone(),
            message: e.to_string(),
        })
    }

    /// URL of the push channel for one patient/condition pair.
    pub fn stream_url(&self, params: &SessionParams) -> Result<Url> {
        let mut url = self.endpoint(defaults::STREAM_PATH)?;
        url.query_pairs_mut()
            .append_pair("patient", &params.patient)
            .append_pair("condition", &params.condition);
        Ok(url)
    }

    /// Open the push channel; the response body is the event stream.
    pub async fn open_stream(&self, params: &SessionParams) -> Result<reqwest::Response> {
        let url = self.stream_url(params)?;
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| request_error(defaults::STREAM_PATH, e))?;
        check_status(defaults::STREAM_PATH, response).await
    }

    /// Ask the backend to grade a rendered report.
    ///
    /// Returns the raw evaluation text, fences included.
    pub async fn evaluate_report(&self, report_html: &str, condition: &str) -> Result<String> {
        let url = self.endpoint(defaults::EVALUATE_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&EvaluationRequest {
                report: report_html,
                condition,
            })
            .send()
            .await
            .map_err(|e| request_error(defaults::EVALUATE_PATH, e))?;
        let response = check_status(defaults::EVALUATE_PATH, response).await?;
        let body: EvaluationResponse = response
            .json()
            .await
            .map_err(|e| request_error(defaults::EVALUATE_PATH, e))?;
        Ok(body.evaluation)
    }

    pub async fn fetch_catalog(&self) -> Result<Catalog> {
        let url = self.endpoint(defaults::CATALOG_PATH)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(defaults::CATALOG_PATH, e))?;
        let response = check_status(defaults::CATALOG_PATH, response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| request_error(defaults::CATALOG_PATH, e))?;
        Catalog::from_json(&text)
    }

    /// Download audio referenced by URL; relative references resolve against the base.
    pub async fn fetch_audio(&self, reference: &str) -> Result<Vec<u8>> {
        let url = match Url::parse(reference) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.endpoint(reference)?,
            Err(e) => {
                return Err(PrevisitError::AudioSource {
                    message: format!("bad audio URL {reference}: {e}"),
                });
            }
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(reference, e))?;
        let response = check_status(reference, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_error(reference, e))?;
        Ok(bytes.to_vec())
    }
}

fn request_error(endpoint: &str, e: reqwest::Error) -> PrevisitError {
    PrevisitError::Request {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    }
}

async fn check_status(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => err.error,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("no reason given")
            .to_string(),
        Err(_) => body.trim().chars().take(200).collect(),
    };
    Err(PrevisitError::HttpStatus {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
    })
}
