//! Background task that turns the push channel into sequencer signals.

use crate::api::ApiClient;
use crate::playback::Signal;
use crate::session::SessionParams;
use crate::stream::event::{StreamFrame, parse_frame};
use crate::stream::sse::SseDecoder;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What ended one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEnd {
    /// The server sent the end marker.
    Ended,
    /// Transport error, bad status or EOF before the end marker.
    Failed(String),
    /// The receiving side is gone.
    Closed,
}

/// Opens push channels and forwards their frames, in arrival order.
#[derive(Debug, Clone)]
pub struct StreamIngestor {
    client: ApiClient,
}

impl StreamIngestor {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Start ingesting on a background task.
    ///
    /// Every event frame becomes `FrameArrived`; the end marker becomes
    /// `StreamEnded`; anything that stops the channel early becomes
    /// `StreamFailed`. Malformed frames are logged and skipped.
    pub fn open(&self, params: &SessionParams, tx: mpsc::UnboundedSender<Signal>) -> IngestorHandle {
        let client = self.client.clone();
        let params = params.clone();
        let task = tokio::spawn(async move {
            tracing::info!(
                "opening conversation stream (patient: {}, condition: {})",
                params.patient,
                params.condition
            );
            let end = match client.open_stream(&params).await {
                Ok(response) => ingest(response.bytes_stream(), &tx).await,
                Err(e) => IngestEnd::Failed(e.to_string()),
            };
            report_end(end, &tx);
        });
        IngestorHandle { task: Some(task) }
    }
}

fn report_end(end: IngestEnd, tx: &mpsc::UnboundedSender<Signal>) {
    let signal = match end {
        IngestEnd::Ended => {
            tracing::info!("conversation stream ended");
            Signal::StreamEnded
        }
        IngestEnd::Failed(reason) => {
            tracing::info!("conversation stream closed early: {reason}");
            Signal::StreamFailed(reason)
        }
        IngestEnd::Closed => return,
    };
    if tx.send(signal).is_err() {
        tracing::debug!("playback gone before stream end was delivered");
    }
}

/// Decode an SSE byte stream and forward frames until the end marker.
///
/// Does not send the terminal signal itself; the caller maps the returned
/// [`IngestEnd`].
pub async fn ingest<S, B, E>(body: S, tx: &mpsc::UnboundedSender<Signal>) -> IngestEnd
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();
    let mut frames = 0usize;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return IngestEnd::Failed(format!("stream interrupted: {e}")),
        };
        for payload in decoder.push(chunk.as_ref()) {
            if let Some(end) = forward(&payload, tx, &mut frames) {
                return end;
            }
        }
    }

    if let Some(payload) = decoder.finish()
        && let Some(end) = forward(&payload, tx, &mut frames)
    {
        return end;
    }
    IngestEnd::Failed(format!("stream closed after {frames} frames without an end marker"))
}

fn forward(
    payload: &str,
    tx: &mpsc::UnboundedSender<Signal>,
    frames: &mut usize,
) -> Option<IngestEnd> {
    match parse_frame(payload) {
        Ok(StreamFrame::Event(event)) => {
            *frames += 1;
            tracing::debug!("frame {}: {}", frames, event.speaker.label());
            if tx.send(Signal::FrameArrived(event)).is_err() {
                return Some(IngestEnd::Closed);
            }
            None
        }
        Ok(StreamFrame::End) => Some(IngestEnd::Ended),
        Err(e) => {
            tracing::warn!("skipping malformed frame: {e}");
            None
        }
    }
}

/// Owns the ingestion task. Closing is idempotent.
#[derive(Debug)]
pub struct IngestorHandle {
    task: Option<JoinHandle<()>>,
}

impl IngestorHandle {
    /// Stop reading the channel. No further signals are sent.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }
}

impl Drop for IngestorHandle {
    fn drop(&mut self) {
        self.close();
    }
}
