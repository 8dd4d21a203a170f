//! One interview playback: ingestor plus driver for a patient/condition pair.

use crate::api::ApiClient;
use crate::error::Result;
use crate::playback::{
    AudioPlayer, PlaybackControls, PlaybackDriver, PlaybackHandle, PlaybackOutcome,
    PlaybackSettings, PlaybackSink,
};
use crate::stream::{IngestorHandle, StreamIngestor};

/// Which interview to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub patient: String,
    pub condition: String,
}

impl SessionParams {
    pub fn new(patient: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            patient: patient.into(),
            condition: condition.into(),
        }
    }
}

/// A running playback. Dropping it tears it down.
#[derive(Debug)]
pub struct Session {
    params: SessionParams,
    ingestor: IngestorHandle,
    playback: PlaybackHandle,
    closed: bool,
}

impl Session {
    /// Open the push channel and start playback.
    pub fn start(
        client: &ApiClient,
        params: SessionParams,
        settings: PlaybackSettings,
        audio: Box<dyn AudioPlayer>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        let playback = PlaybackDriver::new(settings, audio, sink).spawn();
        let ingestor = StreamIngestor::new(client.clone()).open(&params, playback.signals());
        Self {
            params,
            ingestor,
            playback,
            closed: false,
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn controls(&self) -> PlaybackControls {
        self.playback.controls()
    }

    /// Wait for playback to complete, stall or be torn down.
    pub async fn finished(&mut self) -> Result<PlaybackOutcome> {
        let outcome = self.playback.finished().await?;
        self.ingestor.close();
        Ok(outcome)
    }

    /// Close the push channel, stop audio, cancel pacing. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::debug!(
            "closing session (patient: {}, condition: {})",
            self.params.patient,
            self.params.condition
        );
        self.ingestor.close();
        self.playback.teardown();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Holds at most one live session; selecting a new one tears down the old.
#[derive(Debug)]
pub struct SessionManager {
    client: ApiClient,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            current: None,
        }
    }

    pub fn select(
        &mut self,
        params: SessionParams,
        settings: PlaybackSettings,
        audio: Box<dyn AudioPlayer>,
        sink: Box<dyn PlaybackSink>,
    ) -> &mut Session {
        self.close();
        self.current
            .insert(Session::start(&self.client, params, settings, audio, sink))
    }

    pub fn current(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    pub fn close(&mut self) {
        if let Some(mut previous) = self.current.take() {
            previous.close();
        }
    }
}
