//! Speaker output through rodio.

use crate::api::ApiClient;
use crate::error::{PrevisitError, Result};
use crate::playback::audio::{AudioNotifier, AudioPlayer, AudioRef};
use crate::playback::device;
use rodio::{Decoder, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// State of the clip currently owned by the player.
struct ActiveClip {
    cancelled: Arc<AtomicBool>,
    sink: Arc<Mutex<Option<Arc<Sink>>>>,
    task: JoinHandle<()>,
}

impl ActiveClip {
    fn stop(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.sink.lock()
            && let Some(sink) = slot.take()
        {
            sink.stop();
        }
        self.task.abort();
    }
}

/// Plays clips on the default (or a named) output device.
///
/// Remote references are fetched through the API client first. Decoding and
/// playback run on a blocking thread because rodio's output stream is tied
/// to the thread that opened it.
pub struct RodioPlayer {
    client: Option<ApiClient>,
    device: Option<String>,
    active: Option<ActiveClip>,
}

impl RodioPlayer {
    pub fn new(device: Option<String>) -> Self {
        Self {
            client: None,
            device,
            active: None,
        }
    }

    /// Resolve server-relative clip URLs through this client.
    pub fn with_client(mut self, client: ApiClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Fail fast when the output device cannot be opened.
    pub fn probe(&self) -> Result<()> {
        device::open_output_stream(self.device.as_deref()).map(|_| ())
    }
}

impl AudioPlayer for RodioPlayer {
    fn play(&mut self, audio: AudioRef, notifier: AudioNotifier) -> Result<()> {
        self.stop();

        let client = self.client.clone();
        if matches!(audio, AudioRef::Remote(_)) && client.is_none() {
            return Err(PrevisitError::AudioSource {
                message: "remote audio needs a server connection".to_string(),
            });
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let slot: Arc<Mutex<Option<Arc<Sink>>>> = Arc::new(Mutex::new(None));
        let device = self.device.clone();

        let task_cancelled = Arc::clone(&cancelled);
        let task_slot = Arc::clone(&slot);
        let task = tokio::spawn(async move {
            let bytes = match audio {
                AudioRef::Inline { bytes, .. } => Ok(bytes),
                AudioRef::Remote(url) => match client {
                    Some(client) => client.fetch_audio(&url).await,
                    None => Err(PrevisitError::AudioSource {
                        message: "remote audio needs a server connection".to_string(),
                    }),
                },
            };
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    notifier.errored(e.to_string());
                    return;
                }
            };

            let played = tokio::task::spawn_blocking(move || {
                play_blocking(bytes, device.as_deref(), &task_cancelled, &task_slot)
            })
            .await;

            match played {
                Ok(Ok(true)) => notifier.ended(),
                Ok(Ok(false)) => tracing::debug!("clip {:?} stopped", notifier.clip()),
                Ok(Err(e)) => notifier.errored(e.to_string()),
                Err(e) => notifier.errored(format!("playback thread failed: {e}")),
            }
        });

        self.active = Some(ActiveClip {
            cancelled,
            sink: slot,
            task,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop();
        }
    }

    fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    fn name(&self) -> &'static str {
        "rodio"
    }
}

impl Drop for RodioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode and play to the end. Returns false if cancelled before finishing.
fn play_blocking(
    bytes: Vec<u8>,
    device: Option<&str>,
    cancelled: &AtomicBool,
    slot: &Mutex<Option<Arc<Sink>>>,
) -> Result<bool> {
    let (_stream, handle) = device::open_output_stream(device)?;
    let sink = Sink::try_new(&handle).map_err(|e| PrevisitError::AudioPlayback {
        message: format!("Failed to create audio sink: {e}"),
    })?;
    let source = Decoder::new(Cursor::new(bytes)).map_err(|e| PrevisitError::AudioSource {
        message: format!("Failed to decode audio: {e}"),
    })?;
    sink.append(source);
    let sink = Arc::new(sink);

    {
        let mut slot = slot.lock().map_err(|_| PrevisitError::AudioPlayback {
            message: "audio sink lock poisoned".to_string(),
        })?;
        // stop() may have run before the sink existed
        if cancelled.load(Ordering::SeqCst) {
            sink.stop();
            return Ok(false);
        }
        *slot = Some(Arc::clone(&sink));
    }

    sink.sleep_until_end();
    Ok(!cancelled.load(Ordering::SeqCst))
}
