//! Default configuration constants for previsit.
//!
//! Shared by the config layer, the CLI and the playback engine so that the
//! pacing presets and endpoint paths are defined in exactly one place.

/// Default backend URL.
///
/// The demo backend listens on port 7860 when started locally.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:7860";

/// Push channel endpoint (server-sent events).
pub const STREAM_PATH: &str = "/api/stream_conversation";

/// Report evaluation endpoint.
pub const EVALUATE_PATH: &str = "/api/evaluate_report";

/// Static patient and condition catalog.
pub const CATALOG_PATH: &str = "/assets/patients_and_conditions.json";

/// Fast pacing preset in milliseconds.
///
/// Used for events without audio, or for every event while audio is off.
pub const FAST_PACE_MS: u64 = 1000;

/// Slow pacing preset in milliseconds.
pub const SLOW_PACE_MS: u64 = 3000;

/// Audio is on unless the user turns it off.
pub const AUDIO_ENABLED: bool = true;

/// Message shown in place of the evaluation when the request fails.
pub const EVALUATION_ERROR_MESSAGE: &str = "Failed to load evaluation. Please try again later.";

/// Opening fence the evaluation model sometimes wraps its HTML in.
pub const HTML_FENCE_OPEN: &str = "```html";

/// Closing fence matching [`HTML_FENCE_OPEN`].
pub const HTML_FENCE_CLOSE: &str = "```";

/// Report the audio backend compiled into this build.
pub fn audio_backend() -> &'static str {
    if cfg!(feature = "audio-playback") {
        "rodio"
    } else {
        "none"
    }
}
