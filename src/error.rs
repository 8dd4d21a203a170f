//! Error types for previsit.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrevisitError {
    // Backend HTTP errors
    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("Request to {endpoint} returned HTTP {status}: {message}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Invalid server URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Conversation stream errors
    #[error("Stream protocol error: {message}")]
    StreamProtocol { message: String },

    // Audio playback errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio source unusable: {message}")]
    AudioSource { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // Catalog errors
    #[error("Catalog unavailable: {message}")]
    Catalog { message: String },

    #[error("Unknown patient: {name}")]
    UnknownPatient { name: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PrevisitError>;
