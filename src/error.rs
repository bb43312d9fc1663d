//! Device handle error types

use streamdeck_transport::{FrameError, TransportError};
use thiserror::Error;

/// Errors from deck operations
#[derive(Error, Debug)]
pub enum DeckError {
    /// Enumeration found nothing the registry knows
    #[error("No supported device found: {0}")]
    NoDeviceFound(String),

    /// Requested serial is not among the candidates
    #[error("No device with serial {0}")]
    SerialMismatch(String),

    /// Feature not available on this model
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid index {index} (device has {count})")]
    InvalidIndex { index: usize, count: u8 },

    /// Descriptor names no encoding this crate can produce
    #[error("Unknown image format for {0}")]
    UnknownImageFormat(String),

    /// Packet safety cap exceeded
    #[error("Image too large: exceeds {limit} packets")]
    ImageTooLarge { limit: usize },

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid configuration file
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Network handshake succeeded but no descriptor matches
    #[error("Unsupported model: product id 0x{0:04x}")]
    UnsupportedModel(u16),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<FrameError> for DeckError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::InvalidIndex { index, count } => DeckError::InvalidIndex { index, count },
            FrameError::Unsupported(what) => DeckError::UnsupportedOperation(what.to_string()),
            FrameError::ImageTooLarge { limit } => DeckError::ImageTooLarge { limit },
        }
    }
}

impl From<image::ImageError> for DeckError {
    fn from(e: image::ImageError) -> Self {
        DeckError::Image(e.to_string())
    }
}
