//! Driver for Elgato Stream Deck control surfaces
//!
//! This crate provides the device handle on top of the transport layer
//! (USB HID or TCP): opening a deck, writing button and area images,
//! brightness and encoder LEDs, and receiving decoded input events.
//!
//! ```no_run
//! # async fn demo() -> Result<(), streamdeck::DeckError> {
//! let registry = streamdeck::builtin_registry();
//! let deck = streamdeck::StreamDeck::open(&registry).await?;
//! deck.set_brightness(60).await?;
//! deck.on_button(|event| println!("button {} pressed={}", event.index(), event.is_pressed()));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod models;

pub use config::{DeckConfig, OpenOptions};
pub use device::StreamDeck;
pub use dispatch::{Dispatcher, EventHandler};
pub use encode::{DefaultImageEncoder, ImageEncoder};
pub use error::DeckError;
pub use models::builtin_registry;

// Re-export the types applications handle directly
pub use streamdeck_transport::{
    search_devices, ButtonEvent, DeckEvent, DeviceFamily, DeviceRegistry, DeviceSummary,
    DeviceTypeDescriptor, EventCategory, ImageArea, ImageSize, NetworkConfig, TransportError,
    DEFAULT_MAX_PACKETS,
};

/// List attached decks without opening them
pub fn list_decks() -> Result<Vec<DeviceSummary>, DeckError> {
    Ok(search_devices()?)
}
