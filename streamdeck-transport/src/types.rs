//! Common types for transport layer

use std::sync::Arc;

use crate::error::TransportError;

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Direct USB HID connection
    HidLocal,
    /// TCP connection to a network-attached deck
    Network,
}

impl TransportType {
    /// Check if this transport is network-attached
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network)
    }
}

/// Device identification information
#[derive(Debug, Clone)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID (assumed for network decks)
    pub pid: u16,
    /// Transport type
    pub transport_type: TransportType,
    /// Device path or remote address (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

/// Discovered device that can be opened
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Device information
    pub info: TransportDeviceInfo,
}

/// Event categories handlers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Button press/release, plus the disconnect notification
    Button,
    EncoderPress,
    EncoderRotate,
    TouchPush,
    TouchSwipe,
    Nfc,
}

impl EventCategory {
    /// All categories, in table order
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Button,
        EventCategory::EncoderPress,
        EventCategory::EncoderRotate,
        EventCategory::TouchPush,
        EventCategory::TouchSwipe,
        EventCategory::Nfc,
    ];

    /// Position of this category in a per-category table
    pub fn index(self) -> usize {
        match self {
            EventCategory::Button => 0,
            EventCategory::EncoderPress => 1,
            EventCategory::EncoderRotate => 2,
            EventCategory::TouchPush => 3,
            EventCategory::TouchSwipe => 4,
            EventCategory::Nfc => 5,
        }
    }
}

/// Button channel events.
///
/// The disconnect notification travels on this channel so a subscriber to
/// button events always learns when the session ends.
#[derive(Debug, Clone)]
pub enum ButtonEvent {
    Pressed(u8),
    Released(u8),
    /// Session ended; the decode loop has stopped
    Disconnected(Arc<TransportError>),
}

impl ButtonEvent {
    /// Logical index of the button, or -1 for a disconnect
    pub fn index(&self) -> i32 {
        match self {
            ButtonEvent::Pressed(i) | ButtonEvent::Released(i) => i32::from(*i),
            ButtonEvent::Disconnected(_) => -1,
        }
    }

    pub fn is_pressed(&self) -> bool {
        matches!(self, ButtonEvent::Pressed(_))
    }

    /// The error that ended the session, if this is a disconnect
    pub fn error(&self) -> Option<&TransportError> {
        match self {
            ButtonEvent::Disconnected(e) => Some(e),
            _ => None,
        }
    }
}

/// Decoded input events
#[derive(Debug, Clone)]
pub enum DeckEvent {
    Button(ButtonEvent),
    EncoderPress {
        index: u8,
        pressed: bool,
    },
    /// Encoder turned by a signed number of detents
    EncoderRotate {
        index: u8,
        delta: i8,
    },
    /// Touch strip tap (`hold == false`) or long press (`hold == true`)
    TouchPush {
        x: u16,
        y: u16,
        hold: bool,
    },
    TouchSwipe {
        from: (u16, u16),
        to: (u16, u16),
    },
    /// Raw NFC tag payload
    Nfc(Vec<u8>),
}

impl DeckEvent {
    /// Category this event is delivered under
    pub fn category(&self) -> EventCategory {
        match self {
            DeckEvent::Button(_) => EventCategory::Button,
            DeckEvent::EncoderPress { .. } => EventCategory::EncoderPress,
            DeckEvent::EncoderRotate { .. } => EventCategory::EncoderRotate,
            DeckEvent::TouchPush { .. } => EventCategory::TouchPush,
            DeckEvent::TouchSwipe { .. } => EventCategory::TouchSwipe,
            DeckEvent::Nfc(_) => EventCategory::Nfc,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, DeckEvent::Button(ButtonEvent::Disconnected(_)))
    }
}
