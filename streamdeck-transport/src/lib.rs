//! Transport and wire protocol layer for Elgato Stream Deck devices
//!
//! This crate provides a unified interface for talking to decks across two
//! backends:
//!
//! - HID Local (direct USB connection)
//! - Network (TCP to a network-attached deck)
//!
//! It also owns the wire protocol: the model registry, inbound report
//! decoding and outbound image framing.

pub mod device_registry;
pub mod error;
pub mod event_parser;
pub mod framing;
pub mod protocol;
pub mod types;

mod discovery;
mod hid_local;
mod network;

pub use device_registry::{
    ButtonMap, DeviceFamily, DeviceRegistry, DeviceTypeDescriptor, ImageFormat, ImageSize,
    ImageTransform, NETWORK_PRODUCT_ID, VENDOR_ID,
};
pub use error::TransportError;
pub use event_parser::{run_decoder_loop, EventDecoder, EventSink};
pub use framing::{frame_image, FrameError, ImageTarget, DEFAULT_MAX_PACKETS};
pub use protocol::{AreaHeader, ButtonHeader, ImageArea};
pub use types::{
    ButtonEvent, DeckEvent, DiscoveredDevice, EventCategory, TransportDeviceInfo, TransportType,
};

pub use discovery::{search_devices, DeviceDiscovery, DeviceSummary, HidDiscovery};
pub use hid_local::HidLocalTransport;
pub use network::{NetworkConfig, NetworkTransport};

use async_trait::async_trait;
use std::sync::Arc;

/// The core transport trait - all backends implement this
///
/// Outbound traffic is either an output report (image packets, LED frames)
/// or a control report (reset, brightness). Inbound traffic is read one
/// report at a time by the decoder task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read one inbound report into `buf`, waiting until one arrives
    ///
    /// # Returns
    /// Number of bytes written into `buf`. An error ends the session.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write an output report
    async fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Send a control (feature) report
    async fn send_control_report(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Close the transport; pending and later reads fail
    async fn close(&self) -> Result<(), TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Record that the peer has proven it is alive
    fn mark_alive(&self) {}
}

/// Type alias for a boxed transport
pub type BoxedTransport = Arc<dyn Transport>;
