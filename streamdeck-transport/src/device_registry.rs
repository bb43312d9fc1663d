//! Device registry - descriptor lookup by PID
//!
//! Every supported model is described by an immutable
//! [`DeviceTypeDescriptor`]. Descriptors are registered once at startup into a
//! [`DeviceRegistry`] value, which the open routine consults to match
//! enumerated devices by USB product id.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::protocol::{AreaHeader, ButtonHeader};

/// Elgato vendor ID
pub const VENDOR_ID: u16 = 0x0fd9;

/// Product id assumed for decks reached over the network
pub const NETWORK_PRODUCT_ID: u16 = 0x00aa;

/// Protocol generation of a model.
///
/// Selects the inbound report decoder and the outbound framing quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    /// First generation deck: legacy button reports, and image chunks are
    /// halved whenever the payload does not fit one packet
    Original,
    /// Button-only reports at a fixed offset
    Legacy,
    /// Multi-surface reports: buttons, encoders, touch strip, NFC, keep-alive
    Extended,
}

impl DeviceFamily {
    pub fn is_extended(self) -> bool {
        matches!(self, DeviceFamily::Extended)
    }

    /// Whether image chunks are halved when the payload spans packets
    pub fn halves_chunks(self) -> bool {
        matches!(self, DeviceFamily::Original)
    }
}

/// Encoded image format expected by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Bmp,
}

/// Orientation correction applied to images before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageTransform {
    #[default]
    None,
    Rotate180,
    Rotate90FlipVertical,
}

/// Pixel dimensions of a button image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero size means the model has no displays
    pub fn is_zero(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

/// Logical → physical button remapping.
///
/// Not necessarily a bijection: indices without an entry pass through
/// unchanged in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonMap {
    to_physical: BTreeMap<u8, u8>,
}

impl ButtonMap {
    pub fn new(pairs: impl IntoIterator<Item = (u8, u8)>) -> Self {
        Self {
            to_physical: pairs.into_iter().collect(),
        }
    }

    /// Wire index for an application-facing index
    pub fn to_physical(&self, logical: u8) -> u8 {
        self.to_physical.get(&logical).copied().unwrap_or(logical)
    }

    /// Application-facing index for a wire index
    pub fn to_logical(&self, physical: u8) -> u8 {
        self.to_physical
            .iter()
            .find(|(_, &p)| p == physical)
            .map(|(&l, _)| l)
            .unwrap_or(physical)
    }
}

/// Immutable protocol and geometry definition of one model
#[derive(Debug, Clone)]
pub struct DeviceTypeDescriptor {
    pub name: String,
    pub family: DeviceFamily,
    /// Button image size; zero for models without displays
    pub image_size: ImageSize,
    pub product_id: u16,
    /// Control report that resets the device's comms state
    pub reset_report: Vec<u8>,
    pub button_count: u8,
    pub rows: u8,
    pub cols: u8,
    /// Control report prefix; the brightness percentage is appended
    pub brightness_report: Vec<u8>,
    /// Offset of the first button state byte in an inbound report
    pub button_read_offset: usize,
    pub encoder_count: u8,
    pub image_format: Option<ImageFormat>,
    pub image_transform: ImageTransform,
    /// Total size of each outbound image packet, header included
    pub packet_capacity: usize,
    pub button_header: ButtonHeader,
    pub area_header: Option<AreaHeader>,
    pub button_map: Option<ButtonMap>,
}

impl DeviceTypeDescriptor {
    pub fn has_image_capability(&self) -> bool {
        !self.image_size.is_zero()
    }

    /// Wire index for a logical button index
    pub fn to_physical(&self, logical: u8) -> u8 {
        match &self.button_map {
            Some(map) => map.to_physical(logical),
            None => logical,
        }
    }

    /// Logical index for a wire button index
    pub fn to_logical(&self, physical: u8) -> u8 {
        match &self.button_map {
            Some(map) => map.to_logical(physical),
            None => physical,
        }
    }

    /// Brightness control report for a percentage, clamped to 0..=100
    pub fn brightness_command(&self, percent: i32) -> Vec<u8> {
        let mut report = self.brightness_report.clone();
        report.push(percent.clamp(0, 100) as u8);
        report
    }
}

/// Registered descriptors, in registration order
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    descriptors: Vec<Arc<DeviceTypeDescriptor>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model.
    ///
    /// Duplicate product ids are accepted; lookups resolve to whichever was
    /// registered first.
    pub fn register(&mut self, descriptor: DeviceTypeDescriptor) {
        self.descriptors.push(Arc::new(descriptor));
    }

    /// First registered descriptor for a product id
    pub fn lookup(&self, product_id: u16) -> Option<Arc<DeviceTypeDescriptor>> {
        self.descriptors
            .iter()
            .find(|d| d.product_id == product_id)
            .cloned()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<DeviceTypeDescriptor>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
