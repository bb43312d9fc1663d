//! Outbound image framing
//!
//! Splits an encoded image into fixed-size packets: header, payload chunk,
//! zero padding. Packets are built up front so precondition failures and the
//! packet cap abort before anything reaches the device.

use thiserror::Error;
use tracing::trace;

use crate::device_registry::DeviceTypeDescriptor;
use crate::protocol::{AreaHeader, ButtonHeader, ImageArea};

/// Historical safety cap on packets per image
pub const DEFAULT_MAX_PACKETS: usize = 20;

/// Where an image is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    /// Logical button index
    Button(usize),
    /// Sub-display rectangle
    Area(ImageArea),
}

/// Framing precondition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid button index {index} (device has {count} buttons)")]
    InvalidIndex { index: usize, count: u8 },

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Image too large: exceeds {limit} packets")]
    ImageTooLarge { limit: usize },
}

/// Header layout resolved for one write
enum Header {
    Button(ButtonHeader, u8),
    Area(AreaHeader, ImageArea),
}

impl Header {
    fn len(&self) -> usize {
        match self {
            Header::Button(header, _) => header.header_len(),
            Header::Area(header, _) => header.header_len(),
        }
    }

    fn build(&self, chunk: usize, is_last: bool, page: usize) -> Vec<u8> {
        match self {
            Header::Button(header, key) => header.build(*key, chunk, is_last, page),
            Header::Area(header, area) => header.build(area, chunk, is_last, page),
        }
    }
}

/// Frame `payload` for `target` into full-capacity packets.
///
/// Each packet's header carries the length of its own chunk and the final
/// flag is set on the packet that exhausts the payload. First-generation
/// devices halve the chunk whenever the remainder does not fit one packet.
pub fn frame_image(
    descriptor: &DeviceTypeDescriptor,
    target: ImageTarget,
    payload: &[u8],
    max_packets: Option<usize>,
) -> Result<Vec<Vec<u8>>, FrameError> {
    if !descriptor.has_image_capability() {
        return Err(FrameError::Unsupported("device has no displays"));
    }

    let header = match target {
        ImageTarget::Button(index) => {
            if index >= usize::from(descriptor.button_count) {
                return Err(FrameError::InvalidIndex {
                    index,
                    count: descriptor.button_count,
                });
            }
            Header::Button(descriptor.button_header, descriptor.to_physical(index as u8))
        }
        ImageTarget::Area(area) => match descriptor.area_header {
            Some(header) => Header::Area(header, area),
            None => return Err(FrameError::Unsupported("device has no area display")),
        },
    };
    let header_len = header.len();
    if header_len == 0 {
        return Err(FrameError::Unsupported("device has no image header format"));
    }

    let capacity = descriptor.packet_capacity;
    if capacity <= header_len {
        return Err(FrameError::Unsupported("packet capacity smaller than header"));
    }
    let payload_capacity = capacity - header_len;
    let halves = descriptor.family.halves_chunks() && matches!(target, ImageTarget::Button(_));
    let half = payload.len() / 2;

    let mut packets = Vec::new();
    let mut remaining = payload.len();
    let mut sent = 0;
    let mut page = 0;

    while remaining > 0 {
        if let Some(limit) = max_packets {
            if packets.len() >= limit {
                return Err(FrameError::ImageTooLarge { limit });
            }
        }

        let chunk = if payload_capacity < remaining {
            if halves {
                half
            } else {
                payload_capacity
            }
        } else {
            remaining
        };
        // A halved image must fit two packets
        if chunk > payload_capacity {
            return Err(FrameError::ImageTooLarge { limit: 2 });
        }
        let is_last = chunk == remaining;

        let mut packet = header.build(chunk, is_last, page);
        packet.extend_from_slice(&payload[sent..sent + chunk]);
        packet.resize(capacity, 0);
        trace!(
            "Framed page {} ({} bytes, last={}) for {:?}",
            page,
            chunk,
            is_last,
            target
        );
        packets.push(packet);

        remaining -= chunk;
        sent += chunk;
        page += 1;
    }

    Ok(packets)
}
