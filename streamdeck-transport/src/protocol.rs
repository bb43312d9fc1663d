//! Protocol constants and header layouts for Stream Deck communication
//!
//! Outbound image packets start with a header whose layout depends on the
//! device generation. The set of layouts is closed: every descriptor picks one
//! [`ButtonHeader`] and optionally one [`AreaHeader`].

use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of a network frame, in both directions
pub const FRAME_SIZE: usize = 1024;

/// Size of the buffer used for each inbound report read
pub const REPORT_BUFFER_SIZE: usize = 1024;

/// Default TCP port of network-attached decks
pub const NETWORK_PORT: u16 = 5343;

/// HID output report ID carried by every outbound image/LED packet
pub const OUTPUT_REPORT_ID: u8 = 0x02;

/// Network handshake (serial number request/reply)
pub mod handshake {
    /// First byte of host requests and of the serial reply
    pub const REQUEST: u8 = 0x03;
    /// Selector for the serial number query
    pub const SERIAL: u8 = 0x84;
}

/// Keep-alive exchange on network decks
pub mod keep_alive {
    /// Reply bytes sent in answer to an inbound keep-alive
    pub const REPLY: [u8; 2] = [0x03, 0x1a];
}

/// Inbound report layout
pub mod report {
    /// Byte 0 of every extended-family event report
    pub const EVENT: u8 = 0x01;

    /// Sub-protocol selectors (byte 1)
    pub const BUTTONS: u8 = 0x00;
    pub const TOUCH: u8 = 0x02;
    pub const ENCODER: u8 = 0x03;
    pub const NFC: u8 = 0x04;
    pub const KEEP_ALIVE: u8 = 0x0a;

    /// Offset of the touch/encoder action byte
    pub const ACTION_OFFSET: usize = 4;

    /// Touch actions
    pub mod touch {
        pub const TAP: u8 = 1;
        pub const HOLD: u8 = 2;
        pub const SWIPE: u8 = 3;

        /// Coordinate offsets (little-endian u16 each)
        pub const X: usize = 6;
        pub const Y: usize = 8;
        pub const X_END: usize = 10;
        pub const Y_END: usize = 12;
    }

    /// Encoder actions
    pub mod encoder {
        pub const PRESS: u8 = 0;
        pub const ROTATE: u8 = 1;

        /// First encoder state byte
        pub const STATE_OFFSET: usize = 5;
    }

    /// NFC payload: little-endian length at 2, tag bytes from 4
    pub mod nfc {
        pub const LENGTH_OFFSET: usize = 2;
        pub const DATA_OFFSET: usize = 4;
    }
}

/// Direct LED control writes (extended family)
pub mod led {
    pub const ENCODER_RING: u8 = 0x0f;
    pub const ENCODER_COLOR: u8 = 0x10;
    /// LEDs addressable by one ring write
    pub const RING_SLOTS: usize = 24;
    /// Slot offset applied to the right-hand encoder ring
    pub const RIGHT_RING_OFFSET: usize = 12;
}

/// Rectangle of a sub-display, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageArea {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Header layout for button image writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonHeader {
    /// Device cannot receive images
    #[default]
    None,
    /// First generation BMP decks: 1-based page, 1-based key, 16 bytes
    Original,
    /// Mini BMP decks: 0-based page, 1-based key, 16 bytes
    Mini,
    /// JPEG decks: `02 07 key last len page`, 8 bytes
    Jpeg,
}

/// Header layout for sub-display (area) writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaHeader {
    /// Info display of the Neo: `02 0b 00 last len page`, 8 bytes
    Neo,
    /// Touch strip of the Plus: `02 0c x 0 w h last page len 00`, 16 bytes
    Plus,
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct BmpButtonHeader {
    report_id: u8,
    command: u8,
    page: u8,
    _pad0: u8,
    last: u8,
    key: u8,
    _pad: [u8; 10],
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct JpegButtonHeader {
    report_id: u8,
    command: u8,
    key: u8,
    last: u8,
    length: U16,
    page: U16,
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct NeoAreaHeader {
    report_id: u8,
    command: u8,
    _pad0: u8,
    last: u8,
    length: U16,
    page: U16,
}

#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct PlusAreaHeader {
    report_id: u8,
    command: u8,
    x: U16,
    // Always zero; writes with a non-zero y do not render
    y: U16,
    width: U16,
    height: U16,
    last: u8,
    page: U16,
    length: U16,
    _pad: u8,
}

impl ButtonHeader {
    /// Number of header bytes at the start of each packet
    pub fn header_len(self) -> usize {
        match self {
            ButtonHeader::None => 0,
            ButtonHeader::Original | ButtonHeader::Mini => std::mem::size_of::<BmpButtonHeader>(),
            ButtonHeader::Jpeg => std::mem::size_of::<JpegButtonHeader>(),
        }
    }

    /// Build the header for one chunk of a button image
    pub fn build(self, key: u8, chunk_len: usize, is_last: bool, page: usize) -> Vec<u8> {
        match self {
            ButtonHeader::None => Vec::new(),
            ButtonHeader::Original | ButtonHeader::Mini => {
                let page_base = if self == ButtonHeader::Original { 1 } else { 0 };
                BmpButtonHeader {
                    report_id: OUTPUT_REPORT_ID,
                    command: 0x01,
                    page: (page + page_base) as u8,
                    _pad0: 0,
                    last: u8::from(is_last),
                    key: key.wrapping_add(1),
                    _pad: [0; 10],
                }
                .as_bytes()
                .to_vec()
            }
            ButtonHeader::Jpeg => JpegButtonHeader {
                report_id: OUTPUT_REPORT_ID,
                command: 0x07,
                key,
                last: u8::from(is_last),
                length: U16::new(chunk_len as u16),
                page: U16::new(page as u16),
            }
            .as_bytes()
            .to_vec(),
        }
    }
}

impl AreaHeader {
    /// Number of header bytes at the start of each packet
    pub fn header_len(self) -> usize {
        match self {
            AreaHeader::Neo => std::mem::size_of::<NeoAreaHeader>(),
            AreaHeader::Plus => std::mem::size_of::<PlusAreaHeader>(),
        }
    }

    /// Build the header for one chunk of an area image
    pub fn build(self, area: &ImageArea, chunk_len: usize, is_last: bool, page: usize) -> Vec<u8> {
        match self {
            AreaHeader::Neo => NeoAreaHeader {
                report_id: OUTPUT_REPORT_ID,
                command: 0x0b,
                _pad0: 0,
                last: u8::from(is_last),
                length: U16::new(chunk_len as u16),
                page: U16::new(page as u16),
            }
            .as_bytes()
            .to_vec(),
            AreaHeader::Plus => PlusAreaHeader {
                report_id: OUTPUT_REPORT_ID,
                command: 0x0c,
                x: U16::new(area.x),
                y: U16::new(0),
                width: U16::new(area.width),
                height: U16::new(area.height),
                last: u8::from(is_last),
                page: U16::new(page as u16),
                length: U16::new(chunk_len as u16),
                _pad: 0,
            }
            .as_bytes()
            .to_vec(),
        }
    }
}

/// Serial number request sent right after connecting to a network deck
pub fn serial_request() -> [u8; FRAME_SIZE] {
    let mut frame = [0u8; FRAME_SIZE];
    frame[0] = handshake::REQUEST;
    frame[1] = handshake::SERIAL;
    frame
}

/// Extract the serial number from a handshake reply frame.
///
/// The length field is big-endian, unlike every other multi-byte field on
/// the wire.
pub fn parse_serial_reply(frame: &[u8]) -> Option<String> {
    if frame.len() < 4 || frame[0] != handshake::REQUEST || frame[1] != handshake::SERIAL {
        return None;
    }
    let len = u16::from_be_bytes([frame[2], frame[3]]) as usize;
    if len == 0 || frame.len() < 4 + len {
        return None;
    }
    Some(String::from_utf8_lossy(&frame[4..4 + len]).into_owned())
}

/// Reply frame for an inbound keep-alive
pub fn keep_alive_reply() -> [u8; FRAME_SIZE] {
    let mut frame = [0u8; FRAME_SIZE];
    frame[..2].copy_from_slice(&keep_alive::REPLY);
    frame
}

/// Solid colour write for one encoder's LED
pub fn encoder_color_frame(encoder: u8, rgb: [u8; 3]) -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_SIZE];
    frame[0] = OUTPUT_REPORT_ID;
    frame[1] = led::ENCODER_COLOR;
    frame[2] = encoder;
    frame[3..6].copy_from_slice(&rgb);
    frame
}

/// Per-LED colour write for an encoder ring.
///
/// Colours fill consecutive slots starting at `offset`, wrapping at
/// [`led::RING_SLOTS`]; the right-hand ring (encoder 1) is shifted by half a
/// turn.
pub fn encoder_ring_frame(encoder: u8, colours: &[[u8; 3]], offset: usize) -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_SIZE];
    frame[0] = OUTPUT_REPORT_ID;
    frame[1] = led::ENCODER_RING;
    frame[2] = encoder;

    let shift = if encoder == 1 {
        led::RIGHT_RING_OFFSET
    } else {
        0
    };
    let start = shift + offset % led::RING_SLOTS;
    for (i, rgb) in colours.iter().take(led::RING_SLOTS).enumerate() {
        let slot = (start + i) % led::RING_SLOTS;
        let at = 3 + slot * 3;
        frame[at..at + 3].copy_from_slice(rgb);
    }
    frame
}
