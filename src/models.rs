//! Built-in deck models
//!
//! Descriptor data for every supported model. [`builtin_registry`] registers
//! them in a fixed order; applications may build their own
//! [`DeviceRegistry`] from these constructors plus custom descriptors.

use streamdeck_transport::{
    AreaHeader, ButtonHeader, ButtonMap, DeviceFamily, DeviceRegistry, DeviceTypeDescriptor,
    ImageFormat, ImageSize, ImageTransform, NETWORK_PRODUCT_ID,
};

/// Product ids of the built-in models
pub mod pid {
    pub const ORIGINAL: u16 = 0x0060;
    pub const ORIGINAL_V2: u16 = 0x006d;
    pub const MINI: u16 = 0x0063;
    pub const XL: u16 = 0x006c;
    pub const MK2: u16 = 0x0080;
    pub const NEO: u16 = 0x009a;
    pub const PEDAL: u16 = 0x0086;
    pub const PLUS: u16 = 0x0084;
    pub const STUDIO: u16 = super::NETWORK_PRODUCT_ID;
}

/// Image packet size of the second generation and later
const PACKET_SIZE: usize = 1024;

/// Reset report of 32-byte feature report models
fn reset_report_32() -> Vec<u8> {
    let mut report = vec![0u8; 32];
    report[..2].copy_from_slice(&[0x03, 0x02]);
    report
}

fn brightness_report_32() -> Vec<u8> {
    vec![0x03, 0x08]
}

/// Common shape of the JPEG models; callers adjust what differs
fn jpeg_model(
    name: &str,
    product_id: u16,
    (rows, cols): (u8, u8),
    button_px: u32,
) -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        name: name.to_string(),
        family: DeviceFamily::Legacy,
        image_size: ImageSize::new(button_px, button_px),
        product_id,
        reset_report: reset_report_32(),
        button_count: rows * cols,
        rows,
        cols,
        brightness_report: brightness_report_32(),
        button_read_offset: 4,
        encoder_count: 0,
        image_format: Some(ImageFormat::Jpeg),
        image_transform: ImageTransform::None,
        packet_capacity: PACKET_SIZE,
        button_header: ButtonHeader::Jpeg,
        area_header: None,
        button_map: None,
    }
}

/// First generation 15-key deck (BMP images, 8 KiB packets)
pub fn original() -> DeviceTypeDescriptor {
    let mut reset_report = vec![0u8; 17];
    reset_report[..2].copy_from_slice(&[0x0b, 0x63]);

    DeviceTypeDescriptor {
        name: "Streamdeck Original".into(),
        family: DeviceFamily::Original,
        image_size: ImageSize::new(72, 72),
        product_id: pid::ORIGINAL,
        reset_report,
        button_count: 15,
        rows: 3,
        cols: 5,
        brightness_report: vec![0x05, 0x55, 0xaa, 0xd1, 0x01],
        button_read_offset: 1,
        encoder_count: 0,
        image_format: Some(ImageFormat::Bmp),
        image_transform: ImageTransform::Rotate180,
        packet_capacity: 8191,
        button_header: ButtonHeader::Original,
        area_header: None,
        // Keys are reported right to left within each row
        button_map: Some(ButtonMap::new((0..15u8).map(|logical| {
            let (row, col) = (logical / 5, logical % 5);
            (logical, row * 5 + (4 - col))
        }))),
    }
}

pub fn original_v2() -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        image_transform: ImageTransform::Rotate180,
        ..jpeg_model("Streamdeck Original V2", pid::ORIGINAL_V2, (3, 5), 72)
    }
}

pub fn mini() -> DeviceTypeDescriptor {
    let mut reset_report = vec![0u8; 17];
    reset_report[..2].copy_from_slice(&[0x0b, 0x63]);

    DeviceTypeDescriptor {
        name: "Streamdeck Mini".into(),
        family: DeviceFamily::Legacy,
        image_size: ImageSize::new(80, 80),
        product_id: pid::MINI,
        reset_report,
        button_count: 6,
        rows: 2,
        cols: 3,
        brightness_report: vec![0x05, 0x55, 0xaa, 0xd1, 0x01],
        button_read_offset: 1,
        encoder_count: 0,
        image_format: Some(ImageFormat::Bmp),
        image_transform: ImageTransform::Rotate90FlipVertical,
        packet_capacity: PACKET_SIZE,
        button_header: ButtonHeader::Mini,
        area_header: None,
        button_map: None,
    }
}

pub fn xl() -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        image_transform: ImageTransform::Rotate180,
        ..jpeg_model("Streamdeck XL", pid::XL, (4, 8), 96)
    }
}

pub fn mk2() -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        image_transform: ImageTransform::Rotate180,
        ..jpeg_model("Streamdeck MK2", pid::MK2, (3, 5), 72)
    }
}

/// Eight keys plus two touch keys and an info display
pub fn neo() -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        button_count: 10,
        area_header: Some(AreaHeader::Neo),
        ..jpeg_model("Streamdeck Neo", pid::NEO, (2, 4), 96)
    }
}

/// Three pedals, no displays
pub fn pedal() -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        image_size: ImageSize::default(),
        image_format: None,
        packet_capacity: 0,
        button_header: ButtonHeader::None,
        ..jpeg_model("Streamdeck Pedal", pid::PEDAL, (1, 3), 0)
    }
}

/// Eight keys, four encoders and a touch strip
pub fn plus() -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        family: DeviceFamily::Extended,
        encoder_count: 4,
        area_header: Some(AreaHeader::Plus),
        ..jpeg_model("Streamdeck Plus", pid::PLUS, (2, 4), 120)
    }
}

/// Network-attached 32-key deck with two encoders and an NFC reader
pub fn studio() -> DeviceTypeDescriptor {
    DeviceTypeDescriptor {
        family: DeviceFamily::Extended,
        image_size: ImageSize::new(144, 112),
        encoder_count: 2,
        ..jpeg_model("Streamdeck Studio", pid::STUDIO, (2, 16), 0)
    }
}

/// Registry of every built-in model
pub fn builtin_registry() -> DeviceRegistry {
    let mut registry = DeviceRegistry::new();
    for descriptor in [
        original(),
        original_v2(),
        mini(),
        xl(),
        mk2(),
        neo(),
        pedal(),
        plus(),
        studio(),
    ] {
        registry.register(descriptor);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamdeck_transport::{frame_image, ImageArea, ImageTarget};

    fn le16(packet: &[u8], at: usize) -> usize {
        usize::from(u16::from_le_bytes([packet[at], packet[at + 1]]))
    }

    /// Final flag and page number as each header lays them out
    fn button_flags(header: ButtonHeader, packet: &[u8]) -> (u8, usize) {
        match header {
            ButtonHeader::Original => (packet[4], usize::from(packet[2]) - 1),
            ButtonHeader::Mini => (packet[4], usize::from(packet[2])),
            ButtonHeader::Jpeg => (packet[3], le16(packet, 6)),
            ButtonHeader::None => unreachable!("no image header"),
        }
    }

    fn area_flags(header: AreaHeader, packet: &[u8]) -> (u8, usize) {
        match header {
            AreaHeader::Neo => (packet[3], le16(packet, 6)),
            AreaHeader::Plus => (packet[10], le16(packet, 11)),
        }
    }

    fn check_pages(name: &str, packets: &[Vec<u8>], flags: impl Fn(&[u8]) -> (u8, usize)) {
        let last_page = packets.len() - 1;
        for (i, packet) in packets.iter().enumerate() {
            let (last, page) = flags(packet.as_slice());
            assert_eq!(page, i, "{} page order", name);
            assert_eq!(last, u8::from(i == last_page), "{} final flag on page {}", name, i);
        }
    }

    #[test]
    fn test_every_builtin_frames_multi_packet_images() {
        for d in builtin_registry().descriptors() {
            if !d.has_image_capability() {
                continue;
            }
            let capacity = d.packet_capacity;

            let room = capacity - d.button_header.header_len();
            // Halving decks take exactly two packets, the rest need three
            let (len, expected) = if d.family.halves_chunks() {
                (room + room / 2, 2)
            } else {
                (2 * room + 10, 3)
            };
            let payload = vec![0x5a; len];
            let packets = frame_image(d, ImageTarget::Button(1), &payload, None).unwrap();
            assert_eq!(packets.len(), expected, "{}", d.name);
            assert!(packets.iter().all(|p| p.len() == capacity), "{}", d.name);
            check_pages(&d.name, &packets, |p| button_flags(d.button_header, p));

            if let Some(area_header) = d.area_header {
                let room = capacity - area_header.header_len();
                let area = ImageArea {
                    x: 0,
                    y: 0,
                    width: 248,
                    height: 58,
                };
                let payload = vec![0xa5; 2 * room + 1];
                let packets = frame_image(d, ImageTarget::Area(area), &payload, None).unwrap();
                assert_eq!(packets.len(), 3, "{} area", d.name);
                assert!(packets.iter().all(|p| p.len() == capacity), "{} area", d.name);
                check_pages(&d.name, &packets, |p| area_flags(area_header, p));
            }
        }
    }

    #[test]
    fn test_registration_order() {
        let names: Vec<_> = builtin_registry()
            .descriptors()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(
            names,
            [
                "Streamdeck Original",
                "Streamdeck Original V2",
                "Streamdeck Mini",
                "Streamdeck XL",
                "Streamdeck MK2",
                "Streamdeck Neo",
                "Streamdeck Pedal",
                "Streamdeck Plus",
                "Streamdeck Studio",
            ]
        );
    }

    #[test]
    fn test_network_pid_resolves_to_studio() {
        let registry = builtin_registry();
        let studio = registry.lookup(NETWORK_PRODUCT_ID).unwrap();
        assert_eq!(studio.button_count, 32);
        assert_eq!(studio.image_size, ImageSize::new(144, 112));
        assert!(studio.family.is_extended());
    }

    #[test]
    fn test_geometry_consistent() {
        for d in builtin_registry().descriptors() {
            if d.name != "Streamdeck Neo" {
                assert_eq!(
                    usize::from(d.rows) * usize::from(d.cols),
                    usize::from(d.button_count),
                    "{}",
                    d.name
                );
            }
            if d.has_image_capability() {
                assert!(d.image_format.is_some(), "{}", d.name);
                assert!(d.packet_capacity > d.button_header.header_len(), "{}", d.name);
            }
        }
    }

    #[test]
    fn test_pedal_has_no_displays() {
        let pedal = pedal();
        assert!(!pedal.has_image_capability());
        assert_eq!(pedal.button_count, 3);
    }

    #[test]
    fn test_original_reports_mirrored_rows() {
        let original = original();
        assert_eq!(original.to_physical(0), 4);
        assert_eq!(original.to_physical(7), 7);
        assert_eq!(original.to_logical(5), 9);
        assert_eq!(original.reset_report.len(), 17);
    }
}
