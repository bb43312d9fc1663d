//! Inbound report decoding
//!
//! [`EventDecoder`] turns raw input reports into [`DeckEvent`]s. It owns the
//! debounce state for every button and encoder, so it must only ever be driven
//! from one task: [`run_decoder_loop`] reads reports from a transport, decodes
//! them, answers keep-alives, and hands events to an [`EventSink`] in order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::device_registry::{DeviceFamily, DeviceTypeDescriptor};
use crate::protocol::{keep_alive_reply, report, REPORT_BUFFER_SIZE};
use crate::types::{ButtonEvent, DeckEvent};
use crate::Transport;

/// Minimum time between two emitted presses of the same input
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(100);

/// Edge reported by [`Debouncer::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pressed,
    Released,
}

/// Debounce timers and press latches, indexed by logical input.
///
/// A press is emitted only if [`DEBOUNCE_INTERVAL`] has passed since the last
/// emitted press of that input. A release is emitted only while a press is
/// latched, so a suppressed press never produces a stray release.
#[derive(Debug, Clone)]
pub struct Debouncer {
    last_press: Vec<Option<Instant>>,
    latched: Vec<bool>,
}

impl Debouncer {
    pub fn new(inputs: usize) -> Self {
        Self {
            last_press: vec![None; inputs],
            latched: vec![false; inputs],
        }
    }

    /// Feed the current level of one input
    pub fn update(&mut self, index: usize, down: bool, now: Instant) -> Option<Transition> {
        let (Some(last), Some(latched)) =
            (self.last_press.get_mut(index), self.latched.get_mut(index))
        else {
            return None;
        };

        if down {
            let ready =
                last.map_or(true, |t| now.saturating_duration_since(t) >= DEBOUNCE_INTERVAL);
            if !ready {
                return None;
            }
            let was_latched = std::mem::replace(latched, true);
            if was_latched {
                return None;
            }
            *last = Some(now);
            Some(Transition::Pressed)
        } else if *latched {
            *latched = false;
            Some(Transition::Released)
        } else {
            None
        }
    }
}

/// Result of decoding one report
#[derive(Debug, Default)]
pub struct Decoded {
    pub events: Vec<DeckEvent>,
    /// The report was a keep-alive that needs a reply
    pub keep_alive: bool,
}

/// Stateful decoder for one open device
pub struct EventDecoder {
    descriptor: Arc<DeviceTypeDescriptor>,
    buttons: Debouncer,
    encoders: Debouncer,
}

fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes([*data.get(offset)?, *data.get(offset + 1)?]))
}

impl EventDecoder {
    pub fn new(descriptor: Arc<DeviceTypeDescriptor>) -> Self {
        Self {
            buttons: Debouncer::new(usize::from(descriptor.button_count)),
            encoders: Debouncer::new(usize::from(descriptor.encoder_count)),
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &DeviceTypeDescriptor {
        &self.descriptor
    }

    /// Decode one report received at `now`
    pub fn decode(&mut self, data: &[u8], now: Instant) -> Decoded {
        let mut out = Decoded::default();

        match self.descriptor.family {
            // Byte 0 carries no meaning on these generations
            DeviceFamily::Original | DeviceFamily::Legacy => {
                self.decode_buttons(data, now, &mut out.events)
            }
            DeviceFamily::Extended => {
                if data.first() != Some(&report::EVENT) {
                    return out;
                }
                match data.get(1).copied() {
                    Some(report::BUTTONS) => self.decode_buttons(data, now, &mut out.events),
                    Some(report::TOUCH) => Self::decode_touch(data, &mut out.events),
                    Some(report::ENCODER) => self.decode_encoders(data, now, &mut out.events),
                    Some(report::NFC) => Self::decode_nfc(data, &mut out.events),
                    Some(report::KEEP_ALIVE) => out.keep_alive = true,
                    other => trace!("Ignoring report selector {:02X?}", other),
                }
            }
        }

        out
    }

    fn decode_buttons(&mut self, data: &[u8], now: Instant, events: &mut Vec<DeckEvent>) {
        let offset = self.descriptor.button_read_offset;
        for physical in 0..self.descriptor.button_count {
            let down = data
                .get(offset + usize::from(physical))
                .is_some_and(|&b| b != 0);
            let logical = self.descriptor.to_logical(physical);
            match self.buttons.update(usize::from(logical), down, now) {
                Some(Transition::Pressed) => {
                    events.push(DeckEvent::Button(ButtonEvent::Pressed(logical)))
                }
                Some(Transition::Released) => {
                    events.push(DeckEvent::Button(ButtonEvent::Released(logical)))
                }
                None => {}
            }
        }
    }

    fn decode_encoders(&mut self, data: &[u8], now: Instant, events: &mut Vec<DeckEvent>) {
        let action = data.get(report::ACTION_OFFSET).copied();
        for index in 0..self.descriptor.encoder_count {
            let state = data
                .get(report::encoder::STATE_OFFSET + usize::from(index))
                .copied()
                .unwrap_or(0);
            match action {
                Some(report::encoder::ROTATE) => {
                    if state != 0 {
                        events.push(DeckEvent::EncoderRotate {
                            index,
                            delta: state as i8,
                        });
                    }
                }
                Some(report::encoder::PRESS) => {
                    match self.encoders.update(usize::from(index), state != 0, now) {
                        Some(Transition::Pressed) => events.push(DeckEvent::EncoderPress {
                            index,
                            pressed: true,
                        }),
                        Some(Transition::Released) => events.push(DeckEvent::EncoderPress {
                            index,
                            pressed: false,
                        }),
                        None => {}
                    }
                }
                _ => {}
            }
        }
    }

    fn decode_touch(data: &[u8], events: &mut Vec<DeckEvent>) {
        use report::touch;

        let action = data.get(report::ACTION_OFFSET).copied();
        let point = |x, y| Some((read_u16_le(data, x)?, read_u16_le(data, y)?));

        match action {
            Some(touch::TAP) | Some(touch::HOLD) => {
                if let Some((x, y)) = point(touch::X, touch::Y) {
                    events.push(DeckEvent::TouchPush {
                        x,
                        y,
                        hold: action == Some(touch::HOLD),
                    });
                }
            }
            Some(touch::SWIPE) => {
                if let (Some(from), Some(to)) =
                    (point(touch::X, touch::Y), point(touch::X_END, touch::Y_END))
                {
                    events.push(DeckEvent::TouchSwipe { from, to });
                }
            }
            other => trace!("Ignoring touch action {:02X?}", other),
        }
    }

    fn decode_nfc(data: &[u8], events: &mut Vec<DeckEvent>) {
        use report::nfc;

        let Some(len) = read_u16_le(data, nfc::LENGTH_OFFSET) else {
            return;
        };
        let end = nfc::DATA_OFFSET + usize::from(len);
        if data.len() >= end {
            events.push(DeckEvent::Nfc(data[nfc::DATA_OFFSET..end].to_vec()));
        } else {
            debug!("NFC report claims {} bytes, only {} available", len, data.len());
        }
    }
}

/// Receiver of decoded events, invoked from the decoder task
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: DeckEvent);
}

/// Decode loop for one open device.
///
/// Runs until a read (or keep-alive reply) fails, then delivers exactly one
/// disconnect event and returns. No event is dispatched after the disconnect.
pub async fn run_decoder_loop(
    transport: Arc<dyn Transport>,
    mut decoder: EventDecoder,
    sink: Arc<dyn EventSink>,
) {
    let name = decoder.descriptor().name.clone();
    let answers_keep_alive = transport.device_info().transport_type.is_network();
    debug!("{} decoder started", name);

    let mut buf = vec![0u8; REPORT_BUFFER_SIZE];
    loop {
        buf.fill(0);
        let len = match transport.read(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                warn!("{} read failed, ending session: {}", name, e);
                sink.dispatch(DeckEvent::Button(ButtonEvent::Disconnected(Arc::new(e))));
                break;
            }
        };
        trace!("{} report ({} bytes): {:02X?}", name, len, &buf[..len.min(16)]);

        let decoded = decoder.decode(&buf, Instant::now());

        if decoded.keep_alive {
            if answers_keep_alive {
                transport.mark_alive();
                if let Err(e) = transport.write(&keep_alive_reply()).await {
                    warn!("{} keep-alive reply failed, ending session: {}", name, e);
                    sink.dispatch(DeckEvent::Button(ButtonEvent::Disconnected(Arc::new(e))));
                    break;
                }
                trace!("{} answered keep-alive", name);
            } else {
                debug!("{} ignoring keep-alive on local transport", name);
            }
        }

        for event in decoded.events {
            sink.dispatch(event);
        }
    }

    debug!("{} decoder stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_registry::{ButtonMap, ImageFormat, ImageSize, ImageTransform};
    use crate::error::TransportError;
    use crate::protocol::{AreaHeader, ButtonHeader};
    use crate::types::{TransportDeviceInfo, TransportType};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn descriptor(family: DeviceFamily) -> DeviceTypeDescriptor {
        DeviceTypeDescriptor {
            name: "test".into(),
            family,
            image_size: ImageSize::new(120, 120),
            product_id: 0x84,
            reset_report: vec![0x03, 0x02],
            button_count: 8,
            rows: 2,
            cols: 4,
            brightness_report: vec![0x03, 0x08],
            button_read_offset: 4,
            encoder_count: 4,
            image_format: Some(ImageFormat::Jpeg),
            image_transform: ImageTransform::None,
            packet_capacity: 1024,
            button_header: ButtonHeader::Jpeg,
            area_header: Some(AreaHeader::Plus),
            button_map: None,
        }
    }

    fn decoder(family: DeviceFamily) -> EventDecoder {
        EventDecoder::new(Arc::new(descriptor(family)))
    }

    fn buttons_report(pressed: &[usize]) -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[0] = 0x01;
        for &i in pressed {
            data[4 + i] = 1;
        }
        data
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_press_then_release() {
        let mut dec = decoder(DeviceFamily::Legacy);
        let t0 = Instant::now();

        let ev = dec.decode(&buttons_report(&[2]), t0).events;
        assert!(matches!(ev[..], [DeckEvent::Button(ButtonEvent::Pressed(2))]));

        let ev = dec.decode(&buttons_report(&[]), t0 + ms(150)).events;
        assert!(matches!(ev[..], [DeckEvent::Button(ButtonEvent::Released(2))]));
    }

    #[test]
    fn test_repress_within_debounce_window_suppressed() {
        let mut dec = decoder(DeviceFamily::Legacy);
        let t0 = Instant::now();

        assert_eq!(dec.decode(&buttons_report(&[0]), t0).events.len(), 1);
        assert_eq!(dec.decode(&buttons_report(&[]), t0 + ms(20)).events.len(), 1);
        // Second press 50ms after the first: no event, and no stray release
        assert!(dec.decode(&buttons_report(&[0]), t0 + ms(50)).events.is_empty());
        assert!(dec.decode(&buttons_report(&[]), t0 + ms(60)).events.is_empty());
        // Outside the window presses count again
        let ev = dec.decode(&buttons_report(&[0]), t0 + ms(120)).events;
        assert!(matches!(ev[..], [DeckEvent::Button(ButtonEvent::Pressed(0))]));
    }

    #[test]
    fn test_held_button_reports_once() {
        let mut dec = decoder(DeviceFamily::Legacy);
        let t0 = Instant::now();
        assert_eq!(dec.decode(&buttons_report(&[1]), t0).events.len(), 1);
        assert!(dec.decode(&buttons_report(&[1]), t0 + ms(500)).events.is_empty());
    }

    #[test]
    fn test_legacy_ignores_byte_zero() {
        let mut dec = decoder(DeviceFamily::Legacy);
        let mut data = buttons_report(&[3]);
        data[0] = 0x7f;
        assert_eq!(dec.decode(&data, Instant::now()).events.len(), 1);
    }

    #[test]
    fn test_legacy_remaps_to_logical_index() {
        let mut d = descriptor(DeviceFamily::Legacy);
        d.button_map = Some(ButtonMap::new([(5, 0)]));
        let mut dec = EventDecoder::new(Arc::new(d));
        let ev = dec.decode(&buttons_report(&[0]), Instant::now()).events;
        assert!(matches!(ev[..], [DeckEvent::Button(ButtonEvent::Pressed(5))]));
    }

    #[test]
    fn test_extended_requires_event_marker() {
        let mut dec = decoder(DeviceFamily::Extended);
        let mut data = buttons_report(&[1]);
        data[0] = 0x02;
        assert!(dec.decode(&data, Instant::now()).events.is_empty());

        data[0] = 0x01;
        let ev = dec.decode(&data, Instant::now()).events;
        assert!(matches!(ev[..], [DeckEvent::Button(ButtonEvent::Pressed(1))]));
    }

    fn encoder_report(action: u8, states: [u8; 4]) -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[0] = 0x01;
        data[1] = report::ENCODER;
        data[4] = action;
        data[5..9].copy_from_slice(&states);
        data
    }

    #[test]
    fn test_encoder_rotation_is_signed() {
        let mut dec = decoder(DeviceFamily::Extended);
        let ev = dec
            .decode(&encoder_report(1, [0x01, 0xff, 0x00, 0xfd]), Instant::now())
            .events;
        assert_eq!(ev.len(), 3);
        assert!(matches!(ev[0], DeckEvent::EncoderRotate { index: 0, delta: 1 }));
        assert!(matches!(ev[1], DeckEvent::EncoderRotate { index: 1, delta: -1 }));
        assert!(matches!(ev[2], DeckEvent::EncoderRotate { index: 3, delta: -3 }));
    }

    #[test]
    fn test_encoder_press_debounced() {
        let mut dec = decoder(DeviceFamily::Extended);
        let t0 = Instant::now();

        let ev = dec.decode(&encoder_report(0, [0, 1, 0, 0]), t0).events;
        assert!(matches!(ev[..], [DeckEvent::EncoderPress { index: 1, pressed: true }]));

        let ev = dec.decode(&encoder_report(0, [0, 0, 0, 0]), t0 + ms(30)).events;
        assert!(matches!(ev[..], [DeckEvent::EncoderPress { index: 1, pressed: false }]));

        assert!(dec
            .decode(&encoder_report(0, [0, 1, 0, 0]), t0 + ms(60))
            .events
            .is_empty());
    }

    #[test]
    fn test_touch_events() {
        let mut dec = decoder(DeviceFamily::Extended);
        let mut data = vec![0u8; 64];
        data[0] = 0x01;
        data[1] = report::TOUCH;
        data[4] = report::touch::TAP;
        data[6..14].copy_from_slice(&[0x2c, 0x01, 0x32, 0x00, 0x58, 0x02, 0x0a, 0x00]);

        let ev = dec.decode(&data, Instant::now()).events;
        assert!(matches!(ev[..], [DeckEvent::TouchPush { x: 300, y: 50, hold: false }]));

        data[4] = report::touch::HOLD;
        let ev = dec.decode(&data, Instant::now()).events;
        assert!(matches!(ev[..], [DeckEvent::TouchPush { x: 300, y: 50, hold: true }]));

        data[4] = report::touch::SWIPE;
        let ev = dec.decode(&data, Instant::now()).events;
        assert!(matches!(
            ev[..],
            [DeckEvent::TouchSwipe {
                from: (300, 50),
                to: (600, 10)
            }]
        ));
    }

    #[test]
    fn test_nfc_payload() {
        let mut dec = decoder(DeviceFamily::Extended);
        let mut data = vec![0u8; 64];
        data[..9].copy_from_slice(&[0x01, report::NFC, 0x05, 0x00, b'h', b'e', b'l', b'l', b'o']);
        match &dec.decode(&data, Instant::now()).events[..] {
            [DeckEvent::Nfc(tag)] => assert_eq!(tag, b"hello"),
            other => panic!("Expected NFC event, got {:?}", other),
        }

        // Length beyond the report
        data[2] = 0xff;
        assert!(dec.decode(&data, Instant::now()).events.is_empty());
    }

    #[test]
    fn test_keep_alive_flagged() {
        let mut dec = decoder(DeviceFamily::Extended);
        let mut data = vec![0u8; 64];
        data[0] = 0x01;
        data[1] = report::KEEP_ALIVE;
        let decoded = dec.decode(&data, Instant::now());
        assert!(decoded.keep_alive);
        assert!(decoded.events.is_empty());
    }

    /// Transport replaying canned reports, then failing reads
    struct ScriptedTransport {
        reports: Mutex<VecDeque<Vec<u8>>>,
        writes: Mutex<Vec<Vec<u8>>>,
        info: TransportDeviceInfo,
    }

    impl ScriptedTransport {
        fn new(reports: Vec<Vec<u8>>, transport_type: TransportType) -> Self {
            Self {
                reports: Mutex::new(reports.into()),
                writes: Mutex::new(Vec::new()),
                info: TransportDeviceInfo {
                    vid: 0x0fd9,
                    pid: 0x84,
                    transport_type,
                    device_path: "scripted".into(),
                    serial: None,
                    product_name: None,
                },
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let report = self
                .reports
                .lock()
                .pop_front()
                .ok_or(TransportError::Disconnected)?;
            buf[..report.len()].copy_from_slice(&report);
            Ok(report.len())
        }

        async fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
            self.writes.lock().push(data.to_vec());
            Ok(data.len())
        }

        async fn send_control_report(&self, data: &[u8]) -> Result<usize, TransportError> {
            Ok(data.len())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn device_info(&self) -> &TransportDeviceInfo {
            &self.info
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<DeckEvent>>,
    }

    impl EventSink for CollectingSink {
        fn dispatch(&self, event: DeckEvent) {
            self.events.lock().push(event);
        }
    }

    #[tokio::test]
    async fn test_read_failure_emits_single_disconnect() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![buttons_report(&[0])],
            TransportType::HidLocal,
        ));
        let sink = Arc::new(CollectingSink::default());

        run_decoder_loop(transport, decoder(DeviceFamily::Extended), sink.clone()).await;

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DeckEvent::Button(ButtonEvent::Pressed(0))));
        assert!(events[1].is_disconnect());
        assert_eq!(events.iter().filter(|e| e.is_disconnect()).count(), 1);
    }

    #[tokio::test]
    async fn test_keep_alive_answered_on_network() {
        let mut keep_alive = vec![0u8; 64];
        keep_alive[0] = 0x01;
        keep_alive[1] = report::KEEP_ALIVE;

        let transport = Arc::new(ScriptedTransport::new(
            vec![keep_alive.clone()],
            TransportType::Network,
        ));
        let sink = Arc::new(CollectingSink::default());
        run_decoder_loop(transport.clone(), decoder(DeviceFamily::Extended), sink.clone()).await;

        let writes = transport.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 1024);
        assert_eq!(&writes[0][..2], &[0x03, 0x1a]);

        // Local transports never answer
        let transport = Arc::new(ScriptedTransport::new(
            vec![keep_alive],
            TransportType::HidLocal,
        ));
        run_decoder_loop(transport.clone(), decoder(DeviceFamily::Extended), sink).await;
        assert!(transport.writes.lock().is_empty());
    }
}
