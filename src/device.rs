//! Device handle
//!
//! [`StreamDeck`] binds a matched descriptor, an open transport and the
//! running decoder task. Outbound operations run on the caller's task
//! directly against the transport and are not serialized: callers writing
//! to one deck from several tasks must bring their own mutual exclusion.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, Rgb};
use streamdeck_transport::protocol::{encoder_color_frame, encoder_ring_frame};
use streamdeck_transport::{
    frame_image, run_decoder_loop, ButtonEvent, DeckEvent, DeviceDiscovery, DeviceRegistry,
    DeviceTypeDescriptor, EventCategory, EventDecoder, HidDiscovery, ImageArea, ImageSize,
    ImageTarget, NetworkTransport, Transport, TransportType,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OpenOptions;
use crate::dispatch::Dispatcher;
use crate::encode::{solid_color, DefaultImageEncoder, ImageEncoder};
use crate::error::DeckError;

/// An open Stream Deck
pub struct StreamDeck {
    transport: Arc<dyn Transport>,
    descriptor: Arc<DeviceTypeDescriptor>,
    serial: String,
    dispatcher: Arc<Dispatcher>,
    decoder: JoinHandle<()>,
    encoder: Arc<dyn ImageEncoder>,
    max_packets: Option<usize>,
}

impl StreamDeck {
    // === Opening ===

    /// Open the first attached deck of a registered model
    pub async fn open(registry: &DeviceRegistry) -> Result<Self, DeckError> {
        Self::open_with(&HidDiscovery::new(), registry, &OpenOptions::default()).await
    }

    /// Open the attached deck with the given serial number
    pub async fn open_by_serial(
        registry: &DeviceRegistry,
        serial: &str,
    ) -> Result<Self, DeckError> {
        let options = OpenOptions {
            serial: Some(serial.to_string()),
            ..OpenOptions::default()
        };
        Self::open_with(&HidDiscovery::new(), registry, &options).await
    }

    /// Open the first attached deck, leaving its current display untouched
    pub async fn open_without_reset(registry: &DeviceRegistry) -> Result<Self, DeckError> {
        let options = OpenOptions {
            reset_on_open: false,
            ..OpenOptions::default()
        };
        Self::open_with(&HidDiscovery::new(), registry, &options).await
    }

    /// Connect to a network-attached deck (`host` or `host:port`).
    ///
    /// No reset is sent: a reset reboots a network deck and drops the
    /// connection. Use [`StreamDeck::open_network_with`] to opt in.
    pub async fn open_network(registry: &DeviceRegistry, addr: &str) -> Result<Self, DeckError> {
        let options = OpenOptions {
            reset_on_open: false,
            ..OpenOptions::default()
        };
        Self::open_network_with(registry, addr, &options).await
    }

    /// Connect to a network-attached deck with explicit options
    pub async fn open_network_with(
        registry: &DeviceRegistry,
        addr: &str,
        options: &OpenOptions,
    ) -> Result<Self, DeckError> {
        let transport = NetworkTransport::connect(addr, &options.network).await?;
        Self::open_transport(Arc::new(transport), registry, options).await
    }

    /// Enumerate through `discovery` and open the first matching deck
    pub async fn open_with(
        discovery: &dyn DeviceDiscovery,
        registry: &DeviceRegistry,
        options: &OpenOptions,
    ) -> Result<Self, DeckError> {
        let devices = discovery.list_devices().await?;
        if devices.is_empty() {
            return Err(DeckError::NoDeviceFound("no devices enumerated".into()));
        }

        let mut candidates = devices.iter().filter_map(|device| {
            let descriptor = registry.lookup(device.info.pid);
            if descriptor.is_none() {
                debug!("Skipping unknown product 0x{:04x}", device.info.pid);
            }
            descriptor.map(|d| (device, d))
        });

        let (device, descriptor) = match &options.serial {
            Some(serial) => {
                let mut any = false;
                let found = candidates.find(|(device, _)| {
                    any = true;
                    device.info.serial.as_deref() == Some(serial.as_str())
                });
                match found {
                    Some(found) => found,
                    None if any => return Err(DeckError::SerialMismatch(serial.clone())),
                    None => {
                        return Err(DeckError::NoDeviceFound(
                            "no registered model attached".into(),
                        ))
                    }
                }
            }
            None => candidates.next().ok_or_else(|| {
                DeckError::NoDeviceFound("no registered model attached".into())
            })?,
        };

        debug!(
            "Matched {} at {}",
            descriptor.name, device.info.device_path
        );
        let transport = discovery.open_device(device).await?;
        let serial = device.info.serial.clone().unwrap_or_default();
        Self::start(transport, descriptor, serial, options).await
    }

    /// Bind an already open transport, matching its product id
    pub async fn open_transport(
        transport: Arc<dyn Transport>,
        registry: &DeviceRegistry,
        options: &OpenOptions,
    ) -> Result<Self, DeckError> {
        let info = transport.device_info().clone();
        let serial = info.serial.unwrap_or_default();

        let descriptor = match registry.lookup(info.pid) {
            Some(descriptor) => descriptor,
            None => {
                warn!("No registered model for product 0x{:04x}", info.pid);
                transport.close().await?;
                return Err(DeckError::UnsupportedModel(info.pid));
            }
        };

        if let Some(wanted) = &options.serial {
            if *wanted != serial {
                transport.close().await?;
                return Err(DeckError::SerialMismatch(wanted.clone()));
            }
        }

        Self::start(transport, descriptor, serial, options).await
    }

    async fn start(
        transport: Arc<dyn Transport>,
        descriptor: Arc<DeviceTypeDescriptor>,
        serial: String,
        options: &OpenOptions,
    ) -> Result<Self, DeckError> {
        if options.reset_on_open {
            transport.send_control_report(&descriptor.reset_report).await?;
        }

        let dispatcher = Arc::new(Dispatcher::new());
        let decoder = tokio::spawn(run_decoder_loop(
            transport.clone(),
            EventDecoder::new(descriptor.clone()),
            dispatcher.clone(),
        ));

        info!("Opened {} (serial {:?})", descriptor.name, serial);
        Ok(Self {
            transport,
            descriptor,
            serial,
            dispatcher,
            decoder,
            encoder: Arc::new(DefaultImageEncoder),
            max_packets: options.max_packets,
        })
    }

    /// Replace the pixel encoder
    pub fn set_image_encoder(&mut self, encoder: Arc<dyn ImageEncoder>) {
        self.encoder = encoder;
    }

    /// Refuse images needing more than `limit` packets
    pub fn set_max_packets(&mut self, limit: Option<usize>) {
        self.max_packets = limit;
    }

    // === Accessors ===

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &DeviceTypeDescriptor {
        &self.descriptor
    }

    pub fn product_id(&self) -> u16 {
        self.descriptor.product_id
    }

    pub fn image_size(&self) -> ImageSize {
        self.descriptor.image_size
    }

    pub fn has_image_capability(&self) -> bool {
        self.descriptor.has_image_capability()
    }

    pub fn button_count(&self) -> u8 {
        self.descriptor.button_count
    }

    pub fn rows(&self) -> u8 {
        self.descriptor.rows
    }

    pub fn cols(&self) -> u8 {
        self.descriptor.cols
    }

    pub fn encoder_count(&self) -> u8 {
        self.descriptor.encoder_count
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport.device_info().transport_type
    }

    // === Control reports ===

    /// Set display brightness; out-of-range values are clamped to 0..=100
    pub async fn set_brightness(&self, percent: i32) -> Result<(), DeckError> {
        let report = self.descriptor.brightness_command(percent);
        self.transport.send_control_report(&report).await?;
        Ok(())
    }

    /// Re-send the model's reset report
    pub async fn reset(&self) -> Result<(), DeckError> {
        self.transport
            .send_control_report(&self.descriptor.reset_report)
            .await?;
        Ok(())
    }

    // === Button images ===

    fn check_button(&self, index: usize) -> Result<(), DeckError> {
        if !self.descriptor.has_image_capability() {
            return Err(DeckError::UnsupportedOperation(format!(
                "{} has no displays",
                self.descriptor.name
            )));
        }
        if index >= usize::from(self.descriptor.button_count) {
            return Err(DeckError::InvalidIndex {
                index,
                count: self.descriptor.button_count,
            });
        }
        Ok(())
    }

    /// Paint every button black
    pub async fn clear_buttons(&self) -> Result<(), DeckError> {
        for index in 0..usize::from(self.descriptor.button_count) {
            self.write_color_to_button(index, Rgb([0, 0, 0])).await?;
        }
        Ok(())
    }

    pub async fn write_color_to_button(
        &self,
        index: usize,
        color: Rgb<u8>,
    ) -> Result<(), DeckError> {
        self.check_button(index)?;
        self.write_image(index, &solid_color(&self.descriptor, color))
            .await
    }

    /// Load an image file and write it to a button
    pub async fn write_image_file(
        &self,
        index: usize,
        path: impl AsRef<Path>,
    ) -> Result<(), DeckError> {
        self.check_button(index)?;
        let image = image::open(path)?;
        self.write_image(index, &image).await
    }

    /// Scale, orient and encode `image`, then write it to a button
    pub async fn write_image(&self, index: usize, image: &DynamicImage) -> Result<(), DeckError> {
        self.check_button(index)?;
        let payload = self.encoder.encode_button(image, &self.descriptor)?;
        self.write_encoded_image(index, &payload).await
    }

    /// Write an already encoded payload to a button
    pub async fn write_encoded_image(
        &self,
        index: usize,
        payload: &[u8],
    ) -> Result<(), DeckError> {
        let packets = frame_image(
            &self.descriptor,
            ImageTarget::Button(index),
            payload,
            self.max_packets,
        )?;
        self.send_packets(&packets).await
    }

    // === Area images ===

    /// Write `image` at its own size to the sub-display at (`x`, `y`)
    pub async fn write_image_to_area(
        &self,
        x: u16,
        y: u16,
        image: &DynamicImage,
    ) -> Result<(), DeckError> {
        if self.descriptor.area_header.is_none() {
            return Err(DeckError::UnsupportedOperation(format!(
                "{} has no area display",
                self.descriptor.name
            )));
        }
        let area = ImageArea {
            x,
            y,
            width: u16::try_from(image.width())
                .map_err(|_| DeckError::Image("area image too wide".into()))?,
            height: u16::try_from(image.height())
                .map_err(|_| DeckError::Image("area image too tall".into()))?,
        };
        let payload = self.encoder.encode_area(image, &self.descriptor)?;
        self.write_encoded_to_area(area, &payload).await
    }

    /// Write an already encoded payload to a sub-display rectangle
    pub async fn write_encoded_to_area(
        &self,
        area: ImageArea,
        payload: &[u8],
    ) -> Result<(), DeckError> {
        let packets = frame_image(
            &self.descriptor,
            ImageTarget::Area(area),
            payload,
            self.max_packets,
        )?;
        self.send_packets(&packets).await
    }

    async fn send_packets(&self, packets: &[Vec<u8>]) -> Result<(), DeckError> {
        for packet in packets {
            self.transport.write(packet).await?;
        }
        Ok(())
    }

    // === Encoder LEDs ===

    fn check_encoder(&self, index: u8) -> Result<(), DeckError> {
        let count = self.descriptor.encoder_count;
        if count == 0 {
            return Err(DeckError::UnsupportedOperation(format!(
                "{} has no encoders",
                self.descriptor.name
            )));
        }
        if index >= count {
            return Err(DeckError::InvalidIndex {
                index: usize::from(index),
                count,
            });
        }
        Ok(())
    }

    /// Light an encoder in one colour
    pub async fn set_encoder_color(&self, encoder: u8, color: Rgb<u8>) -> Result<(), DeckError> {
        self.check_encoder(encoder)?;
        self.transport
            .write(&encoder_color_frame(encoder, color.0))
            .await?;
        Ok(())
    }

    /// Set the LEDs of an encoder ring, starting at slot `offset`
    pub async fn set_encoder_ring(
        &self,
        encoder: u8,
        colors: &[Rgb<u8>],
        offset: usize,
    ) -> Result<(), DeckError> {
        self.check_encoder(encoder)?;
        let colors: Vec<[u8; 3]> = colors.iter().map(|c| c.0).collect();
        self.transport
            .write(&encoder_ring_frame(encoder, &colors, offset))
            .await?;
        Ok(())
    }

    // === Events ===

    /// Register a callback for one event category.
    ///
    /// Callbacks run on the decoder task in decode order; a slow callback
    /// delays every later event from this deck.
    pub fn subscribe<F>(&self, category: EventCategory, handler: F)
    where
        F: Fn(&DeckEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(category, Arc::new(handler));
    }

    /// Button presses, releases and the final disconnect
    pub fn on_button<F>(&self, handler: F)
    where
        F: Fn(&ButtonEvent) + Send + Sync + 'static,
    {
        self.subscribe(EventCategory::Button, move |event| {
            if let DeckEvent::Button(button) = event {
                handler(button);
            }
        });
    }

    pub fn on_encoder_rotate<F>(&self, handler: F)
    where
        F: Fn(u8, i8) + Send + Sync + 'static,
    {
        self.subscribe(EventCategory::EncoderRotate, move |event| {
            if let DeckEvent::EncoderRotate { index, delta } = event {
                handler(*index, *delta);
            }
        });
    }

    pub fn on_encoder_press<F>(&self, handler: F)
    where
        F: Fn(u8, bool) + Send + Sync + 'static,
    {
        self.subscribe(EventCategory::EncoderPress, move |event| {
            if let DeckEvent::EncoderPress { index, pressed } = event {
                handler(*index, *pressed);
            }
        });
    }

    /// Taps and holds on the touch strip, as `(x, y, hold)`
    pub fn on_touch_push<F>(&self, handler: F)
    where
        F: Fn(u16, u16, bool) + Send + Sync + 'static,
    {
        self.subscribe(EventCategory::TouchPush, move |event| {
            if let DeckEvent::TouchPush { x, y, hold } = event {
                handler(*x, *y, *hold);
            }
        });
    }

    pub fn on_touch_swipe<F>(&self, handler: F)
    where
        F: Fn((u16, u16), (u16, u16)) + Send + Sync + 'static,
    {
        self.subscribe(EventCategory::TouchSwipe, move |event| {
            if let DeckEvent::TouchSwipe { from, to } = event {
                handler(*from, *to);
            }
        });
    }

    pub fn on_nfc<F>(&self, handler: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.subscribe(EventCategory::Nfc, move |event| {
            if let DeckEvent::Nfc(tag) = event {
                handler(tag);
            }
        });
    }

    /// Receiver for every event decoded from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeckEvent> {
        self.dispatcher.subscribe_events()
    }

    /// Close the transport and wait for the decoder to deliver its disconnect
    pub async fn close(mut self) -> Result<(), DeckError> {
        self.transport.close().await?;
        if let Err(e) = (&mut self.decoder).await {
            warn!("Decoder task ended abnormally: {}", e);
        }
        info!("Closed {}", self.descriptor.name);
        Ok(())
    }
}

impl Drop for StreamDeck {
    fn drop(&mut self) {
        self.decoder.abort();
    }
}
