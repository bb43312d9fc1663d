//! In-memory transport and discovery for device tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use streamdeck_transport::{
    DeviceDiscovery, DiscoveredDevice, Transport, TransportDeviceInfo, TransportError,
    TransportType, VENDOR_ID,
};
use tokio::sync::{mpsc, watch};

/// Transport fed by a channel of scripted reports.
///
/// Reads fail with `Disconnected` once the report sender is dropped or the
/// transport is closed. Every write and control report is recorded.
pub struct MockTransport {
    info: TransportDeviceInfo,
    reports: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    writes: Mutex<Vec<Vec<u8>>>,
    control_reports: Mutex<Vec<Vec<u8>>>,
    closed: watch::Sender<bool>,
}

impl MockTransport {
    pub fn new(pid: u16, serial: &str) -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let transport = Arc::new(Self {
            info: TransportDeviceInfo {
                vid: VENDOR_ID,
                pid,
                transport_type: TransportType::HidLocal,
                device_path: format!("mock:{}", serial),
                serial: Some(serial.to_string()),
                product_name: Some("Mock deck".into()),
            },
            reports: tokio::sync::Mutex::new(rx),
            writes: Mutex::new(Vec::new()),
            control_reports: Mutex::new(Vec::new()),
            closed,
        });
        (transport, tx)
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn control_reports(&self) -> Vec<Vec<u8>> {
        self.control_reports.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut closed = self.closed.subscribe();
        let mut reports = self.reports.lock().await;
        let report = tokio::select! {
            report = reports.recv() => report.ok_or(TransportError::Disconnected)?,
            _ = async {
                while !*closed.borrow_and_update() {
                    if closed.changed().await.is_err() {
                        break;
                    }
                }
            } => return Err(TransportError::Disconnected),
        };
        let len = report.len().min(buf.len());
        buf[..len].copy_from_slice(&report[..len]);
        Ok(len)
    }

    async fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        self.writes.lock().push(data.to_vec());
        Ok(data.len())
    }

    async fn send_control_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        self.control_reports.lock().push(data.to_vec());
        Ok(data.len())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

/// Discovery over a fixed set of mock transports
#[derive(Default)]
pub struct MockDiscovery {
    devices: Vec<Arc<MockTransport>>,
    opened: Mutex<Vec<String>>,
}

impl MockDiscovery {
    pub fn new(devices: Vec<Arc<MockTransport>>) -> Self {
        Self {
            devices,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl DeviceDiscovery for MockDiscovery {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        Ok(self
            .devices
            .iter()
            .map(|t| DiscoveredDevice {
                info: t.device_info().clone(),
            })
            .collect())
    }

    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let transport = self
            .devices
            .iter()
            .find(|t| t.device_info().device_path == device.info.device_path)
            .ok_or_else(|| TransportError::DeviceNotFound(device.info.device_path.clone()))?;
        self.opened.lock().push(device.info.device_path.clone());
        Ok(transport.clone())
    }
}

/// Extended-family button report with the given buttons held
pub fn button_report(pressed: &[usize]) -> Vec<u8> {
    let mut report = vec![0u8; 64];
    report[0] = 0x01;
    for &i in pressed {
        report[4 + i] = 1;
    }
    report
}
