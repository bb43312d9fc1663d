//! HID transport for decks attached over USB

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::types::TransportDeviceInfo;
use crate::Transport;

/// Poll interval for input reads, so a closed transport is noticed promptly
const READ_POLL_MS: i32 = 20;

/// HID transport for a locally attached deck
///
/// Outbound reports and inbound reads use separate handles to the same
/// device path, so a blocked read never stalls an image write.
pub struct HidLocalTransport {
    output: Arc<Mutex<HidDevice>>,
    input: Arc<Mutex<HidDevice>>,
    info: TransportDeviceInfo,
    closed: Arc<AtomicBool>,
}

impl HidLocalTransport {
    /// Create a transport from two handles opened on the same path
    pub fn new(output: HidDevice, input: HidDevice, info: TransportDeviceInfo) -> Self {
        Self {
            output: Arc::new(Mutex::new(output)),
            input: Arc::new(Mutex::new(input)),
            info,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn with_output<F>(&self, op: F) -> Result<usize, TransportError>
    where
        F: FnOnce(&HidDevice) -> Result<usize, hidapi::HidError> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Disconnected);
        }
        let device = self.output.clone();
        tokio::task::spawn_blocking(move || op(&device.lock()))
            .await
            .map_err(|e| TransportError::Internal(e.to_string()))?
            .map_err(TransportError::from)
    }
}

#[async_trait]
impl Transport for HidLocalTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let device = self.input.clone();
        let closed = self.closed.clone();
        let capacity = buf.len();

        let report = tokio::task::spawn_blocking(move || {
            let mut report = vec![0u8; capacity];
            let device = device.lock();
            loop {
                if closed.load(Ordering::Acquire) {
                    return Err(TransportError::Disconnected);
                }
                let len = device.read_timeout(&mut report, READ_POLL_MS)?;
                if len > 0 {
                    report.truncate(len);
                    return Ok(report);
                }
            }
        })
        .await
        .map_err(|e| TransportError::Internal(e.to_string()))??;

        buf[..report.len()].copy_from_slice(&report);
        Ok(report.len())
    }

    async fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let data = data.to_vec();
        self.with_output(move |device| device.write(&data)).await
    }

    async fn send_control_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        debug!("Sending control report: {:02X?}", data);
        let data = data.to_vec();
        self.with_output(move |device| {
            device.send_feature_report(&data)?;
            Ok(data.len())
        })
        .await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closing HID transport {}", self.info.device_path);
        }
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

impl Drop for HidLocalTransport {
    fn drop(&mut self) {
        // Lets a pending blocking read return
        self.closed.store(true, Ordering::Release);
    }
}
