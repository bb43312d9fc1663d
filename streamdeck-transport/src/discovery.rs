//! Device discovery for locally attached decks

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidApi;
use tracing::{debug, info};

use crate::device_registry::VENDOR_ID;
use crate::error::TransportError;
use crate::hid_local::HidLocalTransport;
use crate::types::{DiscoveredDevice, TransportDeviceInfo, TransportType};
use crate::Transport;

/// Device discovery abstraction
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// List currently attached decks
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a specific device
    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

/// HID enumeration of every device with the Elgato vendor id
#[derive(Debug, Default, Clone, Copy)]
pub struct HidDiscovery;

impl HidDiscovery {
    pub fn new() -> Self {
        Self
    }
}

fn enumerate(api: &HidApi) -> Vec<DiscoveredDevice> {
    let mut seen = HashSet::new();
    api.device_list()
        .filter(|d| d.vendor_id() == VENDOR_ID)
        .filter(|d| seen.insert(d.path().to_owned()))
        .map(|d| DiscoveredDevice {
            info: TransportDeviceInfo {
                vid: d.vendor_id(),
                pid: d.product_id(),
                transport_type: TransportType::HidLocal,
                device_path: d.path().to_string_lossy().into_owned(),
                serial: d.serial_number().map(str::to_owned),
                product_name: d.product_string().map(str::to_owned),
            },
        })
        .collect()
}

#[async_trait]
impl DeviceDiscovery for HidDiscovery {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        tokio::task::spawn_blocking(|| {
            let api = HidApi::new()?;
            let devices = enumerate(&api);
            debug!("Found {} candidate devices", devices.len());
            Ok::<_, TransportError>(devices)
        })
        .await
        .map_err(|e| TransportError::Internal(e.to_string()))?
    }

    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let info = device.info.clone();
        let transport = tokio::task::spawn_blocking(move || {
            let api = HidApi::new()?;
            let path = std::ffi::CString::new(info.device_path.clone())
                .map_err(|e| TransportError::DeviceNotFound(e.to_string()))?;
            let output = api.open_path(&path)?;
            let input = api.open_path(&path)?;
            info!(
                "Opened {} (PID 0x{:04x}) at {}",
                info.product_name.as_deref().unwrap_or("deck"),
                info.pid,
                info.device_path
            );
            Ok::<_, TransportError>(HidLocalTransport::new(output, input, info))
        })
        .await
        .map_err(|e| TransportError::Internal(e.to_string()))??;

        Ok(Arc::new(transport))
    }
}

/// Summary of one attached deck
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub name: String,
    pub serial: String,
    pub product_id: u16,
}

/// Enumerate attached decks without opening them
pub fn search_devices() -> Result<Vec<DeviceSummary>, TransportError> {
    let api = HidApi::new()?;
    Ok(enumerate(&api)
        .into_iter()
        .map(|d| DeviceSummary {
            name: d.info.product_name.unwrap_or_default(),
            serial: d.info.serial.unwrap_or_default(),
            product_id: d.info.pid,
        })
        .collect())
}
