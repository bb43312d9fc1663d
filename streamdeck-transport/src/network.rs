//! TCP transport for network-attached decks
//!
//! Every frame on the wire is exactly [`FRAME_SIZE`] bytes in both
//! directions. Opening a connection performs the serial number handshake;
//! afterwards a watchdog task closes the session if nothing has been heard
//! from the deck within the liveness timeout.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::device_registry::{NETWORK_PRODUCT_ID, VENDOR_ID};
use crate::error::TransportError;
use crate::protocol::{parse_serial_reply, serial_request, FRAME_SIZE, NETWORK_PORT};
use crate::types::{TransportDeviceInfo, TransportType};
use crate::Transport;

/// Network session settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port used when the address carries none
    pub port: u16,
    /// Watchdog check interval
    pub poll_interval_ms: u64,
    /// Silence after which the session is considered dead
    pub liveness_timeout_ms: u64,
    /// Time allowed for the serial number reply
    pub handshake_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: NETWORK_PORT,
            poll_interval_ms: 1000,
            liveness_timeout_ms: 5000,
            handshake_timeout_ms: 5000,
        }
    }
}

impl NetworkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Resolve `addr` to `host:port`, appending the configured port if absent
    pub fn target(&self, addr: &str) -> String {
        if addr.parse::<SocketAddr>().is_ok() {
            return addr.to_string();
        }
        if let Ok(ip) = addr.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.port).to_string();
        }
        match addr.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => addr.to_string(),
            _ => format!("{}:{}", addr, self.port),
        }
    }
}

/// Time of the last frame heard from the deck
struct Liveness {
    epoch: Instant,
    last_ms: AtomicU64,
}

impl Liveness {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self) {
        self.last_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    fn idle(&self) -> Duration {
        let last = self.last_ms.load(Ordering::Relaxed);
        Duration::from_millis(self.now_ms().saturating_sub(last))
    }
}

struct NetworkShared {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    liveness: Liveness,
    closed: watch::Sender<bool>,
}

impl NetworkShared {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn shutdown(&self) {
        self.closed.send_replace(true);
        if let Err(e) = self.writer.lock().await.shutdown().await {
            trace!("Socket shutdown: {}", e);
        }
    }
}

/// TCP transport for a network-attached deck
pub struct NetworkTransport {
    shared: Arc<NetworkShared>,
    info: TransportDeviceInfo,
    watchdog: JoinHandle<()>,
}

impl NetworkTransport {
    /// Connect, perform the serial handshake and start the liveness watchdog
    pub async fn connect(addr: &str, config: &NetworkConfig) -> Result<Self, TransportError> {
        let target = config.target(addr);
        debug!("Connecting to network deck at {}", target);

        let mut stream = TcpStream::connect(&target).await?;
        stream.set_nodelay(true)?;

        let serial = tokio::time::timeout(config.handshake_timeout(), handshake(&mut stream))
            .await
            .map_err(|_| {
                warn!(
                    "No serial reply from {} within {:?}",
                    target,
                    config.handshake_timeout()
                );
                TransportError::Timeout
            })??;
        info!("Connected to network deck {} (serial {})", target, serial);

        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(NetworkShared {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            liveness: Liveness::new(),
            closed,
        });
        shared.liveness.touch();

        let watchdog = tokio::spawn(run_watchdog(
            shared.clone(),
            config.poll_interval(),
            config.liveness_timeout(),
        ));

        Ok(Self {
            shared,
            info: TransportDeviceInfo {
                vid: VENDOR_ID,
                pid: NETWORK_PRODUCT_ID,
                transport_type: TransportType::Network,
                device_path: target,
                serial: Some(serial),
                product_name: None,
            },
            watchdog,
        })
    }

    /// Serial number reported during the handshake
    pub fn serial(&self) -> &str {
        self.info.serial.as_deref().unwrap_or_default()
    }
}

/// Request the serial number and wait for a usable reply.
///
/// Frames that are not a serial reply, or carry an empty serial, are skipped.
async fn handshake(stream: &mut TcpStream) -> Result<String, TransportError> {
    stream.write_all(&serial_request()).await?;

    let mut frame = [0u8; FRAME_SIZE];
    loop {
        stream.read_exact(&mut frame).await?;
        match parse_serial_reply(&frame) {
            Some(serial) => return Ok(serial),
            None => trace!("Skipping frame during handshake: {:02X?}", &frame[..4]),
        }
    }
}

/// Resolve once the session has been marked closed
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

async fn run_watchdog(shared: Arc<NetworkShared>, poll: Duration, timeout: Duration) {
    let mut closed = shared.closed.subscribe();
    let mut ticker = tokio::time::interval(poll);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let idle = shared.liveness.idle();
                if idle > timeout {
                    warn!("Network deck silent for {:?}, closing session", idle);
                    shared.shutdown().await;
                    break;
                }
            }
            _ = wait_closed(&mut closed) => break,
        }
    }
    trace!("Watchdog stopped");
}

#[async_trait]
impl Transport for NetworkTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.shared.is_closed() {
            return Err(TransportError::Disconnected);
        }
        let mut closed = self.shared.closed.subscribe();

        let mut frame = [0u8; FRAME_SIZE];
        let mut reader = self.shared.reader.lock().await;
        tokio::select! {
            res = reader.read_exact(&mut frame) => { res?; }
            _ = wait_closed(&mut closed) => return Err(TransportError::Disconnected),
        }
        self.shared.liveness.touch();

        let len = buf.len().min(FRAME_SIZE);
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    async fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.shared.is_closed() {
            return Err(TransportError::Disconnected);
        }
        let mut frame = data.to_vec();
        if frame.len() < FRAME_SIZE {
            frame.resize(FRAME_SIZE, 0);
        }
        self.shared.writer.lock().await.write_all(&frame).await?;
        Ok(data.len())
    }

    /// Network decks take control reports as ordinary frames
    async fn send_control_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        debug!("Sending control report: {:02X?}", data);
        self.write(data).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.shared.is_closed() {
            debug!("Closing network transport {}", self.info.device_path);
            self.shared.shutdown().await;
        }
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn mark_alive(&self) {
        self.shared.liveness.touch();
    }
}

impl Drop for NetworkTransport {
    fn drop(&mut self) {
        self.shared.closed.send_replace(true);
        self.watchdog.abort();
    }
}
