//! HID transport capability consumed by device drivers.
//!
//! The host provides a [`HidBackend`] that lists and selects devices, and a
//! [`HidHandle`] per selected device that exchanges feature reports and pushes
//! input reports. Drivers never touch the bus directly.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Errors raised by a transport exchange
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host has no usable HID capability
    #[error("hid transport is not supported on this host: {0}")]
    Unsupported(String),

    /// The handle was closed before or during the exchange
    #[error("device handle is closed")]
    Closed,

    /// The device did not answer in time
    #[error("no response from device within {0:?}")]
    Timeout(Duration),

    /// HID communication error
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Vendor and product id pair used to filter discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Callback receiving `(report_id, payload)` for every unsolicited input report.
/// The payload excludes the report id byte.
pub type InputReportHandler = Arc<dyn Fn(u8, &[u8]) + Send + Sync>;

/// Device discovery half of the transport
pub trait HidBackend: Send + Sync {
    type Device: HidHandle;

    /// Identities of devices the host has already granted access to. Never opens anything.
    fn known_devices(&self) -> impl Future<Output = Result<Vec<DeviceIdentity>>> + Send;

    /// Ask the host to select devices matching `filter`. An empty list means nothing was
    /// found or the user declined.
    fn request_device(
        &self,
        filter: DeviceIdentity,
    ) -> impl Future<Output = Result<Vec<Self::Device>>> + Send;
}

/// One selected device
pub trait HidHandle: Send + Sync {
    fn identity(&self) -> DeviceIdentity;

    fn is_open(&self) -> bool;

    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send one feature report. `data` excludes the report id.
    fn send_feature_report(
        &self,
        report_id: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch one feature report. The returned buffer starts with the report id byte.
    fn receive_feature_report(&self, report_id: u8) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Install the consumer for unsolicited input reports, replacing any previous one.
    fn set_input_report_handler(&mut self, handler: InputReportHandler);
}

/// Bound a transport exchange, converting an elapsed deadline into [`TransportError::Timeout`].
pub async fn with_timeout<T>(limit: Duration, exchange: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}
