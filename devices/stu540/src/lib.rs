//! High level driver for Wacom STU-540 signature tablets over a HID transport.
//!
//! The driver owns one device handle and exposes the tablet as a semantic API:
//! connection handshake, screen commands, image upload and pen sample streaming.
//! Device access goes through the [`HidBackend`] capability supplied by the host.
//!
//! Feature reads carry no request tag, so the session allows a single exchange
//! in flight per handle. Input reports are delivered independently through the
//! transport callback and fanned out to pen subscribers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use stu_sync_core::{
    with_timeout, HidBackend, HidHandle, Subscribers, SubscriptionId, TransportError,
};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::abi::{Opcode, Report};
use crate::pen::{PenDecoder, PenSample};
use crate::types::{
    decode_device_name, Capability, DeviceConfig, InkMode, Options, Outcome, Rgb, StatusEvent,
    Stu540Error, Stu540Result, WritingArea, WritingMode,
};

pub mod abi;
#[cfg(any(test, feature = "mock-hid"))]
pub mod mock;
pub mod pen;
pub mod types;
pub mod upload;

pub use stu_sync_core::DeviceIdentity;

pub mod consts {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use stu_sync_core::DeviceIdentity;

    pub const VENDOR_ID: u16 = 0x056A;
    pub const PRODUCT_ID: u16 = 0x00A8;

    /// Logical screen size in pixels
    pub const CANVAS_WIDTH: u32 = 800;
    pub const CANVAS_HEIGHT: u32 = 480;

    /// Largest image data payload per feature report
    pub const CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(253) {
        Some(size) => size,
        None => unreachable!(),
    };

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub const IDENTITY: DeviceIdentity = DeviceIdentity::new(VENDOR_ID, PRODUCT_ID);
}

/// Send one feature report, bounded by `timeout`
pub(crate) async fn send_report<D: HidHandle>(
    device: &D,
    report: &Report,
    timeout: Duration,
) -> Result<(), TransportError> {
    debug!(opcode = %report.opcode, len = report.payload.len(), "sending feature report");
    with_timeout(
        timeout,
        device.send_feature_report(report.opcode.id(), &report.payload),
    )
    .await
}

/// Session with one STU-540 tablet
pub struct Stu540<B: HidBackend> {
    backend: B,
    options: Options,
    /// Open handle, also serializing every exchange with the device
    device: Mutex<Option<B::Device>>,
    config: RwLock<DeviceConfig>,
    pen: Arc<PenDecoder>,
    status: Subscribers<StatusEvent>,
}

impl<B: HidBackend> Stu540<B> {
    pub fn new(backend: B, options: Options) -> Self {
        Self {
            config: RwLock::new(DeviceConfig::new(&options)),
            backend,
            options,
            device: Mutex::new(None),
            pen: Arc::new(PenDecoder::new()),
            status: Subscribers::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Check for a supported tablet without opening it
    pub async fn is_available(&self) -> Stu540Result<bool> {
        let slot = self.device.lock().await;
        if slot.as_ref().is_some_and(|d| d.is_open()) {
            return Ok(true);
        }
        let known = with_timeout(self.options.timeout, self.backend.known_devices())
            .await
            .map_err(|e| self.failed("is_available", e.into()))?;
        Ok(known.contains(&self.options.identity))
    }

    /// Select, open and handshake with the tablet.
    ///
    /// Returns `Ok(false)` when no device was selected. A device that opens but fails
    /// the capability or information query yields [`Stu540Error::HandshakeFailed`] and
    /// is closed again. Calling this while connected returns `Ok(true)` immediately.
    pub async fn connect(&self) -> Stu540Result<bool> {
        let mut slot = self.device.lock().await;
        if slot.as_ref().is_some_and(|d| d.is_open()) {
            debug!("already connected");
            return Ok(true);
        }
        self.drop_vanished(&mut slot);

        // The host picker may wait on the user, so it is not bounded.
        let identity = self.options.identity;
        let Some(mut device) = self
            .backend
            .request_device(identity)
            .await
            .map_err(|e| self.failed("connect", e.into()))?
            .into_iter()
            .find(|d| d.identity() == identity)
        else {
            info!(%identity, "no tablet selected");
            return Ok(false);
        };

        with_timeout(self.options.timeout, device.open())
            .await
            .map_err(|e| self.failed("connect", e.into()))?;
        let pen = Arc::clone(&self.pen);
        device.set_input_report_handler(Arc::new(move |report_id, payload| {
            pen.handle_input_report(report_id, payload);
        }));

        let config = match self.handshake(&device).await {
            Ok(config) => config,
            Err(e) => {
                if let Err(close) = with_timeout(self.options.timeout, device.close()).await {
                    warn!("failed to close tablet after handshake error: {close}");
                }
                return Err(self.failed("connect", e));
            },
        };

        let device_name = config.device_name.clone().unwrap_or_default();
        info!(
            name = %device_name,
            scale = ?config.scale_factor(),
            "connected to tablet"
        );
        *self.config.write() = config;
        *slot = Some(device);
        drop(slot);

        self.status.emit(&StatusEvent::Connected { device_name });
        Ok(true)
    }

    async fn handshake(&self, device: &B::Device) -> Stu540Result<DeviceConfig> {
        let report = self
            .query(device, Opcode::Capability)
            .await
            .map_err(|e| Stu540Error::handshake(Opcode::Capability, e))?;
        let capability = Capability::decode(&report)
            .map_err(|e| Stu540Error::handshake(Opcode::Capability, e))?;

        let report = self
            .query(device, Opcode::Information)
            .await
            .map_err(|e| Stu540Error::handshake(Opcode::Information, e))?;
        let device_name = decode_device_name(&report)
            .map_err(|e| Stu540Error::handshake(Opcode::Information, e))?;

        Ok(DeviceConfig {
            capability: Some(capability),
            device_name: Some(device_name),
            ..DeviceConfig::new(&self.options)
        })
    }

    async fn query(&self, device: &B::Device, opcode: Opcode) -> Stu540Result<Vec<u8>> {
        debug!(%opcode, "reading feature report");
        let report = with_timeout(
            self.options.timeout,
            device.receive_feature_report(opcode.id()),
        )
        .await?;
        Ok(report)
    }

    /// Snapshot of the negotiated configuration, `None` while disconnected
    pub async fn info(&self) -> Option<DeviceConfig> {
        let _device = self.lock_open("info").await?;
        Some(self.config.read().clone())
    }

    /// Close the tablet if open. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Stu540Result<()> {
        let mut slot = self.device.lock().await;
        let Some(mut device) = slot.take() else {
            debug!("disconnect while not connected");
            return Ok(());
        };
        *self.config.write() = DeviceConfig::new(&self.options);

        let closed = if device.is_open() {
            with_timeout(self.options.timeout, device.close()).await
        } else {
            Ok(())
        };
        drop(slot);

        info!("disconnected from tablet");
        self.status.emit(&StatusEvent::Disconnected);
        closed.map_err(|e| self.failed("disconnect", e.into()))
    }

    /// Transmit an arbitrary feature report
    pub async fn send(&self, report: Report) -> Stu540Result<Outcome> {
        let operation = report.opcode.name();
        let Some(device) = self.lock_open(operation).await else {
            return Ok(Outcome::NotConnected);
        };
        send_report(&*device, &report, self.options.timeout)
            .await
            .map_err(|e| self.failed(operation, e.into()))?;
        Ok(Outcome::Completed(()))
    }

    /// Fetch one feature report, report id byte included
    pub async fn read(&self, opcode: Opcode) -> Stu540Result<Outcome<Vec<u8>>> {
        let Some(device) = self.lock_open(opcode.name()).await else {
            return Ok(Outcome::NotConnected);
        };
        let report = self
            .query(&device, opcode)
            .await
            .map_err(|e| self.failed(opcode.name(), e))?;
        Ok(Outcome::Completed(report))
    }

    pub async fn set_pen_color_and_width(&self, color: Rgb, width: u8) -> Stu540Result<Outcome> {
        self.send(abi::pen_color_and_width(color, width)).await
    }

    pub async fn clear_screen(&self) -> Stu540Result<Outcome> {
        self.send(abi::clear_screen()).await
    }

    pub async fn set_background_color(&self, color: Rgb) -> Stu540Result<Outcome> {
        self.send(abi::background_color(color)).await
    }

    pub async fn set_brightness(&self, level: u8) -> Stu540Result<Outcome> {
        self.send(abi::brightness(level)).await
    }

    pub async fn set_ink_mode(&self, mode: InkMode) -> Stu540Result<Outcome> {
        self.send(abi::ink_mode(mode)).await
    }

    pub async fn set_writing_mode(&self, mode: WritingMode) -> Stu540Result<Outcome> {
        self.send(abi::writing_mode(mode)).await
    }

    pub async fn set_writing_area(&self, area: WritingArea) -> Stu540Result<Outcome> {
        self.send(abi::writing_area(area)).await
    }

    pub async fn set_pen_data_timing(&self, enabled: bool) -> Stu540Result<Outcome> {
        self.send(abi::pen_data_timing(enabled)).await
    }

    /// Read the electronic serial number
    pub async fn read_serial(&self) -> Stu540Result<Outcome<String>> {
        let report = match self.read(Opcode::Serial).await? {
            Outcome::Completed(report) => report,
            Outcome::NotConnected => return Ok(Outcome::NotConnected),
        };
        let serial = abi::read_ascii_tail(&report, 1).ok_or(Stu540Error::MalformedReport {
            opcode: Opcode::Serial,
            expected: 1,
            actual: 0,
        })?;
        Ok(Outcome::Completed(serial))
    }

    /// Upload a raw image in the configured pixel format
    pub async fn set_image(&self, data: &[u8]) -> Stu540Result<Outcome> {
        self.set_image_with_progress(data, |_| {}).await
    }

    /// Upload a raw image, reporting each chunk index before it is sent and the
    /// chunk total after the end report
    pub async fn set_image_with_progress(
        &self,
        data: &[u8],
        mut progress: impl FnMut(usize) + Send,
    ) -> Stu540Result<Outcome> {
        let Some(device) = self.lock_open("set_image").await else {
            return Ok(Outcome::NotConnected);
        };
        if data.is_empty() {
            debug!("empty image, nothing to upload");
            return Ok(Outcome::Completed(()));
        }

        upload::upload(
            &*device,
            data,
            self.options.image_format,
            self.options.chunk_size,
            self.options.timeout,
            &mut progress,
        )
        .await
        .map_err(|e| self.failed("set_image", e))?;
        Ok(Outcome::Completed(()))
    }

    /// Register a pen sample observer
    pub fn on_pen_sample(
        &self,
        callback: impl Fn(&PenSample) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.pen.subscribe(callback)
    }

    pub fn remove_pen_listener(&self, id: SubscriptionId) -> bool {
        self.pen.unsubscribe(id)
    }

    /// Register a session status observer
    pub fn on_status(
        &self,
        callback: impl Fn(&StatusEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.status.subscribe(callback)
    }

    pub fn remove_status_listener(&self, id: SubscriptionId) -> bool {
        self.status.unsubscribe(id)
    }

    /// Lock the handle if it is open
    async fn lock_open(&self, operation: &str) -> Option<MappedMutexGuard<'_, B::Device>> {
        let mut slot = self.device.lock().await;
        self.drop_vanished(&mut slot);
        match MutexGuard::try_map(slot, |slot| slot.as_mut()) {
            Ok(device) => Some(device),
            Err(_) => {
                debug!(operation, "tablet not connected, skipping");
                None
            },
        }
    }

    /// Release a handle the transport closed under the session
    fn drop_vanished(&self, slot: &mut Option<B::Device>) {
        if slot.as_ref().is_some_and(|d| !d.is_open()) {
            *slot = None;
            *self.config.write() = DeviceConfig::new(&self.options);
            warn!("tablet went away");
            self.status.emit(&StatusEvent::Disconnected);
        }
    }

    fn failed(&self, operation: &str, error: Stu540Error) -> Stu540Error {
        error!(operation, "tablet operation failed: {error}");
        self.status.emit(&StatusEvent::Error {
            message: error.to_string(),
        });
        error
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex as SyncMutex;

    use super::*;
    use crate::mock::{Call, MockBackend, MockDevice};
    use crate::types::TransferStage;

    fn session(device: &MockDevice) -> Stu540<MockBackend> {
        Stu540::new(
            MockBackend::new().with_device(device.clone()),
            Options {
                timeout: Duration::from_millis(50),
                ..Options::default()
            },
        )
    }

    fn status_log(tablet: &Stu540<MockBackend>) -> Arc<SyncMutex<Vec<StatusEvent>>> {
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let sink = log.clone();
        tablet.on_status(move |e| sink.lock().push(e.clone()));
        log
    }

    #[tokio::test]
    async fn connect_performs_handshake() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        let status = status_log(&tablet);

        assert!(tablet.info().await.is_none());
        assert!(tablet.connect().await.unwrap());

        assert_eq!(
            device.calls(),
            [
                Call::Open,
                Call::ReceiveFeature { report_id: 0x09 },
                Call::ReceiveFeature { report_id: 0x08 },
            ]
        );

        let info = tablet.info().await.unwrap();
        assert_eq!(info.device_name.as_deref(), Some("STU-540"));
        assert_eq!(
            info.capability,
            Some(Capability {
                tablet_width: 9600,
                tablet_height: 5760,
                pressure_resolution: 1023,
            })
        );
        assert_eq!(info.scale_factor(), Some(12.0));
        assert_eq!(
            *status.lock(),
            [StatusEvent::Connected {
                device_name: "STU-540".into()
            }]
        );
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let device = MockDevice::stu540();
        let backend = MockBackend::new().with_device(device.clone());
        let tablet = Stu540::new(backend, Options::default());

        assert!(tablet.connect().await.unwrap());
        let calls = device.calls();
        assert!(tablet.connect().await.unwrap());

        assert_eq!(device.calls(), calls);
        assert_eq!(tablet.backend.request_count(), 1);
    }

    #[tokio::test]
    async fn connect_without_device_returns_false() {
        let tablet = Stu540::new(MockBackend::new(), Options::default());
        assert!(!tablet.connect().await.unwrap());
        assert!(!tablet.is_available().await.unwrap());
        assert!(tablet.info().await.is_none());
    }

    #[tokio::test]
    async fn other_models_are_not_selected() {
        let other = MockDevice::new(DeviceIdentity::new(0x056A, 0x00A5));
        let tablet = session(&other);
        assert!(!tablet.is_available().await.unwrap());
        assert!(!tablet.connect().await.unwrap());
        assert!(other.calls().is_empty());
    }

    #[tokio::test]
    async fn availability_never_opens() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        assert!(tablet.is_available().await.unwrap());
        assert!(device.calls().is_empty());
        assert_eq!(tablet.backend.request_count(), 0);
    }

    #[tokio::test]
    async fn malformed_capability_fails_handshake() {
        let device =
            MockDevice::stu540().with_response(Opcode::Capability.id(), vec![0x09, 0x25, 0x80]);
        let tablet = session(&device);
        let status = status_log(&tablet);

        let err = tablet.connect().await.unwrap_err();
        assert!(matches!(
            err,
            Stu540Error::HandshakeFailed {
                stage: Opcode::Capability,
                ..
            }
        ));
        assert_eq!(device.calls().last(), Some(&Call::Close));
        assert!(tablet.info().await.is_none());
        assert!(matches!(status.lock().as_slice(), [StatusEvent::Error { .. }]));
    }

    #[tokio::test]
    async fn missing_information_fails_handshake() {
        let device = MockDevice::stu540().without_response(Opcode::Information.id());
        let tablet = session(&device);

        let err = tablet.connect().await.unwrap_err();
        assert!(matches!(
            err,
            Stu540Error::HandshakeFailed {
                stage: Opcode::Information,
                ..
            }
        ));
        assert!(!device.is_open());
    }

    #[tokio::test]
    async fn stalled_query_times_out() {
        let device = MockDevice::stu540();
        device.stall_receive();
        let tablet = session(&device);

        match tablet.connect().await.unwrap_err() {
            Stu540Error::HandshakeFailed { source, .. } => assert!(matches!(
                *source,
                Stu540Error::Transport(TransportError::Timeout(_))
            )),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn disconnected_operations_make_no_calls() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        let red = Rgb([255, 0, 0]);

        assert_eq!(tablet.clear_screen().await.unwrap(), Outcome::NotConnected);
        assert_eq!(
            tablet.set_pen_color_and_width(red, 2).await.unwrap(),
            Outcome::NotConnected
        );
        assert_eq!(
            tablet.set_background_color(red).await.unwrap(),
            Outcome::NotConnected
        );
        assert_eq!(tablet.set_image(&[1, 2, 3]).await.unwrap(), Outcome::NotConnected);
        assert_eq!(tablet.read(Opcode::Serial).await.unwrap(), Outcome::NotConnected);
        assert_eq!(tablet.read_serial().await.unwrap(), Outcome::NotConnected);
        tablet.disconnect().await.unwrap();

        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn drawing_commands_send_expected_reports() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();
        device.clear_calls();

        let color: Rgb = "#102030".parse().unwrap();
        assert!(tablet.set_pen_color_and_width(color, 4).await.unwrap().is_completed());
        assert!(tablet.clear_screen().await.unwrap().is_completed());
        assert!(tablet.set_background_color(color).await.unwrap().is_completed());
        assert!(tablet.set_ink_mode(InkMode::On).await.unwrap().is_completed());

        assert_eq!(
            device.sent_reports(),
            [
                (0x2D, vec![0x10, 0x20, 0x30, 4]),
                (0x20, vec![0]),
                (0x2E, vec![0x10, 0x20, 0x30]),
                (0x21, vec![1]),
            ]
        );
    }

    #[tokio::test]
    async fn image_upload_sequence() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();
        device.clear_calls();

        let image: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let mut seen = Vec::new();
        tablet
            .set_image_with_progress(&image, |i| seen.push(i))
            .await
            .unwrap();

        let sent = device.sent_reports();
        assert_eq!(sent.len(), 1 + 3 + 1);
        assert_eq!(sent[0], (0x25, vec![0x04]));
        assert_eq!(sent[1], (0x26, image[..253].to_vec()));
        assert_eq!(sent[2], (0x26, image[253..506].to_vec()));
        assert_eq!(sent[3], (0x26, image[506..].to_vec()));
        assert_eq!(sent[4], (0x27, vec![0]));
        assert_eq!(seen, [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_image_sends_nothing() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();
        device.clear_calls();

        assert!(tablet.set_image(&[]).await.unwrap().is_completed());
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_chunk_aborts_upload() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();
        let status = status_log(&tablet);
        // send 0 is the start report, send 2 the second chunk
        device.fail_send_at(2);

        let err = tablet.set_image(&[0xAB; 253 * 4]).await.unwrap_err();
        assert!(matches!(
            err,
            Stu540Error::TransferFailed {
                stage: TransferStage::Data { chunk: 1, total: 4 },
                ..
            }
        ));

        let ids: Vec<u8> = device.sent_reports().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, [0x25, 0x26, 0x26]);
        assert!(matches!(status.lock().as_slice(), [StatusEvent::Error { .. }]));
    }

    #[tokio::test]
    async fn failed_start_sends_no_data() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();
        device.fail_send_at(0);

        let err = tablet.set_image(&[1; 10]).await.unwrap_err();
        assert!(matches!(
            err,
            Stu540Error::TransferFailed {
                stage: TransferStage::Start,
                ..
            }
        ));
        assert_eq!(device.sent_reports().len(), 1);
    }

    #[tokio::test]
    async fn pen_samples_reach_every_subscriber() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();

        let first = Arc::new(SyncMutex::new(Vec::new()));
        let second = Arc::new(SyncMutex::new(Vec::new()));
        let first_id = {
            let first = first.clone();
            tablet.on_pen_sample(move |s| first.lock().push(*s))
        };
        {
            let second = second.clone();
            tablet.on_pen_sample(move |s| second.lock().push(*s));
        }

        assert!(device.push_input_report(0x01, &[0x01, 0x00, 0x01, 0x00, 0x00, 0x80]));
        assert!(tablet.remove_pen_listener(first_id));
        device.push_input_report(0x01, &[0x00, 0x00, 0x00, 0x01, 0x00, 0x02]);
        device.push_input_report(0x09, &[0x00; 6]);

        assert_eq!(first.lock().len(), 1);
        assert_eq!(
            first.lock()[0],
            PenSample {
                x: 256,
                y: 128,
                pressure: 256,
                is_pen_down: true,
            }
        );
        assert_eq!(second.lock().len(), 2);
    }

    #[tokio::test]
    async fn disconnect_closes_once() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        let status = status_log(&tablet);
        tablet.connect().await.unwrap();

        tablet.disconnect().await.unwrap();
        tablet.disconnect().await.unwrap();

        let closes = device.calls().iter().filter(|c| **c == Call::Close).count();
        assert_eq!(closes, 1);
        assert!(tablet.info().await.is_none());
        assert_eq!(status.lock().last(), Some(&StatusEvent::Disconnected));
    }

    #[tokio::test]
    async fn unplugged_device_behaves_as_disconnected() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();
        device.unplug();
        device.clear_calls();

        let status = status_log(&tablet);

        assert_eq!(tablet.clear_screen().await.unwrap(), Outcome::NotConnected);
        assert!(tablet.info().await.is_none());
        assert!(device.calls().is_empty());
        assert_eq!(*status.lock(), [StatusEvent::Disconnected]);

        // reconnecting selects the device again
        assert!(tablet.connect().await.unwrap());
        assert_eq!(device.calls().first(), Some(&Call::Open));
        assert_eq!(status.lock().len(), 2);
    }

    #[tokio::test]
    async fn unplug_during_upload_is_a_transfer_failure() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();
        let status = status_log(&tablet);
        // start report and first chunk go out, then the device vanishes
        device.unplug_after_sends(2);

        let err = tablet.set_image(&[0x11; 253 * 3]).await.unwrap_err();
        assert!(matches!(
            err,
            Stu540Error::TransferFailed {
                stage: TransferStage::Data { chunk: 1, total: 3 },
                source: TransportError::Closed,
            }
        ));

        let ids: Vec<u8> = device.sent_reports().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, [0x25, 0x26]);
        assert!(matches!(status.lock().as_slice(), [StatusEvent::Error { .. }]));

        assert_eq!(tablet.clear_screen().await.unwrap(), Outcome::NotConnected);
        assert_eq!(status.lock().last(), Some(&StatusEvent::Disconnected));
    }

    #[tokio::test]
    async fn picker_failure_is_reported_to_observers() {
        let tablet = Stu540::new(MockBackend::new().failing_requests(), Options::default());
        let status = status_log(&tablet);

        assert!(matches!(
            tablet.connect().await,
            Err(Stu540Error::Transport(TransportError::Unsupported(_)))
        ));
        assert!(matches!(
            tablet.is_available().await,
            Err(Stu540Error::Transport(TransportError::Unsupported(_)))
        ));
        assert_eq!(status.lock().len(), 2);
        assert!(status
            .lock()
            .iter()
            .all(|e| matches!(e, StatusEvent::Error { .. })));
    }

    #[tokio::test]
    async fn reads_serial_number() {
        let device = MockDevice::stu540();
        let tablet = session(&device);
        tablet.connect().await.unwrap();

        let serial = tablet.read_serial().await.unwrap().completed();
        assert_eq!(serial.as_deref(), Some("5E00012345"));
    }
}
