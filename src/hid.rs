//! hidapi backed transport for the tablet driver.
//!
//! hidapi has no user mediated picker, so every enumerated device is both known
//! and selectable. Blocking calls run on the tokio blocking pool and input
//! reports are polled on a dedicated thread per open handle.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use hidapi::{HidApi, HidDevice, HidResult};
use parking_lot::{Mutex, RwLock};
use stu_sync_core::{
    DeviceIdentity, HidBackend, HidHandle, InputReportHandler, Result, TransportError,
};
use tracing::{debug, trace, warn};

/// Largest feature report the tablet returns, report id included
const FEATURE_REPORT_LEN: usize = 256;
/// Input report buffer, report id included
const INPUT_REPORT_LEN: usize = 64;
/// Pause of the input thread after a poll finds no report. The handle lock is
/// only held for the poll itself, so feature exchanges never wait on it.
const INPUT_IDLE: Duration = Duration::from_millis(2);

/// Run a blocking hidapi call off the async runtime
async fn blocking<T: Send + 'static>(call: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T> {
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| TransportError::Other(format!("hid worker failed: {e}")))?
}

pub struct HidapiBackend {
    api: Arc<Mutex<HidApi>>,
}

impl HidapiBackend {
    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(|e| TransportError::Unsupported(e.to_string()))?;
        Ok(Self {
            api: Arc::new(Mutex::new(api)),
        })
    }
}

impl HidBackend for HidapiBackend {
    type Device = HidapiDevice;

    async fn known_devices(&self) -> Result<Vec<DeviceIdentity>> {
        let api = self.api.clone();
        blocking(move || {
            let mut api = api.lock();
            api.refresh_devices()?;
            let mut known = Vec::new();
            for info in api.device_list() {
                let identity = DeviceIdentity::new(info.vendor_id(), info.product_id());
                if !known.contains(&identity) {
                    known.push(identity);
                }
            }
            Ok(known)
        })
        .await
    }

    async fn request_device(&self, filter: DeviceIdentity) -> Result<Vec<HidapiDevice>> {
        let api = self.api.clone();
        blocking(move || {
            let devices = {
                let mut guard = api.lock();
                guard.refresh_devices()?;
                guard
                    .device_list()
                    .filter(|info| {
                        info.vendor_id() == filter.vendor_id
                            && info.product_id() == filter.product_id
                    })
                    .map(|info| info.path().to_owned())
                    .collect::<Vec<_>>()
            };
            debug!(%filter, count = devices.len(), "enumerated matching devices");
            Ok(devices
                .into_iter()
                .map(|path| HidapiDevice::new(api.clone(), path, filter))
                .collect())
        })
        .await
    }
}

/// One enumerated interface of a tablet
pub struct HidapiDevice {
    api: Arc<Mutex<HidApi>>,
    path: CString,
    identity: DeviceIdentity,
    device: Option<Arc<Mutex<HidDevice>>>,
    /// Cleared on close, or by the input thread when the device goes away
    open: Arc<AtomicBool>,
    handler: Arc<RwLock<Option<InputReportHandler>>>,
    reader: Option<JoinHandle<()>>,
}

impl HidapiDevice {
    fn new(api: Arc<Mutex<HidApi>>, path: CString, identity: DeviceIdentity) -> Self {
        Self {
            api,
            path,
            identity,
            device: None,
            open: Arc::new(AtomicBool::new(false)),
            handler: Arc::default(),
            reader: None,
        }
    }

    fn handle(&self) -> Result<Arc<Mutex<HidDevice>>> {
        match &self.device {
            Some(device) if self.is_open() => Ok(device.clone()),
            _ => Err(TransportError::Closed),
        }
    }
}

impl HidHandle for HidapiDevice {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let api = self.api.clone();
        let path = self.path.clone();
        let device = blocking(move || Ok(api.lock().open_path(&path)?)).await?;
        let device = Arc::new(Mutex::new(device));

        self.open.store(true, Ordering::Release);
        let reader = std::thread::Builder::new()
            .name("stu-sync-input".into())
            .spawn({
                let device = device.clone();
                let open = self.open.clone();
                let handler = self.handler.clone();
                move || read_input_reports(&device, &open, &handler)
            })
            .map_err(|e| {
                self.open.store(false, Ordering::Release);
                TransportError::Other(format!("failed to start input reader: {e}"))
            })?;

        debug!(path = ?self.path, "opened hid device");
        self.device = Some(device);
        self.reader = Some(reader);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            blocking(move || {
                reader
                    .join()
                    .map_err(|_| TransportError::Other("input reader panicked".into()))
            })
            .await?;
        }
        self.device = None;
        debug!(path = ?self.path, "closed hid device");
        Ok(())
    }

    async fn send_feature_report(&self, report_id: u8, data: &[u8]) -> Result<()> {
        let device = self.handle()?;
        let mut report = Vec::with_capacity(data.len() + 1);
        report.push(report_id);
        report.extend_from_slice(data);
        blocking(move || Ok(device.lock().send_feature_report(&report)?)).await
    }

    async fn receive_feature_report(&self, report_id: u8) -> Result<Vec<u8>> {
        let device = self.handle()?;
        blocking(move || {
            let mut buf = vec![0u8; FEATURE_REPORT_LEN];
            buf[0] = report_id;
            let len = device.lock().get_feature_report(&mut buf)?;
            buf.truncate(len);
            Ok(buf)
        })
        .await
    }

    fn set_input_report_handler(&mut self, handler: InputReportHandler) {
        *self.handler.write() = Some(handler);
    }
}

impl Drop for HidapiDevice {
    fn drop(&mut self) {
        // the input thread notices on its next poll
        self.open.store(false, Ordering::Release);
    }
}

/// Non-blocking read of one queued input report
trait PollInput: Send {
    fn poll_input(&self, buf: &mut [u8]) -> HidResult<usize>;
}

impl PollInput for HidDevice {
    fn poll_input(&self, buf: &mut [u8]) -> HidResult<usize> {
        self.read_timeout(buf, 0)
    }
}

fn read_input_reports<D: PollInput>(
    device: &Mutex<D>,
    open: &AtomicBool,
    handler: &RwLock<Option<InputReportHandler>>,
) {
    let mut buf = [0u8; INPUT_REPORT_LEN];
    while open.load(Ordering::Acquire) {
        let read = device.lock().poll_input(&mut buf);
        match read {
            Ok(0) => std::thread::sleep(INPUT_IDLE),
            Ok(len) => {
                trace!(report_id = buf[0], len, "input report");
                let handler = handler.read().clone();
                if let Some(handler) = handler {
                    handler(buf[0], &buf[1..len]);
                }
            },
            Err(e) => {
                warn!("input report read failed, closing device: {e}");
                open.store(false, Ordering::Release);
            },
        }
    }
    debug!("input reader exiting");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Instant;

    use hidapi::HidError;

    use super::*;

    /// Input source replaying queued reports, then staying idle
    #[derive(Default)]
    struct Replay {
        reports: parking_lot::Mutex<VecDeque<Vec<u8>>>,
        fail_when_empty: bool,
    }

    impl PollInput for Replay {
        fn poll_input(&self, buf: &mut [u8]) -> HidResult<usize> {
            // a driver round trip takes a moment even when nothing is queued
            std::thread::sleep(Duration::from_micros(200));
            match self.reports.lock().pop_front() {
                Some(report) => {
                    buf[..report.len()].copy_from_slice(&report);
                    Ok(report.len())
                },
                None if self.fail_when_empty => Err(HidError::HidApiError {
                    message: "device unplugged".into(),
                }),
                None => Ok(0),
            }
        }
    }

    fn spawn_reader(
        device: Replay,
        handler: Option<InputReportHandler>,
    ) -> (Arc<Mutex<Replay>>, Arc<AtomicBool>, JoinHandle<()>) {
        let device = Arc::new(Mutex::new(device));
        let open = Arc::new(AtomicBool::new(true));
        let handler = Arc::new(RwLock::new(handler));
        let reader = std::thread::spawn({
            let device = device.clone();
            let open = open.clone();
            move || read_input_reports(&device, &open, &handler)
        });
        (device, open, reader)
    }

    #[test]
    fn idle_reader_does_not_hold_up_exchanges() {
        let (device, open, reader) = spawn_reader(Replay::default(), None);

        // feature exchanges contend for the same handle lock
        let started = Instant::now();
        for _ in 0..200 {
            let _exchange = device.lock();
            std::thread::sleep(Duration::from_micros(100));
        }
        let elapsed = started.elapsed();

        open.store(false, Ordering::Release);
        reader.join().unwrap();
        assert!(elapsed < Duration::from_secs(2), "exchanges took {elapsed:?}");
    }

    #[test]
    fn reports_are_split_into_id_and_payload() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let handler: InputReportHandler = {
            let seen = seen.clone();
            Arc::new(move |id: u8, payload: &[u8]| seen.lock().push((id, payload.to_vec())))
        };
        let replay = Replay::default();
        replay.reports.lock().extend([vec![0x01, 1, 2, 3, 4, 5, 6], vec![0x09, 7]]);

        let (_device, open, reader) = spawn_reader(replay, Some(handler));
        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        open.store(false, Ordering::Release);
        reader.join().unwrap();

        assert_eq!(
            *seen.lock(),
            [(0x01, vec![1, 2, 3, 4, 5, 6]), (0x09, vec![7])]
        );
    }

    #[test]
    fn read_error_closes_the_handle() {
        let replay = Replay {
            fail_when_empty: true,
            ..Replay::default()
        };
        let (_device, open, reader) = spawn_reader(replay, None);
        reader.join().unwrap();
        assert!(!open.load(Ordering::Acquire));
    }
}
