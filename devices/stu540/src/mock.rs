//! In-memory transport that records every exchange.
//!
//! Used by the unit tests and by front ends running without hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use stu_sync_core::{
    DeviceIdentity, HidBackend, HidHandle, InputReportHandler, Result, TransportError,
};

use crate::abi::Opcode;
use crate::consts;

/// One recorded transport call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Open,
    Close,
    SendFeature { report_id: u8, data: Vec<u8> },
    ReceiveFeature { report_id: u8 },
}

#[derive(Default)]
struct State {
    open: bool,
    calls: Vec<Call>,
    responses: HashMap<u8, Vec<u8>>,
    sends: usize,
    fail_send_at: Option<usize>,
    unplug_after_sends: Option<usize>,
    stall_receive: bool,
    handler: Option<InputReportHandler>,
}

/// Simulated tablet. Clones share state, so a test can keep one clone while
/// the session owns another.
#[derive(Clone)]
pub struct MockDevice {
    identity: DeviceIdentity,
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            state: Arc::default(),
        }
    }

    /// A tablet answering the handshake queries like an STU-540
    pub fn stu540() -> Self {
        Self::new(consts::IDENTITY)
            .with_response(
                Opcode::Capability.id(),
                vec![0x09, 0x25, 0x80, 0x16, 0x80, 0x03, 0xFF, 0x00],
            )
            .with_response(Opcode::Information.id(), b"\x08STU-540\x00\x00".to_vec())
            .with_response(Opcode::Serial.id(), b"\x0F5E00012345\x00".to_vec())
    }

    /// Answer `report_id` with `report` (report id included)
    pub fn with_response(self, report_id: u8, report: Vec<u8>) -> Self {
        self.state.lock().responses.insert(report_id, report);
        self
    }

    pub fn without_response(self, report_id: u8) -> Self {
        self.state.lock().responses.remove(&report_id);
        self
    }

    /// Fail the `index`th feature report send (zero based, counted across the session)
    pub fn fail_send_at(&self, index: usize) {
        self.state.lock().fail_send_at = Some(index);
    }

    /// Close the device once `count` feature reports have been sent, so the
    /// next send finds the handle gone
    pub fn unplug_after_sends(&self, count: usize) {
        self.state.lock().unplug_after_sends = Some(count);
    }

    /// Never answer feature report reads
    pub fn stall_receive(&self) {
        self.state.lock().stall_receive = true;
    }

    /// Simulate the device vanishing under the session
    pub fn unplug(&self) {
        self.state.lock().open = false;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Feature reports sent so far as `(report_id, payload)`
    pub fn sent_reports(&self) -> Vec<(u8, Vec<u8>)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::SendFeature { report_id, data } => Some((*report_id, data.clone())),
                _ => None,
            })
            .collect()
    }

    /// Deliver an input report to the installed handler, as the transport would
    pub fn push_input_report(&self, report_id: u8, payload: &[u8]) -> bool {
        let handler = self.state.lock().handler.clone();
        match handler {
            Some(handler) => {
                handler(report_id, payload);
                true
            },
            None => false,
        }
    }
}

impl HidHandle for MockDevice {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    async fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Open);
        state.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Close);
        state.open = false;
        Ok(())
    }

    async fn send_feature_report(&self, report_id: u8, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let sends = state.sends;
        if state.unplug_after_sends.is_some_and(|limit| sends >= limit) {
            state.open = false;
        }
        if !state.open {
            return Err(TransportError::Closed);
        }
        state.calls.push(Call::SendFeature {
            report_id,
            data: data.to_vec(),
        });
        let index = state.sends;
        state.sends += 1;
        if state.fail_send_at == Some(index) {
            return Err(TransportError::Other(format!("simulated failure on send {index}")));
        }
        Ok(())
    }

    async fn receive_feature_report(&self, report_id: u8) -> Result<Vec<u8>> {
        let stall = {
            let mut state = self.state.lock();
            if !state.open {
                return Err(TransportError::Closed);
            }
            state.calls.push(Call::ReceiveFeature { report_id });
            state.stall_receive
        };
        if stall {
            std::future::pending::<()>().await;
        }
        self.state
            .lock()
            .responses
            .get(&report_id)
            .cloned()
            .ok_or_else(|| TransportError::Other(format!("no report {report_id:#04x}")))
    }

    fn set_input_report_handler(&mut self, handler: InputReportHandler) {
        self.state.lock().handler = Some(handler);
    }
}

/// Host whose device picker always offers the configured devices
#[derive(Default)]
pub struct MockBackend {
    devices: Vec<MockDevice>,
    requests: AtomicUsize,
    unsupported: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Fail every discovery call as a host without HID support would
    pub fn failing_requests(mut self) -> Self {
        self.unsupported = true;
        self
    }

    fn check_supported(&self) -> Result<()> {
        if self.unsupported {
            return Err(TransportError::Unsupported("mock host".into()));
        }
        Ok(())
    }

    /// How many times the device picker was shown
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl HidBackend for MockBackend {
    type Device = MockDevice;

    async fn known_devices(&self) -> Result<Vec<DeviceIdentity>> {
        self.check_supported()?;
        Ok(self.devices.iter().map(|d| d.identity).collect())
    }

    async fn request_device(&self, filter: DeviceIdentity) -> Result<Vec<MockDevice>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.check_supported()?;
        Ok(self
            .devices
            .iter()
            .filter(|d| d.identity == filter)
            .cloned()
            .collect())
    }
}
