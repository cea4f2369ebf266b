//! Pen input report decoding and fan-out.

use stu_sync_core::{Subscribers, SubscriptionId};
use tracing::trace;

use crate::abi::{read_u16, Opcode};
use crate::types::DeviceConfig;

/// One pen position report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PenSample {
    pub x: u16,
    pub y: u16,
    pub pressure: u16,
    pub is_pen_down: bool,
}

impl PenSample {
    /// Payload bytes needed to decode a sample
    pub const LEN: usize = 6;

    /// Decode a pen data payload (report id already stripped)
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let payload = payload.get(..Self::LEN)?;
        Some(Self {
            pressure: read_u16(payload, 0)?,
            is_pen_down: payload[0] & 1 != 0,
            x: read_u16(payload, 2)?,
            y: read_u16(payload, 4)?,
        })
    }

    /// Map the tablet position onto the logical canvas. `None` until the
    /// capability handshake has provided a scale factor.
    pub fn to_canvas(&self, config: &DeviceConfig) -> Option<(f32, f32)> {
        let scale = config.scale_factor().filter(|s| *s > 0.0)?;
        Some((self.x as f32 / scale, self.y as f32 / scale))
    }
}

/// Consumes input reports and dispatches decoded samples to subscribers
#[derive(Debug, Default)]
pub struct PenDecoder {
    observers: Subscribers<PenSample>,
}

impl PenDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&PenSample) + Send + Sync + 'static) -> SubscriptionId {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Handle one unsolicited input report. Reports other than pen data, and
    /// truncated pen reports, are ignored.
    pub fn handle_input_report(&self, report_id: u8, payload: &[u8]) -> Option<PenSample> {
        if report_id != Opcode::PenData.id() {
            trace!(report_id, "ignoring input report");
            return None;
        }
        let Some(sample) = PenSample::decode(payload) else {
            trace!(len = payload.len(), "dropping truncated pen report");
            return None;
        };
        self.observers.emit(&sample);
        Some(sample)
    }
}
