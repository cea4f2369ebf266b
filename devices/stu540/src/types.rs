use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use stu_sync_core::{DeviceIdentity, TransportError};

use crate::abi::{read_ascii, read_u16, Arg, Opcode};
use crate::consts;

pub type Stu540Result<T> = Result<T, Stu540Error>;

#[derive(thiserror::Error)]
pub enum Stu540Error {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("tablet handshake failed while reading {stage}: {source}")]
    HandshakeFailed {
        stage: Opcode,
        #[source]
        source: Box<Stu540Error>,
    },
    #[error("malformed {opcode} report: expected at least {expected} bytes, got {actual}")]
    MalformedReport {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },
    #[error("invalid color {0:?}, expected #RRGGBB")]
    InvalidColor(String),
    #[error("image transfer failed at {stage}: {source}")]
    TransferFailed {
        stage: TransferStage,
        #[source]
        source: TransportError,
    },
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
}

impl Stu540Error {
    pub(crate) fn handshake(stage: Opcode, source: Stu540Error) -> Self {
        Self::HandshakeFailed {
            stage,
            source: Box::new(source),
        }
    }
}

impl fmt::Debug for Stu540Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Position within the start/data/end image upload sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStage {
    Start,
    Data { chunk: usize, total: usize },
    End,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStage::Start => f.write_str("image start"),
            TransferStage::Data { chunk, total } => write!(f, "chunk {}/{total}", chunk + 1),
            TransferStage::End => f.write_str("image end"),
        }
    }
}

/// Result of an operation that needs an open session
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T = ()> {
    Completed(T),
    /// No device was open, nothing was sent
    NotConnected,
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::NotConnected => None,
        }
    }
}

/// Parse a `#RRGGBB` (or `#RGB`) hex color into its red, green and blue bytes
pub fn color_to_bytes(code: &str) -> Stu540Result<[u8; 3]> {
    let invalid = || Stu540Error::InvalidColor(code.to_string());
    let hex = code.strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let hex = match hex.len() {
        // Extend 3 character hex colors
        3 => hex.chars().flat_map(|a| [a, a]).collect(),
        6 => hex.to_string(),
        _ => return Err(invalid()),
    };
    let channels = u32::from_str_radix(&hex, 16).map_err(|_| invalid())?;
    Ok([
        ((channels >> 16) & 0xFF) as u8,
        ((channels >> 8) & 0xFF) as u8,
        (channels & 0xFF) as u8,
    ])
}

/// 24 bit color, sent on the wire in R, G, B order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl FromStr for Rgb {
    type Err = Stu540Error;
    fn from_str(code: &str) -> Result<Self, Self::Err> {
        color_to_bytes(code).map(Self)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl Arg for Rgb {
    const SIZE: usize = 3;
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

/// Pixel format announced at the start of an image upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageFormat {
    #[default]
    Bgr24 = 0x04,
}

impl ImageFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Bgr24 => 3,
        }
    }
}

impl Arg for ImageFormat {
    const SIZE: usize = 1;
    #[inline(always)]
    fn to_bytes(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

/// Whether the tablet draws the pen trace on its own screen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum InkMode {
    Off = 0,
    #[default]
    On = 1,
}

impl Arg for InkMode {
    const SIZE: usize = 1;
    #[inline(always)]
    fn to_bytes(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum WritingMode {
    #[default]
    Basic = 0,
    Smooth = 1,
}

impl Arg for WritingMode {
    const SIZE: usize = 1;
    #[inline(always)]
    fn to_bytes(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

/// Rectangle in tablet coordinates accepting pen input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WritingArea {
    pub left: u16,
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
}

impl Arg for WritingArea {
    const SIZE: usize = 8;
    fn to_bytes(&self) -> Vec<u8> {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect()
    }
}

/// Physical tablet properties from the capability report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capability {
    pub tablet_width: u16,
    pub tablet_height: u16,
    pub pressure_resolution: u16,
}

impl Capability {
    /// Decode a capability report (report id at offset 0)
    pub fn decode(report: &[u8]) -> Stu540Result<Self> {
        let malformed = || Stu540Error::MalformedReport {
            opcode: Opcode::Capability,
            expected: 7,
            actual: report.len(),
        };
        Ok(Self {
            tablet_width: read_u16(report, 1).ok_or_else(malformed)?,
            tablet_height: read_u16(report, 3).ok_or_else(malformed)?,
            pressure_resolution: read_u16(report, 5).ok_or_else(malformed)?,
        })
    }
}

/// Decode the device name from an information report (report id at offset 0)
pub fn decode_device_name(report: &[u8]) -> Stu540Result<String> {
    read_ascii(report, 1, 7).ok_or(Stu540Error::MalformedReport {
        opcode: Opcode::Information,
        expected: 8,
        actual: report.len(),
    })
}

/// Fixed driver settings. Immutable for the lifetime of a session.
#[derive(Clone, Debug)]
pub struct Options {
    pub identity: DeviceIdentity,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub chunk_size: NonZeroUsize,
    pub image_format: ImageFormat,
    /// Upper bound on every request/response exchange with the device
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            identity: consts::IDENTITY,
            canvas_width: consts::CANVAS_WIDTH,
            canvas_height: consts::CANVAS_HEIGHT,
            chunk_size: consts::CHUNK_SIZE,
            image_format: ImageFormat::Bgr24,
            timeout: consts::DEFAULT_TIMEOUT,
        }
    }
}

/// Session scoped view of the tablet.
///
/// `capability` and `device_name` are only populated after a successful handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub chunk_size: usize,
    pub capability: Option<Capability>,
    pub device_name: Option<String>,
}

impl DeviceConfig {
    pub fn new(options: &Options) -> Self {
        Self {
            canvas_width: options.canvas_width,
            canvas_height: options.canvas_height,
            chunk_size: options.chunk_size.get(),
            capability: None,
            device_name: None,
        }
    }

    /// Tablet units per canvas pixel, derived from the negotiated tablet width
    pub fn scale_factor(&self) -> Option<f32> {
        self.capability
            .map(|cap| cap.tablet_width as f32 / self.canvas_width as f32)
    }

    /// Size in bytes of a full screen image in `format`
    pub fn image_len(&self, format: ImageFormat) -> usize {
        self.canvas_width as usize * self.canvas_height as usize * format.bytes_per_pixel()
    }
}

/// Session lifecycle notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    Connected { device_name: String },
    Disconnected,
    Error { message: String },
}
