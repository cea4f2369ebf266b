//! Feature report opcodes, report builders and field decoders.

use std::fmt;

use crate::types::{ImageFormat, InkMode, Rgb, Stu540Error, WritingArea, WritingMode};

/// Report identifiers understood by the tablet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    PenData = 0x01,
    Information = 0x08,
    Capability = 0x09,
    WritingMode = 0x0E,
    Serial = 0x0F,
    ClearScreen = 0x20,
    InkMode = 0x21,
    WriteImageStart = 0x25,
    WriteImageData = 0x26,
    WriteImageEnd = 0x27,
    WritingArea = 0x2A,
    Brightness = 0x2B,
    PenColorAndWidth = 0x2D,
    BackgroundColor = 0x2E,
    PenDataTiming = 0x34,
}

impl Opcode {
    pub const ALL: [Opcode; 15] = [
        Opcode::PenData,
        Opcode::Information,
        Opcode::Capability,
        Opcode::WritingMode,
        Opcode::Serial,
        Opcode::ClearScreen,
        Opcode::InkMode,
        Opcode::WriteImageStart,
        Opcode::WriteImageData,
        Opcode::WriteImageEnd,
        Opcode::WritingArea,
        Opcode::Brightness,
        Opcode::PenColorAndWidth,
        Opcode::BackgroundColor,
        Opcode::PenDataTiming,
    ];

    /// Wire value of the report id
    #[inline(always)]
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::PenData => "pen data",
            Opcode::Information => "information",
            Opcode::Capability => "capability",
            Opcode::WritingMode => "writing mode",
            Opcode::Serial => "serial",
            Opcode::ClearScreen => "clear screen",
            Opcode::InkMode => "ink mode",
            Opcode::WriteImageStart => "image start",
            Opcode::WriteImageData => "image data",
            Opcode::WriteImageEnd => "image end",
            Opcode::WritingArea => "writing area",
            Opcode::Brightness => "brightness",
            Opcode::PenColorAndWidth => "pen color and width",
            Opcode::BackgroundColor => "background color",
            Opcode::PenDataTiming => "pen data timing",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Stu540Error;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.id() == id)
            .ok_or(Stu540Error::UnknownOpcode(id))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.id())
    }
}

/// One outbound feature report. The payload excludes the report id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

pub trait Arg {
    const SIZE: usize;
    fn to_bytes(&self) -> Vec<u8>;
}

impl Arg for u8 {
    const SIZE: usize = 1;
    fn to_bytes(&self) -> Vec<u8> {
        vec![*self]
    }
}

impl Arg for bool {
    const SIZE: usize = 1;
    fn to_bytes(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Arg for u16 {
    const SIZE: usize = 2;
    fn to_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }
}

macro_rules! impl_command_abi {
    [$(
        $( #[doc = $( $doc:tt )* ] )*
        fn $name:ident ( $([ $( $hardcode:expr ),* ]$(,)?)? $( $arg:ident: $type:tt ),* ) => $opcode:ident;
    )+] => {
        $(
            $(#[doc = concat!("Construct a report for ", $($doc)*)])*
            #[allow(unused_mut)]
            pub fn $name( $( $arg: $type ),* ) -> Report {
                let len = 0 $($( + $hardcode - $hardcode + 1 )*)? $( + <$type as Arg>::SIZE )*;
                let mut payload = Vec::with_capacity(len);
                $($(
                    payload.push($hardcode);
                )*)?
                $(
                    payload.extend_from_slice(&$arg.to_bytes());
                )*
                Report { opcode: Opcode::$opcode, payload }
            }
        )*
    };
}

impl_command_abi![
    /* DISPLAY COMMANDS */

    /// clearing the screen
    fn clear_screen([0]) => ClearScreen;

    /// setting the ink color and stroke width
    fn pen_color_and_width(color: Rgb, width: u8) => PenColorAndWidth;

    /// setting the screen background color
    fn background_color(color: Rgb) => BackgroundColor;

    /// setting the backlight brightness
    fn brightness(level: u8) => Brightness;

    /* IMAGE TRANSFER */

    /// signaling the start of an image upload
    fn image_start(format: ImageFormat) => WriteImageStart;

    /// signaling the end of an image upload
    fn image_end([0]) => WriteImageEnd;

    /* PEN INPUT */

    /// toggling on-screen inking
    fn ink_mode(mode: InkMode) => InkMode;

    /// selecting the pen data writing mode
    fn writing_mode(mode: WritingMode) => WritingMode;

    /// restricting pen input to an area of the tablet
    fn writing_area(area: WritingArea) => WritingArea;

    /// toggling timestamped pen data reports
    fn pen_data_timing(enabled: bool) => PenDataTiming;
];

/// Construct a report carrying one chunk of image data
pub fn image_data(chunk: &[u8]) -> Report {
    Report {
        opcode: Opcode::WriteImageData,
        payload: chunk.to_vec(),
    }
}

/* FIELD DECODERS */

/// Read a big endian u16 at `offset`
pub fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Read a fixed width ASCII field, trimming NUL padding and whitespace.
/// Non-ASCII bytes are replaced.
pub fn read_ascii(buf: &[u8], offset: usize, len: usize) -> Option<String> {
    let bytes = buf.get(offset..offset + len)?;
    Some(ascii_lossy(bytes))
}

/// Read an ASCII field running from `offset` to the end of the buffer
pub fn read_ascii_tail(buf: &[u8], offset: usize) -> Option<String> {
    buf.get(offset..).map(ascii_lossy)
}

fn ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
        .collect::<String>()
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
