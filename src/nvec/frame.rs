// Licensed under the Apache-2.0 license

//! EC frame model.
//!
//! ```text
//!  byte 0 (header)                        bytes 1..N
//! +---+-------+---+---------------+      +---------------------+
//! | 7 |  6 5  | 4 |    3 2 1 0    |      |       payload       |
//! +---+-------+---+---------------+      +---------------------+
//!  event  size       message type
//! ```
//!
//! Bit 7 set marks an unsolicited event, clear marks the response to the
//! request the host just issued. Size class and message type are only
//! meaningful on events. A frame never exceeds [`MAX_FRAME_LEN`] bytes.

use super::common::MAX_FRAME_LEN;
use heapless::Vec;

const EVENT_FLAG: u8 = 0x80;
const SIZE_CLASS_SHIFT: u8 = 5;
const SIZE_CLASS_MASK: u8 = 0x03;
const MESSAGE_TYPE_MASK: u8 = 0x0f;

/// Event payload length class, bits 5..6 of the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SizeClass {
    TwoByte,
    ThreeByte,
    /// Variable-length events are not supported by this driver.
    Variable,
    Reserved,
}

impl SizeClass {
    /// Row of the scan-code tables used for this class, if any.
    #[must_use]
    pub const fn table_row(self) -> Option<usize> {
        match self {
            SizeClass::TwoByte => Some(0),
            SizeClass::ThreeByte => Some(1),
            SizeClass::Variable | SizeClass::Reserved => None,
        }
    }
}

/// Typed view of a frame's first byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header(u8);

impl Header {
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_event(self) -> bool {
        self.0 & EVENT_FLAG != 0
    }

    #[must_use]
    pub const fn size_class(self) -> SizeClass {
        match (self.0 >> SIZE_CLASS_SHIFT) & SIZE_CLASS_MASK {
            0 => SizeClass::TwoByte,
            1 => SizeClass::ThreeByte,
            2 => SizeClass::Variable,
            _ => SizeClass::Reserved,
        }
    }

    #[must_use]
    pub const fn message_type(self) -> u8 {
        self.0 & MESSAGE_TYPE_MASK
    }
}

/// One complete inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8, MAX_FRAME_LEN>,
}

impl Frame {
    /// Copy `bytes` into a frame. `None` if empty or longer than
    /// [`MAX_FRAME_LEN`].
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Vec::from_slice(bytes).ok().map(|bytes| Self { bytes })
    }

    #[must_use]
    pub fn header(&self) -> Header {
        Header(self.bytes.first().copied().unwrap_or_default())
    }

    /// Everything after the header byte.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.bytes.get(1..).unwrap_or(&[])
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An event frame as seen by a peripheral: the header already consumed,
/// the payload starting at frame byte 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Event<'f> {
    pub header: Header,
    pub payload: &'f [u8],
}

impl<'f> Event<'f> {
    #[must_use]
    pub fn new(frame: &'f Frame) -> Self {
        Self {
            header: frame.header(),
            payload: frame.payload(),
        }
    }
}
