// Licensed under the Apache-2.0 license

//! Protocol constants, command vocabulary and link configuration.

use super::system::event;
use fugit::{MicrosDurationU32, MillisDurationU32};

/// Hard ceiling on one EC frame (type byte + payload).
pub const MAX_FRAME_LEN: usize = 34;
/// Largest request the host may queue for transmission.
pub const MAX_REQUEST_LEN: usize = 32;

/// Command byte the EC sends before a repeated-start read.
pub const READ_COMMAND: u8 = 0x01;

/// Slave status register bits.
pub mod status {
    /// Master is reading from us (clear: master is writing).
    pub const RNW: u32 = 1 << 1;
    /// A byte (or address) was received.
    pub const RCVD: u32 = 1 << 2;
    /// Slave interrupt pending, i.e. the status is valid.
    pub const IRQ: u32 = 1 << 3;
    /// Stop condition seen: end of transaction.
    pub const END_TRANS: u32 = 1 << 4;
}

/// EC message types. As an event header these are the low nibble of byte 0;
/// as a request they are the first byte sent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    Keyboard = 0x00,
    System = 0x01,
    Battery = 0x02,
    Gpio = 0x03,
    Sleep = 0x04,
    KeyboardControl = 0x05,
    Ps2 = 0x06,
    Control = 0x07,
    Oem0 = 0x0d,
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

pub mod system_cmd {
    pub const GET_STATUS: u8 = 0x00;
    pub const CNFG_EVENT_REPORTING: u8 = 0x01;
    pub const ACK_STATUS: u8 = 0x02;
    pub const CNFG_WAKE: u8 = 0xfd;
}

pub mod keyboard_cmd {
    pub const CNFG_WAKE: u8 = 0x03;
    pub const CNFG_WAKE_KEY_REPORTING: u8 = 0x04;
    pub const SET_LEDS: u8 = 0xed;
    pub const ENABLE: u8 = 0xf4;
    pub const DISABLE: u8 = 0xf5;
}

pub mod control_cmd {
    pub const RESET_EC: u8 = 0x00;
    pub const SELF_TEST: u8 = 0x01;
    pub const NOOP: u8 = 0x02;
    pub const GET_EC_SPEC_VER: u8 = 0x10;
    pub const GET_FIRMWARE_VERSION: u8 = 0x15;
}

pub mod sleep_cmd {
    pub const GLOBAL_EVENTS: u8 = 0x00;
    pub const AP_PWR_DOWN: u8 = 0x01;
    pub const AP_SUSPEND: u8 = 0x02;
}

pub mod ps2_cmd {
    pub const SEND_CMD: u8 = 0x01;
    /// PS/2 device reset, forwarded through `SEND_CMD`.
    pub const RESET: u8 = 0xff;
}

/// Sent when the EC asks for data and nothing is queued.
pub const NOOP_REQUEST: [u8; 2] = [MessageType::Control as u8, control_cmd::NOOP];

/// Whether `run_io` may give up as soon as the EC has nothing to say.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    /// Poll until the EC starts a transaction or `io_timeout` elapses.
    Blocking,
    /// Return `WouldBlock` if the first status poll is not ready.
    NonBlocking,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EcConfig {
    /// Slave address in its 8-bit wire form, as the EC sends it.
    pub address: u8,
    /// Quiet period before the first status poll of every transaction.
    pub settle_delay: MillisDurationU32,
    /// Give up on a blocking transaction after this long.
    pub io_timeout: MillisDurationU32,
    /// Spacing between status polls while the EC is not ready.
    pub poll_interval: MicrosDurationU32,
    /// Request/response exchanges attempted before a request fails.
    pub max_attempts: u8,
    /// Transactions drained per `poll_events` call.
    pub max_event_reads: u8,
    /// Enable EC global event reporting during start-up.
    pub global_events: bool,
    /// System event sources enabled during start-up, one request per set
    /// bit (see [`event`]).
    pub event_reporting: u32,
}

impl Default for EcConfig {
    fn default() -> Self {
        EcConfigBuilder::new().build()
    }
}

pub struct EcConfigBuilder {
    address: u8,
    settle_delay: MillisDurationU32,
    io_timeout: MillisDurationU32,
    poll_interval: MicrosDurationU32,
    max_attempts: u8,
    max_event_reads: u8,
    global_events: bool,
    event_reporting: u32,
}

impl Default for EcConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EcConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            address: 0x8a,
            settle_delay: MillisDurationU32::millis(20),
            io_timeout: MillisDurationU32::millis(600),
            poll_interval: MicrosDurationU32::micros(100),
            max_attempts: 10,
            max_event_reads: 8,
            global_events: true,
            event_reporting: event::LID_SWITCH | event::POWER_BUTTON,
        }
    }
    #[must_use]
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }
    #[must_use]
    pub fn settle_delay(mut self, delay: MillisDurationU32) -> Self {
        self.settle_delay = delay;
        self
    }
    #[must_use]
    pub fn io_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.io_timeout = timeout;
        self
    }
    #[must_use]
    pub fn poll_interval(mut self, interval: MicrosDurationU32) -> Self {
        self.poll_interval = interval;
        self
    }
    /// Clamped to at least one attempt.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
    #[must_use]
    pub fn max_event_reads(mut self, reads: u8) -> Self {
        self.max_event_reads = reads;
        self
    }
    #[must_use]
    pub fn global_events(mut self, enabled: bool) -> Self {
        self.global_events = enabled;
        self
    }
    #[must_use]
    pub fn event_reporting(mut self, mask: u32) -> Self {
        self.event_reporting = mask;
        self
    }
    #[must_use]
    pub fn build(self) -> EcConfig {
        EcConfig {
            address: self.address,
            settle_delay: self.settle_delay,
            io_timeout: self.io_timeout,
            poll_interval: self.poll_interval,
            max_attempts: self.max_attempts,
            max_event_reads: self.max_event_reads,
            global_events: self.global_events,
            event_reporting: self.event_reporting,
        }
    }
}
