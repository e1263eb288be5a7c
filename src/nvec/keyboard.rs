// Licensed under the Apache-2.0 license

//! Keyboard peripheral: EC key events to a bounded queue of key codes.
//!
//! The queue is split in two. [`Keyboard`] is registered with the engine
//! and only ever pushes; [`KeyReader`] stays with the console code and only
//! ever pops. Keys are delivered oldest first. Once the queue is full, new
//! keys are dropped until the reader catches up.

use super::common::{keyboard_cmd, ps2_cmd, MessageType};
use super::frame::Event;
use super::keytable;
use super::traits::{Peripheral, Requester};
use crate::common::{Logger, NoOpLogger};
use heapless::spsc::{Consumer, Producer, Queue};

/// Keys the queue holds before dropping.
pub const KEY_QUEUE_CAPACITY: usize = 256;

/// Backing storage for the key queue. One slot is kept free by the
/// single-producer queue, hence the `+ 1`.
pub type KeyQueue = Queue<KeyEvent, { KEY_QUEUE_CAPACITY + 1 }>;

const RELEASE_FLAG: u8 = 0x80;
const SCANCODE_MASK: u8 = 0x7f;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyEvent {
    /// Linux input key code.
    pub code: u16,
    pub released: bool,
}

impl KeyEvent {
    /// `(state << 16) | code`, where `state` is 0x80 for a release and 0
    /// for a press.
    #[must_use]
    pub fn packed(self) -> i32 {
        let state = if self.released {
            i32::from(RELEASE_FLAG)
        } else {
            0
        };
        (state << 16) | i32::from(self.code)
    }
}

pub struct Keyboard<'q, L: Logger = NoOpLogger> {
    keys: Producer<'q, KeyEvent, { KEY_QUEUE_CAPACITY + 1 }>,
    logger: L,
    wake_reporting: bool,
}

impl<'q> Keyboard<'q> {
    /// Split `queue` into the peripheral half and the reader half.
    pub fn new(queue: &'q mut KeyQueue) -> (Self, KeyReader<'q>) {
        let (keys, reader) = queue.split();
        let keyboard = Self {
            keys,
            logger: NoOpLogger,
            wake_reporting: false,
        };
        (keyboard, KeyReader { keys: reader })
    }
}

impl<'q, L: Logger> Keyboard<'q, L> {
    #[must_use]
    pub fn with_logger<L2: Logger>(self, logger: L2) -> Keyboard<'q, L2> {
        Keyboard {
            keys: self.keys,
            logger,
            wake_reporting: self.wake_reporting,
        }
    }

    /// Also ask the EC to wake the host on key presses during bring-up.
    #[must_use]
    pub fn with_wake_reporting(mut self, enabled: bool) -> Self {
        self.wake_reporting = enabled;
        self
    }

    fn push(&mut self, key: KeyEvent) {
        if self.keys.enqueue(key).is_err() {
            self.logger.debug(format_args!(
                "NVEC: key queue full, dropping key {}",
                key.code
            ));
        }
    }

    fn step(&mut self, ec: &mut dyn Requester, payload: &[u8], what: &str) {
        if ec.request(payload).is_err() {
            self.logger.error(format_args!("NVEC: failed to {what}"));
        }
    }
}

impl<L: Logger> Peripheral for Keyboard<'_, L> {
    fn bring_up(&mut self, ec: &mut dyn Requester) {
        let ps2: u8 = MessageType::Ps2.into();
        let kbd: u8 = MessageType::KeyboardControl.into();

        self.step(
            ec,
            &[ps2, ps2_cmd::SEND_CMD, ps2_cmd::RESET, 3],
            "reset keyboard",
        );
        self.step(ec, &[kbd, keyboard_cmd::SET_LEDS, 0], "clear leds");
        self.step(ec, &[kbd, keyboard_cmd::ENABLE], "enable keyboard");

        if self.wake_reporting {
            self.step(
                ec,
                &[kbd, keyboard_cmd::CNFG_WAKE, 1, 1],
                "configure keyboard wake",
            );
            self.step(
                ec,
                &[kbd, keyboard_cmd::CNFG_WAKE_KEY_REPORTING, 1],
                "enable wake key reporting",
            );
        }

        self.logger
            .debug(format_args!("NVEC: keyboard initialization finished"));
    }

    fn handle_event(&mut self, event: &Event<'_>) {
        let Some(row) = event.header.size_class().table_row() else {
            self.logger.debug(format_args!(
                "NVEC: unsupported keyboard event 0x{:02x}",
                event.header.raw()
            ));
            return;
        };
        // Three-byte events carry a lead byte before the scan code, so the
        // code sits at the same offset as the table row.
        let Some(byte) = event.payload.get(row).copied() else {
            self.logger.debug(format_args!("NVEC: short keyboard event"));
            return;
        };
        let Some(code) = keytable::lookup(row, byte & SCANCODE_MASK) else {
            return;
        };
        self.push(KeyEvent {
            code,
            released: byte & RELEASE_FLAG != 0,
        });
    }
}

/// Consumer half of the key queue.
pub struct KeyReader<'q> {
    keys: Consumer<'q, KeyEvent, { KEY_QUEUE_CAPACITY + 1 }>,
}

impl KeyReader<'_> {
    #[must_use]
    pub fn have_keys(&self) -> bool {
        self.keys.ready()
    }

    pub fn pop_event(&mut self) -> Option<KeyEvent> {
        self.keys.dequeue()
    }

    /// Oldest key in [`KeyEvent::packed`] form.
    pub fn pop_key(&mut self) -> Option<i32> {
        self.pop_event().map(KeyEvent::packed)
    }

    /// Fill `out` with packed keys, calling `refill` first if nothing is
    /// queued. Returns the number of entries written.
    pub fn read_keys(&mut self, refill: impl FnOnce(), out: &mut [i32]) -> usize {
        if !self.have_keys() {
            refill();
        }
        let mut count = 0;
        for slot in out.iter_mut() {
            let Some(key) = self.pop_key() else {
                break;
            };
            *slot = key;
            count += 1;
        }
        count
    }
}
