// Licensed under the Apache-2.0 license

//! # NvEC Abstraction Traits
//!
//! The link is built from small, focused traits so that every piece of
//! hardware it touches can be swapped for a simulation in tests.
//!
//! ## Trait Map
//!
//! ```text
//! SlaveRegisters   status/data register pair of the I2C slave block
//! MonotonicClock   millisecond time base (paired with embedded-hal DelayNs)
//! Requester        "send command, get response" contract offered to peripherals
//! Peripheral       bring-up + event handler registered per message type
//! ```

use super::coordinator::RequestError;
use super::frame::{Event, Frame};
use fugit::TimerInstantU32;

/// Millisecond instant used for transaction timeouts.
pub type Instant = TimerInstantU32<1_000>;

/// Raw slave status register value with named accessors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlaveStatus(pub u32);

impl SlaveStatus {
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The slave block has something for us.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        self.0 & super::common::status::IRQ != 0
    }

    /// The master is writing, so the data register holds a fresh byte.
    #[must_use]
    pub const fn is_master_write(self) -> bool {
        self.0 & super::common::status::RNW == 0
    }

    #[must_use]
    pub const fn is_end_of_transaction(self) -> bool {
        self.0 & super::common::status::END_TRANS != 0
    }

    /// Address phase of a new master write.
    ///
    /// Only the exact `IRQ | RCVD` pattern counts; other combinations that
    /// may also mean a restart have not been validated on hardware.
    #[must_use]
    pub const fn is_transaction_start(self) -> bool {
        use super::common::status::{IRQ, RCVD};
        self.0 == IRQ | RCVD
    }

    /// Repeated-start address phase of a master read.
    #[must_use]
    pub const fn is_read_request(self) -> bool {
        use super::common::status::{IRQ, RCVD, RNW};
        self.0 == IRQ | RNW | RCVD
    }
}

/// Status/data register pair exposed by the I2C slave controller.
///
/// The same data register is read for bytes the master writes and written
/// for bytes the master reads.
pub trait SlaveRegisters {
    /// Current slave status.
    fn status(&mut self) -> SlaveStatus;

    /// Byte most recently received from the master.
    fn read_data(&mut self) -> u8;

    /// Byte to hand to the master on its next read clock.
    fn write_data(&mut self, byte: u8);
}

/// Free-running millisecond clock.
///
/// Paired with [`embedded_hal::delay::DelayNs`] on the same object so that a
/// simulated time base advances exactly by the delays the driver asks for.
pub trait MonotonicClock {
    fn now(&mut self) -> Instant;
}

/// The request path offered to peripherals during bring-up.
pub trait Requester {
    /// Send `payload` and wait for the EC to answer.
    ///
    /// # Errors
    ///
    /// Fails with [`RequestError`] when the payload is malformed or every
    /// attempt failed.
    fn request(&mut self, payload: &[u8]) -> Result<(), RequestError>;

    /// Response frame to the last request, if the EC sent one.
    fn take_response(&mut self) -> Option<Frame>;
}

/// A consumer of one EC message type.
///
/// Registered with the engine against a message type; the engine calls
/// [`Peripheral::bring_up`] once during start-up and
/// [`Peripheral::handle_event`] for every event frame of that type.
pub trait Peripheral {
    /// Issue whatever requests this peripheral needs. Failures are the
    /// peripheral's to log; start-up continues regardless.
    fn bring_up(&mut self, ec: &mut dyn Requester);

    /// Handle one event. `event.payload` starts at frame byte 1.
    fn handle_event(&mut self, event: &Event<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvec::common::status::{END_TRANS, IRQ, RCVD, RNW};

    #[test]
    fn test_status_accessors() {
        let status = SlaveStatus(IRQ | RCVD);
        assert!(status.is_ready());
        assert!(status.is_master_write());
        assert!(status.is_transaction_start());
        assert!(!status.is_read_request());
        assert!(!status.is_end_of_transaction());

        let status = SlaveStatus(IRQ | RNW | RCVD);
        assert!(!status.is_master_write());
        assert!(status.is_read_request());
        assert!(!status.is_transaction_start());

        let status = SlaveStatus(IRQ | END_TRANS);
        assert!(status.is_end_of_transaction());
        assert!(!SlaveStatus(0).is_ready());
    }

    #[test]
    fn test_transaction_start_is_exact_pattern() {
        assert!(!SlaveStatus(IRQ | RCVD | END_TRANS).is_transaction_start());
    }
}
