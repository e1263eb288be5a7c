// Licensed under the Apache-2.0 license

//! Byte-level slave transaction state machine.
//!
//! The EC is the bus master. Every transaction it starts is one of:
//!
//! ```text
//! EC writes (host receives a frame):
//!   [addr+W] [header] [byte] ... [byte] STOP
//!    BEGIN    CMD      SUBCMD   READ ...
//!
//! EC reads (host transmits its queued request):
//!   [addr+W] [0x01] [addr+R] -> size,      byte, ..., byte STOP
//!    BEGIN    CMD    SUBCMD     WRITE_SIZE WRITE ...
//! ```
//!
//! The stop may come on the same status as the last frame byte, so a
//! two-byte frame can already complete in SUBCMD.
//!
//! [`Transport::run_io`] drives exactly one of these to completion by
//! polling the slave status register. The EC does not tolerate being polled
//! too eagerly, so each call starts with a settle delay.

use super::common::{
    EcConfig, WaitMode, MAX_FRAME_LEN, MAX_REQUEST_LEN, NOOP_REQUEST, READ_COMMAND,
};
use super::coordinator::RequestError;
use super::frame::Frame;
use super::traits::{Instant, MonotonicClock, SlaveRegisters, SlaveStatus};
use crate::common::{Logger, NoOpLogger};
use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use fugit::MillisDurationU32;
use heapless::Vec;

/// Position within the current transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsmState {
    /// Expecting our own address.
    Begin,
    /// Expecting the header/command byte.
    Cmd,
    /// Deciding between an EC write and an EC read.
    Subcmd,
    /// Receiving frame bytes.
    Read,
    /// The EC asked to read; the size byte goes out on this same poll.
    WriteSize,
    /// Streaming the transmit frame.
    Write,
}

/// Successful end of one `run_io` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IoOutcome {
    /// The EC wrote a complete frame.
    ReadOk(Frame),
    /// The EC read our whole transmit frame.
    WriteOk,
    /// The transaction ended at an unexpected point; call again.
    Retry,
}

/// Errors that abort the transaction in progress.
///
/// "Not ready" is not among them: a non-blocking poll that finds the EC idle
/// yields `nb::Error::WouldBlock`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The first byte of the transaction was not our slave address.
    AddressMismatch { received: u8 },
    /// The EC changed direction or ended the transaction out of sequence.
    ProtocolViolation,
    /// The EC kept reading after the transmit frame was exhausted.
    NoDataToWrite,
    /// The EC did not finish the transaction within `io_timeout`.
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::AddressMismatch { received } => {
                write!(f, "unknown address 0x{received:02x}")
            }
            TransportError::ProtocolViolation => f.write_str("protocol violation"),
            TransportError::NoDataToWrite => f.write_str("no data to write"),
            TransportError::Timeout => f.write_str("timeout"),
        }
    }
}

/// Counters kept across transactions for field debugging.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Bytes dropped because a frame exceeded [`MAX_FRAME_LEN`].
    pub dropped_bytes: u32,
    /// Request line writes that failed.
    pub signal_failures: u32,
    pub last_status: Option<SlaveStatus>,
}

/// Receive/transmit buffers and cursors of the one transaction in flight.
#[derive(Debug)]
pub struct TransactionState {
    fsm: FsmState,
    rx_buf: [u8; MAX_FRAME_LEN],
    rx_pos: usize,
    tx: Option<Vec<u8, MAX_REQUEST_LEN>>,
    tx_pos: usize,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fsm: FsmState::Begin,
            rx_buf: [0; MAX_FRAME_LEN],
            rx_pos: 0,
            tx: None,
            tx_pos: 0,
        }
    }

    fn restart(&mut self) {
        self.fsm = FsmState::Begin;
        self.rx_pos = 0;
        self.tx_pos = 0;
    }

    /// Store one received byte. `false` if the frame buffer is full.
    fn push_rx(&mut self, byte: u8) -> bool {
        match self.rx_buf.get_mut(self.rx_pos) {
            Some(slot) => {
                *slot = byte;
                self.rx_pos += 1;
                true
            }
            None => false,
        }
    }

    fn take_frame(&mut self) -> Option<Frame> {
        let frame = self.rx_buf.get(..self.rx_pos).and_then(Frame::from_slice);
        self.rx_pos = 0;
        frame
    }

    fn tx_len(&self) -> u8 {
        // Bounded by MAX_REQUEST_LEN.
        self.tx.as_ref().map_or(0, |tx| tx.len() as u8)
    }

    fn next_tx(&self) -> Option<u8> {
        self.tx.as_ref().and_then(|tx| tx.get(self.tx_pos).copied())
    }

    fn clear_tx(&mut self) {
        self.tx = None;
        self.tx_pos = 0;
    }
}

/// One EC link: slave registers, request line, time base and the
/// transaction state they drive.
pub struct Transport<R, P, T, L = NoOpLogger>
where
    R: SlaveRegisters,
    P: OutputPin,
    T: DelayNs + MonotonicClock,
    L: Logger,
{
    regs: R,
    request_pin: P,
    timer: T,
    logger: L,
    config: EcConfig,
    state: TransactionState,
    diagnostics: Diagnostics,
}

impl<R, P, T, L> Transport<R, P, T, L>
where
    R: SlaveRegisters,
    P: OutputPin,
    T: DelayNs + MonotonicClock,
    L: Logger,
{
    pub fn new(regs: R, request_pin: P, timer: T, config: EcConfig, logger: L) -> Self {
        Self {
            regs,
            request_pin,
            timer,
            logger,
            config,
            state: TransactionState::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EcConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> FsmState {
        self.state.fsm
    }

    /// Bytes of the frame currently being received.
    #[must_use]
    pub fn rx_len(&self) -> usize {
        self.state.rx_pos
    }

    #[must_use]
    pub fn has_tx(&self) -> bool {
        self.state.tx.is_some()
    }

    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn logger(&mut self) -> &mut L {
        &mut self.logger
    }

    /// Queue `payload` as the frame to hand out on the next EC read, and
    /// rewind the transmit cursor.
    ///
    /// # Errors
    ///
    /// `InvalidPayload` if `payload` is empty or longer than
    /// [`MAX_REQUEST_LEN`].
    pub fn queue_tx(&mut self, payload: &[u8]) -> Result<(), RequestError> {
        if payload.is_empty() {
            return Err(RequestError::InvalidPayload { len: 0 });
        }
        let tx = Vec::from_slice(payload).map_err(|()| RequestError::InvalidPayload {
            len: payload.len(),
        })?;
        self.state.tx = Some(tx);
        self.state.tx_pos = 0;
        Ok(())
    }

    pub fn clear_tx(&mut self) {
        self.state.clear_tx();
    }

    /// Pull the request line low: the host has data for the EC.
    ///
    /// Returns `false` (and counts the failure) if the pin could not be driven.
    pub fn assert_request_line(&mut self) -> bool {
        if self.request_pin.set_low().is_err() {
            self.diagnostics.signal_failures = self.diagnostics.signal_failures.saturating_add(1);
            self.logger
                .error(format_args!("NVEC io: failed to set gpio value to 0"));
            return false;
        }
        true
    }

    fn release_request_line(&mut self) {
        if self.request_pin.set_high().is_err() {
            self.diagnostics.signal_failures = self.diagnostics.signal_failures.saturating_add(1);
            self.logger
                .error(format_args!("NVEC io: failed to set gpio value to 1"));
        }
    }

    fn elapsed_since(&mut self, start: Instant) -> MillisDurationU32 {
        self.timer
            .now()
            .checked_duration_since(start)
            .unwrap_or(MillisDurationU32::from_ticks(0))
    }

    /// Drive one transaction to completion.
    ///
    /// Waits `settle_delay`, then polls the slave status. In
    /// [`WaitMode::NonBlocking`] an idle EC on the first poll returns
    /// `WouldBlock`; otherwise polling continues every `poll_interval` until
    /// the transaction ends or `io_timeout` (measured from entry, settle
    /// delay included) passes.
    ///
    /// # Errors
    ///
    /// `nb::Error::WouldBlock` when non-blocking and the EC is idle;
    /// `nb::Error::Other` with a [`TransportError`] when the transaction is
    /// aborted.
    pub fn run_io(&mut self, mode: WaitMode) -> nb::Result<IoOutcome, TransportError> {
        let start = self.timer.now();
        self.timer.delay_ms(self.config.settle_delay.to_millis());

        let mut first_poll = true;
        let mut received: u8 = 0;

        loop {
            let status = self.regs.status();
            self.diagnostics.last_status = Some(status);

            if !status.is_ready() {
                if first_poll && mode == WaitMode::NonBlocking {
                    return Err(nb::Error::WouldBlock);
                }
                first_poll = false;
                if self.elapsed_since(start) > self.config.io_timeout {
                    return Err(nb::Error::Other(TransportError::Timeout));
                }
                self.timer.delay_us(self.config.poll_interval.to_micros());
                continue;
            }
            first_poll = false;

            if status.is_master_write() {
                received = self.regs.read_data();
            }

            if status.is_transaction_start() {
                self.state.restart();
            }

            if let Some(outcome) = self.step(status, received).map_err(nb::Error::Other)? {
                return Ok(outcome);
            }

            if status.is_end_of_transaction() {
                return Ok(IoOutcome::Retry);
            }

            // A status stuck at "ready" must not hold the bus forever.
            if self.elapsed_since(start) > self.config.io_timeout {
                return Err(nb::Error::Other(TransportError::Timeout));
            }
        }
    }

    fn step(
        &mut self,
        status: SlaveStatus,
        received: u8,
    ) -> Result<Option<IoOutcome>, TransportError> {
        match self.state.fsm {
            FsmState::Begin => {
                self.state.rx_pos = 0;
                self.state.tx_pos = 0;
                if received != self.config.address {
                    self.logger
                        .error(format_args!("NVEC io: unknown addr 0x{received:02x}"));
                    return Err(TransportError::AddressMismatch { received });
                }
                self.state.fsm = FsmState::Cmd;
            }

            FsmState::Cmd => {
                // rx_pos was reset in BEGIN, so the header always fits.
                self.state.push_rx(received);
                self.state.fsm = FsmState::Subcmd;
            }

            FsmState::Subcmd => {
                if status.is_read_request() {
                    if self.state.rx_buf.first() != Some(&READ_COMMAND) {
                        self.logger.error(format_args!("NVEC io: wrong read"));
                        self.state.fsm = FsmState::Begin;
                        return Err(TransportError::ProtocolViolation);
                    }
                    self.prepare_tx();
                    self.state.fsm = FsmState::WriteSize;
                    return self.step(status, received);
                }
                self.state.push_rx(received);
                self.state.fsm = FsmState::Read;
                if status.is_end_of_transaction() {
                    return Ok(self.state.take_frame().map(IoOutcome::ReadOk));
                }
            }

            FsmState::Read => {
                if !self.state.push_rx(received) {
                    self.diagnostics.dropped_bytes =
                        self.diagnostics.dropped_bytes.saturating_add(1);
                    self.logger
                        .error(format_args!("NVEC io: read buffer is full"));
                } else if status.is_end_of_transaction() {
                    if let Some(frame) = self.state.take_frame() {
                        return Ok(Some(IoOutcome::ReadOk(frame)));
                    }
                }
            }

            FsmState::WriteSize => {
                self.regs.write_data(self.state.tx_len());
                self.release_request_line();
                self.state.fsm = FsmState::Write;
            }

            FsmState::Write => return self.write_next(status),
        }
        Ok(None)
    }

    /// Fall back to the no-op frame if nothing is queued.
    fn prepare_tx(&mut self) {
        if self.state.tx.is_none() {
            self.logger
                .debug(format_args!("NVEC io: tx buffer is empty, sending no-op"));
            self.state.tx = Vec::from_slice(&NOOP_REQUEST).ok();
        }
        self.state.tx_pos = 0;
    }

    fn write_next(&mut self, status: SlaveStatus) -> Result<Option<IoOutcome>, TransportError> {
        match (self.state.next_tx(), status.is_end_of_transaction()) {
            (Some(byte), false) => {
                self.regs.write_data(byte);
                self.state.tx_pos += 1;
                Ok(None)
            }
            (None, true) => {
                self.state.clear_tx();
                Ok(Some(IoOutcome::WriteOk))
            }
            (Some(_), true) => {
                self.logger
                    .error(format_args!("NVEC io: stop before end of data"));
                Err(TransportError::ProtocolViolation)
            }
            (None, false) => {
                self.logger.error(format_args!("NVEC io: no data to write"));
                Err(TransportError::NoDataToWrite)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvec::common::status::{END_TRANS, IRQ, RCVD, RNW};
    use crate::nvec::common::EcConfigBuilder;
    use crate::nvec::sim::{self, SimBus, SimClock, SimLogger, SimPin, ADDR};

    type SimTransport = Transport<SimBus, SimPin, SimClock, SimLogger>;

    fn transport() -> (SimTransport, SimBus, SimPin, SimClock, SimLogger) {
        let bus = SimBus::new();
        let pin = SimPin::new();
        let clock = SimClock::new();
        let logger = SimLogger::new();
        let config = EcConfigBuilder::new().address(ADDR).build();
        let transport = Transport::new(
            bus.clone(),
            pin.clone(),
            clock.clone(),
            config,
            logger.clone(),
        );
        (transport, bus, pin, clock, logger)
    }

    #[test]
    fn test_read_frame() {
        let (mut t, bus, _, _, _) = transport();
        bus.script(&sim::ec_writes(ADDR, &[0x02, 0x10, 0x20, 0x30]));

        let outcome = t.run_io(WaitMode::Blocking).unwrap();
        match outcome {
            IoOutcome::ReadOk(frame) => assert_eq!(frame.as_bytes(), &[0x02, 0x10, 0x20, 0x30]),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(t.state(), FsmState::Read);
        assert_eq!(t.rx_len(), 0);
        assert_eq!(bus.remaining(), 0);
    }

    #[test]
    fn test_two_byte_frame_completes_on_stop() {
        let (mut t, bus, _, _, _) = transport();
        bus.script(&sim::ec_writes(ADDR, &[0x80, 0x1e]));

        match t.run_io(WaitMode::Blocking).unwrap() {
            IoOutcome::ReadOk(frame) => assert_eq!(frame.as_bytes(), &[0x80, 0x1e]),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(t.rx_len(), 0);
    }

    #[test]
    fn test_write_frame() {
        let (mut t, bus, pin, _, _) = transport();
        t.queue_tx(&[0x05, 0xf4]).unwrap();
        bus.script(&sim::ec_reads(ADDR, 2));

        assert_eq!(t.run_io(WaitMode::Blocking), Ok(IoOutcome::WriteOk));
        // size byte, then the payload
        assert_eq!(bus.written(), vec![2, 0x05, 0xf4]);
        assert_eq!(pin.levels(), vec![true]);
        assert!(!t.has_tx());
    }

    #[test]
    fn test_read_request_sends_size_and_releases_line() {
        let (mut t, bus, pin, _, _) = transport();
        t.queue_tx(&[0x07, 0x15, 0x00]).unwrap();
        // The EC addresses us for a read and then stalls.
        bus.script(&[
            (IRQ | RCVD, Some(ADDR)),
            (IRQ, Some(0x01)),
            (IRQ | RNW | RCVD, None),
        ]);

        assert_eq!(
            t.run_io(WaitMode::Blocking),
            Err(nb::Error::Other(TransportError::Timeout))
        );
        // WRITE_SIZE handled the read request on its own poll
        assert_eq!(bus.written(), vec![3]);
        assert_eq!(pin.levels(), vec![true]);
        assert_eq!(t.state(), FsmState::Write);
        assert!(t.has_tx());
    }

    #[test]
    fn test_write_without_queued_request_sends_noop() {
        let (mut t, bus, _, _, logger) = transport();
        bus.script(&sim::ec_reads(ADDR, 2));

        assert_eq!(t.run_io(WaitMode::Blocking), Ok(IoOutcome::WriteOk));
        assert_eq!(bus.written(), vec![2, 0x07, 0x02]);
        assert!(logger.contains("sending no-op"));
    }

    #[test]
    fn test_address_mismatch_stays_in_begin() {
        let (mut t, bus, _, _, logger) = transport();
        bus.script(&sim::ec_writes(0x42, &[0x80, 0x41]));

        assert_eq!(
            t.run_io(WaitMode::Blocking),
            Err(nb::Error::Other(TransportError::AddressMismatch { received: 0x42 }))
        );
        assert_eq!(t.state(), FsmState::Begin);
        assert!(logger.contains("unknown addr 0x42"));
    }

    #[test]
    fn test_overflow_drops_bytes_and_stays_in_read() {
        let (mut t, bus, _, _, _) = transport();
        let mut steps = vec![(IRQ | RCVD, Some(ADDR))];
        for i in 0..40u8 {
            steps.push((IRQ, Some(i)));
        }
        bus.script(&steps);

        // Script runs dry without an end marker: the EC goes quiet.
        assert_eq!(
            t.run_io(WaitMode::Blocking),
            Err(nb::Error::Other(TransportError::Timeout))
        );
        assert_eq!(t.state(), FsmState::Read);
        assert_eq!(t.rx_len(), MAX_FRAME_LEN);
        assert_eq!(t.diagnostics().dropped_bytes, 40 - MAX_FRAME_LEN as u32);
    }

    #[test]
    fn test_overflowed_frame_ends_in_retry() {
        let (mut t, bus, _, _, _) = transport();
        let mut steps = vec![(IRQ | RCVD, Some(ADDR))];
        for i in 0..MAX_FRAME_LEN as u8 {
            steps.push((IRQ, Some(i)));
        }
        steps.push((IRQ | END_TRANS, Some(0xff)));
        bus.script(&steps);

        assert_eq!(t.run_io(WaitMode::Blocking), Ok(IoOutcome::Retry));
        assert_eq!(t.diagnostics().dropped_bytes, 1);
    }

    #[test]
    fn test_non_blocking_idle_is_would_block() {
        let (mut t, _, _, clock, _) = transport();
        assert_eq!(t.run_io(WaitMode::NonBlocking), Err(nb::Error::WouldBlock));
        // only the settle delay was spent
        assert_eq!(clock.elapsed_ms(), 20);
    }

    #[test]
    fn test_blocking_idle_times_out() {
        let (mut t, _, _, clock, _) = transport();
        assert_eq!(
            t.run_io(WaitMode::Blocking),
            Err(nb::Error::Other(TransportError::Timeout))
        );
        let elapsed = clock.elapsed_ms();
        assert!(elapsed > 600 && elapsed <= 601, "elapsed {elapsed}");
    }

    #[test]
    fn test_wrong_read_command_is_protocol_violation() {
        let (mut t, bus, _, _, logger) = transport();
        t.queue_tx(&[0x07, 0x02]).unwrap();
        bus.script(&[
            (IRQ | RCVD, Some(ADDR)),
            (IRQ, Some(0x03)),
            (IRQ | RNW | RCVD, None),
        ]);

        assert_eq!(
            t.run_io(WaitMode::Blocking),
            Err(nb::Error::Other(TransportError::ProtocolViolation))
        );
        assert_eq!(t.state(), FsmState::Begin);
        assert!(logger.contains("wrong read"));
    }

    #[test]
    fn test_stop_before_all_bytes_sent() {
        let (mut t, bus, _, _, _) = transport();
        t.queue_tx(&[0x06, 0x01, 0xff, 0x03]).unwrap();
        bus.script(&[
            (IRQ | RCVD, Some(ADDR)),
            (IRQ, Some(0x01)),
            (IRQ | RNW | RCVD, None),
            (IRQ | RNW, None),
            (IRQ | END_TRANS, None),
        ]);

        assert_eq!(
            t.run_io(WaitMode::Blocking),
            Err(nb::Error::Other(TransportError::ProtocolViolation))
        );
    }

    #[test]
    fn test_read_past_end_of_data() {
        let (mut t, bus, _, _, _) = transport();
        t.queue_tx(&[0x07, 0x02]).unwrap();
        let mut steps = sim::ec_reads(ADDR, 2);
        steps.pop();
        steps.push((IRQ | RNW, None));
        bus.script(&steps);

        assert_eq!(
            t.run_io(WaitMode::Blocking),
            Err(nb::Error::Other(TransportError::NoDataToWrite))
        );
    }

    #[test]
    fn test_early_stop_is_retry() {
        let (mut t, bus, _, _, _) = transport();
        bus.script(&[(IRQ | RCVD, Some(ADDR)), (IRQ | END_TRANS, Some(0x80))]);

        assert_eq!(t.run_io(WaitMode::Blocking), Ok(IoOutcome::Retry));
        assert_eq!(t.state(), FsmState::Subcmd);
    }

    #[test]
    fn test_restart_pattern_resynchronises() {
        let (mut t, bus, _, _, _) = transport();
        let mut steps = vec![(IRQ | RCVD, Some(ADDR)), (IRQ, Some(0x80))];
        // EC abandons the frame and starts over
        steps.extend(sim::ec_writes(ADDR, &[0x80, 0x1e]));
        bus.script(&steps);

        match t.run_io(WaitMode::Blocking).unwrap() {
            IoOutcome::ReadOk(frame) => assert_eq!(frame.as_bytes(), &[0x80, 0x1e]),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_gpio_failure_is_counted() {
        let (mut t, bus, pin, _, logger) = transport();
        pin.fail(true);
        t.queue_tx(&[0x07, 0x02]).unwrap();
        bus.script(&sim::ec_reads(ADDR, 2));

        assert!(!t.assert_request_line());
        assert_eq!(t.run_io(WaitMode::Blocking), Ok(IoOutcome::WriteOk));
        assert_eq!(t.diagnostics().signal_failures, 2);
        assert!(logger.contains("failed to set gpio value to 1"));
    }

    #[test]
    fn test_queue_tx_limits() {
        let (mut t, _, _, _, _) = transport();
        assert_eq!(
            t.queue_tx(&[]),
            Err(RequestError::InvalidPayload { len: 0 })
        );
        let len = MAX_REQUEST_LEN + 1;
        assert_eq!(
            t.queue_tx(&[0u8; MAX_REQUEST_LEN + 1]),
            Err(RequestError::InvalidPayload { len })
        );
        assert!(t.queue_tx(&[0u8; MAX_REQUEST_LEN]).is_ok());
    }
}
