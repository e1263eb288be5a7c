// Licensed under the Apache-2.0 license

//! Request/response exchange on top of the transport.
//!
//! One request is: queue the payload, pull the request line, let the EC
//! read the payload, then receive its reply. The whole exchange is retried
//! up to `max_attempts` times.
//!
//! Frames received along the way are never handed to a peripheral from in
//! here. The response lands in a single slot; events are parked in a short
//! queue that the engine drains once the request is over. That keeps a
//! peripheral's event handler from running while the same peripheral is
//! blocked inside [`Requester::request`].

use super::common::{WaitMode, MAX_REQUEST_LEN};
use super::decoder::{decode, Decoded};
use super::frame::Frame;
use super::traits::{MonotonicClock, Requester, SlaveRegisters};
use super::transport::{IoOutcome, Transport, TransportError};
use crate::common::{Logger, NoOpLogger};
use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::Deque;

/// Events held between a request and the next dispatch.
pub const PENDING_EVENTS: usize = 8;

/// Failed steps over all attempts of one request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailureCounts {
    pub send: u8,
    pub receive: u8,
    pub signal: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// Payload empty or longer than [`MAX_REQUEST_LEN`].
    InvalidPayload { len: usize },
    /// Attempts exhausted; the last one failed while the EC was reading the
    /// request.
    RequestFailed(FailureCounts),
    /// Attempts exhausted; the last one failed while waiting for the
    /// response.
    ResponseFailed(FailureCounts),
}

impl RequestError {
    #[must_use]
    pub fn counts(&self) -> Option<FailureCounts> {
        match self {
            RequestError::InvalidPayload { .. } => None,
            RequestError::RequestFailed(counts) | RequestError::ResponseFailed(counts) => {
                Some(*counts)
            }
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidPayload { len } => {
                write!(f, "invalid request length {len} (1..={MAX_REQUEST_LEN})")
            }
            RequestError::RequestFailed(c) => write!(
                f,
                "request failed (send: {}, recv: {}, gpio: {})",
                c.send, c.receive, c.signal
            ),
            RequestError::ResponseFailed(c) => write!(
                f,
                "response failed (send: {}, recv: {}, gpio: {})",
                c.send, c.receive, c.signal
            ),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Phase {
    Send,
    Receive,
}

pub struct Coordinator<R, P, T, L = NoOpLogger>
where
    R: SlaveRegisters,
    P: OutputPin,
    T: DelayNs + MonotonicClock,
    L: Logger,
{
    transport: Transport<R, P, T, L>,
    response: Option<Frame>,
    events: Deque<Frame, PENDING_EVENTS>,
}

impl<R, P, T, L> Coordinator<R, P, T, L>
where
    R: SlaveRegisters,
    P: OutputPin,
    T: DelayNs + MonotonicClock,
    L: Logger,
{
    pub fn new(transport: Transport<R, P, T, L>) -> Self {
        Self {
            transport,
            response: None,
            events: Deque::new(),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &Transport<R, P, T, L> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<R, P, T, L> {
        &mut self.transport
    }

    /// Send `payload` and receive the EC's reply.
    ///
    /// On success the reply (if it was a response rather than an event) is
    /// available from [`Coordinator::take_response`]. Any response left over
    /// from an earlier request is discarded first.
    ///
    /// # Errors
    ///
    /// `InvalidPayload` without touching the bus; otherwise
    /// `RequestFailed`/`ResponseFailed` once every attempt has failed.
    pub fn perform_request(&mut self, payload: &[u8]) -> Result<(), RequestError> {
        if payload.is_empty() || payload.len() > MAX_REQUEST_LEN {
            return Err(RequestError::InvalidPayload { len: payload.len() });
        }
        self.response = None;

        let attempts = self.transport.config().max_attempts;
        let signal_base = self.transport.diagnostics().signal_failures;
        let mut counts = FailureCounts::default();
        let mut failed_in = Phase::Send;

        for attempt in 1..=attempts {
            self.transport.queue_tx(payload)?;
            self.transport.assert_request_line();

            match self.transport.run_io(WaitMode::Blocking) {
                Ok(IoOutcome::WriteOk) => {}
                other => {
                    // The EC may have pushed an event instead of reading.
                    if let Ok(IoOutcome::ReadOk(frame)) = &other {
                        self.accept(frame.clone());
                    }
                    counts.send = counts.send.saturating_add(1);
                    failed_in = Phase::Send;
                    self.transport.logger().debug(format_args!(
                        "NVEC: request attempt {attempt} not sent: {}",
                        Outcome(&other)
                    ));
                    continue;
                }
            }

            match self.transport.run_io(WaitMode::Blocking) {
                Ok(IoOutcome::ReadOk(frame)) => self.accept(frame),
                other => {
                    counts.receive = counts.receive.saturating_add(1);
                    failed_in = Phase::Receive;
                    self.transport.logger().debug(format_args!(
                        "NVEC: request attempt {attempt} got no reply: {}",
                        Outcome(&other)
                    ));
                    continue;
                }
            }

            self.transport.clear_tx();
            return Ok(());
        }

        self.transport.clear_tx();
        let signal = self
            .transport
            .diagnostics()
            .signal_failures
            .saturating_sub(signal_base);
        counts.signal = u8::try_from(signal).unwrap_or(u8::MAX);

        let err = match failed_in {
            Phase::Send => RequestError::RequestFailed(counts),
            Phase::Receive => RequestError::ResponseFailed(counts),
        };
        self.transport
            .logger()
            .error(format_args!("NVEC: failed to perform request: {err}"));
        Err(err)
    }

    /// One transaction in `mode`, keeping whatever frame it delivers.
    ///
    /// # Errors
    ///
    /// Whatever [`Transport::run_io`] reports.
    pub fn receive(&mut self, mode: WaitMode) -> nb::Result<IoOutcome, TransportError> {
        let outcome = self.transport.run_io(mode)?;
        if let IoOutcome::ReadOk(frame) = &outcome {
            self.accept(frame.clone());
        }
        Ok(outcome)
    }

    #[must_use]
    pub fn take_response(&mut self) -> Option<Frame> {
        self.response.take()
    }

    /// Oldest event not yet dispatched.
    pub fn next_event(&mut self) -> Option<Frame> {
        self.events.pop_front()
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    fn accept(&mut self, frame: Frame) {
        match decode(&frame) {
            Decoded::Response => self.response = Some(frame),
            Decoded::Event(_) => {
                if self.events.is_full() {
                    self.events.pop_front();
                    self.transport
                        .logger()
                        .error(format_args!("NVEC: event queue full, dropping oldest"));
                }
                // Room was made above.
                let _ = self.events.push_back(frame);
            }
        }
    }
}

impl<R, P, T, L> Requester for Coordinator<R, P, T, L>
where
    R: SlaveRegisters,
    P: OutputPin,
    T: DelayNs + MonotonicClock,
    L: Logger,
{
    fn request(&mut self, payload: &[u8]) -> Result<(), RequestError> {
        self.perform_request(payload)
    }

    fn take_response(&mut self) -> Option<Frame> {
        Coordinator::take_response(self)
    }
}

/// Log adapter for a `run_io` result.
struct Outcome<'a>(&'a nb::Result<IoOutcome, TransportError>);

impl fmt::Display for Outcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Ok(IoOutcome::ReadOk(frame)) => {
                write!(f, "unexpected frame 0x{:02x}", frame.header().raw())
            }
            Ok(IoOutcome::WriteOk) => f.write_str("unexpected write"),
            Ok(IoOutcome::Retry) => f.write_str("transaction cut short"),
            Err(nb::Error::WouldBlock) => f.write_str("not ready"),
            Err(nb::Error::Other(e)) => write!(f, "{e}"),
        }
    }
}
