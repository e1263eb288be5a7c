// Licensed under the Apache-2.0 license

//! The EC communication engine: one link plus the peripherals using it.

use super::common::{EcConfig, WaitMode};
use super::coordinator::{Coordinator, RequestError};
use super::frame::Frame;
use super::registry::{Registry, RegistryError, MESSAGE_TYPES};
use super::system;
use super::traits::{MonotonicClock, Peripheral, Requester, SlaveRegisters};
use super::transport::{Diagnostics, IoOutcome, Transport};
use crate::common::{Logger, NoOpLogger};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// NvEC driver.
///
/// ```text
///   Nvec::start ──► Peripheral::bring_up ──► Requester (Coordinator)
///                                               │
///   Nvec::poll_events ──────────────────────────┤
///                                               ▼
///                                           Transport ──► SlaveRegisters
///                                               │
///                     Registry::dispatch ◄── pending events
/// ```
///
/// Events that arrive while a request is in flight are held by the
/// coordinator and handed to their peripheral only after the request
/// returns.
pub struct Nvec<'a, R, P, T, L = NoOpLogger>
where
    R: SlaveRegisters,
    P: OutputPin,
    T: DelayNs + MonotonicClock,
    L: Logger,
{
    link: Coordinator<R, P, T, L>,
    registry: Registry<'a>,
}

impl<'a, R, P, T, L> Nvec<'a, R, P, T, L>
where
    R: SlaveRegisters,
    P: OutputPin,
    T: DelayNs + MonotonicClock,
    L: Logger,
{
    /// `request_pin` is the active-low "host has data" line to the EC; it
    /// should be configured as an output, driven high.
    pub fn new(regs: R, request_pin: P, timer: T, config: EcConfig, logger: L) -> Self {
        Self {
            link: Coordinator::new(Transport::new(regs, request_pin, timer, config, logger)),
            registry: Registry::new(),
        }
    }

    /// # Errors
    ///
    /// See [`Registry::register`]. A rejected peripheral is never brought
    /// up.
    pub fn register_peripheral(
        &mut self,
        msg_type: impl Into<u8>,
        peripheral: &'a mut dyn Peripheral,
    ) -> Result<(), RegistryError> {
        let result = self.registry.register(msg_type.into(), peripheral);
        if let Err(e) = &result {
            self.log_error(format_args!("NVEC: {e}"));
        }
        result
    }

    /// Bring the link up.
    ///
    /// Drains whatever the EC has queued since reset and pings it. Then, as
    /// configured, turns on global event reporting, logs the firmware
    /// version and enables each system event source in `event_reporting`.
    /// Last, every registered peripheral is brought up in message-type
    /// order. Failures along the way are logged; start-up always runs to the
    /// end.
    pub fn start(&mut self) {
        if let Err(nb::Error::Other(e)) = self.link.receive(WaitMode::NonBlocking) {
            self.log_debug(format_args!("NVEC: initial flush: {e}"));
        }
        self.dispatch_pending();

        if let Err(e) = system::noop(&mut self.link) {
            self.log_error(format_args!("NVEC: noop failed: {e}"));
        }
        if self.link.transport().config().global_events {
            if let Err(e) = system::toggle_global_events(&mut self.link, true) {
                self.log_error(format_args!("NVEC: failed to enable global events: {e}"));
            }
        }
        match system::firmware_version(&mut self.link) {
            Ok(Some(version)) => {
                self.log_debug(format_args!("NVEC: firmware {:02x?}", version.payload()));
            }
            Ok(None) => self.log_debug(format_args!("NVEC: firmware version not reported")),
            Err(e) => self.log_error(format_args!("NVEC: failed to get firmware version: {e}")),
        }
        let reporting = self.link.transport().config().event_reporting;
        for source in (0..u32::BITS).map(|bit| 1u32 << bit) {
            if reporting & source == 0 {
                continue;
            }
            if let Err(e) = system::configure_event_reporting(&mut self.link, source, true) {
                self.log_error(format_args!("NVEC: event 0x{source:02x} not enabled: {e}"));
            }
        }
        self.dispatch_pending();

        for msg_type in 0..MESSAGE_TYPES as u8 {
            if let Some(peripheral) = self.registry.get_mut(msg_type) {
                peripheral.bring_up(&mut self.link);
                self.dispatch_pending();
            }
        }
        self.log_debug(format_args!("NVEC: initialized"));
    }

    /// Send `payload`, wait for the reply, then dispatch any events that
    /// arrived meanwhile.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::perform_request`].
    pub fn perform_request(&mut self, payload: &[u8]) -> Result<(), RequestError> {
        let result = self.link.perform_request(payload);
        self.dispatch_pending();
        result
    }

    /// Response frame to the last successful request, if it had one.
    pub fn take_response(&mut self) -> Option<Frame> {
        self.link.take_response()
    }

    /// Service EC-initiated traffic without blocking.
    ///
    /// Runs at most `max_event_reads` transactions, stopping at the first
    /// one that finds the EC idle or fails.
    pub fn poll_events(&mut self) {
        let reads = self.link.transport().config().max_event_reads;
        for _ in 0..reads {
            let outcome = self.link.receive(WaitMode::NonBlocking);
            self.dispatch_pending();
            match outcome {
                Ok(IoOutcome::ReadOk(_) | IoOutcome::Retry) => {}
                Ok(IoOutcome::WriteOk) => {
                    self.log_debug(format_args!("NVEC events: EC read without a request"));
                    break;
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    self.log_debug(format_args!("NVEC events: io failed: {e}"));
                    break;
                }
            }
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        self.link.transport().diagnostics()
    }

    pub fn coordinator(&mut self) -> &mut Coordinator<R, P, T, L> {
        &mut self.link
    }

    fn dispatch_pending(&mut self) {
        while let Some(frame) = self.link.next_event() {
            self.registry.dispatch(&frame);
        }
    }

    fn log_debug(&mut self, args: core::fmt::Arguments<'_>) {
        self.link.transport_mut().logger().debug(args);
    }

    fn log_error(&mut self, args: core::fmt::Arguments<'_>) {
        self.link.transport_mut().logger().error(args);
    }
}

impl<R, P, T, L> Requester for Nvec<'_, R, P, T, L>
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
        Nvec::take_response(self)
    }
}
