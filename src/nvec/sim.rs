// Licensed under the Apache-2.0 license

//! Scripted hardware doubles for the unit tests.
//!
//! Every double is a cheap handle around shared state, so a test can keep a
//! clone to inspect after handing the other one to the driver.

use super::common::status::{END_TRANS, IRQ, RCVD, RNW};
use super::frame::Event;
use super::traits::{
    Instant, MonotonicClock, Peripheral, Requester, SlaveRegisters, SlaveStatus,
};
use crate::common::Logger;
use core::cell::{Cell, RefCell};
use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use std::collections::VecDeque;
use std::rc::Rc;

pub const ADDR: u8 = 0x8a;

/// One status poll: the status word and, optionally, a new data register
/// value. `None` leaves the last byte in the register.
pub type Step = (u32, Option<u8>);

/// A poll that finds the EC idle.
pub const IDLE: Step = (0, None);

/// Steps for an EC write of `frame`. The stop is reported together with the
/// last byte, so the host receives exactly `frame`.
pub fn ec_writes(addr: u8, frame: &[u8]) -> Vec<Step> {
    let mut steps = vec![(IRQ | RCVD, Some(addr))];
    match frame.split_last() {
        Some((last, body)) => {
            steps.extend(body.iter().map(|b| (IRQ, Some(*b))));
            steps.push((IRQ | END_TRANS, Some(*last)));
        }
        None => steps.push((IRQ | END_TRANS, None)),
    }
    steps
}

/// Steps for an EC read of a queued request of `len` bytes.
pub fn ec_reads(addr: u8, len: usize) -> Vec<Step> {
    let mut steps = vec![
        (IRQ | RCVD, Some(addr)),
        (IRQ, Some(0x01)),
        (IRQ | RNW | RCVD, None),
    ];
    steps.extend(core::iter::repeat((IRQ | RNW, None)).take(len));
    steps.push((IRQ | END_TRANS, None));
    steps
}

/// Roughly `ms` of idle polls at the default poll interval: enough for one
/// blocking transaction of that timeout to give up.
pub fn silence(ms: usize) -> Vec<Step> {
    vec![IDLE; ms * 10]
}

/// A full request/response exchange.
pub fn exchange(addr: u8, request_len: usize, response: &[u8]) -> Vec<Step> {
    let mut steps = ec_reads(addr, request_len);
    steps.extend(ec_writes(addr, response));
    steps
}

#[derive(Default)]
struct BusState {
    steps: VecDeque<Step>,
    data: u8,
    written: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct SimBus(Rc<RefCell<BusState>>);

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, steps: &[Step]) {
        self.0.borrow_mut().steps.extend(steps.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn remaining(&self) -> usize {
        self.0.borrow().steps.len()
    }
}

impl SlaveRegisters for SimBus {
    fn status(&mut self) -> SlaveStatus {
        let mut state = self.0.borrow_mut();
        match state.steps.pop_front() {
            Some((status, data)) => {
                if let Some(data) = data {
                    state.data = data;
                }
                SlaveStatus(status)
            }
            None => SlaveStatus(0),
        }
    }

    fn read_data(&mut self) -> u8 {
        self.0.borrow().data
    }

    fn write_data(&mut self, byte: u8) {
        self.0.borrow_mut().written.push(byte);
    }
}

/// Time only moves when the driver delays.
#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns));
    }
}

impl MonotonicClock for SimClock {
    fn now(&mut self) -> Instant {
        Instant::from_ticks(self.elapsed_ms() as u32)
    }
}

#[derive(Default)]
struct PinState {
    levels: Vec<bool>,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct SimPin(Rc<RefCell<PinState>>);

impl SimPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.0.borrow_mut().fail = fail;
    }

    /// Successfully driven levels, `true` for high.
    pub fn levels(&self) -> Vec<bool> {
        self.0.borrow().levels.clone()
    }

    fn drive(&self, high: bool) -> Result<(), ErrorKind> {
        let mut state = self.0.borrow_mut();
        if state.fail {
            return Err(ErrorKind::Other);
        }
        state.levels.push(high);
        Ok(())
    }
}

impl ErrorType for SimPin {
    type Error = ErrorKind;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

#[derive(Clone, Default)]
pub struct SimLogger(Rc<RefCell<Vec<String>>>);

impl SimLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.borrow().iter().any(|line| line.contains(needle))
    }
}

impl Logger for SimLogger {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.0.borrow_mut().push(format!("debug: {args}"));
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.0.borrow_mut().push(format!("error: {args}"));
    }
}

/// Records what the engine does to it.
#[derive(Default)]
pub struct RecordingPeripheral {
    pub id: u8,
    /// Sent during bring-up, if set.
    pub bring_up_request: Option<Vec<u8>>,
    /// Shared between peripherals to observe bring-up order.
    pub order: Rc<RefCell<Vec<u8>>>,
    pub bring_up_results: Vec<bool>,
    /// Header byte followed by payload, per event.
    pub events: Vec<Vec<u8>>,
}

impl RecordingPeripheral {
    pub fn new(id: u8, order: Rc<RefCell<Vec<u8>>>) -> Self {
        Self {
            id,
            order,
            ..Self::default()
        }
    }
}

impl Peripheral for RecordingPeripheral {
    fn bring_up(&mut self, ec: &mut dyn Requester) {
        self.order.borrow_mut().push(self.id);
        if let Some(request) = self.bring_up_request.clone() {
            self.bring_up_results.push(ec.request(&request).is_ok());
        }
    }

    fn handle_event(&mut self, event: &Event<'_>) {
        let mut bytes = vec![event.header.raw()];
        bytes.extend_from_slice(event.payload);
        self.events.push(bytes);
    }
}
