// Licensed under the Apache-2.0 license

//! Response/event classification of received frames.

use super::frame::{Event, Frame};

/// Where a received frame belongs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decoded<'f> {
    /// Reply to the request just issued; goes back to its caller.
    Response,
    /// Unsolicited event, routed by `event.header.message_type()`.
    Event(Event<'f>),
}

#[must_use]
pub fn decode(frame: &Frame) -> Decoded<'_> {
    if frame.header().is_event() {
        Decoded::Event(Event::new(frame))
    } else {
        Decoded::Response
    }
}
