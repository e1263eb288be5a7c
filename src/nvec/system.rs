// Licensed under the Apache-2.0 license

//! System, sleep and control requests that are not tied to one peripheral.

use super::common::{control_cmd, sleep_cmd, system_cmd, MessageType, NOOP_REQUEST};
use super::coordinator::RequestError;
use super::frame::Frame;
use super::traits::Requester;

/// System event sources for [`configure_event_reporting`].
pub mod event {
    pub const LID_SWITCH: u32 = 0x02;
    pub const POWER_BUTTON: u32 = 0x80;
}

/// Ping the EC.
///
/// # Errors
///
/// Propagates the request failure.
pub fn noop<E: Requester + ?Sized>(ec: &mut E) -> Result<(), RequestError> {
    ec.request(&NOOP_REQUEST)
}

/// Turn EC-wide event reporting on or off.
///
/// # Errors
///
/// Propagates the request failure.
pub fn toggle_global_events<E: Requester + ?Sized>(
    ec: &mut E,
    enable: bool,
) -> Result<(), RequestError> {
    ec.request(&[
        MessageType::Sleep.into(),
        sleep_cmd::GLOBAL_EVENTS,
        u8::from(enable),
    ])
}

/// Enable or disable the system events in `mask` (see [`event`]).
///
/// # Errors
///
/// Propagates the request failure.
pub fn configure_event_reporting<E: Requester + ?Sized>(
    ec: &mut E,
    mask: u32,
    enable: bool,
) -> Result<(), RequestError> {
    let [b0, b1, b2, b3] = mask.to_le_bytes();
    // The EC takes the mask as two 16-bit halves, upper half first.
    ec.request(&[
        MessageType::System.into(),
        system_cmd::CNFG_EVENT_REPORTING,
        u8::from(enable),
        b2,
        b3,
        b0,
        b1,
    ])
}

/// Ask for the firmware version; the raw response frame is returned.
///
/// # Errors
///
/// Propagates the request failure.
pub fn firmware_version<E: Requester + ?Sized>(
    ec: &mut E,
) -> Result<Option<Frame>, RequestError> {
    ec.request(&[
        MessageType::Control.into(),
        control_cmd::GET_FIRMWARE_VERSION,
    ])?;
    Ok(ec.take_response())
}
