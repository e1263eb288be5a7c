// Licensed under the Apache-2.0 license

//! Peripheral registrations keyed by message type.

use super::decoder::{decode, Decoded};
use super::frame::Frame;
use super::traits::Peripheral;
use core::fmt;

/// One slot per possible 4-bit message type.
pub const MESSAGE_TYPES: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// A peripheral already owns this message type. The first registration
    /// stays in place.
    DuplicateRegistration { msg_type: u8 },
    /// Message types are four bits wide.
    InvalidMessageType { msg_type: u8 },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateRegistration { msg_type } => {
                write!(f, "message type {msg_type} already registered")
            }
            RegistryError::InvalidMessageType { msg_type } => {
                write!(f, "invalid message type {msg_type}")
            }
        }
    }
}

pub struct Registry<'a> {
    slots: [Option<&'a mut dyn Peripheral>; MESSAGE_TYPES],
}

impl Default for Registry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Registry<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// # Errors
    ///
    /// `InvalidMessageType` above 0x0f, `DuplicateRegistration` if the type
    /// is taken.
    pub fn register(
        &mut self,
        msg_type: impl Into<u8>,
        peripheral: &'a mut dyn Peripheral,
    ) -> Result<(), RegistryError> {
        let msg_type = msg_type.into();
        let slot = self
            .slots
            .get_mut(usize::from(msg_type))
            .ok_or(RegistryError::InvalidMessageType { msg_type })?;
        if slot.is_some() {
            return Err(RegistryError::DuplicateRegistration { msg_type });
        }
        *slot = Some(peripheral);
        Ok(())
    }

    #[must_use]
    pub fn is_registered(&self, msg_type: u8) -> bool {
        matches!(self.slots.get(usize::from(msg_type)), Some(Some(_)))
    }

    /// Peripheral registered for `msg_type`.
    pub fn get_mut(&mut self, msg_type: u8) -> Option<&mut (dyn Peripheral + 'a)> {
        self.slots
            .get_mut(usize::from(msg_type))
            .and_then(|slot| slot.as_deref_mut())
    }

    /// Hand an event frame to its peripheral.
    ///
    /// Returns `false` for responses and for event types nobody registered;
    /// neither is an error.
    pub fn dispatch(&mut self, frame: &Frame) -> bool {
        let Decoded::Event(event) = decode(frame) else {
            return false;
        };
        match self.get_mut(event.header.message_type()) {
            Some(peripheral) => {
                peripheral.handle_event(&event);
                true
            }
            None => false,
        }
    }
}
