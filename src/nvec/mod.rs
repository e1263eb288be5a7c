// Licensed under the Apache-2.0 license

//! NVIDIA compliant embedded controller (NvEC) driver.
//!
//! The host sits on the I2C bus as a *slave* and the EC drives every
//! transaction as master. To talk, the host pulls a request GPIO low and
//! waits for the EC to come and read the queued frame; the EC then writes
//! its response back. Keyboard, power button and lid events arrive the same
//! way, unprompted, and are routed to the peripheral registered for their
//! message type.
//!
//! ```text
//! Nvec (engine) ─► Coordinator ─► Transport ─► SlaveRegisters
//!      │                                  └──► request pin (OutputPin)
//!      └─► Registry ─► Keyboard ─► KeyQueue ─► KeyReader
//! ```
//!
//! Everything here is polled; no interrupts are used.

pub mod common;
pub mod coordinator;
pub mod decoder;
pub mod engine;
pub mod frame;
pub mod keyboard;
pub mod keytable;
pub mod mmio;
pub mod registry;
pub mod system;
pub mod traits;
pub mod transport;

#[cfg(test)]
pub(crate) mod sim;

pub use common::{EcConfig, EcConfigBuilder, MessageType, WaitMode};
pub use coordinator::{Coordinator, FailureCounts, RequestError};
pub use engine::Nvec;
pub use frame::{Event, Frame, Header, SizeClass};
pub use keyboard::{KeyEvent, KeyQueue, KeyReader, Keyboard};
pub use registry::RegistryError;
pub use traits::{MonotonicClock, Peripheral, Requester, SlaveRegisters, SlaveStatus};
pub use transport::{IoOutcome, Transport, TransportError};
