// Licensed under the Apache-2.0 license

//! Memory-mapped Tegra I2C slave status/data registers.

use super::traits::{SlaveRegisters, SlaveStatus};
use core::ptr::{read_volatile, write_volatile};

const I2C_SL_RCVD: usize = 0x24;
const I2C_SL_STATUS: usize = 0x28;

/// Register pair of an I2C controller already configured in slave mode.
pub struct MmioSlaveRegisters {
    base: usize,
}

impl MmioSlaveRegisters {
    /// # Safety
    ///
    /// `base` must be the MMIO base of an I2C controller with the slave
    /// block at its usual offsets, and nothing else may access those
    /// registers while this value exists.
    #[must_use]
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn reg(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }
}

impl SlaveRegisters for MmioSlaveRegisters {
    fn status(&mut self) -> SlaveStatus {
        // SAFETY: address validity is guaranteed by the constructor contract.
        SlaveStatus(unsafe { read_volatile(self.reg(I2C_SL_STATUS)) })
    }

    fn read_data(&mut self) -> u8 {
        // SAFETY: as above.
        (unsafe { read_volatile(self.reg(I2C_SL_RCVD)) } & 0xff) as u8
    }

    fn write_data(&mut self, byte: u8) {
        // SAFETY: as above.
        unsafe { write_volatile(self.reg(I2C_SL_RCVD), u32::from(byte)) }
    }
}
