// Licensed under the Apache-2.0 license

//! EC scan codes to Linux input key codes.
//!
//! Row 0 covers two-byte events (PS/2 set 1 make codes), row 1 three-byte
//! events (the `E0`-prefixed set). Codes without a key map to 0.

pub const TABLE_LEN: usize = 128;

pub mod key {
    pub const RESERVED: u16 = 0;
    pub const ESC: u16 = 1;
    pub const A: u16 = 30;
    pub const GRAVE: u16 = 41;
    pub const KPDOT: u16 = 83;
    pub const KEY_102ND: u16 = 86;
    pub const F11: u16 = 87;
    pub const F12: u16 = 88;
    pub const KPENTER: u16 = 96;
    pub const RIGHTCTRL: u16 = 97;
    pub const KPSLASH: u16 = 98;
    pub const SYSRQ: u16 = 99;
    pub const RIGHTALT: u16 = 100;
    pub const HOME: u16 = 102;
    pub const UP: u16 = 103;
    pub const PAGEUP: u16 = 104;
    pub const LEFT: u16 = 105;
    pub const RIGHT: u16 = 106;
    pub const END: u16 = 107;
    pub const DOWN: u16 = 108;
    pub const PAGEDOWN: u16 = 109;
    pub const INSERT: u16 = 110;
    pub const DELETE: u16 = 111;
    pub const MUTE: u16 = 113;
    pub const VOLUMEDOWN: u16 = 114;
    pub const VOLUMEUP: u16 = 115;
    pub const POWER: u16 = 116;
    pub const LEFTMETA: u16 = 125;
    pub const RIGHTMETA: u16 = 126;
    pub const COMPOSE: u16 = 127;
    pub const SLEEP: u16 = 142;
    pub const WAKEUP: u16 = 143;
    pub const NEXTSONG: u16 = 163;
    pub const PLAYPAUSE: u16 = 164;
    pub const PREVIOUSSONG: u16 = 165;
    pub const STOPCD: u16 = 166;
}

// Out-of-range indices here fail the build, not the firmware.
#[allow(clippy::indexing_slicing)]
const fn base_set() -> [u16; TABLE_LEN] {
    let mut table = [key::RESERVED; TABLE_LEN];
    // Set 1 make codes 0x01..=0x53 coincide with the Linux key codes.
    let mut code = 1;
    while code <= key::KPDOT as usize {
        table[code] = code as u16;
        code += 1;
    }
    table[0x00] = key::GRAVE;
    table[0x54] = key::SYSRQ;
    table[0x56] = key::KEY_102ND;
    table[0x57] = key::F11;
    table[0x58] = key::F12;
    table
}

#[allow(clippy::indexing_slicing)]
const fn extended_set() -> [u16; TABLE_LEN] {
    let mut table = [key::RESERVED; TABLE_LEN];
    table[0x10] = key::PREVIOUSSONG;
    table[0x19] = key::NEXTSONG;
    table[0x1c] = key::KPENTER;
    table[0x1d] = key::RIGHTCTRL;
    table[0x20] = key::MUTE;
    table[0x22] = key::PLAYPAUSE;
    table[0x24] = key::STOPCD;
    table[0x2e] = key::VOLUMEDOWN;
    table[0x30] = key::VOLUMEUP;
    table[0x35] = key::KPSLASH;
    table[0x37] = key::SYSRQ;
    table[0x38] = key::RIGHTALT;
    table[0x47] = key::HOME;
    table[0x48] = key::UP;
    table[0x49] = key::PAGEUP;
    table[0x4b] = key::LEFT;
    table[0x4d] = key::RIGHT;
    table[0x4f] = key::END;
    table[0x50] = key::DOWN;
    table[0x51] = key::PAGEDOWN;
    table[0x52] = key::INSERT;
    table[0x53] = key::DELETE;
    table[0x5b] = key::LEFTMETA;
    table[0x5c] = key::RIGHTMETA;
    table[0x5d] = key::COMPOSE;
    table[0x5e] = key::POWER;
    table[0x5f] = key::SLEEP;
    table[0x63] = key::WAKEUP;
    table
}

/// Indexed by size-class row, then by 7-bit scan code.
pub static KEYTABLE: [[u16; TABLE_LEN]; 2] = [base_set(), extended_set()];

/// Key code for `scancode` in table `row`, or `None` if either is out of
/// range.
#[must_use]
pub fn lookup(row: usize, scancode: u8) -> Option<u16> {
    KEYTABLE
        .get(row)
        .and_then(|table| table.get(usize::from(scancode)))
        .copied()
}
