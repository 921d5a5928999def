use core::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::consts::STACK_TOP;

bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusFlags: u8 {
        const N = 0b10000000; // 80
        const V = 0b01000000; // 40
        const U = 0b00100000; // 20
        const B = 0b00010000; // 10
        const D = 0b00001000; // 08
        const I = 0b00000100; // 04
        const Z = 0b00000010; // 02
        const C = 0b00000001; // 01
    }
}

impl Default for StatusFlags {
    fn default() -> StatusFlags {
        StatusFlags::U | StatusFlags::B
    }
}

impl fmt::Debug for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, flag) in [
            ("N", StatusFlags::N),
            ("V", StatusFlags::V),
            ("U", StatusFlags::U),
            ("B", StatusFlags::B),
            ("D", StatusFlags::D),
            ("I", StatusFlags::I),
            ("Z", StatusFlags::Z),
            ("C", StatusFlags::C),
        ] {
            write!(f, "{}", if self.contains(flag) { name } else { "-" })?;
        }
        Ok(())
    }
}

/// The 6502 register file. `sp` is a full 16-bit value whose high byte
/// stays locked to 0x01; only the low byte moves on push/pull.
#[derive(Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub ac: u8,
    pub xi: u8,
    pub yi: u8,
    pub sr: StatusFlags,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ac: 0,
            xi: 0,
            yi: 0,
            sr: StatusFlags::default(),
            sp: STACK_TOP,
            pc: 0,
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Registers::new()
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ ac:0x{:02x} xi:0x{:02x} yi:0x{:02x} sr:{:?} sp:0x{:04x} pc:0x{:04x} }}",
            self.ac, self.xi, self.yi, self.sr, self.sp, self.pc
        )
    }
}
