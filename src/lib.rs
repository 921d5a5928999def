//! Instruction-level MOS 6502 emulator with a real-time clock
//! synchronizer. The CPU executes one instruction per [`cpu::Cpu::step`]
//! against any [`bus::Bus`] and reports the machine cycles it consumed;
//! [`clock::ClockSync`] paces those cycles against the wall clock so the
//! emulated machine runs at its original speed.

pub mod bus;
pub mod clock;
pub mod consts;
pub mod cpu;
pub mod ram;
pub mod regs;

pub fn serialize(state: &cpu::CpuState, data: &mut [u8]) -> Result<(), &'static str> {
    match postcard::to_slice(state, data) {
        Err(_) => Err("Serialization error."),
        Ok(_) => Ok(()),
    }
}

pub fn deserialize(data: &[u8]) -> Result<cpu::CpuState, &'static str> {
    match postcard::from_bytes::<cpu::CpuState>(data) {
        Err(_) => Err("Deserialization error"),
        Ok(state) => Ok(state),
    }
}

pub const fn info() -> (&'static str, &'static str) {
    (env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
