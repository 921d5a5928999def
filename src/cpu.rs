use core::fmt;

use bitflags::bitflags;
use log::{error, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::Bus;
use crate::consts::{INTV_ADDR, NMIV_ADDR, RESV_ADDR};
use crate::regs::{Registers, StatusFlags};

/// Lookup table for instruction length.
/// BRK (00) length includes the mark byte.
const INSTRUCTION_LENGTH: [u8; 256] = [
    //  0, 1, 2, 3, 4, 5, 6, 7, 8, 9, A, B, C, D, E, F  // (Low/High) Nibble
    2, 2, 0, 0, 0, 2, 2, 0, 1, 2, 1, 0, 0, 3, 3, 0, // 0
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0, // 1
    3, 2, 0, 0, 2, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0, // 2
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0, // 3
    1, 2, 0, 0, 0, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0, // 4
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0, // 5
    1, 2, 0, 0, 0, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0, // 6
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0, // 7
    0, 2, 0, 0, 2, 2, 2, 0, 1, 0, 1, 0, 3, 3, 3, 0, // 8
    2, 2, 0, 0, 2, 2, 2, 0, 1, 3, 1, 0, 0, 3, 0, 0, // 9
    2, 2, 2, 0, 2, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0, // A
    2, 2, 0, 0, 2, 2, 2, 0, 1, 3, 1, 0, 3, 3, 3, 0, // B
    2, 2, 0, 0, 2, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0, // C
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0, // D
    2, 2, 0, 0, 2, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0, // E
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0, // F
];

/// Lookup table for the base cycle count of an instruction.
const INSTRUCTION_CYCLES: [u8; 256] = [
    //  0, 1, 2, 3, 4, 5, 6, 7, 8, 9, A, B, C, D, E, F  // (Low/High) Nibble
    7, 6, 0, 0, 0, 3, 5, 0, 3, 2, 2, 0, 0, 4, 6, 0, // 0
    2, 5, 0, 0, 0, 4, 6, 0, 2, 4, 0, 0, 0, 4, 7, 0, // 1
    6, 6, 0, 0, 3, 3, 5, 0, 4, 2, 2, 0, 4, 4, 6, 0, // 2
    2, 5, 0, 0, 0, 4, 6, 0, 2, 4, 0, 0, 0, 4, 7, 0, // 3
    6, 6, 0, 0, 0, 3, 5, 0, 3, 2, 2, 0, 3, 4, 6, 0, // 4
    2, 5, 0, 0, 0, 4, 6, 0, 2, 4, 0, 0, 0, 4, 7, 0, // 5
    6, 6, 0, 0, 0, 3, 5, 0, 4, 2, 2, 0, 5, 4, 6, 0, // 6
    2, 5, 0, 0, 0, 4, 6, 0, 2, 4, 0, 0, 0, 4, 7, 0, // 7
    0, 6, 0, 0, 3, 3, 3, 0, 2, 0, 2, 0, 4, 4, 4, 0, // 8
    2, 6, 0, 0, 4, 4, 4, 0, 2, 5, 2, 0, 0, 5, 0, 0, // 9
    2, 6, 2, 0, 3, 3, 3, 0, 2, 2, 2, 0, 4, 4, 4, 0, // A
    2, 5, 0, 0, 4, 4, 4, 0, 2, 4, 2, 0, 4, 4, 4, 0, // B
    2, 6, 0, 0, 3, 3, 5, 0, 2, 2, 2, 0, 4, 4, 6, 0, // C
    2, 5, 0, 0, 4, 6, 6, 0, 2, 4, 0, 0, 0, 4, 7, 0, // D
    2, 2, 0, 0, 3, 3, 5, 0, 2, 2, 2, 0, 4, 4, 6, 0, // E
    2, 5, 0, 0, 0, 4, 6, 0, 2, 4, 0, 0, 0, 4, 7, 0, // F
];

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct IntRequests: u8 {
        const IRQ   = 0b00000001;
        const NMI   = 0b00000010;
        const RESET = 0b00000100;
    }
}

/// The one fatal failure the core raises. The CPU state after this error
/// is undefined; the instance should be discarded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("illegal instruction: 0x{opcode:02X}")]
pub struct IllegalInstruction {
    pub opcode: u8,
}

// Bit-field view of an opcode byte, keyed to the llx.com/Neil/a2 map:
// group selects the dispatch family, addr the addressing mode row.
#[derive(Copy, Clone, Default, Serialize, Deserialize)]
struct Opcode(u8);

impl Opcode {
    #[inline]
    fn byte(self) -> u8 {
        self.0
    }

    #[inline]
    fn group(self) -> u8 {
        self.0 & 0x03
    }

    #[inline]
    fn addr(self) -> u8 {
        (self.0 >> 2) & 0x07
    }

    #[inline]
    fn oper(self) -> u8 {
        (self.0 >> 5) & 0x07
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:02x} ({}:{}:{})",
            self.0,
            self.group(),
            self.addr(),
            self.oper()
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Operand {
    Accumulator,
    Immediate,
    Memory(MemoryMode),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MemoryMode {
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
}

/// Everything a savestate needs from the CPU. The bus is the host's to
/// save separately.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub regs: Registers,
    pub requests: IntRequests,
}

/// MOS Technology 6502 microprocessor.
///
/// Generic over the bus for compile-time dispatch on tight loops; hosts
/// that compose heterogeneous busses can instantiate `Cpu<Box<dyn Bus>>`
/// or share a bus through `Rc<RefCell<_>>` instead.
pub struct Cpu<B> {
    bus: B,
    regs: Registers,
    requests: IntRequests,
    opcode: Opcode,
    immediate8: u8,
    immediate16: u16,
    extra_cycles: u8,
}

impl<B: Bus> Cpu<B> {
    #[must_use]
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            regs: Registers::new(),
            requests: IntRequests::empty(),
            opcode: Opcode::default(),
            immediate8: 0,
            immediate16: 0,
            extra_cycles: 0,
        }
    }

    pub fn regs(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    #[must_use]
    pub fn into_bus(self) -> B {
        self.bus
    }

    #[must_use]
    pub fn snapshot(&self) -> CpuState {
        CpuState {
            regs: self.regs,
            requests: self.requests,
        }
    }

    pub fn restore(&mut self, state: &CpuState) {
        self.regs = state.regs;
        self.requests = state.requests;
    }

    /// Request a maskable interrupt. Latched; honoured before the next
    /// fetch if the I flag is clear, dropped otherwise.
    pub fn signal_irq(&mut self) {
        self.requests.insert(IntRequests::IRQ);
    }

    /// Request a non-maskable interrupt. Latched; honoured before the
    /// next fetch.
    pub fn signal_nmi(&mut self) {
        self.requests.insert(IntRequests::NMI);
    }

    /// Request a reset. Latched; before the next fetch, pc is loaded
    /// from the reset vector. sp and sr keep their values.
    pub fn signal_reset(&mut self) {
        self.requests.insert(IntRequests::RESET);
    }

    /// Execute one instruction and return the machine cycles it took.
    ///
    /// Pending interrupt requests are serviced first, so the fetched
    /// opcode is the handler's first instruction when one fires.
    pub fn step(&mut self) -> Result<u8, IllegalInstruction> {
        if !self.requests.is_empty() {
            self.service_interrupts();
        }

        self.opcode = Opcode(self.bus.read(self.regs.pc));
        self.immediate8 = self.bus.read(self.regs.pc.wrapping_add(1));
        self.immediate16 = u16::from(self.immediate8)
            | (u16::from(self.bus.read(self.regs.pc.wrapping_add(2))) << 8);
        self.extra_cycles = 0;

        let length = INSTRUCTION_LENGTH[self.opcode.byte() as usize];
        let cycles = INSTRUCTION_CYCLES[self.opcode.byte() as usize];
        if length == 0 || cycles == 0 {
            return Err(self.illegal());
        }

        trace!("[0x{:04x}] opcode {:?}", self.regs.pc, self.opcode);

        // Jumps, branches and interrupt returns overwrite pc afterwards;
        // relative branches offset from this post-length value.
        self.regs.pc = self.regs.pc.wrapping_add(u16::from(length));

        self.dispatch()?;
        Ok(cycles + self.extra_cycles)
    }

    fn dispatch(&mut self) -> Result<(), IllegalInstruction> {
        match self.opcode.byte() {
            0x61 | 0x65 | 0x69 | 0x6D | 0x71 | 0x75 | 0x79 | 0x7D => self.adc()?,
            0xE1 | 0xE5 | 0xE9 | 0xED | 0xF1 | 0xF5 | 0xF9 | 0xFD => self.sbc()?,

            0x21 | 0x25 | 0x29 | 0x2D | 0x31 | 0x35 | 0x39 | 0x3D => self.and()?,
            0x01 | 0x05 | 0x09 | 0x0D | 0x11 | 0x15 | 0x19 | 0x1D => self.ora()?,
            0x41 | 0x45 | 0x49 | 0x4D | 0x51 | 0x55 | 0x59 | 0x5D => self.eor()?,
            0x24 | 0x2C => self.bit()?,

            0xC1 | 0xC5 | 0xC9 | 0xCD | 0xD1 | 0xD5 | 0xD9 | 0xDD => self.cmp()?,
            0xE0 | 0xE4 | 0xEC => self.cpx()?,
            0xC0 | 0xC4 | 0xCC => self.cpy()?,

            0xC6 | 0xCE | 0xD6 | 0xDE => self.dec()?,
            0xE6 | 0xEE | 0xF6 | 0xFE => self.inc()?,
            0xCA => self.dex(),
            0x88 => self.dey(),
            0xE8 => self.inx(),
            0xC8 => self.iny(),

            0xA1 | 0xA5 | 0xA9 | 0xAD | 0xB1 | 0xB5 | 0xB9 | 0xBD => self.lda()?,
            0xA2 | 0xA6 | 0xB6 | 0xAE | 0xBE => self.ldx()?,
            0xA0 | 0xA4 | 0xAC | 0xB4 | 0xBC => self.ldy()?,

            0x81 | 0x85 | 0x8D | 0x91 | 0x95 | 0x99 | 0x9D => self.sta()?,
            0x86 | 0x8E | 0x96 => self.stx()?,
            0x84 | 0x8C | 0x94 => self.sty()?,

            0xAA => self.tax(),
            0xA8 => self.tay(),
            0xBA => self.tsx(),
            0x8A => self.txa(),
            0x9A => self.txs(),
            0x98 => self.tya(),

            0x06 | 0x0A | 0x0E | 0x16 | 0x1E => self.asl()?,
            0x46 | 0x4A | 0x4E | 0x56 | 0x5E => self.lsr()?,
            0x26 | 0x2A | 0x2E | 0x36 | 0x3E => self.rol()?,
            0x66 | 0x6A | 0x6E | 0x76 | 0x7E => self.ror()?,

            0x48 => self.pha(),
            0x08 => self.php(),
            0x68 => self.pla(),
            0x28 => self.plp(),

            0x20 => self.jsr(),
            0x60 => self.rts(),
            0x00 => self.brk(),
            0x40 => self.rti(),
            0x4C => self.jmp_abs(),
            0x6C => self.jmp_ind(),

            0x90 => self.bcc(),
            0xB0 => self.bcs(),
            0xF0 => self.beq(),
            0xD0 => self.bne(),
            0x30 => self.bmi(),
            0x10 => self.bpl(),
            0x50 => self.bvc(),
            0x70 => self.bvs(),

            0x18 => self.clc(),
            0xD8 => self.cld(),
            0x58 => self.cli(),
            0xB8 => self.clv(),
            0x38 => self.sec(),
            0xF8 => self.sed(),
            0x78 => self.sei(),
            0xEA => self.nop(),

            _ => return Err(self.illegal()),
        }
        Ok(())
    }

    fn illegal(&self) -> IllegalInstruction {
        let err = IllegalInstruction {
            opcode: self.opcode.byte(),
        };
        error!("{err}");
        err
    }

    fn service_interrupts(&mut self) {
        if self.requests.contains(IntRequests::RESET) {
            self.requests.remove(IntRequests::RESET);
            let handler = self.read_vector(RESV_ADDR);
            trace!("reset -> 0x{handler:04x}");
            // sp and sr keep their pre-reset values.
            self.regs.pc = handler;
        }
        if self.requests.contains(IntRequests::NMI) {
            self.requests.remove(IntRequests::NMI);
            self.interrupt(NMIV_ADDR, false);
        }
        if self.requests.contains(IntRequests::IRQ) {
            self.requests.remove(IntRequests::IRQ);
            if !self.regs.sr.contains(StatusFlags::I) {
                self.interrupt(INTV_ADDR, false);
            }
        }
    }

    fn interrupt(&mut self, vector: u16, software: bool) {
        let pc_lo = (self.regs.pc & 0x00FF) as u8;
        let pc_hi = (self.regs.pc >> 8) as u8;

        let handler = self.read_vector(vector);
        trace!("interrupt 0x{vector:04x} -> 0x{handler:04x}");

        // B is virtual: set only in the copy a BRK pushes.
        let mut status = self.regs.sr;
        status.set(StatusFlags::B, software);

        self.push(pc_hi);
        self.push(pc_lo);
        self.push(status.bits());

        self.regs.pc = handler;
        self.regs.sr.insert(StatusFlags::I);
    }

    fn read_vector(&mut self, addr: u16) -> u16 {
        let lo = self.bus.read(addr);
        let hi = self.bus.read(addr.wrapping_add(1));
        u16::from(lo) | (u16::from(hi) << 8)
    }

    // Post-decrement push, pre-increment pull; only the low byte of sp
    // moves, the high byte stays on the stack page.
    fn push(&mut self, data: u8) {
        self.bus.write(self.regs.sp, data);
        self.regs.sp = (self.regs.sp & 0xFF00) | (self.regs.sp.wrapping_sub(1) & 0x00FF);
    }

    fn pull(&mut self) -> u8 {
        self.regs.sp = (self.regs.sp & 0xFF00) | (self.regs.sp.wrapping_add(1) & 0x00FF);
        self.bus.read(self.regs.sp)
    }

    #[inline]
    fn set_nz(&mut self, value: u8) {
        self.regs.sr.set(StatusFlags::N, value >= 0x80);
        self.regs.sr.set(StatusFlags::Z, value == 0x00);
    }

    fn read_mode(&self) -> Result<Operand, IllegalInstruction> {
        use MemoryMode::*;

        let op = self.opcode;
        Ok(match (op.group(), op.addr()) {
            (1, 0) => Operand::Memory(IndirectX),
            (1, 1) => Operand::Memory(ZeroPage),
            (1, 2) => Operand::Immediate,
            (1, 3) => Operand::Memory(Absolute),
            (1, 4) => Operand::Memory(IndirectY),
            (1, 5) => Operand::Memory(ZeroPageX),
            (1, 6) => Operand::Memory(AbsoluteY),
            (1, 7) => Operand::Memory(AbsoluteX),

            (2, 0) => Operand::Immediate,
            (2, 1) => Operand::Memory(ZeroPage),
            (2, 2) if op.oper() < 4 => Operand::Accumulator,
            (2, 3) => Operand::Memory(Absolute),
            // STX and LDX index the zero page with Y instead of X.
            (2, 5) if op.oper() == 4 || op.oper() == 5 => Operand::Memory(ZeroPageY),
            (2, 5) => Operand::Memory(ZeroPageX),
            // LDX absolute is indexed with Y.
            (2, 7) if op.oper() == 5 => Operand::Memory(AbsoluteY),
            (2, 7) => Operand::Memory(AbsoluteX),

            (0, 0) => Operand::Immediate,
            (0, 1) => Operand::Memory(ZeroPage),
            (0, 3) => Operand::Memory(Absolute),
            (0, 5) => Operand::Memory(ZeroPageX),
            (0, 7) => Operand::Memory(AbsoluteX),

            _ => return Err(self.illegal()),
        })
    }

    fn write_mode(&self) -> Result<Operand, IllegalInstruction> {
        match self.read_mode()? {
            Operand::Immediate => Err(self.illegal()),
            mode => Ok(mode),
        }
    }

    fn operand_addr(&mut self, mode: MemoryMode) -> u16 {
        match mode {
            MemoryMode::ZeroPage => u16::from(self.immediate8),
            MemoryMode::ZeroPageX => u16::from(self.immediate8.wrapping_add(self.regs.xi)),
            MemoryMode::ZeroPageY => u16::from(self.immediate8.wrapping_add(self.regs.yi)),
            MemoryMode::Absolute => self.immediate16,
            MemoryMode::AbsoluteX => self.immediate16.wrapping_add(u16::from(self.regs.xi)),
            MemoryMode::AbsoluteY => self.immediate16.wrapping_add(u16::from(self.regs.yi)),
            MemoryMode::IndirectX => {
                let base = self.immediate8.wrapping_add(self.regs.xi);
                let lo = self.bus.read(u16::from(base));
                let hi = self.bus.read(u16::from(base.wrapping_add(1)));
                u16::from(lo) | (u16::from(hi) << 8)
            }
            MemoryMode::IndirectY => {
                let lo = self.bus.read(u16::from(self.immediate8));
                let hi = self.bus.read(u16::from(self.immediate8.wrapping_add(1)));
                (u16::from(lo) | (u16::from(hi) << 8)).wrapping_add(u16::from(self.regs.yi))
            }
        }
    }

    fn read_operand(&mut self) -> Result<u8, IllegalInstruction> {
        Ok(match self.read_mode()? {
            Operand::Accumulator => self.regs.ac,
            Operand::Immediate => self.immediate8,
            Operand::Memory(mode) => {
                let addr = self.operand_addr(mode);
                self.bus.read(addr)
            }
        })
    }

    fn write_operand(&mut self, data: u8) -> Result<(), IllegalInstruction> {
        match self.write_mode()? {
            Operand::Accumulator => self.regs.ac = data,
            Operand::Immediate => unreachable!("rejected by write_mode"),
            Operand::Memory(mode) => {
                let addr = self.operand_addr(mode);
                self.bus.write(addr, data);
            }
        }
        Ok(())
    }

    /// Add with carry. In decimal mode the binary result is adjusted a
    /// nibble at a time; V keeps the pre-adjustment binary overflow (the
    /// documented NMOS quirk), Z and N follow the adjusted value.
    fn adc(&mut self) -> Result<(), IllegalInstruction> {
        let acc = self.regs.ac;
        let mem = self.read_operand()?;
        let carry_in = u16::from(self.regs.sr.contains(StatusFlags::C));

        let sum = u16::from(acc) + u16::from(mem) + carry_in;
        let mut res = sum as u8;
        let mut carry = sum > 0x00FF;
        let overflow = (acc ^ res) & (mem ^ res) & 0x80 != 0;
        let mut negative = res >= 0x80;
        let mut zero = res == 0x00;

        if self.regs.sr.contains(StatusFlags::D) {
            let mut adjustment = 0u8;
            if res & 0x0F > 0x09 {
                adjustment += 0x06;
            }
            if res > 0x99 || carry {
                adjustment += 0x60;
                carry = true;
            }
            res = res.wrapping_add(adjustment);
            negative = res >= 0x80;
            zero = res == 0x00;
        }

        self.regs.ac = res;
        self.regs.sr.set(StatusFlags::C, carry);
        self.regs.sr.set(StatusFlags::N, negative);
        self.regs.sr.set(StatusFlags::V, overflow);
        self.regs.sr.set(StatusFlags::Z, zero);
        Ok(())
    }

    /// Subtract with carry: carry acts as inverted borrow-in and C comes
    /// back set when no borrow was taken. No decimal adjustment (known
    /// conformance gap with NMOS hardware).
    fn sbc(&mut self) -> Result<(), IllegalInstruction> {
        let acc = self.regs.ac;
        let mem = self.read_operand()?;
        let borrow = 1 - u16::from(self.regs.sr.contains(StatusFlags::C));

        let diff = u16::from(acc)
            .wrapping_sub(u16::from(mem))
            .wrapping_sub(borrow);
        let res = diff as u8;
        let overflow = (acc ^ mem) & (acc ^ res) & 0x80 != 0;

        self.regs.ac = res;
        self.regs.sr.set(StatusFlags::C, diff & 0xFF00 == 0);
        self.regs.sr.set(StatusFlags::V, overflow);
        self.set_nz(res);
        Ok(())
    }

    fn and(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.regs.ac & self.read_operand()?;
        self.regs.ac = res;
        self.set_nz(res);
        Ok(())
    }

    fn ora(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.regs.ac | self.read_operand()?;
        self.regs.ac = res;
        self.set_nz(res);
        Ok(())
    }

    fn eor(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.regs.ac ^ self.read_operand()?;
        self.regs.ac = res;
        self.set_nz(res);
        Ok(())
    }

    // N and V come straight from the memory operand, only Z looks at
    // the AND result.
    fn bit(&mut self) -> Result<(), IllegalInstruction> {
        let mem = self.read_operand()?;
        let zero = self.regs.ac & mem == 0;
        let bits = (self.regs.sr.bits() & 0x3D) | (mem & 0xC0) | (u8::from(zero) << 1);
        self.regs.sr = StatusFlags::from_bits_retain(bits);
        Ok(())
    }

    fn compare(&mut self, reg: u8) -> Result<(), IllegalInstruction> {
        let mem = self.read_operand()?;
        let diff = u16::from(reg).wrapping_sub(u16::from(mem));
        self.regs.sr.set(StatusFlags::C, diff & 0xFF00 == 0);
        self.set_nz(diff as u8);
        Ok(())
    }

    fn cmp(&mut self) -> Result<(), IllegalInstruction> {
        let reg = self.regs.ac;
        self.compare(reg)
    }

    fn cpx(&mut self) -> Result<(), IllegalInstruction> {
        let reg = self.regs.xi;
        self.compare(reg)
    }

    fn cpy(&mut self) -> Result<(), IllegalInstruction> {
        let reg = self.regs.yi;
        self.compare(reg)
    }

    fn dec(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.read_operand()?.wrapping_sub(1);
        self.set_nz(res);
        self.write_operand(res)
    }

    fn inc(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.read_operand()?.wrapping_add(1);
        self.set_nz(res);
        self.write_operand(res)
    }

    fn dex(&mut self) {
        self.regs.xi = self.regs.xi.wrapping_sub(1);
        let res = self.regs.xi;
        self.set_nz(res);
    }

    fn dey(&mut self) {
        self.regs.yi = self.regs.yi.wrapping_sub(1);
        let res = self.regs.yi;
        self.set_nz(res);
    }

    fn inx(&mut self) {
        self.regs.xi = self.regs.xi.wrapping_add(1);
        let res = self.regs.xi;
        self.set_nz(res);
    }

    fn iny(&mut self) {
        self.regs.yi = self.regs.yi.wrapping_add(1);
        let res = self.regs.yi;
        self.set_nz(res);
    }

    fn lda(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.read_operand()?;
        self.regs.ac = res;
        self.set_nz(res);
        Ok(())
    }

    fn ldx(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.read_operand()?;
        self.regs.xi = res;
        self.set_nz(res);
        Ok(())
    }

    fn ldy(&mut self) -> Result<(), IllegalInstruction> {
        let res = self.read_operand()?;
        self.regs.yi = res;
        self.set_nz(res);
        Ok(())
    }

    fn sta(&mut self) -> Result<(), IllegalInstruction> {
        let data = self.regs.ac;
        self.write_operand(data)
    }

    fn stx(&mut self) -> Result<(), IllegalInstruction> {
        let data = self.regs.xi;
        self.write_operand(data)
    }

    fn sty(&mut self) -> Result<(), IllegalInstruction> {
        let data = self.regs.yi;
        self.write_operand(data)
    }

    fn tax(&mut self) {
        self.regs.xi = self.regs.ac;
        let res = self.regs.xi;
        self.set_nz(res);
    }

    fn tay(&mut self) {
        self.regs.yi = self.regs.ac;
        let res = self.regs.yi;
        self.set_nz(res);
    }

    fn tsx(&mut self) {
        self.regs.xi = (self.regs.sp & 0x00FF) as u8;
        let res = self.regs.xi;
        self.set_nz(res);
    }

    fn txa(&mut self) {
        self.regs.ac = self.regs.xi;
        let res = self.regs.ac;
        self.set_nz(res);
    }

    // Updates N,Z from X like the other transfers; real hardware leaves
    // the flags alone on TXS.
    fn txs(&mut self) {
        self.regs.sp = (self.regs.sp & 0xFF00) | u16::from(self.regs.xi);
        let res = self.regs.xi;
        self.set_nz(res);
    }

    fn tya(&mut self) {
        self.regs.ac = self.regs.yi;
        let res = self.regs.ac;
        self.set_nz(res);
    }

    fn asl(&mut self) -> Result<(), IllegalInstruction> {
        let mem = self.read_operand()?;
        let res = mem << 1;
        self.regs.sr.set(StatusFlags::C, mem >= 0x80);
        self.set_nz(res);
        self.write_operand(res)
    }

    fn lsr(&mut self) -> Result<(), IllegalInstruction> {
        let mem = self.read_operand()?;
        let res = mem >> 1;
        self.regs.sr.set(StatusFlags::C, mem & 0x01 != 0);
        self.set_nz(res);
        self.write_operand(res)
    }

    fn rol(&mut self) -> Result<(), IllegalInstruction> {
        let mem = self.read_operand()?;
        let carry_in = u8::from(self.regs.sr.contains(StatusFlags::C));
        let res = (mem << 1) | carry_in;
        self.regs.sr.set(StatusFlags::C, mem >> 7 != 0);
        self.set_nz(res);
        self.write_operand(res)
    }

    fn ror(&mut self) -> Result<(), IllegalInstruction> {
        let mem = self.read_operand()?;
        let carry_in = if self.regs.sr.contains(StatusFlags::C) {
            0x80
        } else {
            0x00
        };
        let res = (mem >> 1) | carry_in;
        self.regs.sr.set(StatusFlags::C, mem & 0x01 != 0);
        self.set_nz(res);
        self.write_operand(res)
    }

    fn pha(&mut self) {
        let data = self.regs.ac;
        self.push(data);
    }

    fn php(&mut self) {
        let data = self.regs.sr.bits();
        self.push(data);
    }

    fn pla(&mut self) {
        let res = self.pull();
        self.regs.ac = res;
        self.set_nz(res);
    }

    // U and B stay whatever they were; only the other six bits come off
    // the stack.
    fn plp(&mut self) {
        let pulled = self.pull();
        self.regs.sr = StatusFlags::from_bits_retain((pulled & 0xCF) | (self.regs.sr.bits() & 0x30));
    }

    fn jsr(&mut self) {
        let pc_lo = (self.regs.pc & 0x00FF) as u8;
        let pc_hi = (self.regs.pc >> 8) as u8;
        self.push(pc_hi);
        self.push(pc_lo);
        self.regs.pc = self.immediate16;
    }

    fn rts(&mut self) {
        let pc_lo = self.pull();
        let pc_hi = self.pull();
        self.regs.pc = u16::from(pc_lo) | (u16::from(pc_hi) << 8);
    }

    // Software interrupt through the IRQ vector, B set in the pushed
    // status. The length table already advanced pc past the mark byte.
    fn brk(&mut self) {
        self.interrupt(INTV_ADDR, true);
    }

    // Unlike RTS, no pc adjustment on the way out.
    fn rti(&mut self) {
        self.plp();
        self.rts();
    }

    fn jmp_abs(&mut self) {
        self.regs.pc = self.immediate16;
    }

    // The second pointer byte comes from operand+1 with 16-bit
    // arithmetic; the NMOS page-wrap bug is not modelled.
    fn jmp_ind(&mut self) {
        let pc_lo = self.bus.read(self.immediate16);
        let pc_hi = self.bus.read(self.immediate16.wrapping_add(1));
        self.regs.pc = u16::from(pc_lo) | (u16::from(pc_hi) << 8);
    }

    fn jmp_rel(&mut self) {
        self.regs.pc = self
            .regs
            .pc
            .wrapping_add(i16::from(self.immediate8 as i8) as u16);
    }

    fn branch(&mut self, flag: StatusFlags, taken_when_set: bool) {
        if self.regs.sr.contains(flag) == taken_when_set {
            self.jmp_rel();
        }
    }

    fn bcc(&mut self) {
        self.branch(StatusFlags::C, false);
    }

    fn bcs(&mut self) {
        self.branch(StatusFlags::C, true);
    }

    fn beq(&mut self) {
        self.branch(StatusFlags::Z, true);
    }

    fn bne(&mut self) {
        self.branch(StatusFlags::Z, false);
    }

    fn bmi(&mut self) {
        self.branch(StatusFlags::N, true);
    }

    fn bpl(&mut self) {
        self.branch(StatusFlags::N, false);
    }

    fn bvs(&mut self) {
        self.branch(StatusFlags::V, true);
    }

    fn bvc(&mut self) {
        self.branch(StatusFlags::V, false);
    }

    fn clc(&mut self) {
        self.regs.sr.remove(StatusFlags::C);
    }

    fn cld(&mut self) {
        self.regs.sr.remove(StatusFlags::D);
    }

    fn cli(&mut self) {
        self.regs.sr.remove(StatusFlags::I);
    }

    fn clv(&mut self) {
        self.regs.sr.remove(StatusFlags::V);
    }

    fn sec(&mut self) {
        self.regs.sr.insert(StatusFlags::C);
    }

    fn sed(&mut self) {
        self.regs.sr.insert(StatusFlags::D);
    }

    fn sei(&mut self) {
        self.regs.sr.insert(StatusFlags::I);
    }

    fn nop(&mut self) {}
}

impl<B> fmt::Debug for Cpu<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ regs:{:?} requests:{:?} opcode:{:?} imm8:0x{:02x} imm16:0x{:04x} }}",
            self.regs, self.requests, self.opcode, self.immediate8, self.immediate16
        )
    }
}
