pub const INTV_ADDR: u16 = 0xFFFE;
pub const RESV_ADDR: u16 = 0xFFFC;
pub const NMIV_ADDR: u16 = 0xFFFA;

pub const STACK_PAGE: u16 = 0x0100;
pub const STACK_TOP: u16 = 0x01FF;

// "The NTSC color subcarrier is 3.579545 MHz. Machine clocks are derived
// by integer division of that crystal."
pub const NTSC_CRYSTAL_FREQ: u64 = 3_579_545;

// Crystal / 3, the CPU clock of the NTSC 6507 machines.
pub const NTSC_DIV3_CLOCK: u64 = 1_193_181;

pub const NTSC_FRAME_RATE: u64 = 60;
