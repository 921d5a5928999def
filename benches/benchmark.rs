use criterion::{criterion_group, criterion_main, Criterion};

use mos6502::bus::Bus;
use mos6502::clock::{ClockSync, SyncPrecision};
use mos6502::cpu::Cpu;

// Answers every read with the same opcode so step() runs the same
// instruction forever.
struct ConstantBus(u8);

impl Bus for ConstantBus {
    fn read(&mut self, _addr: u16) -> u8 {
        self.0
    }

    fn write(&mut self, _addr: u16, _data: u8) {}
}

fn criterion_benchmark_cpu(c: &mut Criterion) {
    for (name, opcode) in [
        ("cpu step nop", 0xEAu8),
        ("cpu step adc imm", 0x69),
        ("cpu step lda abs", 0xAD),
        ("cpu step sta izx", 0x81),
    ] {
        let mut cpu = Cpu::new(ConstantBus(opcode));
        c.bench_function(name, |b| b.iter(|| cpu.step().unwrap()));
    }
}

fn criterion_benchmark_clock(c: &mut Criterion) {
    // A frame budget far beyond what the bench feeds keeps the pacing
    // branch cold and measures pure accounting.
    let mut sync = ClockSync::new(u32::MAX as u64, 1, SyncPrecision::High);
    c.bench_function("clock elapse", |b| b.iter(|| sync.elapse(7)));
}

criterion_group!(benches, criterion_benchmark_cpu, criterion_benchmark_clock);
criterion_main!(benches);
