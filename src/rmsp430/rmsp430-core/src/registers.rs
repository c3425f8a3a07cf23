use crate::constants::registers::*;
use crate::constants::status::*;
use bitflags::bitflags;

bitflags! {
    /// Decomposed view of the status register (R2)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u16 {
        const C = 1 << SR_C;
        const Z = 1 << SR_Z;
        const N = 1 << SR_N;
        const GIE = 1 << SR_GIE;
        const CPUOFF = 1 << SR_CPUOFF;
        const OSCOFF = 1 << SR_OSCOFF;
        const SCG0 = 1 << SR_SCG0;
        const SCG1 = 1 << SR_SCG1;
        const V = 1 << SR_V;
    }
}

impl Status {
    /// Arithmetic flags owned by ALU results
    pub const ARITHMETIC: Status = Status::C.union(Status::Z).union(Status::N).union(Status::V);
}

/// Byte lane of a register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Low,
    High,
}

/// The sixteen CPU registers
///
/// Every cell carries 20 bits so MSP430X address instructions can use the full
/// address range. The plain accessors expose the 16-bit view used by the base
/// instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    registers: [u32; REGISTER_MAX],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTER_MAX],
        }
    }

    /// Clears every register; the CPU reloads PC from the reset vector afterwards
    pub fn reset(&mut self) {
        self.registers = [0; REGISTER_MAX];
    }

    #[inline(always)]
    fn check(reg: usize) {
        assert!(reg < REGISTER_MAX, "register index {} out of range", reg);
    }

    /// Low 16 bits of a register
    pub fn read(&self, reg: usize) -> u16 {
        Self::check(reg);
        (self.registers[reg] & 0xFFFF) as u16
    }

    /// Full 20-bit register value
    pub fn read_a(&self, reg: usize) -> u32 {
        Self::check(reg);
        self.registers[reg]
    }

    /// Word write, bits 19:16 are cleared
    pub fn write(&mut self, reg: usize, value: u16) {
        self.write_a(reg, value as u32);
    }

    /// 20-bit write with the per-register masking rules applied
    pub fn write_a(&mut self, reg: usize, value: u32) {
        Self::check(reg);
        let value = value & REGISTER_MASK;
        match reg {
            // Word aligned, bit 0 is dropped rather than rejected
            REGISTER_PC | REGISTER_SP => self.registers[reg] = value & !1,
            REGISTER_SR => self.registers[reg] = value & SR_MASK as u32,
            // Constant generator, stores have no effect
            REGISTER_CG => {}
            _ => self.registers[reg] = value,
        }
    }

    pub fn read_byte(&self, reg: usize, half: Half) -> u8 {
        let value = self.read(reg);
        match half {
            Half::Low => (value & 0xFF) as u8,
            Half::High => (value >> 8) as u8,
        }
    }

    /// Byte write into a register
    ///
    /// The low lane follows byte-instruction semantics: the register is
    /// zero-extended and the previous upper bits are lost. The high lane replaces
    /// bits 15:8 and keeps the low byte.
    pub fn write_byte(&mut self, reg: usize, half: Half, value: u8) {
        match half {
            Half::Low => self.write_a(reg, value as u32),
            Half::High => {
                let low = self.read(reg) & 0x00FF;
                self.write(reg, low | (value as u16) << 8);
            }
        }
    }

    pub fn pc(&self) -> u32 {
        self.registers[REGISTER_PC]
    }

    pub fn set_pc(&mut self, addr: u32) {
        self.write_a(REGISTER_PC, addr);
    }

    pub fn increment_pc(&mut self, by: u32) {
        let next = self.pc().wrapping_add(by);
        self.set_pc(next);
    }

    pub fn sp(&self) -> u32 {
        self.registers[REGISTER_SP]
    }

    pub fn set_sp(&mut self, addr: u32) {
        self.write_a(REGISTER_SP, addr);
    }

    pub fn sr(&self) -> u16 {
        self.read(REGISTER_SR)
    }

    pub fn set_sr(&mut self, value: u16) {
        self.write(REGISTER_SR, value);
    }

    pub fn status(&self) -> Status {
        Status::from_bits_truncate(self.sr())
    }

    pub fn set_status(&mut self, status: Status) {
        self.set_sr(status.bits());
    }

    #[inline(always)]
    pub fn flag(&self, bit: u8) -> bool {
        self.sr() & (1 << bit) != 0
    }

    #[inline(always)]
    pub fn set_flag(&mut self, bit: u8, v: bool) {
        let sr = self.sr();
        if v {
            self.set_sr(sr | 1 << bit);
        } else {
            self.set_sr(sr & !(1 << bit));
        }
    }

    /// Replaces C, Z, N and V in one go, leaving the control bits untouched
    pub fn set_arithmetic(&mut self, c: bool, z: bool, n: bool, v: bool) {
        let mut status = self.status() - Status::ARITHMETIC;
        status.set(Status::C, c);
        status.set(Status::Z, z);
        status.set(Status::N, n);
        status.set(Status::V, v);
        self.set_status(status);
    }

    pub fn carry(&self) -> bool {
        self.flag(SR_C)
    }

    pub fn zero(&self) -> bool {
        self.flag(SR_Z)
    }

    pub fn negative(&self) -> bool {
        self.flag(SR_N)
    }

    pub fn overflow(&self) -> bool {
        self.flag(SR_V)
    }

    pub fn gie(&self) -> bool {
        self.flag(SR_GIE)
    }

    pub fn cpu_off(&self) -> bool {
        self.flag(SR_CPUOFF)
    }

    /// Copy of all register cells, for inspection
    pub fn to_array(&self) -> [u32; REGISTER_MAX] {
        self.registers
    }
}

#[cfg(test)]
mod register_tests {
    use super::*;

    #[test]
    fn pc_drops_bit_zero() {
        let mut regs = RegisterFile::new();
        regs.set_pc(0x8001);
        assert_eq!(regs.pc(), 0x8000);

        regs.write(REGISTER_PC, 0xC0DF);
        assert_eq!(regs.read(REGISTER_PC), 0xC0DE);
    }

    #[test]
    fn increment_pc_stays_even_and_wraps() {
        let mut regs = RegisterFile::new();
        regs.set_pc(0x8000);
        regs.increment_pc(4);
        assert_eq!(regs.pc(), 0x8004);
        regs.increment_pc(3);
        assert_eq!(regs.pc(), 0x8006);

        regs.set_pc(0xFFFE);
        regs.increment_pc(2);
        assert_eq!(regs.pc(), 0x1_0000);

        regs.set_pc(0xF_FFFE);
        regs.increment_pc(2);
        assert_eq!(regs.pc(), 0);
    }

    #[test]
    fn set_flag_touches_one_bit() {
        let mut regs = RegisterFile::new();
        regs.set_flag(SR_GIE, true);
        regs.set_flag(SR_C, true);
        assert_eq!(regs.status(), Status::GIE | Status::C);
        assert!(regs.flag(SR_GIE));

        regs.set_flag(SR_C, false);
        assert_eq!(regs.status(), Status::GIE);

        // Reserved bits stay clear
        regs.set_flag(12, true);
        assert_eq!(regs.sr() & !SR_MASK, 0);
        assert_eq!(regs.status(), Status::GIE);
    }

    #[test]
    fn sp_drops_bit_zero() {
        let mut regs = RegisterFile::new();
        regs.set_sp(0x2FFF);
        assert_eq!(regs.sp(), 0x2FFE);

        regs.write_byte(REGISTER_SP, Half::Low, 0x35);
        assert_eq!(regs.sp(), 0x0034);
    }

    #[test]
    fn byte_write_zero_extends() {
        let mut regs = RegisterFile::new();
        regs.write(5, 0x1234);
        regs.write_byte(5, Half::Low, 0xAB);
        assert_eq!(regs.read(5), 0x00AB);

        regs.write_a(6, 0xF_FFFF);
        regs.write_byte(6, Half::Low, 0xAB);
        assert_eq!(regs.read_a(6), 0x000AB);
    }

    #[test]
    fn high_byte_write_keeps_low_byte() {
        let mut regs = RegisterFile::new();
        regs.write(7, 0x1234);
        regs.write_byte(7, Half::High, 0xAB);
        assert_eq!(regs.read(7), 0xAB34);
        assert_eq!(regs.read_byte(7, Half::High), 0xAB);
        assert_eq!(regs.read_byte(7, Half::Low), 0x34);
    }

    #[test]
    fn word_write_clears_upper_bits() {
        let mut regs = RegisterFile::new();
        regs.write_a(9, 0x5_4321);
        assert_eq!(regs.read(9), 0x4321);
        regs.write(9, 0x1111);
        assert_eq!(regs.read_a(9), 0x1111);
    }

    #[test]
    fn status_reserved_bits_read_zero() {
        let mut regs = RegisterFile::new();
        regs.set_sr(0xFFFF);
        assert_eq!(regs.sr(), SR_MASK);
        assert!(regs.status().contains(Status::V | Status::GIE | Status::C));
    }

    #[test]
    fn constant_generator_ignores_writes() {
        let mut regs = RegisterFile::new();
        regs.write(REGISTER_CG, 0x5555);
        assert_eq!(regs.read(REGISTER_CG), 0);
    }

    #[test]
    fn arithmetic_flags_leave_control_bits() {
        let mut regs = RegisterFile::new();
        regs.set_status(Status::GIE | Status::CPUOFF | Status::C);
        regs.set_arithmetic(false, true, true, true);
        assert_eq!(
            regs.status(),
            Status::GIE | Status::CPUOFF | Status::Z | Status::N | Status::V
        );
        assert!(!regs.carry());
        assert!(regs.zero() && regs.negative() && regs.overflow());
        assert!(regs.gie() && regs.cpu_off());
    }

    #[test]
    #[should_panic]
    fn out_of_range_register_panics() {
        let regs = RegisterFile::new();
        regs.read(16);
    }
}
