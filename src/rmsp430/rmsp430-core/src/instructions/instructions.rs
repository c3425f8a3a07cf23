use super::{Instruction, Mnemonic, OperandSize};
use crate::constants::registers::*;
use crate::constants::ADDRESS_MASK;
use crate::cpu::{Cpu, Location, Operands};
use crate::error::AccessFault;
use crate::registers::Status;
use crate::utils::bcd_add;
use log::debug;

type ExecResult = Result<(), AccessFault>;

// Binary addition at the operand width, returns result, carry and overflow
fn add_with_carry(a: u32, b: u32, carry: bool, size: OperandSize) -> (u32, bool, bool) {
    let mask = size.mask();
    let sum = (a & mask) + (b & mask) + carry as u32;
    let result = sum & mask;
    let overflow = (a ^ result) & (b ^ result) & size.msb() != 0;
    (result, sum > mask, overflow)
}

fn is_negative(value: u32, size: OperandSize) -> bool {
    value & size.msb() != 0
}

/// Arithmetic operations (ADD, ADDC, SUB, SUBC, CMP, DADD, SXT)
pub trait Arithmetic {
    fn add(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn addc(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn sub(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn subc(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn cmp(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn dadd(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // Decimal add with carry
    fn sxt(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // Sign extend byte
}

impl<'a> Cpu<'a> {
    /// Shared ADD/SUB data path; subtraction adds the one's complement of the source
    fn alu_add(
        &mut self,
        i: &Instruction,
        ops: &Operands,
        subtract: bool,
        use_carry: bool,
        write: bool,
    ) -> ExecResult {
        let size = i.size;
        let src = self.load(ops.src, size)?;
        let dst = self.load(ops.dst, size)?;

        let carry = if use_carry { self.carry_in(i) } else { subtract };
        let src = if subtract { !src & size.mask() } else { src };
        let (result, c, v) = add_with_carry(src, dst, carry, size);

        if write {
            self.store(ops.dst, size, result)?;
        }
        // Flags land after the result so an SR destination ends up with them
        self.regs
            .set_arithmetic(c, result == 0, is_negative(result, size), v);
        Ok(())
    }
}

impl<'a> Arithmetic for Cpu<'a> {
    fn add(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, false, false, true)
    }

    fn addc(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, false, true, true)
    }

    fn sub(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, true, false, true)
    }

    fn subc(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, true, true, true)
    }

    fn cmp(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, true, false, false)
    }

    fn dadd(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let size = i.size;
        let src = self.load(ops.src, size)?;
        let dst = self.load(ops.dst, size)?;
        let carry = self.carry_in(i);

        let (result, c) = bcd_add(src, dst, carry, size.bits() / 4);
        self.store(ops.dst, size, result)?;

        // V is left as it was
        let v = self.regs.overflow();
        self.regs
            .set_arithmetic(c, result == 0, is_negative(result, size), v);
        Ok(())
    }

    fn sxt(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let size = i.size;
        let value = self.load(ops.dst, size)? & 0xFF;
        let extended = if value & 0x80 != 0 {
            value | (ADDRESS_MASK & !0xFF)
        } else {
            value
        };
        let result = extended & size.mask();

        match ops.dst {
            // Register destinations are extended through bit 19
            Location::Register(reg) => self.regs.write_a(reg, extended),
            dst => self.store(dst, size, result)?,
        }

        let z = result == 0;
        self.regs
            .set_arithmetic(!z, z, is_negative(result, size), false);
        Ok(())
    }
}

/// Logical, bit and rotate operations
pub trait Logic {
    fn and(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn bit(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // AND without writeback
    fn bic(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // Clear bits
    fn bis(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // Set bits
    fn xor(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn rrc(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // Rotate right through carry
    fn rra(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // Arithmetic shift right
    fn swpb(&mut self, i: &Instruction, ops: &Operands) -> ExecResult; // Swap bytes
}

impl<'a> Cpu<'a> {
    /// Flags of AND and BIC: Z and N follow the result, C and V are kept
    ///
    /// With SR as the destination the written value stands, so CLRC, CLRZ,
    /// CLRN and DINT only touch their own bit.
    fn zero_negative_flags(&mut self, dst: Location, result: u32, size: OperandSize) {
        if dst == Location::Register(REGISTER_SR) {
            return;
        }
        let mut status = self.regs.status();
        status.set(Status::Z, result & size.mask() == 0);
        status.set(Status::N, is_negative(result, size));
        self.regs.set_status(status);
    }

    /// Flags of BIT and XOR: C is the inverse of Z
    fn logic_flags(&mut self, result: u32, size: OperandSize, v: bool) {
        let z = result == 0;
        self.regs
            .set_arithmetic(!z, z, is_negative(result, size), v);
    }

    /// Shift/rotate result flags: C takes the bit shifted out, V is cleared
    fn shift_flags(&mut self, result: u32, size: OperandSize, carry: bool) {
        self.regs
            .set_arithmetic(carry, result == 0, is_negative(result, size), false);
    }
}

impl<'a> Logic for Cpu<'a> {
    fn and(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let result = self.load(ops.src, i.size)? & self.load(ops.dst, i.size)?;
        self.store(ops.dst, i.size, result)?;
        self.zero_negative_flags(ops.dst, result, i.size);
        Ok(())
    }

    fn bit(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let result = self.load(ops.src, i.size)? & self.load(ops.dst, i.size)?;
        self.logic_flags(result, i.size, false);
        Ok(())
    }

    fn bic(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let src = self.load(ops.src, i.size)?;
        let dst = self.load(ops.dst, i.size)?;
        let result = dst & !src & i.size.mask();
        self.store(ops.dst, i.size, result)?;
        self.zero_negative_flags(ops.dst, result, i.size);
        Ok(())
    }

    fn bis(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let src = self.load(ops.src, i.size)?;
        let dst = self.load(ops.dst, i.size)?;
        self.store(ops.dst, i.size, dst | src)
    }

    fn xor(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let src = self.load(ops.src, i.size)?;
        let dst = self.load(ops.dst, i.size)?;
        let result = src ^ dst;
        self.store(ops.dst, i.size, result)?;
        let v = is_negative(src, i.size) && is_negative(dst, i.size);
        self.logic_flags(result, i.size, v);
        Ok(())
    }

    fn rrc(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let size = i.size;
        let value = self.load(ops.dst, size)?;
        let carry = self.carry_in(i);
        let result = (value >> 1) | if carry { size.msb() } else { 0 };
        self.store(ops.dst, size, result)?;
        self.shift_flags(result, size, value & 1 != 0);
        Ok(())
    }

    fn rra(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let size = i.size;
        let value = self.load(ops.dst, size)?;
        let result = (value >> 1) | (value & size.msb());
        self.store(ops.dst, size, result)?;
        self.shift_flags(result, size, value & 1 != 0);
        Ok(())
    }

    fn swpb(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let value = self.load(ops.dst, i.size)?;
        // Bits 19:16 of SWPBX.A are cleared
        let result = ((value & 0xFF) << 8) | ((value >> 8) & 0xFF);
        self.store(ops.dst, i.size, result)
    }
}

/// Data movement and stack operations
pub trait DataMovement {
    fn mov(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn push(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
}

impl<'a> DataMovement for Cpu<'a> {
    fn mov(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let value = self.load(ops.src, i.size)?;
        self.store(ops.dst, i.size, value)
    }

    fn push(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let value = self.load(ops.src, i.size)?;
        match i.size {
            OperandSize::Byte => {
                // Byte pushes still move SP by a full word
                let sp = self.regs.sp().wrapping_sub(2);
                self.regs.set_sp(sp);
                self.stage_write_byte(sp, value as u8)
            }
            OperandSize::Word => self.push_word(value as u16),
            OperandSize::Address => self.push_addr(value),
        }
    }
}

/// Jumps and subroutine calls
pub trait ControlFlow {
    fn jump(&mut self, i: &Instruction) -> ExecResult;
    fn call(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
}

impl<'a> ControlFlow for Cpu<'a> {
    fn jump(&mut self, i: &Instruction) -> ExecResult {
        let n = self.regs.negative();
        let v = self.regs.overflow();
        let taken = match i.mnem {
            Mnemonic::JNE => !self.regs.zero(),
            Mnemonic::JEQ => self.regs.zero(),
            Mnemonic::JNC => !self.regs.carry(),
            Mnemonic::JC => self.regs.carry(),
            Mnemonic::JN => n,
            Mnemonic::JGE => n == v,
            Mnemonic::JL => n != v,
            _ => true,
        };
        if taken {
            let target = (i.pc + 2) as i64 + 2 * i.offset as i64;
            self.regs.set_pc(target as u32 & ADDRESS_MASK);
        }
        Ok(())
    }

    fn call(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let target = self.load(ops.src, OperandSize::Word)?;
        self.push_word(i.next_pc() as u16)?;
        self.regs.set_pc(target);
        Ok(())
    }
}

/// Return from interrupt
pub trait Interrupt {
    fn reti(&mut self, i: &Instruction) -> ExecResult;
}

impl<'a> Interrupt for Cpu<'a> {
    fn reti(&mut self, _i: &Instruction) -> ExecResult {
        let sr = self.pop_word()?;
        let pc_lo = self.pop_word()? as u32;
        // The stacked SR word carries PC bits 19:16 in bits 15:12
        let pc = ((sr as u32 & 0xF000) << 4) | pc_lo;
        self.regs.set_sr(sr);
        self.regs.set_pc(pc);
        debug!("RETI to 0x{:05x}, SR = 0x{:03x}", pc, self.regs.sr());
        Ok(())
    }
}

/// MSP430X address-word and multi-register instructions
pub trait Address {
    fn mova(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn adda(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn suba(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn cmpa(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn calla(&mut self, i: &Instruction, ops: &Operands) -> ExecResult;
    fn pushm(&mut self, i: &Instruction) -> ExecResult;
    fn popm(&mut self, i: &Instruction) -> ExecResult;
    fn rotate_multiple(&mut self, i: &Instruction) -> ExecResult; // RRCM, RRAM, RLAM, RRUM
}

impl<'a> Address for Cpu<'a> {
    fn mova(&mut self, _i: &Instruction, ops: &Operands) -> ExecResult {
        let value = self.load(ops.src, OperandSize::Address)?;
        self.store(ops.dst, OperandSize::Address, value)
    }

    fn adda(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, false, false, true)
    }

    fn suba(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, true, false, true)
    }

    fn cmpa(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        self.alu_add(i, ops, true, false, false)
    }

    fn calla(&mut self, i: &Instruction, ops: &Operands) -> ExecResult {
        let target = self.load(ops.src, OperandSize::Address)?;
        self.push_addr(i.next_pc())?;
        self.regs.set_pc(target);
        Ok(())
    }

    fn pushm(&mut self, i: &Instruction) -> ExecResult {
        let top = i.get_register_operand();
        for k in 0..i.count as usize {
            let reg = top - k;
            match i.size {
                OperandSize::Address => self.push_addr(self.regs.read_a(reg))?,
                _ => self.push_word(self.regs.read(reg))?,
            }
        }
        Ok(())
    }

    fn popm(&mut self, i: &Instruction) -> ExecResult {
        let n = i.count as usize;
        let lowest = i.get_register_operand() + 1 - n;
        for reg in lowest..lowest + n {
            match i.size {
                OperandSize::Address => {
                    let value = self.pop_addr()?;
                    self.regs.write_a(reg, value);
                }
                _ => {
                    let value = self.pop_word()?;
                    self.regs.write(reg, value);
                }
            }
        }
        Ok(())
    }

    fn rotate_multiple(&mut self, i: &Instruction) -> ExecResult {
        let size = i.size;
        let reg = i.get_register_operand();
        let mut value = self.regs.read_a(reg) & size.mask();
        let mut carry = self.regs.carry();

        for _ in 0..i.count {
            let (next, out) = match i.mnem {
                Mnemonic::RRCM => (
                    (value >> 1) | if carry { size.msb() } else { 0 },
                    value & 1 != 0,
                ),
                Mnemonic::RRAM => ((value >> 1) | (value & size.msb()), value & 1 != 0),
                Mnemonic::RLAM => ((value << 1) & size.mask(), value & size.msb() != 0),
                _ => (value >> 1, value & 1 != 0),
            };
            value = next;
            carry = out;
        }

        match size {
            OperandSize::Address => self.regs.write_a(reg, value),
            _ => self.regs.write(reg, value as u16),
        }
        self.shift_flags(value, size, carry);
        Ok(())
    }
}

impl Instruction {
    /// Register of a register-mode destination, R0 when there is none
    pub(crate) fn get_register_operand(&self) -> usize {
        self.dst
            .and_then(|op| op.register())
            .unwrap_or(REGISTER_PC)
    }
}




#[cfg(test)]
mod control_flow_tests {
    use crate::instructions::tests::{init_cpu, run, STACK_TOP};
    use crate::registers::Status;

    #[test]
    fn jeq_not_taken_advances_by_two() {
        // CLRZ is implied by reset; JEQ +8
        let mut cpu = init_cpu(&[0x2408]);
        let cycles = run(&mut cpu, 1);
        assert_eq!(cpu.pc(), 0x8002);
        assert_eq!(cycles, 2);
    }

    #[test]
    fn jump_taken_is_relative_to_next_word() {
        // SETZ (BIS #2, SR); JEQ +3
        let mut cpu = init_cpu(&[0xD322, 0x2403]);
        run(&mut cpu, 2);
        assert_eq!(cpu.pc(), 0x8004 + 6);
    }

    #[test]
    fn jmp_self_loops() {
        let mut cpu = init_cpu(&[0x3FFF]);
        run(&mut cpu, 3);
        assert_eq!(cpu.pc(), 0x8000);
    }

    #[test]
    fn signed_jumps() {
        // BIS #N, SR; JL +1 taken because N != V
        let mut cpu = init_cpu(&[0xD222, 0x3801]);
        run(&mut cpu, 2);
        assert_eq!(cpu.pc(), 0x8006);
        assert!(cpu.status().contains(Status::N));

        // JGE with N = V = 0
        let mut cpu = init_cpu(&[0x3401]);
        run(&mut cpu, 1);
        assert_eq!(cpu.pc(), 0x8004);
    }

    #[test]
    fn call_and_ret() {
        // 0x8000: CALL #0x8008; 0x8004: JMP $; 0x8006: NOP; 0x8008: MOV #7, R5; RET
        let mut cpu = init_cpu(&[0x12B0, 0x8008, 0x3FFF, 0x4303, 0x4035, 0x0007, 0x4130]);
        run(&mut cpu, 1);
        assert_eq!(cpu.pc(), 0x8008);
        assert_eq!(cpu.sp(), STACK_TOP - 2);
        run(&mut cpu, 2);
        assert_eq!(cpu.pc(), 0x8004);
        assert_eq!(cpu.sp(), STACK_TOP);
        assert_eq!(cpu.registers().read(5), 7);
    }
}

#[cfg(test)]
mod address_tests {
    use crate::constants::registers::*;
    use crate::instructions::tests::{init_cpu, run, STACK_TOP};
    use crate::registers::Status;

    #[test]
    fn mova_immediate_and_adda() {
        // MOVA #0x1FFFF, R5; ADDA #1, R5
        let mut cpu = init_cpu(&[0x0185, 0xFFFF, 0x00A5, 0x0001]);
        run(&mut cpu, 2);
        assert_eq!(cpu.registers().read_a(5), 0x2_0000);
        assert!(!cpu.status().contains(Status::C));
    }

    #[test]
    fn suba_and_cmpa_flags() {
        // MOVA #0x10000, R5; SUBA #1, R5; CMPA #0xFFFF, R5
        let mut cpu = init_cpu(&[0x0185, 0x0000, 0x00B5, 0x0001, 0x0095, 0xFFFF]);
        run(&mut cpu, 2);
        assert_eq!(cpu.registers().read_a(5), 0xFFFF);
        run(&mut cpu, 1);
        assert!(cpu.status().contains(Status::Z | Status::C));
    }

    #[test]
    fn calla_and_reta() {
        // 0x8000: CALLA #0x08008; 0x8004: JMP $; 0x8006: NOP; 0x8008: RETA
        let mut cpu = init_cpu(&[0x13B0, 0x8008, 0x3FFF, 0x4303, 0x0110]);
        run(&mut cpu, 1);
        assert_eq!(cpu.pc(), 0x8008);
        assert_eq!(cpu.sp(), STACK_TOP - 4);
        let mut stacked = [0u8; 4];
        cpu.read_memory(STACK_TOP - 4, &mut stacked).unwrap();
        assert_eq!(stacked, [0x04, 0x80, 0x00, 0x00]);
        run(&mut cpu, 1);
        assert_eq!(cpu.pc(), 0x8004);
        assert_eq!(cpu.sp(), STACK_TOP);
    }

    #[test]
    fn pushm_popm_round_trip() {
        // MOV #1, R8; MOV #2, R9; MOV #3, R10; PUSHM.W #3, R10;
        // CLR R8; CLR R9; CLR R10; POPM.W #3, R10
        let mut cpu = init_cpu(&[
            0x4318, 0x4329, 0x403A, 0x0003, 0x152A, 0x4308, 0x4309, 0x430A, 0x1728,
        ]);
        run(&mut cpu, 4);
        assert_eq!(cpu.sp(), STACK_TOP - 6);
        // R10 is pushed first, R8 ends up on top
        let mut top = [0u8; 2];
        cpu.read_memory(STACK_TOP - 6, &mut top).unwrap();
        assert_eq!(top, [0x01, 0x00]);
        run(&mut cpu, 4);
        assert_eq!(cpu.registers().read(8), 1);
        assert_eq!(cpu.registers().read(9), 2);
        assert_eq!(cpu.registers().read(10), 3);
        assert_eq!(cpu.sp(), STACK_TOP);
    }

    #[test]
    fn pushm_address_keeps_upper_bits() {
        // MOVA #0x54321, R4; PUSHM.A #1, R4; POPM.A #1, R5
        let mut cpu = init_cpu(&[0x0584, 0x4321, 0x1404, 0x1605]);
        run(&mut cpu, 3);
        assert_eq!(cpu.registers().read_a(5), 0x5_4321);
        assert_eq!(cpu.sp(), STACK_TOP);
    }

    #[test]
    fn rotate_multiple() {
        // MOV #0x4001, R7; RLAM.W #2, R7
        let mut cpu = init_cpu(&[0x4037, 0x4001, 0x0657]);
        run(&mut cpu, 2);
        assert_eq!(cpu.registers().read(7), 0x0004);
        assert!(cpu.status().contains(Status::C));

        // MOV #0x8000, R7; RRAM.W #3, R7
        let mut cpu = init_cpu(&[0x4037, 0x8000, 0x0957]);
        run(&mut cpu, 2);
        assert_eq!(cpu.registers().read(7), 0xF000);

        // RRUM.W #1, R7 with the sign bit set
        let mut cpu = init_cpu(&[0x4037, 0x8000, 0x0357]);
        run(&mut cpu, 2);
        assert_eq!(cpu.registers().read(7), 0x4000);
        assert!(!cpu.status().contains(Status::N));
    }

    #[test]
    fn extended_repeat_shifts() {
        // MOV #1, R5; RPT #4 ADDX.W R5, R5
        let mut cpu = init_cpu(&[0x4315, 0x1843, 0x5505]);
        let cycles = run(&mut cpu, 2);
        assert_eq!(cpu.registers().read(5), 0x0010);
        // 1 cycle for MOV, n + 1 for the repeated add
        assert_eq!(cycles, 1 + 5);
    }

    #[test]
    fn rrux_clears_carry_in() {
        // SETC; MOV #0x8000, R6; RRUX.W R6
        let mut cpu = init_cpu(&[0xD312, 0x4036, 0x8000, 0x1940, 0x1006]);
        run(&mut cpu, 3);
        assert_eq!(cpu.registers().read(6), 0x4000);
        assert!(!cpu.status().contains(Status::C));
    }

    #[test]
    fn movx_address_immediate() {
        // MOVX.A #0x12345, R5
        let mut cpu = init_cpu(&[0x1880, 0x4075, 0x2345]);
        run(&mut cpu, 1);
        assert_eq!(cpu.registers().read_a(5), 0x1_2345);
        assert_eq!(cpu.pc(), 0x8006);
        assert_eq!(cpu.registers().read(REGISTER_SP) as u32, STACK_TOP);
    }
}
