use core::sync::atomic::{AtomicBool, Ordering};

use crate::constants::limits::MAX_PENDING_WRITES;
use crate::constants::registers::*;
use crate::constants::timing::*;
use crate::constants::vectors::VECTOR_RESET;
use crate::cycles::instruction_cycles;
use crate::decoder::decode;
use crate::error::{AccessFault, AttachError, Fault};
use crate::instructions::{Address, Arithmetic, ControlFlow, DataMovement, Interrupt, Logic};
use crate::instructions::{Format, Instruction, Mnemonic, OperandSize, Repeat};
use crate::interrupts::{InterruptController, InterruptRequest};
use crate::memory::periph::Peripheral;
use crate::memory::MemoryMap;
use crate::operands::{autoincrement, indexed_address, Operand};
use crate::registers::{Half, RegisterFile, Status};
use log::{debug, trace, warn};

/// Where the CPU is inside a step
///
/// Steps are atomic to callers, so outside `step` the CPU is only ever seen
/// `Idle` or `Halted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Decoding,
    ResolvingOperands,
    Executing,
    WritingBack,
    InterruptEntry,
    Halted,
}

impl Stage {
    fn can_enter(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (*self, next),
            (Idle, Fetching)
                | (Fetching, Decoding)
                | (Decoding, ResolvingOperands)
                | (ResolvingOperands, Executing)
                | (Executing, WritingBack)
                | (WritingBack, Idle)
                | (Idle, InterruptEntry)
                | (Halted, InterruptEntry)
                | (InterruptEntry, Idle)
                | (Idle, Halted)
                | (Halted, Idle)
                // Faults abandon the step from wherever it got to
                | (Fetching, Idle)
                | (Decoding, Idle)
                | (ResolvingOperands, Idle)
                | (Executing, Idle)
        )
    }
}

/// What a step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Executed { pc: u32, mnem: Mnemonic },
    Interrupt { vector: u32 },
    Reset,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub cycles: u32,
    pub event: StepEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: u64,
    pub cycles: u64,
    pub reason: StopReason,
}

/// Operand after effective address resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    None,
    Register(usize),
    Memory(u32),
    Value(u32),
}

/// Resolved source and destination of the instruction being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    pub src: Location,
    pub dst: Location,
}

/// Memory write held back until the step commits
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    addr: u32,
    value: u16,
    word: bool,
}

impl PendingWrite {
    fn byte_at(&self, addr: u32) -> Option<u8> {
        let [lo, hi] = self.value.to_le_bytes();
        match (self.word, addr.wrapping_sub(self.addr)) {
            (_, 0) => Some(lo),
            (true, 1) => Some(hi),
            _ => None,
        }
    }
}

/// Struct representing the CPU and its state
pub struct Cpu<'a> {
    mem: MemoryMap<'a>,               // Memory map and attached devices
    pub(crate) regs: RegisterFile,    // R0-R15
    interrupts: InterruptController,  // Pending requests
    journal: heapless::Vec<PendingWrite, MAX_PENDING_WRITES>,
    stage: Stage,
    total_cycles: u64,
    instructions_retired: u64,
}

impl<'a> Cpu<'a> {
    /// Creates a CPU over `memmap` and applies a power-on reset
    pub fn new(memmap: MemoryMap<'a>) -> Cpu<'a> {
        let mut cpu = Cpu {
            mem: memmap,
            regs: RegisterFile::new(),
            interrupts: InterruptController::new(),
            journal: heapless::Vec::new(),
            stage: Stage::Idle,
            total_cycles: 0,
            instructions_retired: 0,
        };

        cpu.reset();
        cpu
    }

    /// Reset to the startup state, PC is loaded from the reset vector
    pub fn reset(&mut self) {
        self.mem.reset();
        self.regs.reset();
        self.interrupts.clear();
        self.journal.clear();
        self.stage = Stage::Idle;
        self.total_cycles = 0;
        self.instructions_retired = 0;

        match self.mem.read_word(VECTOR_RESET) {
            Ok(pc) => self.regs.set_pc(pc as u32),
            Err(e) => warn!("Unable to read reset vector: {}", e),
        }
        debug!("CPU reset, PC = 0x{:05x}", self.regs.pc());
    }

    fn transition(&mut self, next: Stage) {
        assert!(
            self.stage.can_enter(next),
            "illegal stage transition {:?} -> {:?}",
            self.stage,
            next
        );
        self.stage = next;
    }

    // Loader and device setup

    /// Copies an image into memory ignoring write protection
    pub fn write_block(&mut self, start: u32, bytes: &[u8]) -> Result<(), AccessFault> {
        self.mem.write_block(start, bytes)
    }

    pub fn attach(
        &mut self,
        start: u32,
        len: u32,
        dev: &'a mut dyn Peripheral,
    ) -> Result<(), AttachError> {
        self.mem.attach(start, len, dev)
    }

    /// Debugger poke of a register, applies the usual register masking
    pub fn set_register(&mut self, reg: usize, value: u32) {
        self.regs.write_a(reg, value);
    }

    // Inspection

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn snapshot(&self) -> RegisterFile {
        self.regs
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc()
    }

    pub fn sp(&self) -> u32 {
        self.regs.sp()
    }

    pub fn status(&self) -> Status {
        self.regs.status()
    }

    pub fn read_memory(&self, start: u32, buf: &mut [u8]) -> Result<(), AccessFault> {
        self.mem.read_block(start, buf)
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn instructions_retired(&self) -> u64 {
        self.instructions_retired
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_halted(&self) -> bool {
        self.stage == Stage::Halted
    }

    pub fn pending_interrupts(&self) -> &[InterruptRequest] {
        self.interrupts.pending()
    }

    /// Queues an interrupt request, served between instructions
    pub fn raise_interrupt(&mut self, vector: u32, priority: u8) {
        self.interrupts.raise(InterruptRequest::new(vector, priority));
    }

    // Memory access during a step. Reads see writes staged earlier in the
    // same step, writes are validated when staged and applied on commit.

    fn overlay(&self, addr: u32, byte: u8) -> u8 {
        self.journal
            .iter()
            .rev()
            .find_map(|w| w.byte_at(addr))
            .unwrap_or(byte)
    }

    pub(crate) fn read_byte(&self, addr: u32) -> Result<u8, AccessFault> {
        let byte = self.mem.read_byte(addr)?;
        Ok(self.overlay(addr, byte))
    }

    pub(crate) fn read_word(&self, addr: u32) -> Result<u16, AccessFault> {
        let [lo, hi] = self.mem.read_word(addr)?.to_le_bytes();
        Ok(u16::from_le_bytes([
            self.overlay(addr, lo),
            self.overlay(addr + 1, hi),
        ]))
    }

    pub(crate) fn read_addr(&self, addr: u32) -> Result<u32, AccessFault> {
        let lo = self.read_word(addr)? as u32;
        let hi = self.read_word(addr + 2)? as u32;
        Ok((hi & 0xF) << 16 | lo)
    }

    fn stage_write(&mut self, write: PendingWrite) {
        if self.journal.push(write).is_err() {
            panic!("write journal overflow at 0x{:05x}", write.addr);
        }
    }

    pub(crate) fn stage_write_byte(&mut self, addr: u32, value: u8) -> Result<(), AccessFault> {
        self.mem.check_write(addr, 1)?;
        self.stage_write(PendingWrite {
            addr,
            value: value as u16,
            word: false,
        });
        Ok(())
    }

    pub(crate) fn stage_write_word(&mut self, addr: u32, value: u16) -> Result<(), AccessFault> {
        self.mem.check_write(addr, 2)?;
        self.stage_write(PendingWrite {
            addr,
            value,
            word: true,
        });
        Ok(())
    }

    pub(crate) fn stage_write_addr(&mut self, addr: u32, value: u32) -> Result<(), AccessFault> {
        self.mem.check_write(addr, 4)?;
        self.stage_write_word(addr, value as u16)?;
        self.stage_write_word(addr + 2, ((value >> 16) & 0xF) as u16)
    }

    fn commit(&mut self) -> Result<(), AccessFault> {
        for w in self.journal.iter() {
            if w.word {
                self.mem.write_word(w.addr, w.value)?;
            } else {
                self.mem.write_byte(w.addr, w.value as u8)?;
            }
        }
        self.journal.clear();
        Ok(())
    }

    // Stack

    pub(crate) fn push_word(&mut self, value: u16) -> Result<(), AccessFault> {
        let sp = self.regs.sp().wrapping_sub(2);
        self.regs.set_sp(sp);
        self.stage_write_word(sp, value)
    }

    /// Pushes a 20-bit value as two words, bits 19:16 at the higher address
    pub(crate) fn push_addr(&mut self, value: u32) -> Result<(), AccessFault> {
        let sp = self.regs.sp().wrapping_sub(4);
        self.regs.set_sp(sp);
        self.stage_write_addr(sp, value)
    }

    pub(crate) fn pop_word(&mut self) -> Result<u16, AccessFault> {
        let sp = self.regs.sp();
        let value = self.read_word(sp)?;
        self.regs.set_sp(sp + 2);
        Ok(value)
    }

    pub(crate) fn pop_addr(&mut self) -> Result<u32, AccessFault> {
        let sp = self.regs.sp();
        let value = self.read_addr(sp)?;
        self.regs.set_sp(sp + 4);
        Ok(value)
    }

    // Operand access

    pub(crate) fn load(&self, loc: Location, size: OperandSize) -> Result<u32, AccessFault> {
        match loc {
            Location::None => Ok(0),
            Location::Register(reg) => Ok(match size {
                OperandSize::Byte => self.regs.read_byte(reg, Half::Low) as u32,
                OperandSize::Word => self.regs.read(reg) as u32,
                OperandSize::Address => self.regs.read_a(reg),
            }),
            Location::Memory(addr) => match size {
                OperandSize::Byte => self.read_byte(addr).map(u32::from),
                OperandSize::Word => self.read_word(addr).map(u32::from),
                OperandSize::Address => self.read_addr(addr),
            },
            Location::Value(v) => Ok(v & size.mask()),
        }
    }

    /// Byte and word results written to a register clear its upper bits
    pub(crate) fn store(
        &mut self,
        loc: Location,
        size: OperandSize,
        value: u32,
    ) -> Result<(), AccessFault> {
        match loc {
            Location::Register(reg) => {
                match size {
                    OperandSize::Byte => self.regs.write_byte(reg, Half::Low, value as u8),
                    OperandSize::Word => self.regs.write(reg, value as u16),
                    OperandSize::Address => self.regs.write_a(reg, value),
                }
                Ok(())
            }
            Location::Memory(addr) => match size {
                OperandSize::Byte => self.stage_write_byte(addr, value as u8),
                OperandSize::Word => self.stage_write_word(addr, value as u16),
                OperandSize::Address => self.stage_write_addr(addr, value),
            },
            Location::None | Location::Value(_) => Ok(()),
        }
    }

    /// Carry seen by the instruction, forced clear by the ZC extension bit
    pub(crate) fn carry_in(&self, i: &Instruction) -> bool {
        match i.ext {
            Some(ext) if ext.zc => false,
            _ => self.regs.carry(),
        }
    }

    /// Turns a decoded operand into a location, applying autoincrement
    fn resolve(&mut self, op: Option<Operand>, size: OperandSize, extended: bool, source: bool) -> Location {
        let op = match op {
            Some(op) => op,
            None => return Location::None,
        };
        match op {
            // PC reads as the address of the word after the opcode
            Operand::Register(REGISTER_PC) if source => Location::Value(self.regs.pc()),
            Operand::Register(reg) => Location::Register(reg),
            Operand::Indexed { reg, offset } => {
                Location::Memory(indexed_address(self.regs.read_a(reg), offset, extended))
            }
            Operand::Indirect(reg) => Location::Memory(self.regs.read_a(reg)),
            Operand::IndirectAutoincrement(reg) => {
                let addr = self.regs.read_a(reg);
                self.regs.write_a(reg, addr + autoincrement(reg, size));
                Location::Memory(addr)
            }
            Operand::Immediate(v) | Operand::Constant(v) => Location::Value(v),
            Operand::Absolute(addr) | Operand::Symbolic(addr) => Location::Memory(addr),
        }
    }

    fn repeat_count(&self, i: &Instruction) -> u32 {
        match i.ext.and_then(|e| e.repeat) {
            Some(Repeat::Count(n)) => n as u32,
            Some(Repeat::Register(reg)) => (self.regs.read(reg) & 0xF) as u32 + 1,
            None => 1,
        }
    }

    /// Execute the instruction against resolved operands
    pub fn execute(&mut self, inst: &Instruction, ops: &Operands) -> Result<(), AccessFault> {
        match inst.mnem {
            Mnemonic::MOV => self.mov(inst, ops),
            Mnemonic::ADD => self.add(inst, ops),
            Mnemonic::ADDC => self.addc(inst, ops),
            Mnemonic::SUBC => self.subc(inst, ops),
            Mnemonic::SUB => self.sub(inst, ops),
            Mnemonic::CMP => self.cmp(inst, ops),
            Mnemonic::DADD => self.dadd(inst, ops),
            Mnemonic::BIT => self.bit(inst, ops),
            Mnemonic::BIC => self.bic(inst, ops),
            Mnemonic::BIS => self.bis(inst, ops),
            Mnemonic::XOR => self.xor(inst, ops),
            Mnemonic::AND => self.and(inst, ops),
            Mnemonic::RRC => self.rrc(inst, ops),
            Mnemonic::SWPB => self.swpb(inst, ops),
            Mnemonic::RRA => self.rra(inst, ops),
            Mnemonic::SXT => self.sxt(inst, ops),
            Mnemonic::PUSH => self.push(inst, ops),
            Mnemonic::CALL => self.call(inst, ops),
            Mnemonic::RETI => self.reti(inst),
            Mnemonic::JNE
            | Mnemonic::JEQ
            | Mnemonic::JNC
            | Mnemonic::JC
            | Mnemonic::JN
            | Mnemonic::JGE
            | Mnemonic::JL
            | Mnemonic::JMP => self.jump(inst),
            Mnemonic::MOVA => self.mova(inst, ops),
            Mnemonic::CMPA => self.cmpa(inst, ops),
            Mnemonic::ADDA => self.adda(inst, ops),
            Mnemonic::SUBA => self.suba(inst, ops),
            Mnemonic::CALLA => self.calla(inst, ops),
            Mnemonic::PUSHM => self.pushm(inst),
            Mnemonic::POPM => self.popm(inst),
            Mnemonic::RRCM | Mnemonic::RRAM | Mnemonic::RLAM | Mnemonic::RRUM => {
                self.rotate_multiple(inst)
            }
            // Placeholder seeded by Instruction::new, replaced by every decode path
            Mnemonic::INVALID => {
                unreachable!("execute on an undecoded instruction at 0x{:05x}", inst.pc)
            }
        }
    }

    /// Fetch, decode, resolve, execute and write back one instruction
    fn run_instruction(&mut self, pc: u32) -> Result<Step, Fault> {
        let access = |source| Fault::Access { pc, source };

        self.transition(Stage::Fetching);
        let first = self.mem.fetch_word(pc).map_err(access)?;

        self.transition(Stage::Decoding);
        let mem = &self.mem;
        let mut next = pc;
        let inst = decode(pc, first, || {
            next = (next + 2) & crate::constants::ADDRESS_MASK;
            mem.fetch_word(next)
        })
        .map_err(|e| Fault::from_decode(pc, e))?;
        trace!(
            "0x{:05x}: {:?}{} {:?}, {:?}",
            pc,
            inst.mnem,
            match inst.size {
                OperandSize::Byte => ".B",
                OperandSize::Word => "",
                OperandSize::Address => ".A",
            },
            inst.src,
            inst.dst
        );

        // Source first, then destination, so @Rn+ is visible to an indexed destination
        self.transition(Stage::ResolvingOperands);
        let extended = inst.format == Format::Extended;
        self.regs.set_pc(inst.after_opcode());
        let src = self.resolve(inst.src, inst.size, extended, true);
        self.regs.set_pc(inst.next_pc());
        let dst = self.resolve(inst.dst, inst.size, extended, false);
        let ops = Operands { src, dst };

        self.transition(Stage::Executing);
        let repeat = self.repeat_count(&inst);
        for _ in 0..repeat {
            self.execute(&inst, &ops).map_err(access)?;
        }

        self.transition(Stage::WritingBack);
        self.commit().map_err(access)?;
        self.transition(Stage::Idle);

        self.instructions_retired += 1;
        Ok(Step {
            cycles: instruction_cycles(&inst, repeat),
            event: StepEvent::Executed {
                pc,
                mnem: inst.mnem,
            },
        })
    }

    fn enter_vector(&mut self, vector: u32) -> Result<(), AccessFault> {
        let pc = self.regs.pc();
        let sr = self.regs.sr();
        self.push_word(pc as u16)?;
        // PC bits 19:16 ride in the top nibble of the stacked SR
        self.push_word(((pc >> 4) & 0xF000) as u16 | sr)?;
        let handler = self.read_word(vector)?;
        // Everything but SCG0 is cleared, which also wakes the CPU
        let kept = self.regs.status() & Status::SCG0;
        self.regs.set_status(kept);
        self.regs.set_pc(handler as u32);
        self.commit()
    }

    /// Pushes PC and SR, clears SR apart from SCG0 and jumps through `vector`
    ///
    /// Returns the cycles taken. On a fault nothing is changed and the request,
    /// if one is pending for the vector, stays pending.
    pub fn force_vector_entry(&mut self, vector: u32) -> Result<u32, Fault> {
        let from = self.stage;
        let snapshot = self.regs;
        self.transition(Stage::InterruptEntry);

        if let Err(source) = self.enter_vector(vector) {
            self.regs = snapshot;
            self.journal.clear();
            self.stage = from;
            warn!(
                "Interrupt entry through 0x{:04x} failed: {}",
                vector, source
            );
            return Err(Fault::Access {
                pc: snapshot.pc(),
                source,
            });
        }

        self.interrupts.consume(vector);
        self.transition(Stage::Idle);
        debug!(
            "Entered vector 0x{:04x}, handler at 0x{:05x}",
            vector,
            self.regs.pc()
        );
        Ok(INTERRUPT_LATENCY)
    }

    /// Advance peripherals and collect their requests
    fn advance(&mut self, cycles: u32) {
        self.total_cycles += cycles as u64;
        self.mem.tick(cycles);
        for req in self.mem.check_interrupts() {
            self.interrupts.raise(req);
        }
    }

    /// CPU execution cycle handler
    ///
    /// Either serves a pending interrupt, idles while halted, or runs exactly
    /// one instruction. A faulting step leaves registers and memory untouched.
    pub fn step(&mut self) -> Result<Step, Fault> {
        if self.interrupts.reset_request().is_some() {
            self.reset();
            self.advance(RESET_CYCLES);
            return Ok(Step {
                cycles: RESET_CYCLES,
                event: StepEvent::Reset,
            });
        }

        if self.regs.gie() {
            if let Some(req) = self.interrupts.highest() {
                let cycles = self.force_vector_entry(req.vector)?;
                self.advance(cycles);
                return Ok(Step {
                    cycles,
                    event: StepEvent::Interrupt { vector: req.vector },
                });
            }
        }

        if self.stage == Stage::Halted {
            if self.regs.cpu_off() {
                self.advance(HALTED_CYCLES);
                return Ok(Step {
                    cycles: HALTED_CYCLES,
                    event: StepEvent::Halted,
                });
            }
            self.transition(Stage::Idle);
        }

        let snapshot = self.regs;
        let pc = snapshot.pc();
        let step = match self.run_instruction(pc) {
            Ok(step) => step,
            Err(fault) => {
                self.regs = snapshot;
                self.journal.clear();
                self.stage = Stage::Idle;
                warn!("{}", fault);
                return Err(fault);
            }
        };

        if self.regs.cpu_off() {
            debug!("CPUOFF set at 0x{:05x}, halting", pc);
            self.transition(Stage::Halted);
        }
        self.advance(step.cycles);
        Ok(step)
    }

    /// Steps until `stop` returns true or `cancel` is raised
    ///
    /// `cancel` is checked between steps, so a step in progress always
    /// completes. A fault ends the run and is returned as the error.
    pub fn run_until<P>(&mut self, cancel: &AtomicBool, mut stop: P) -> Result<RunSummary, Fault>
    where
        P: FnMut(&Cpu<'a>, &Step) -> bool,
    {
        let mut summary = RunSummary {
            steps: 0,
            cycles: 0,
            reason: StopReason::Cancelled,
        };
        while !cancel.load(Ordering::Relaxed) {
            let step = self.step()?;
            summary.steps += 1;
            summary.cycles += step.cycles as u64;
            if stop(self, &step) {
                summary.reason = StopReason::Condition;
                return Ok(summary);
            }
        }
        Ok(summary)
    }
}
