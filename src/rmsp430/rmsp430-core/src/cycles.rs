// Instruction timing for the MSP430X CPU. Every figure is a lookup into a
// table transcribed from the CPUX timing tables; counts feed statistics and
// peripheral clocking only.

use crate::constants::timing::*;
use crate::instructions::{Instruction, Mnemonic, OperandSize};
use crate::operands::Operand;

/// Timing class of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrClass {
    /// Format I other than MOV, BIT and CMP
    FormatI,
    /// MOV, BIT and CMP, which skip the destination write cycle
    FormatICompare,
    /// RRC, RRA, SWPB, SXT
    Rotate,
    Push,
    Call,
    Reti,
    Jump,
    /// MOVA
    MoveAddress,
    /// CMPA, ADDA, SUBA
    ArithAddress,
    CallA,
    PushMultiple { n: u8, address: bool },
    PopMultiple { n: u8, address: bool },
    RotateMultiple { n: u8 },
    Interrupt,
    Reset,
}

/// Source (or single operand) addressing mode column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcMode {
    None,
    /// Rn and constant generator values
    Register,
    Indirect,
    Autoincrement,
    Immediate,
    /// x(Rn) and symbolic
    Indexed,
    Absolute,
}

/// Destination addressing mode column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstMode {
    None,
    Register,
    Pc,
    /// x(Rm), symbolic and absolute
    Memory,
}

/// Extension word properties that select the extended tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtTiming {
    pub address: bool,
    /// Number of executions of a repeated register-mode instruction
    pub repeat: u32,
}

impl SrcMode {
    pub fn of(op: Option<&Operand>) -> SrcMode {
        match op {
            None => SrcMode::None,
            Some(Operand::Register(_)) | Some(Operand::Constant(_)) => SrcMode::Register,
            Some(Operand::Indirect(_)) => SrcMode::Indirect,
            Some(Operand::IndirectAutoincrement(_)) => SrcMode::Autoincrement,
            Some(Operand::Immediate(_)) => SrcMode::Immediate,
            Some(Operand::Indexed { .. }) | Some(Operand::Symbolic(_)) => SrcMode::Indexed,
            Some(Operand::Absolute(_)) => SrcMode::Absolute,
        }
    }

    fn row(self) -> usize {
        match self {
            SrcMode::None | SrcMode::Register => 0,
            SrcMode::Indirect => 1,
            SrcMode::Autoincrement => 2,
            SrcMode::Immediate => 3,
            SrcMode::Indexed => 4,
            SrcMode::Absolute => 5,
        }
    }
}

impl DstMode {
    pub fn of(op: Option<&Operand>) -> DstMode {
        match op {
            None => DstMode::None,
            Some(Operand::Register(0)) => DstMode::Pc,
            Some(Operand::Register(_)) => DstMode::Register,
            Some(_) => DstMode::Memory,
        }
    }

    fn column(self) -> usize {
        match self {
            DstMode::None | DstMode::Register => 0,
            DstMode::Pc => 1,
            DstMode::Memory => 2,
        }
    }
}

// Rows: Rn, @Rn, @Rn+, #N, x(Rn)/EDE, &EDE
// Columns: Rm, PC, x(Rm)/EDE/&EDE
static FORMAT_I: [[u32; 3]; 6] = [
    [1, 2, 4],
    [2, 3, 5],
    [2, 3, 5],
    [2, 3, 5],
    [3, 4, 6],
    [3, 3, 6],
];

static FORMAT_I_COMPARE: [[u32; 3]; 6] = [
    [1, 2, 3],
    [2, 3, 4],
    [2, 3, 4],
    [2, 3, 4],
    [3, 4, 5],
    [3, 3, 5],
];

static EXT_FORMAT_I: [[u32; 3]; 6] = [
    [2, 3, 5],
    [3, 4, 6],
    [3, 4, 6],
    [3, 4, 6],
    [4, 5, 7],
    [4, 5, 7],
];

static EXT_FORMAT_I_COMPARE: [[u32; 3]; 6] = [
    [2, 3, 4],
    [3, 4, 5],
    [3, 4, 5],
    [3, 4, 5],
    [4, 5, 6],
    [4, 5, 6],
];

static EXT_FORMAT_I_A: [[u32; 3]; 6] = [
    [2, 3, 7],
    [4, 5, 9],
    [4, 5, 9],
    [3, 4, 8],
    [5, 6, 10],
    [5, 6, 10],
];

static EXT_FORMAT_I_A_COMPARE: [[u32; 3]; 6] = [
    [2, 3, 5],
    [4, 5, 7],
    [4, 5, 7],
    [3, 4, 6],
    [5, 6, 8],
    [5, 6, 8],
];

// Rows as above. Columns: RRA/RRC/SWPB/SXT, PUSH, CALL
// Immediate shift operands are rejected by the decoder
static FORMAT_II: [[u32; 3]; 6] = [
    [1, 3, 4],
    [3, 3, 4],
    [3, 3, 4],
    [0, 3, 4],
    [4, 4, 5],
    [4, 4, 6],
];

// Columns: RRAX/RRCX/RRUX/SWPBX/SXTX .B/.W and .A, PUSHX .B/.W and .A
static EXT_FORMAT_II: [[u32; 4]; 6] = [
    [1, 2, 4, 5],
    [4, 6, 5, 7],
    [4, 6, 5, 7],
    [0, 0, 4, 5],
    [5, 7, 5, 7],
    [5, 7, 5, 7],
];

// Indexed by n - 1
static PUSHM_W: [u32; 16] = [3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18];
static PUSHM_A: [u32; 16] = [4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30, 32, 34];
static POPM_W: [u32; 16] = [3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18];
static POPM_A: [u32; 16] = [4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30, 32, 34];
static RXXM: [u32; 4] = [1, 2, 3, 4];

fn per_count(table: &[u32], n: u8) -> u32 {
    let idx = (n.max(1) as usize - 1).min(table.len() - 1);
    table[idx]
}

/// MOVA timing by source row and destination column
fn move_address(src: SrcMode, dst: DstMode) -> u32 {
    match (src, dst) {
        (SrcMode::Register, DstMode::Register) | (SrcMode::Register, DstMode::None) => 1,
        (SrcMode::Register, DstMode::Pc) => 3,
        (SrcMode::Register, DstMode::Memory) => 4,
        (SrcMode::Immediate, DstMode::Pc) => 3,
        (SrcMode::Immediate, _) => 2,
        (SrcMode::Indirect, DstMode::Pc) | (SrcMode::Autoincrement, DstMode::Pc) => 5,
        (SrcMode::Indirect, _) | (SrcMode::Autoincrement, _) => 3,
        (SrcMode::Indexed, DstMode::Pc) | (SrcMode::Absolute, DstMode::Pc) => 5,
        (SrcMode::Indexed, _) | (SrcMode::Absolute, _) => 4,
        (SrcMode::None, _) => 1,
    }
}

/// Cycle count for an instruction class and its operand modes
pub fn cycles_for(class: InstrClass, src: SrcMode, dst: DstMode, ext: Option<ExtTiming>) -> u32 {
    let (row, col) = (src.row(), dst.column());
    match class {
        InstrClass::FormatI | InstrClass::FormatICompare => {
            let compare = class == InstrClass::FormatICompare;
            match ext {
                None if compare => FORMAT_I_COMPARE[row][col],
                None => FORMAT_I[row][col],
                // Repeated register-mode instructions take n + 1 cycles
                Some(e) if e.repeat > 1 => e.repeat + 1,
                Some(e) => match (e.address, compare) {
                    (false, false) => EXT_FORMAT_I[row][col],
                    (false, true) => EXT_FORMAT_I_COMPARE[row][col],
                    (true, false) => EXT_FORMAT_I_A[row][col],
                    (true, true) => EXT_FORMAT_I_A_COMPARE[row][col],
                },
            }
        }
        InstrClass::Rotate | InstrClass::Push => {
            let push = class == InstrClass::Push;
            match ext {
                None => FORMAT_II[row][push as usize],
                Some(e) if e.repeat > 1 => e.repeat + 1,
                Some(e) => EXT_FORMAT_II[row][(push as usize) * 2 + e.address as usize],
            }
        }
        InstrClass::Call => FORMAT_II[row][2],
        InstrClass::Reti => RETI_CYCLES,
        InstrClass::Jump => JUMP_CYCLES,
        InstrClass::MoveAddress => move_address(src, dst),
        InstrClass::ArithAddress => match src {
            SrcMode::Immediate => 3,
            _ => 1,
        },
        InstrClass::CallA => match src {
            SrcMode::Absolute => 6,
            _ => 5,
        },
        InstrClass::PushMultiple { n, address } => {
            per_count(if address { &PUSHM_A } else { &PUSHM_W }, n)
        }
        InstrClass::PopMultiple { n, address } => {
            per_count(if address { &POPM_A } else { &POPM_W }, n)
        }
        InstrClass::RotateMultiple { n } => per_count(&RXXM, n),
        InstrClass::Interrupt => INTERRUPT_LATENCY,
        InstrClass::Reset => RESET_CYCLES,
    }
}

/// Timing class of a decoded instruction
pub fn class_of(i: &Instruction) -> InstrClass {
    let address = i.size == OperandSize::Address;
    match i.mnem {
        m if m.is_compare_like() => InstrClass::FormatICompare,
        Mnemonic::ADD
        | Mnemonic::ADDC
        | Mnemonic::SUBC
        | Mnemonic::SUB
        | Mnemonic::DADD
        | Mnemonic::BIC
        | Mnemonic::BIS
        | Mnemonic::XOR
        | Mnemonic::AND => InstrClass::FormatI,
        Mnemonic::RRC | Mnemonic::RRA | Mnemonic::SWPB | Mnemonic::SXT => InstrClass::Rotate,
        Mnemonic::PUSH => InstrClass::Push,
        Mnemonic::CALL => InstrClass::Call,
        Mnemonic::RETI => InstrClass::Reti,
        Mnemonic::MOVA => InstrClass::MoveAddress,
        Mnemonic::CMPA | Mnemonic::ADDA | Mnemonic::SUBA => InstrClass::ArithAddress,
        Mnemonic::CALLA => InstrClass::CallA,
        Mnemonic::PUSHM => InstrClass::PushMultiple { n: i.count, address },
        Mnemonic::POPM => InstrClass::PopMultiple { n: i.count, address },
        Mnemonic::RRCM | Mnemonic::RRAM | Mnemonic::RLAM | Mnemonic::RRUM => {
            InstrClass::RotateMultiple { n: i.count }
        }
        _ => InstrClass::Jump,
    }
}

/// Cycles for a decoded instruction; `repeat` is the resolved repeat count
pub fn instruction_cycles(i: &Instruction, repeat: u32) -> u32 {
    let class = class_of(i);
    let ext = i.ext.map(|_| ExtTiming {
        address: i.size == OperandSize::Address,
        repeat,
    });
    // Format II operands are timed from the source column
    let (src, dst) = match class {
        InstrClass::Rotate => (SrcMode::of(i.dst.as_ref()), DstMode::None),
        _ => (SrcMode::of(i.src.as_ref()), DstMode::of(i.dst.as_ref())),
    };
    cycles_for(class, src, dst, ext)
}
