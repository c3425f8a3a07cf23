pub mod instructions;

// Import trait implementations for CPU instruction families
pub use instructions::Address;
pub use instructions::Arithmetic;
pub use instructions::ControlFlow;
pub use instructions::DataMovement;
pub use instructions::Interrupt;
pub use instructions::Logic;

use crate::constants::ADDRESS_MASK;
use crate::operands::Operand;

// Field masks for the base instruction word
const FORMAT_I_BW: u16 = 0x0040; // Byte/word select, formats I and II
const REG_MASK: u16 = 0x000F;

/// Instruction mnemonics of the MSP430 and MSP430X instruction sets
///
/// Extended (X suffixed) forms share the mnemonic of their base instruction and
/// are told apart by `Format::Extended`. RRUX is RRC with the ZC bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    // Format I
    MOV,
    ADD,
    ADDC,
    SUBC,
    SUB,
    CMP,
    DADD,
    BIT,
    BIC,
    BIS,
    XOR,
    AND,
    // Format II
    RRC,
    SWPB,
    RRA,
    SXT,
    PUSH,
    CALL,
    RETI,
    // Format III
    JNE,
    JEQ,
    JNC,
    JC,
    JN,
    JGE,
    JL,
    JMP,
    // MSP430X address and multi-register instructions
    MOVA,
    CMPA,
    ADDA,
    SUBA,
    CALLA,
    PUSHM,
    POPM,
    RRCM,
    RRAM,
    RLAM,
    RRUM,
    /// Placeholder until the decoder names the operation
    INVALID,
}

impl Mnemonic {
    /// MOV, BIT and CMP only read their destination
    pub fn is_compare_like(&self) -> bool {
        matches!(self, Mnemonic::MOV | Mnemonic::BIT | Mnemonic::CMP)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    FormatI,
    FormatII,
    FormatIII,
    /// Extension-word prefixed instructions and the MSP430X-only encodings
    Extended,
}

/// Operand width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSize {
    Byte,
    Word,
    Address,
}

impl OperandSize {
    pub fn bits(&self) -> u32 {
        match self {
            OperandSize::Byte => 8,
            OperandSize::Word => 16,
            OperandSize::Address => 20,
        }
    }

    pub fn mask(&self) -> u32 {
        (1 << self.bits()) - 1
    }

    pub fn msb(&self) -> u32 {
        1 << (self.bits() - 1)
    }

    /// Bytes occupied in memory; 20-bit values take two words
    pub fn bytes(&self) -> u32 {
        match self {
            OperandSize::Byte => 1,
            OperandSize::Word => 2,
            OperandSize::Address => 4,
        }
    }
}

/// Source of the repeat count of a register-mode extended instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Count(u8),
    Register(usize),
}

/// Decoded MSP430X extension word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension {
    pub word: u16,
    pub src_hi: u32,
    pub dst_hi: u32,
    pub zc: bool,
    pub repeat: Option<Repeat>,
}

impl Extension {
    /// Register-mode form carries ZC and a repeat count instead of address bits
    pub fn from_word(word: u16, register_mode: bool) -> Extension {
        if register_mode {
            let field = (word & 0x000F) as u8;
            let repeat = if word & 0x0080 != 0 {
                Repeat::Register(field as usize)
            } else {
                Repeat::Count(field + 1)
            };
            Extension {
                word,
                src_hi: 0,
                dst_hi: 0,
                zc: word & 0x0100 != 0,
                repeat: Some(repeat),
            }
        } else {
            Extension {
                word,
                src_hi: ((word >> 7) & 0xF) as u32,
                dst_hi: (word & 0xF) as u32,
                zc: false,
                repeat: None,
            }
        }
    }

    /// A/L bit, clear selects 20-bit operation
    pub fn al(&self) -> bool {
        self.word & 0x0040 != 0
    }
}

/// A fully decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pc: u32,             // Address of the first word
    pub format: Format,      // Encoding family
    pub mnem: Mnemonic,      // Operation
    pub size: OperandSize,   // .B, .W or .A
    pub src: Option<Operand>,
    pub dst: Option<Operand>,
    pub ext: Option<Extension>,
    pub offset: i16,         // Jump offset in words
    pub count: u8,           // Register count of PUSHM/POPM, shift count of RxxM
    pub data: u16,           // Raw base (opcode) word
    pub len: u32,            // Encoding length in bytes
}

impl Instruction {
    pub(crate) fn new(pc: u32, data: u16) -> Instruction {
        Instruction {
            pc,
            format: Format::FormatI,
            mnem: Mnemonic::INVALID,
            size: OperandSize::Word,
            src: None,
            dst: None,
            ext: None,
            offset: 0,
            count: 0,
            data,
            len: 2,
        }
    }

    /// Address of the word following the opcode word
    pub fn after_opcode(&self) -> u32 {
        let prefix = if self.has_extension_word() { 2 } else { 0 };
        (self.pc + prefix + 2) & ADDRESS_MASK
    }

    /// Address of the next sequential instruction
    pub fn next_pc(&self) -> u32 {
        (self.pc + self.len) & ADDRESS_MASK
    }

    pub fn has_extension_word(&self) -> bool {
        self.ext.is_some()
    }

    /// B/W bit of formats I and II
    pub fn get_bw(&self) -> bool {
        self.data & FORMAT_I_BW != 0
    }

    /// Register field in bits 3:0
    pub fn get_register(&self) -> usize {
        (self.data & REG_MASK) as usize
    }
}

#[cfg(test)]
pub mod tests {
    use crate::constants::registers::REGISTER_SP;
    use crate::cpu::Cpu;
    use crate::memory::MemoryMap;

    pub const PROGRAM_START: u32 = 0x8000;
    pub const STACK_TOP: u32 = 0x3000;

    /// CPU with `program` in FRAM at 0x8000, the reset vector pointing at it
    /// and SP at the top of SRAM
    pub fn init_cpu(program: &[u16]) -> Cpu<'static> {
        let mut cpu = Cpu::new(MemoryMap::new());
        let mut bytes = [0u8; 512];
        for (i, w) in program.iter().enumerate() {
            let [lo, hi] = w.to_le_bytes();
            bytes[i * 2] = lo;
            bytes[i * 2 + 1] = hi;
        }
        cpu.write_block(PROGRAM_START, &bytes[..program.len() * 2])
            .unwrap();
        cpu.write_block(0xFFFE, &(PROGRAM_START as u16).to_le_bytes())
            .unwrap();
        cpu.reset();
        cpu.set_register(REGISTER_SP, STACK_TOP);
        cpu
    }

    /// Places a handler address in a vector slot
    pub fn set_vector(cpu: &mut Cpu, vector: u32, handler: u16) {
        cpu.write_block(vector, &handler.to_le_bytes()).unwrap();
    }

    /// Runs `n` steps, panicking on any fault
    pub fn run(cpu: &mut Cpu, n: usize) -> u32 {
        let mut cycles = 0;
        for _ in 0..n {
            cycles += cpu.step().unwrap().cycles;
        }
        cycles
    }
}
