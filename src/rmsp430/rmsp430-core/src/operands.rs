use crate::constants::registers::*;
use crate::constants::ADDRESS_MASK;
use crate::error::{AccessFault, DecodeError};
use crate::instructions::OperandSize;
use crate::utils::{sign_extend, sign_extend_16};

/// Operand of a decoded instruction
///
/// Everything that can be known from the instruction stream alone is settled at
/// decode time: immediates, constants, absolute and symbolic addresses. Register
/// based modes are turned into effective addresses by the CPU when the operand
/// is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(usize),
    Indexed { reg: usize, offset: i32 },
    Indirect(usize),
    IndirectAutoincrement(usize),
    Immediate(u32),
    Absolute(u32),
    Symbolic(u32),
    Constant(u32),
}

impl Operand {
    /// Register named by a register-mode operand
    pub fn register(&self) -> Option<usize> {
        match *self {
            Operand::Register(reg) => Some(reg),
            _ => None,
        }
    }
}

/// Cursor over the words following an instruction's first word
pub struct WordStream<F> {
    addr: u32,
    fetch: F,
    consumed: u32,
}

impl<F> WordStream<F>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    /// `addr` is the bus address of the first word `fetch` will return
    pub fn new(addr: u32, fetch: F) -> Self {
        Self {
            addr,
            fetch,
            consumed: 0,
        }
    }

    /// Next word and the address it was read from
    pub fn next(&mut self) -> Result<(u32, u16), AccessFault> {
        let at = self.addr;
        let word = (self.fetch)()?;
        self.addr = (self.addr + 2) & ADDRESS_MASK;
        self.consumed += 1;
        Ok((at, word))
    }

    /// Number of words taken so far
    pub fn consumed(&self) -> u32 {
        self.consumed
    }
}

/// Combines an offset word with extension bits 19:16
fn extended_value(word: u16, hi: Option<u32>) -> u32 {
    match hi {
        Some(hi) => (hi & 0xF) << 16 | word as u32,
        None => word as u32,
    }
}

/// Signed index from an offset word, 20-bit when extended
fn index_offset(word: u16, hi: Option<u32>) -> i32 {
    match hi {
        Some(_) => sign_extend(extended_value(word, hi), 20),
        None => sign_extend_16(word),
    }
}

/// Symbolic target: address of the offset word plus the offset
fn symbolic_target(at: u32, word: u16, hi: Option<u32>) -> u32 {
    let target = (at as i64 + index_offset(word, hi) as i64) as u32;
    match hi {
        Some(_) => target & ADDRESS_MASK,
        None => target & 0xFFFF,
    }
}

/// Maps a source register and As field to an operand
///
/// The constant generator is checked before the generic mode table. `hi`
/// carries source bits 19:16 of an extension word, when present.
pub fn source<F>(
    reg: usize,
    as_mode: u16,
    size: OperandSize,
    hi: Option<u32>,
    words: &mut WordStream<F>,
) -> Result<Operand, AccessFault>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    let operand = match (reg, as_mode) {
        (REGISTER_CG, 0) => Operand::Constant(0),
        (REGISTER_CG, 1) => Operand::Constant(1),
        (REGISTER_CG, 2) => Operand::Constant(2),
        (REGISTER_CG, 3) => Operand::Constant(size.mask()),
        (REGISTER_SR, 2) => Operand::Constant(4),
        (REGISTER_SR, 3) => Operand::Constant(8),

        (_, 0) => Operand::Register(reg),
        (REGISTER_SR, 1) => {
            let (_, word) = words.next()?;
            Operand::Absolute(extended_value(word, hi))
        }
        (REGISTER_PC, 1) => {
            let (at, word) = words.next()?;
            Operand::Symbolic(symbolic_target(at, word, hi))
        }
        (_, 1) => {
            let (_, word) = words.next()?;
            Operand::Indexed {
                reg,
                offset: index_offset(word, hi),
            }
        }
        (_, 2) => Operand::Indirect(reg),
        (REGISTER_PC, 3) => {
            let (_, word) = words.next()?;
            Operand::Immediate(extended_value(word, hi))
        }
        _ => Operand::IndirectAutoincrement(reg),
    };
    Ok(operand)
}

/// Maps a destination register and Ad field to an operand
pub fn destination<F>(
    reg: usize,
    ad_mode: u16,
    hi: Option<u32>,
    data: u16,
    words: &mut WordStream<F>,
) -> Result<Operand, DecodeError>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    if ad_mode == 0 {
        return Ok(Operand::Register(reg));
    }
    let operand = match reg {
        REGISTER_SR => {
            let (_, word) = words.next()?;
            Operand::Absolute(extended_value(word, hi))
        }
        REGISTER_PC => {
            let (at, word) = words.next()?;
            Operand::Symbolic(symbolic_target(at, word, hi))
        }
        REGISTER_CG => {
            return Err(DecodeError::Invalid {
                word: data,
                reason: "indexed constant generator destination",
            })
        }
        _ => {
            let (_, word) = words.next()?;
            Operand::Indexed {
                reg,
                offset: index_offset(word, hi),
            }
        }
    };
    Ok(operand)
}

/// Effective address of an indexed operand
///
/// Non-extended instructions keep the result inside the lower 64 KB when the
/// base register points there; otherwise the sum is taken over 20 bits.
pub fn indexed_address(base: u32, offset: i32, extended: bool) -> u32 {
    let sum = (base as i64 + offset as i64) as u32;
    if !extended && base <= 0xFFFF {
        sum & 0xFFFF
    } else {
        sum & ADDRESS_MASK
    }
}

/// Register increment applied by `@Rn+`
pub fn autoincrement(reg: usize, size: OperandSize) -> u32 {
    match (reg, size) {
        (REGISTER_SP, OperandSize::Byte) => 2,
        (_, size) => size.bytes(),
    }
}

#[cfg(test)]
mod operand_tests {
    use super::*;

    fn stream(words: &[u16]) -> WordStream<impl FnMut() -> Result<u16, AccessFault> + '_> {
        let mut it = words.iter();
        WordStream::new(0x8002, move || {
            it.next()
                .copied()
                .ok_or(AccessFault::Unmapped { addr: 0 })
        })
    }

    #[test]
    fn constant_generator_takes_priority() {
        let mut words = stream(&[]);
        let w = OperandSize::Word;
        assert_eq!(source(3, 0, w, None, &mut words), Ok(Operand::Constant(0)));
        assert_eq!(source(3, 1, w, None, &mut words), Ok(Operand::Constant(1)));
        assert_eq!(source(3, 2, w, None, &mut words), Ok(Operand::Constant(2)));
        assert_eq!(
            source(3, 3, w, None, &mut words),
            Ok(Operand::Constant(0xFFFF))
        );
        assert_eq!(
            source(3, 3, OperandSize::Byte, None, &mut words),
            Ok(Operand::Constant(0xFF))
        );
        assert_eq!(
            source(3, 3, OperandSize::Address, None, &mut words),
            Ok(Operand::Constant(0xF_FFFF))
        );
        assert_eq!(source(2, 2, w, None, &mut words), Ok(Operand::Constant(4)));
        assert_eq!(source(2, 3, w, None, &mut words), Ok(Operand::Constant(8)));
        assert_eq!(words.consumed(), 0);
    }

    #[test]
    fn word_consuming_modes() {
        let mut words = stream(&[0x0200, 0x0010, 0xFFFE, 0x1234]);
        let w = OperandSize::Word;
        assert_eq!(
            source(2, 1, w, None, &mut words),
            Ok(Operand::Absolute(0x0200))
        );
        // Offset word sits at 0x8004
        assert_eq!(
            source(0, 1, w, None, &mut words),
            Ok(Operand::Symbolic(0x8014))
        );
        assert_eq!(
            source(5, 1, w, None, &mut words),
            Ok(Operand::Indexed { reg: 5, offset: -2 })
        );
        assert_eq!(
            source(0, 3, w, None, &mut words),
            Ok(Operand::Immediate(0x1234))
        );
        assert_eq!(words.consumed(), 4);
    }

    #[test]
    fn register_modes_consume_nothing() {
        let mut words = stream(&[]);
        let w = OperandSize::Word;
        assert_eq!(source(7, 0, w, None, &mut words), Ok(Operand::Register(7)));
        assert_eq!(source(7, 2, w, None, &mut words), Ok(Operand::Indirect(7)));
        assert_eq!(
            source(7, 3, w, None, &mut words),
            Ok(Operand::IndirectAutoincrement(7))
        );
        assert_eq!(
            source(1, 3, w, None, &mut words),
            Ok(Operand::IndirectAutoincrement(1))
        );
    }

    #[test]
    fn extension_bits_widen_values() {
        let mut words = stream(&[0x2345, 0xFFFF]);
        assert_eq!(
            source(0, 3, OperandSize::Address, Some(0x1), &mut words),
            Ok(Operand::Immediate(0x1_2345))
        );
        assert_eq!(
            source(9, 1, OperandSize::Address, Some(0xF), &mut words),
            Ok(Operand::Indexed { reg: 9, offset: -1 })
        );
    }

    #[test]
    fn destination_modes() {
        let mut words = stream(&[0x0300, 0x0004, 0x0006]);
        assert_eq!(
            destination(2, 1, None, 0x4292, &mut words),
            Ok(Operand::Absolute(0x0300))
        );
        assert_eq!(
            destination(0, 1, None, 0x4290, &mut words),
            Ok(Operand::Symbolic(0x8008))
        );
        assert_eq!(
            destination(4, 1, None, 0x4294, &mut words),
            Ok(Operand::Indexed { reg: 4, offset: 6 })
        );
        assert_eq!(destination(3, 0, None, 0x4303, &mut words), Ok(Operand::Register(3)));
        assert_eq!(
            destination(3, 1, None, 0x4393, &mut words),
            Err(DecodeError::Invalid {
                word: 0x4393,
                reason: "indexed constant generator destination"
            })
        );
    }

    #[test]
    fn indexed_addresses_wrap_in_lower_64k() {
        assert_eq!(indexed_address(0xFFF0, 0x20, false), 0x0010);
        assert_eq!(indexed_address(0x2000, -2, false), 0x1FFE);
        assert_eq!(indexed_address(0xFFF0, 0x20, true), 0x1_0010);
        assert_eq!(indexed_address(0x1_0000, -2, false), 0xFFFE);
    }

    #[test]
    fn autoincrement_steps() {
        assert_eq!(autoincrement(5, OperandSize::Byte), 1);
        assert_eq!(autoincrement(5, OperandSize::Word), 2);
        assert_eq!(autoincrement(5, OperandSize::Address), 4);
        assert_eq!(autoincrement(1, OperandSize::Byte), 2);
    }
}
