use crate::constants::ADDRESS_MASK;
use crate::error::{AccessFault, DecodeError};
use crate::instructions::{Extension, Format, Instruction, Mnemonic, OperandSize};
use crate::operands::{self, Operand, WordStream};
use crate::utils::{jump_offset, sign_extend, sign_extend_16};
use log::error;

fn invalid(word: u16, reason: &'static str) -> DecodeError {
    DecodeError::Invalid { word, reason }
}

/// Decode double-operand (Format I) instructions
fn decoder_format_i<F>(
    mut i: Instruction,
    ext: Option<Extension>,
    words: &mut WordStream<F>,
) -> Result<Instruction, DecodeError>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    i.mnem = match i.data >> 12 {
        0x4 => Mnemonic::MOV,
        0x5 => Mnemonic::ADD,
        0x6 => Mnemonic::ADDC,
        0x7 => Mnemonic::SUBC,
        0x8 => Mnemonic::SUB,
        0x9 => Mnemonic::CMP,
        0xA => Mnemonic::DADD,
        0xB => Mnemonic::BIT,
        0xC => Mnemonic::BIC,
        0xD => Mnemonic::BIS,
        0xE => Mnemonic::XOR,
        0xF => Mnemonic::AND,
        _ => return Err(invalid(i.data, "not a format I opcode")),
    };

    let src_reg = ((i.data >> 8) & 0xF) as usize;
    let ad = (i.data >> 7) & 0x1;
    let as_mode = (i.data >> 4) & 0x3;
    let dst_reg = i.get_register();

    i.size = operand_size(&i, ext)?;
    let (src_hi, dst_hi) = match ext {
        Some(e) if e.repeat.is_none() => (Some(e.src_hi), Some(e.dst_hi)),
        _ => (None, None),
    };

    // The source's offset word precedes the destination's
    i.src = Some(operands::source(src_reg, as_mode, i.size, src_hi, words)?);
    i.dst = Some(operands::destination(dst_reg, ad, dst_hi, i.data, words)?);
    Ok(i)
}

/// Decode single-operand (Format II) instructions, RETI and CALLA
fn decoder_format_ii<F>(
    mut i: Instruction,
    ext: Option<Extension>,
    words: &mut WordStream<F>,
) -> Result<Instruction, DecodeError>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    if i.data & 0xFFC0 == 0x1300 {
        if i.data != 0x1300 || ext.is_some() {
            return Err(invalid(i.data, "malformed RETI"));
        }
        i.format = Format::FormatII;
        i.mnem = Mnemonic::RETI;
        return Ok(i);
    }
    if i.data >= 0x1340 {
        if ext.is_some() {
            return Err(invalid(i.data, "extension word before CALLA"));
        }
        return decoder_calla(i, words);
    }

    i.mnem = match (i.data >> 7) & 0x7 {
        0 => Mnemonic::RRC,
        1 => Mnemonic::SWPB,
        2 => Mnemonic::RRA,
        3 => Mnemonic::SXT,
        4 => Mnemonic::PUSH,
        5 => Mnemonic::CALL,
        _ => return Err(invalid(i.data, "not a format II opcode")),
    };
    if ext.is_some() && i.mnem == Mnemonic::CALL {
        return Err(invalid(i.data, "extension word before CALL"));
    }

    i.size = operand_size(&i, ext)?;
    if i.size == OperandSize::Byte
        && matches!(i.mnem, Mnemonic::SWPB | Mnemonic::SXT | Mnemonic::CALL)
    {
        return Err(invalid(i.data, "byte form not allowed"));
    }

    let as_mode = (i.data >> 4) & 0x3;
    let hi = match ext {
        Some(e) if e.repeat.is_none() => Some(e.dst_hi),
        _ => None,
    };
    let operand = operands::source(i.get_register(), as_mode, i.size, hi, words)?;

    match i.mnem {
        Mnemonic::PUSH | Mnemonic::CALL => i.src = Some(operand),
        _ => {
            if matches!(operand, Operand::Immediate(_) | Operand::Constant(_)) {
                return Err(invalid(i.data, "immediate shift operand"));
            }
            i.dst = Some(operand);
        }
    }
    Ok(i)
}

fn decoder_calla<F>(mut i: Instruction, words: &mut WordStream<F>) -> Result<Instruction, DecodeError>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    i.format = Format::Extended;
    i.mnem = Mnemonic::CALLA;
    i.size = OperandSize::Address;

    let reg = i.get_register();
    let hi = (i.data & 0xF) as u32;
    let operand = match (i.data >> 4) & 0xF {
        0x4 => Operand::Register(reg),
        0x5 => {
            let (_, word) = words.next()?;
            Operand::Indexed {
                reg,
                offset: sign_extend_16(word),
            }
        }
        0x6 => Operand::Indirect(reg),
        0x7 => Operand::IndirectAutoincrement(reg),
        0x8 => {
            let (_, word) = words.next()?;
            Operand::Absolute(hi << 16 | word as u32)
        }
        0x9 => {
            let (at, word) = words.next()?;
            let offset = sign_extend(hi << 16 | word as u32, 20);
            Operand::Symbolic((at as i64 + offset as i64) as u32 & ADDRESS_MASK)
        }
        0xB => {
            let (_, word) = words.next()?;
            Operand::Immediate(hi << 16 | word as u32)
        }
        _ => return Err(invalid(i.data, "not a CALLA addressing mode")),
    };
    i.src = Some(operand);
    Ok(i)
}

/// Decode conditional and unconditional jumps (Format III)
fn decoder_jump(mut i: Instruction) -> Result<Instruction, DecodeError> {
    i.format = Format::FormatIII;
    i.mnem = match (i.data >> 10) & 0x7 {
        0 => Mnemonic::JNE,
        1 => Mnemonic::JEQ,
        2 => Mnemonic::JNC,
        3 => Mnemonic::JC,
        4 => Mnemonic::JN,
        5 => Mnemonic::JGE,
        6 => Mnemonic::JL,
        _ => Mnemonic::JMP,
    };
    i.offset = jump_offset(i.data);
    Ok(i)
}

/// Decode PUSHM and POPM
fn decoder_multiple(mut i: Instruction) -> Result<Instruction, DecodeError> {
    i.format = Format::Extended;
    let n = ((i.data >> 4) & 0xF) as usize + 1;
    let reg = i.get_register();

    let (mnem, size) = match (i.data >> 8) & 0x3 {
        0 => (Mnemonic::PUSHM, OperandSize::Address),
        1 => (Mnemonic::PUSHM, OperandSize::Word),
        2 => (Mnemonic::POPM, OperandSize::Address),
        _ => (Mnemonic::POPM, OperandSize::Word),
    };

    // PUSHM names the highest register, POPM encodes the lowest
    let rdst = match mnem {
        Mnemonic::PUSHM if reg + 1 >= n => reg,
        Mnemonic::POPM if reg + n <= 16 => reg + n - 1,
        _ => return Err(invalid(i.data, "register range out of bounds")),
    };

    i.mnem = mnem;
    i.size = size;
    i.count = n as u8;
    i.dst = Some(Operand::Register(rdst));
    Ok(i)
}

/// Decode the MSP430X address instructions (MOVA, CMPA, ADDA, SUBA) and RxxM
fn decoder_address<F>(mut i: Instruction, words: &mut WordStream<F>) -> Result<Instruction, DecodeError>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    i.format = Format::Extended;
    i.size = OperandSize::Address;

    let src = ((i.data >> 8) & 0xF) as usize;
    let dst = i.get_register();
    let src_hi = src as u32;
    let dst_hi = dst as u32;

    let (mnem, s, d) = match (i.data >> 4) & 0xF {
        0x0 => (Mnemonic::MOVA, Operand::Indirect(src), Operand::Register(dst)),
        0x1 => (
            Mnemonic::MOVA,
            Operand::IndirectAutoincrement(src),
            Operand::Register(dst),
        ),
        0x2 => {
            let (_, word) = words.next()?;
            (
                Mnemonic::MOVA,
                Operand::Absolute(src_hi << 16 | word as u32),
                Operand::Register(dst),
            )
        }
        0x3 => {
            let (_, word) = words.next()?;
            (
                Mnemonic::MOVA,
                Operand::Indexed {
                    reg: src,
                    offset: sign_extend_16(word),
                },
                Operand::Register(dst),
            )
        }
        0x4 | 0x5 => return decoder_rotate(i),
        0x6 => {
            let (_, word) = words.next()?;
            (
                Mnemonic::MOVA,
                Operand::Register(src),
                Operand::Absolute(dst_hi << 16 | word as u32),
            )
        }
        0x7 => {
            let (_, word) = words.next()?;
            (
                Mnemonic::MOVA,
                Operand::Register(src),
                Operand::Indexed {
                    reg: dst,
                    offset: sign_extend_16(word),
                },
            )
        }
        op @ 0x8..=0xB => {
            let (_, word) = words.next()?;
            let mnem = match op {
                0x8 => Mnemonic::MOVA,
                0x9 => Mnemonic::CMPA,
                0xA => Mnemonic::ADDA,
                _ => Mnemonic::SUBA,
            };
            (
                mnem,
                Operand::Immediate(src_hi << 16 | word as u32),
                Operand::Register(dst),
            )
        }
        op => {
            let mnem = match op {
                0xC => Mnemonic::MOVA,
                0xD => Mnemonic::CMPA,
                0xE => Mnemonic::ADDA,
                _ => Mnemonic::SUBA,
            };
            (mnem, Operand::Register(src), Operand::Register(dst))
        }
    };

    i.mnem = mnem;
    i.src = Some(s);
    i.dst = Some(d);
    Ok(i)
}

/// Decode RRCM, RRAM, RLAM and RRUM
fn decoder_rotate(mut i: Instruction) -> Result<Instruction, DecodeError> {
    i.mnem = match (i.data >> 8) & 0x3 {
        0 => Mnemonic::RRCM,
        1 => Mnemonic::RRAM,
        2 => Mnemonic::RLAM,
        _ => Mnemonic::RRUM,
    };
    i.size = if i.data & 0x0010 != 0 {
        OperandSize::Word
    } else {
        OperandSize::Address
    };
    i.count = ((i.data >> 10) & 0x3) as u8 + 1;
    i.dst = Some(Operand::Register(i.get_register()));
    Ok(i)
}

/// Decode an extension word and the format I or II instruction it prefixes
fn decoder_extended<F>(mut i: Instruction, words: &mut WordStream<F>) -> Result<Instruction, DecodeError>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    let ext_word = i.data;
    let (_, base) = words.next()?;
    i.data = base;

    let (register_mode, format) = match base {
        0x4000..=0xFFFF => {
            let ad = (base >> 7) & 0x1;
            let as_mode = (base >> 4) & 0x3;
            (ad == 0 && as_mode == 0, Format::FormatI)
        }
        0x1000..=0x12FF => ((base >> 4) & 0x3 == 0, Format::FormatII),
        _ => return Err(invalid(ext_word, "extension word not followed by format I or II")),
    };

    let ext = Extension::from_word(ext_word, register_mode);
    i.ext = Some(ext);
    let mut decoded = match format {
        Format::FormatI => decoder_format_i(i, Some(ext), words)?,
        _ => decoder_format_ii(i, Some(ext), words)?,
    };
    decoded.format = Format::Extended;
    Ok(decoded)
}

/// Operand width from the B/W bit and, when extended, the A/L bit
fn operand_size(i: &Instruction, ext: Option<Extension>) -> Result<OperandSize, DecodeError> {
    match (ext.map(|e| e.al()), i.get_bw()) {
        (None, false) | (Some(true), false) => Ok(OperandSize::Word),
        (None, true) | (Some(true), true) => Ok(OperandSize::Byte),
        (Some(false), true) => Ok(OperandSize::Address),
        (Some(false), false) => Err(invalid(i.data, "reserved A/L and B/W combination")),
    }
}

/// Decodes the instruction starting at `pc`
///
/// `first` is the word at `pc`; `fetch` yields the words that follow, in
/// order, and is only called as far as the encoding requires.
pub fn decode<F>(pc: u32, first: u16, fetch: F) -> Result<Instruction, DecodeError>
where
    F: FnMut() -> Result<u16, AccessFault>,
{
    let mut words = WordStream::new((pc + 2) & ADDRESS_MASK, fetch);
    let mut i = Instruction::new(pc, first);

    let decoded = match first {
        0x0000..=0x0FFF => decoder_address(i, &mut words),
        0x1000..=0x13FF => {
            i.format = Format::FormatII;
            decoder_format_ii(i, None, &mut words)
        }
        0x1400..=0x17FF => decoder_multiple(i),
        0x1800..=0x1FFF => decoder_extended(i, &mut words),
        0x2000..=0x3FFF => decoder_jump(i),
        _ => decoder_format_i(i, None, &mut words),
    };

    match decoded {
        Ok(mut i) => {
            i.len = 2 + 2 * words.consumed();
            Ok(i)
        }
        Err(e) => {
            if let DecodeError::Invalid { word, reason } = e {
                error!(
                    "Invalid instruction at 0x{:05x} (0x{:04x}): {}",
                    pc, word, reason
                );
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod decoder_tests {
    use super::*;
    use crate::instructions::Repeat;

    fn decode_words(words: &[u16]) -> Result<Instruction, DecodeError> {
        let mut rest = words[1..].iter();
        decode(0x8000, words[0], move || {
            rest.next()
                .copied()
                .ok_or(AccessFault::Unmapped { addr: 0x9000 })
        })
    }

    #[test]
    fn format_i_register_mode() {
        // MOV R5, R6
        let i = decode_words(&[0x4506]).unwrap();
        assert_eq!(i.mnem, Mnemonic::MOV);
        assert_eq!(i.format, Format::FormatI);
        assert_eq!(i.size, OperandSize::Word);
        assert_eq!(i.src, Some(Operand::Register(5)));
        assert_eq!(i.dst, Some(Operand::Register(6)));
        assert_eq!(i.len, 2);
    }

    #[test]
    fn format_i_word_order() {
        // ADD.B #0x12, 4(R7)
        let i = decode_words(&[0x50F7, 0x0012, 0x0004]).unwrap();
        assert_eq!(i.mnem, Mnemonic::ADD);
        assert_eq!(i.size, OperandSize::Byte);
        assert_eq!(i.src, Some(Operand::Immediate(0x12)));
        assert_eq!(i.dst, Some(Operand::Indexed { reg: 7, offset: 4 }));
        assert_eq!(i.len, 6);
    }

    #[test]
    fn format_i_absolute_and_symbolic() {
        // MOV &0x0200, 0x10(PC): dst offset word at 0x8004
        let i = decode_words(&[0x4290, 0x0200, 0x0010]).unwrap();
        assert_eq!(i.src, Some(Operand::Absolute(0x0200)));
        assert_eq!(i.dst, Some(Operand::Symbolic(0x8014)));
    }

    #[test]
    fn constant_generator_sources() {
        // MOV #-1, R4 via R3 As=11
        let i = decode_words(&[0x4334]).unwrap();
        assert_eq!(i.src, Some(Operand::Constant(0xFFFF)));
        // MOV #8, R4 via R2 As=11
        let i = decode_words(&[0x4234]).unwrap();
        assert_eq!(i.src, Some(Operand::Constant(8)));
        assert_eq!(i.len, 2);
    }

    #[test]
    fn indexed_r3_destination_is_invalid() {
        let err = decode_words(&[0x4583, 0x0000]).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid { word: 0x4583, .. }));
    }

    #[test]
    fn format_ii() {
        // RRA R5
        let i = decode_words(&[0x1105]).unwrap();
        assert_eq!(i.mnem, Mnemonic::RRA);
        assert_eq!(i.dst, Some(Operand::Register(5)));
        // PUSH.B @R6+
        let i = decode_words(&[0x1276]).unwrap();
        assert_eq!(i.mnem, Mnemonic::PUSH);
        assert_eq!(i.size, OperandSize::Byte);
        assert_eq!(i.src, Some(Operand::IndirectAutoincrement(6)));
        // CALL #0x8100
        let i = decode_words(&[0x12B0, 0x8100]).unwrap();
        assert_eq!(i.mnem, Mnemonic::CALL);
        assert_eq!(i.src, Some(Operand::Immediate(0x8100)));
        assert_eq!(i.len, 4);
    }

    #[test]
    fn format_ii_invalid_forms() {
        // SWPB.B R5, SXT.B R5, CALL.B R5
        assert!(decode_words(&[0x10C5]).is_err());
        assert!(decode_words(&[0x11C5]).is_err());
        assert!(decode_words(&[0x12C5]).is_err());
        // RRC #0x1234
        assert!(decode_words(&[0x1030, 0x1234]).is_err());
        // Bits 9:7 = 110 other than RETI
        assert!(decode_words(&[0x1305]).is_err());
    }

    #[test]
    fn reti_is_exact() {
        let i = decode_words(&[0x1300]).unwrap();
        assert_eq!(i.mnem, Mnemonic::RETI);
        assert_eq!(i.format, Format::FormatII);
    }

    #[test]
    fn jumps() {
        // JMP $ (offset -1)
        let i = decode_words(&[0x3FFF]).unwrap();
        assert_eq!(i.mnem, Mnemonic::JMP);
        assert_eq!(i.offset, -1);
        // JEQ +4
        let i = decode_words(&[0x2404]).unwrap();
        assert_eq!(i.mnem, Mnemonic::JEQ);
        assert_eq!(i.offset, 4);
        assert_eq!(decode_words(&[0x2000]).unwrap().mnem, Mnemonic::JNE);
        assert_eq!(decode_words(&[0x2800]).unwrap().mnem, Mnemonic::JNC);
        assert_eq!(decode_words(&[0x2C00]).unwrap().mnem, Mnemonic::JC);
        assert_eq!(decode_words(&[0x3000]).unwrap().mnem, Mnemonic::JN);
        assert_eq!(decode_words(&[0x3400]).unwrap().mnem, Mnemonic::JGE);
        assert_eq!(decode_words(&[0x3800]).unwrap().mnem, Mnemonic::JL);
    }

    #[test]
    fn address_instructions() {
        // MOVA #0x12345, R5
        let i = decode_words(&[0x0185, 0x2345]).unwrap();
        assert_eq!(i.mnem, Mnemonic::MOVA);
        assert_eq!(i.size, OperandSize::Address);
        assert_eq!(i.src, Some(Operand::Immediate(0x1_2345)));
        assert_eq!(i.dst, Some(Operand::Register(5)));
        assert_eq!(i.len, 4);
        // ADDA R4, R5
        let i = decode_words(&[0x04E5]).unwrap();
        assert_eq!(i.mnem, Mnemonic::ADDA);
        assert_eq!(i.src, Some(Operand::Register(4)));
        // MOVA @SP+, PC (RETA)
        let i = decode_words(&[0x0110]).unwrap();
        assert_eq!(i.src, Some(Operand::IndirectAutoincrement(1)));
        assert_eq!(i.dst, Some(Operand::Register(0)));
        // MOVA R6, &0x22000
        let i = decode_words(&[0x0662, 0x2000]).unwrap();
        assert_eq!(i.dst, Some(Operand::Absolute(0x2_2000)));
    }

    #[test]
    fn rotate_multiple() {
        // RLAM.W #3, R7
        let i = decode_words(&[0x0A57]).unwrap();
        assert_eq!(i.mnem, Mnemonic::RLAM);
        assert_eq!(i.size, OperandSize::Word);
        assert_eq!(i.count, 3);
        // RRCM.A #1, R4
        let i = decode_words(&[0x0044]).unwrap();
        assert_eq!(i.mnem, Mnemonic::RRCM);
        assert_eq!(i.size, OperandSize::Address);
        assert_eq!(i.count, 1);
    }

    #[test]
    fn push_and_pop_multiple() {
        // PUSHM.W #3, R10
        let i = decode_words(&[0x152A]).unwrap();
        assert_eq!(i.mnem, Mnemonic::PUSHM);
        assert_eq!(i.size, OperandSize::Word);
        assert_eq!(i.count, 3);
        assert_eq!(i.dst, Some(Operand::Register(10)));
        // POPM.W #3, R10 encodes R8
        let i = decode_words(&[0x1728]).unwrap();
        assert_eq!(i.mnem, Mnemonic::POPM);
        assert_eq!(i.dst, Some(Operand::Register(10)));
        // PUSHM.A #4, R2 would run below R0
        assert!(decode_words(&[0x1432]).is_err());
    }

    #[test]
    fn calla_modes() {
        let i = decode_words(&[0x1345]).unwrap();
        assert_eq!(i.mnem, Mnemonic::CALLA);
        assert_eq!(i.src, Some(Operand::Register(5)));
        let i = decode_words(&[0x13B1, 0x0000]).unwrap();
        assert_eq!(i.src, Some(Operand::Immediate(0x1_0000)));
        let i = decode_words(&[0x1380, 0x8100]).unwrap();
        assert_eq!(i.src, Some(Operand::Absolute(0x8100)));
        assert!(decode_words(&[0x13A0, 0x0000]).is_err());
    }

    #[test]
    fn extended_immediate_address_size() {
        // MOVX.A #0x12345, R5: src bits 19:16 = 1
        let i = decode_words(&[0x1880, 0x4075, 0x2345]).unwrap();
        assert_eq!(i.format, Format::Extended);
        assert_eq!(i.mnem, Mnemonic::MOV);
        assert_eq!(i.size, OperandSize::Address);
        assert_eq!(i.src, Some(Operand::Immediate(0x1_2345)));
        assert_eq!(i.len, 6);
        assert_eq!(i.after_opcode(), 0x8004);
    }

    #[test]
    fn extended_register_mode_repeat() {
        // RPT #4 RLAX.W R5, written as ADDX.W R5, R5
        let i = decode_words(&[0x1843, 0x5505]).unwrap();
        assert_eq!(i.mnem, Mnemonic::ADD);
        assert_eq!(i.size, OperandSize::Word);
        let ext = i.ext.unwrap();
        assert_eq!(ext.repeat, Some(Repeat::Count(4)));
        assert!(!ext.zc);
        // RRUX.W R6: RRCX with ZC
        let i = decode_words(&[0x1940, 0x1006]).unwrap();
        assert_eq!(i.mnem, Mnemonic::RRC);
        assert!(i.ext.unwrap().zc);
        // Repeat count from R7
        let i = decode_words(&[0x18C7, 0x5505]).unwrap();
        assert_eq!(i.ext.unwrap().repeat, Some(Repeat::Register(7)));
    }

    #[test]
    fn extended_invalid_combinations() {
        // Extension word followed by a jump
        assert!(decode_words(&[0x1800, 0x3C00]).is_err());
        // A/L = 0 with B/W = 0
        assert!(decode_words(&[0x1800, 0x4505]).is_err());
        // Extension word before CALL
        assert!(decode_words(&[0x1840, 0x1285]).is_err());
    }

    #[test]
    fn fetch_failure_is_access_error() {
        let err = decode_words(&[0x40B2]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Access(AccessFault::Unmapped { addr: 0x9000 })
        );
    }
}
