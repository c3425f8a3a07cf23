// Sign extends the low `bits` of a value
pub fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

// Sign extends a 16-bit word
pub fn sign_extend_16(value: u16) -> i32 {
    value as i16 as i32
}

// Sign extends the 10-bit offset field of a jump
pub fn jump_offset(word: u16) -> i16 {
    sign_extend((word & 0x03FF) as u32, 10) as i16
}

// Decimal addition of packed BCD digits, returns the sum and the decimal carry
pub fn bcd_add(a: u32, b: u32, carry: bool, digits: u32) -> (u32, bool) {
    let mut result = 0;
    let mut c = carry as u32;
    for i in 0..digits {
        let shift = i * 4;
        let mut d = ((a >> shift) & 0xF) + ((b >> shift) & 0xF) + c;
        c = 0;
        if d > 9 {
            d += 6;
            c = 1;
        }
        result |= (d & 0xF) << shift;
    }
    (result, c != 0)
}
